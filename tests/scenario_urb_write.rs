//! Scenario A (spec.md §8): `mov g2<1>f g1<8,8,1>f; send.urb; eot`.
//!
//! `driver::compile_shader` hardcodes `urb_base: 0` (see `translate::
//! SendContext` and DESIGN.md), which would place every VUE write near a
//! null host address, so this test calls `sfid::urb::emit_sfid_urb`
//! directly with a real host buffer as `urb_base`, the same way
//! `translate::translate_send` would have dispatched a `send.urb`
//! instruction, just without `compile_shader`'s fixed-zero wiring.

mod common;

use ksim::eu::decode::{BRW_OPCODE_MOV, BRW_OPCODE_SEND};
use ksim::eu::{DecodedInst, InstCommon, InstDst, InstSend, InstSrc, RegFile, RegType};
use ksim::kir::program::KirProgram;
use ksim::sfid::urb::emit_sfid_urb;
use ksim::thread::{Grf, Thread};
use ksim::translate::translate_inst;

#[test]
fn urb_write_lands_eight_lanes_at_their_per_lane_handles() {
    let mut prog = KirProgram::new(0, 0);

    // mov g2<1>f g1<8,8,1>f
    let mov = DecodedInst {
        common: InstCommon {
            opcode: BRW_OPCODE_MOV,
            access_mode: 0,
            exec_size: 3,
            pred_control: 0,
            pred_inv: false,
            cond_modifier: 0,
            saturate: false,
            mask_control: 0,
            cmpt_control: false,
        },
        dst: InstDst { file: RegFile::General, reg_type: RegType::F, num: 2, subnum: 0, hstride: 1 },
        src0: InstSrc {
            file: RegFile::General,
            reg_type: RegType::F,
            num: 1,
            subnum: 0,
            vstride: 8,
            width: 8,
            hstride: 1,
            negate: false,
            abs: false,
        },
        src1: InstSrc {
            file: RegFile::General,
            reg_type: RegType::F,
            num: 1,
            subnum: 0,
            vstride: 8,
            width: 8,
            hstride: 1,
            negate: false,
            abs: false,
        },
        send: None,
        imm: 0,
    };
    translate_inst(&mut prog, &mov);

    // send.urb: src0.num = 0 (handle register g0); opcode bits 0-3 = 7
    // (UrbOpcode::Simd8Write), no per-slot offset / channel mask / global
    // offset; mlen = 2 (header + one payload register) so
    // `sfid_urb_simd8_write`'s `valid_bits` covers exactly payload
    // register `grf[1]`.
    let send = DecodedInst {
        common: InstCommon {
            opcode: BRW_OPCODE_SEND,
            access_mode: 0,
            exec_size: 3,
            pred_control: 0,
            pred_inv: false,
            cond_modifier: 0,
            saturate: false,
            mask_control: 0,
            cmpt_control: false,
        },
        dst: InstDst { file: RegFile::General, reg_type: RegType::Ud, num: 0, subnum: 0, hstride: 1 },
        src0: InstSrc {
            file: RegFile::General,
            reg_type: RegType::Ud,
            num: 0,
            subnum: 0,
            vstride: 8,
            width: 8,
            hstride: 1,
            negate: false,
            abs: false,
        },
        src1: InstSrc {
            file: RegFile::General,
            reg_type: RegType::Ud,
            num: 0,
            subnum: 0,
            vstride: 8,
            width: 8,
            hstride: 1,
            negate: false,
            abs: false,
        },
        send: Some(InstSend { sfid: 6, function_control: 7, header_present: true, rlen: 0, mlen: 2, eot: false }),
        imm: 0,
    };

    let mut arena = scratch_arena();
    // Each lane's handle is a distinct 4-byte offset into `buf`, matching
    // real hardware semantics: 8 lanes of a SIMD8 batch hold 8 different
    // vertices, each with its own VUE handle.
    let mut buf = [0u32; 8];
    let urb_base = buf.as_mut_ptr() as u64;

    emit_sfid_urb(&mut prog, &mut arena, &send, 0, urb_base, false);
    prog.eot();

    let (_arena_code, entry) = common::compile(&mut prog);

    let mut thread = Thread::new();
    thread.grf[0] = Grf::from_i32([0, 4, 8, 12, 16, 20, 24, 28]);
    thread.grf[1] = Grf::from_f32([0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    thread.mask_q1 = common::all_lanes_active();

    entry(&mut *thread as *mut Thread);

    assert_eq!(buf, [0f32.to_bits(), 1f32.to_bits(), 2f32.to_bits(), 3f32.to_bits(), 4f32.to_bits(), 5f32.to_bits(), 6f32.to_bits(), 7f32.to_bits()]);
}

/// `emit_sfid_urb` takes its own arena only to allocate the message's fixed
/// argument block in; a throwaway arena separate from the one `common::
/// compile` later emits code into is exactly what `translate_send`'s real
/// callers do too (`SendContext::arena` is the same arena `compile_shader`
/// emits into, but nothing requires that).
fn scratch_arena() -> ksim::arena::ShaderArena {
    ksim::arena::ShaderArena::new(1 << 16).expect("arena allocation")
}
