//! Scenario C (spec.md §8): `add(8) g2<1>f g1<0,1,0>f g1.1<0,1,0>f`, a
//! scalar broadcast of two different channels of the same register. Built
//! the way `translate.rs`'s own `#[cfg(test)]` module builds a
//! `DecodedInst` by hand (`inst_with`), rather than decoding raw bytes.

mod common;

use ksim::eu::decode::BRW_OPCODE_ADD;
use ksim::eu::{DecodedInst, InstCommon, InstDst, InstSrc, RegFile, RegType};
use ksim::kir::program::KirProgram;
use ksim::thread::{Grf, Thread};
use ksim::translate::translate_inst;

/// `g1<0,1,0>f` / `g1.1<0,1,0>f`: a uniform (`vstride=0, width=1,
/// hstride=0`) scalar region, `subnum` selecting which 4-byte slot of `g1`
/// to broadcast.
fn scalar_src(subnum: u32) -> InstSrc {
    InstSrc {
        file: RegFile::General,
        reg_type: RegType::F,
        num: 1,
        subnum,
        vstride: 0,
        width: 1,
        hstride: 0,
        negate: false,
        abs: false,
    }
}

#[test]
fn scalar_broadcast_add_reads_two_channels_of_one_register() {
    let mut prog = KirProgram::new(0, 0);

    let inst = DecodedInst {
        common: InstCommon {
            opcode: BRW_OPCODE_ADD,
            access_mode: 0,
            exec_size: 3, // SIMD8
            pred_control: 0,
            pred_inv: false,
            cond_modifier: 0,
            saturate: false,
            mask_control: 0,
            cmpt_control: false,
        },
        dst: InstDst { file: RegFile::General, reg_type: RegType::F, num: 2, subnum: 0, hstride: 1 },
        src0: scalar_src(0),
        src1: scalar_src(1),
        send: None,
        imm: 0,
    };

    translate_inst(&mut prog, &inst);
    prog.eot();

    let (_arena, entry) = common::compile(&mut prog);

    let mut thread = Thread::new();
    thread.grf[1] = Grf::from_f32([3.5, 2.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    entry(&mut *thread as *mut Thread);

    let expected = 3.5f32 + 2.25f32;
    assert_eq!(thread.grf[2].as_f32(), [expected; 8]);
}
