//! URB (Unified Return Buffer) message lowering, SFID 6.
//!
//! Grounded on `urb.c`'s `unpack_urb_message_descriptor`,
//! `emit_sfid_urb_simd8_simple_write`, `sfid_urb_simd8_read`/`_write`,
//! `create_urb_args`, `builder_emit_sfid_urb`.

use crate::arena::ShaderArena;
use crate::eu::DecodedInst;
use crate::kir::program::KirProgram;
use crate::sfid::{alloc_args, field};
use crate::thread::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrbOpcode {
    WriteHword,
    WriteOword,
    ReadHword,
    ReadOword,
    AtomicMov,
    AtomicInc,
    AtomicAdd,
    Simd8Write,
    Simd8Read,
}

impl UrbOpcode {
    fn from_bits(bits: u32) -> UrbOpcode {
        match bits {
            0 => UrbOpcode::WriteHword,
            1 => UrbOpcode::WriteOword,
            2 => UrbOpcode::ReadHword,
            3 => UrbOpcode::ReadOword,
            4 => UrbOpcode::AtomicMov,
            5 => UrbOpcode::AtomicInc,
            6 => UrbOpcode::AtomicAdd,
            7 => UrbOpcode::Simd8Write,
            8 => UrbOpcode::Simd8Read,
            other => panic!("out of range urb opcode: {other}"),
        }
    }
}

struct UrbMessageDescriptor {
    opcode: UrbOpcode,
    global_offset: u32,
    channel_mask: bool,
    per_slot_offset: bool,
}

fn unpack_urb_message_descriptor(function_control: u32) -> UrbMessageDescriptor {
    UrbMessageDescriptor {
        opcode: UrbOpcode::from_bits(field(function_control, 0, 3)),
        global_offset: field(function_control, 4, 14),
        channel_mask: field(function_control, 15, 15) != 0,
        per_slot_offset: field(function_control, 17, 17) != 0,
    }
}

/// The fixed argument block a URB `send` helper reads via `rsi`, built once
/// at KIR-construction time by `create_urb_args`.
#[repr(C)]
struct SfidUrbArgs {
    global_offset: u32,
    per_slot_offset: bool,
    channel_mask: bool,
    src: u32,
    dst: u32,
    len: u32,
    rlen: u32,
    /// Host base address backing the URB, so `urb_handle_to_entry` can
    /// resolve a VUE handle without a global.
    urb_base: u64,
    /// Which execution-mask quarter (`Thread::mask_q1`/`mask_q2`) applies,
    /// `kir_program::scope` at emission time.
    scope_is_q2: bool,
}

fn urb_handle_to_entry(urb_base: u64, handle: u32) -> *mut u32 {
    (urb_base + handle as u64) as *mut u32
}

fn mask_for_scope(t: &Thread, scope_is_q2: bool) -> [u32; 8] {
    let grf = if scope_is_q2 { t.mask_q2 } else { t.mask_q1 };
    grf.as_i32().map(|v| v as u32)
}

extern "C" fn sfid_urb_simd8_read(t: *mut Thread, args: *const SfidUrbArgs) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };

    let mut grf = args.src;
    let vue_handles = t.grf[grf as usize].as_i32().map(|v| v as u32);
    grf += 1;

    let mut offset = [args.global_offset; 8];
    if args.per_slot_offset {
        let add = t.grf[grf as usize].as_i32().map(|v| v as u32);
        for c in 0..8 {
            offset[c] = offset[c].wrapping_add(add[c]);
        }
        grf += 1;
    }

    let valid_bits = (1u32 << args.rlen) - 1;
    let channel_mask = if args.channel_mask {
        let raw = t.grf[grf as usize].as_i32().map(|v| v as u32);
        grf += 1;
        raw.map(|v| (v >> 16) & valid_bits)
    } else {
        [valid_bits; 8]
    };

    let exec_mask = mask_for_scope(t, args.scope_is_q2);
    for c in 0..8 {
        let mask = channel_mask[c] & exec_mask[c];
        if mask == 0 {
            continue;
        }
        let vue = urb_handle_to_entry(args.urb_base, vue_handles[c]).wrapping_add((offset[c] * 16) as usize);
        for i in 0..32u32 {
            if mask & (1 << i) == 0 {
                continue;
            }
            let word = unsafe { *vue.add(i as usize) };
            let mut grf_val = t.grf[(args.dst + i) as usize].as_i32();
            grf_val[c] = word as i32;
            t.grf[(args.dst + i) as usize] = crate::thread::Grf::from_i32(grf_val);
        }
    }
}

extern "C" fn sfid_urb_simd8_write(t: *mut Thread, args: *const SfidUrbArgs) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };

    let mut grf = args.src;
    let vue_handles = t.grf[grf as usize].as_i32().map(|v| v as u32);
    grf += 1;

    let mut offset = [args.global_offset; 8];
    if args.per_slot_offset {
        let add = t.grf[grf as usize].as_i32().map(|v| v as u32);
        for c in 0..8 {
            offset[c] = offset[c].wrapping_add(add[c]);
        }
        grf += 1;
    }

    let channel_mask = if args.channel_mask {
        let raw = t.grf[grf as usize].as_i32().map(|v| v as u32);
        let valid_bits = (1u32 << (args.src + args.len - grf - 1)) - 1;
        grf += 1;
        raw.map(|v| (v >> 16) & valid_bits)
    } else {
        let valid_bits = (1u32 << (args.src + args.len - grf)) - 1;
        [valid_bits; 8]
    };

    let exec_mask = mask_for_scope(t, args.scope_is_q2);
    for c in 0..8 {
        let mask = channel_mask[c] & exec_mask[c];
        if mask == 0 {
            continue;
        }
        let vue = urb_handle_to_entry(args.urb_base, vue_handles[c]).wrapping_add((offset[c] * 16) as usize);
        for i in 0..32u32 {
            if mask & (1 << i) == 0 {
                continue;
            }
            let src_val = t.grf[(grf + i) as usize].as_i32()[c] as u32;
            unsafe { *vue.add(i as usize) = src_val };
        }
    }
}

/// `emit_sfid_urb_simd8_simple_write`: when there's no per-slot offset or
/// channel mask and the program knows its own URB landing offset, skip the
/// native helper and just copy GRFs straight into the VUE inline.
fn emit_simple_write(prog: &mut KirProgram, inst: &DecodedInst, urb_offset: u32) {
    let send = inst.send.expect("urb message without send fields");
    let src = (inst.src0.num + 1) * 32;
    let vue_offset = field(send.function_control, 4, 14);
    let dst = urb_offset + vue_offset * 4 * 32;

    prog.comment(format!("urb write: length {}, offset {vue_offset}", send.mlen - 1));

    for i in 0..send.mlen - 1 {
        let v = prog.load_v8(src + i * 32);
        prog.store_v8(dst + i * 32, v);
    }
}

fn create_args(arena: &mut ShaderArena, inst: &DecodedInst, md: &UrbMessageDescriptor, scope_is_q2: bool, urb_base: u64) -> usize {
    let send = inst.send.expect("urb message without send fields");
    alloc_args(
        arena,
        SfidUrbArgs {
            global_offset: md.global_offset,
            per_slot_offset: md.per_slot_offset,
            channel_mask: md.channel_mask,
            src: inst.src0.num,
            dst: inst.dst.num,
            len: send.mlen,
            rlen: send.rlen,
            urb_base,
            scope_is_q2,
        },
    )
}

/// Lower one `send` instruction whose SFID field selected URB. `urb_offset`
/// is `KirProgram`'s own landing-buffer offset for the simple-write fast
/// path (0 disables it, matching `prog->urb_offset > 0` in the original);
/// `urb_base`/`scope_is_q2` become part of the native helper's argument
/// block for the non-simple paths.
pub fn emit_sfid_urb(prog: &mut KirProgram, arena: &mut ShaderArena, inst: &DecodedInst, urb_offset: u32, urb_base: u64, scope_is_q2: bool) {
    let send = inst.send.expect("urb message without send fields");
    assert!(send.header_present, "urb message missing header");
    let md = unpack_urb_message_descriptor(send.function_control);

    match md.opcode {
        UrbOpcode::WriteHword
        | UrbOpcode::WriteOword
        | UrbOpcode::ReadHword
        | UrbOpcode::ReadOword
        | UrbOpcode::AtomicMov
        | UrbOpcode::AtomicInc
        | UrbOpcode::AtomicAdd => {
            panic!("unimplemented sfid urb opcode: {:?}", md.opcode);
        }
        UrbOpcode::Simd8Read => {
            let args = create_args(arena, inst, &md, scope_is_q2, urb_base);
            prog.send(sfid_urb_simd8_read as usize, args, inst.src0.num, send.mlen, inst.dst.num, send.rlen, false);
        }
        UrbOpcode::Simd8Write => {
            assert_eq!(send.rlen, 0);
            if !md.per_slot_offset && !md.channel_mask && urb_offset > 0 {
                emit_simple_write(prog, inst, urb_offset);
            } else {
                let args = create_args(arena, inst, &md, scope_is_q2, urb_base);
                prog.send(sfid_urb_simd8_write as usize, args, inst.src0.num, send.mlen, inst.dst.num, send.rlen, true);
            }
        }
    }
}
