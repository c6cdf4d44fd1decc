//! Dataport message lowering, SFID 12 (data cache 1 / untyped + atomics) and
//! SFID 0/4/9 (dataport-RO / constant cache).
//!
//! Grounded on `dataport.c`'s `sfid_dataport1_untyped_write`,
//! `sfid_dataport1_integer_atomic_inc`/`_predec`, `emit_dword_atomic_integer`,
//! `builder_emit_sfid_dataport1`, `builder_emit_sfid_dataport_ro`.

use crate::arena::ShaderArena;
use crate::eu::DecodedInst;
use crate::gpu_addr::HostMemory;
use crate::kir::program::KirProgram;
use crate::sfid::{alloc_args, field};
use crate::surface;
use crate::thread::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Simd2Mode {
    Simd16,
    Simd8,
}

impl Simd2Mode {
    fn from_bits(bits: u32) -> Simd2Mode {
        match bits {
            0 => Simd2Mode::Simd16,
            1 => Simd2Mode::Simd8,
            other => panic!("out of range mdc_sm2r: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomicOp {
    Inc,
    Predec,
    Other(u32),
}

impl AtomicOp {
    fn from_bits(bits: u32) -> AtomicOp {
        match bits {
            0x05 => AtomicOp::Inc,
            0x0f => AtomicOp::Predec,
            other => AtomicOp::Other(other),
        }
    }
}

/// Argument block shared by every dataport-1 native helper below, `struct
/// sfid_dataport1_args`.
#[repr(C)]
struct SfidDataport1Args {
    simd_mode: Simd2Mode,
    scope_is_q2: bool,
    src: u32,
    /// Host pointer to the resolved surface's pixel data.
    buffer: u64,
    /// Untyped-write-only: which of the 4 dword components to *skip*
    /// (`MSD1W_US`'s write-mask field).
    mask: u32,
}

fn movemask(exec_mask: &Thread, scope_is_q2: bool, half: u32) -> u32 {
    let grf = if scope_is_q2 { exec_mask.mask_q2 } else { exec_mask.mask_q1 };
    let lanes = grf.as_i32();
    let mut bits = 0u32;
    for (c, &v) in lanes.iter().enumerate() {
        if v < 0 {
            bits |= 1 << c;
        }
    }
    let _ = half;
    bits
}

extern "C" fn sfid_dataport1_untyped_write(t: *mut Thread, args: *const SfidDataport1Args) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };

    let channel_bits = t.grf[args.src as usize].as_i32()[7] as u32;
    let mask = movemask(t, args.scope_is_q2, 0) & channel_bits;

    for c in 0..8u32 {
        if mask & (1 << c) == 0 {
            continue;
        }
        let dst_offset = t.grf[(args.src + 1) as usize].as_i32()[c as usize] as u32;
        let dst = (args.buffer + dst_offset as u64) as *mut u32;
        let mut written = 0usize;
        for comp in 0..4u32 {
            if args.mask & (1 << comp) != 0 {
                continue;
            }
            let src = t.grf[(args.src + 2 + comp) as usize].as_i32()[c as usize] as u32;
            unsafe { *dst.add(written) = src };
            written += 1;
        }
    }
}

extern "C" fn sfid_dataport1_integer_atomic_inc(t: *mut Thread, args: *const SfidDataport1Args) {
    atomic_step(t, args, 1);
}

extern "C" fn sfid_dataport1_integer_atomic_predec(t: *mut Thread, args: *const SfidDataport1Args) {
    atomic_step(t, args, -1);
}

fn atomic_step(t: *mut Thread, args: *const SfidDataport1Args, delta: i64) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };

    let channel_bits = t.grf[args.src as usize].as_i32()[7] as u32;
    let mask = movemask(t, args.scope_is_q2, 0) & channel_bits;
    let u = t.grf[(args.src + 1) as usize].as_i32();
    for c in 0..8u32 {
        if mask & (1 << c) == 0 {
            continue;
        }
        let dst = (args.buffer + u[c as usize] as u64) as *const std::sync::atomic::AtomicU32;
        unsafe { (*dst).fetch_add(delta as u32, std::sync::atomic::Ordering::Relaxed) };
    }

    if args.simd_mode == Simd2Mode::Simd8 {
        return;
    }

    let mask = movemask(t, args.scope_is_q2, 1) & (channel_bits >> 8);
    let u = t.grf[(args.src + 2) as usize].as_i32();
    for c in 0..8u32 {
        if mask & (1 << c) == 0 {
            continue;
        }
        let dst = (args.buffer + u[c as usize] as u64) as *const std::sync::atomic::AtomicU32;
        unsafe { (*dst).fetch_add(delta as u32, std::sync::atomic::Ordering::Relaxed) };
    }
}

/// `emit_dword_atomic_integer`: `MSD1R_DWAI2` sub-dispatch on the atomic op.
fn emit_dword_atomic_integer(prog: &mut KirProgram, arena: &mut ShaderArena, host: &dyn HostMemory, inst: &DecodedInst, scope_is_q2: bool) {
    let send = inst.send.expect("dataport message without send fields");
    assert!(send.header_present);

    let bti = field(send.function_control, 0, 7);
    let atomic_op = AtomicOp::from_bits(field(send.function_control, 8, 11));
    let simd_mode = Simd2Mode::from_bits(field(send.function_control, 12, 12));

    let func = match atomic_op {
        AtomicOp::Inc => sfid_dataport1_integer_atomic_inc as usize,
        AtomicOp::Predec => sfid_dataport1_integer_atomic_predec as usize,
        AtomicOp::Other(op) => panic!("unimplemented dataport atomic op: {op}"),
    };

    let surface = surface::get_surface(host, prog.binding_table_address, bti).expect("invalid binding table entry");
    let buffer = host.translate(surface.pixels, 1).expect("surface not mapped") as u64;

    let args = alloc_args(
        arena,
        SfidDataport1Args { simd_mode, scope_is_q2, src: inst.src0.num, buffer, mask: 0 },
    );
    prog.send(func, args, inst.src0.num, send.mlen, inst.dst.num, send.rlen, true);
}

/// Lower one `send` instruction whose SFID field selected dataport-1 (data
/// cache, untyped reads/writes and atomics).
pub fn emit_sfid_dataport1(prog: &mut KirProgram, arena: &mut ShaderArena, host: &dyn HostMemory, inst: &DecodedInst, scope_is_q2: bool) {
    let send = inst.send.expect("dataport message without send fields");
    let bti = field(send.function_control, 0, 7);
    let mask = field(send.function_control, 8, 11);
    let simd_mode = field(send.function_control, 12, 13);
    let opcode = field(send.function_control, 14, 18);

    match opcode {
        0x02 => emit_dword_atomic_integer(prog, arena, host, inst, scope_is_q2),
        0x09 => {
            assert_eq!(simd_mode, 2, "MSD1W_US requires SIMD8");
            let surface = surface::get_surface(host, prog.binding_table_address, bti).expect("invalid binding table entry");
            let buffer = host.translate(surface.pixels, 1).expect("surface not mapped") as u64;
            let args = alloc_args(
                arena,
                SfidDataport1Args {
                    simd_mode: Simd2Mode::Simd8,
                    scope_is_q2,
                    src: inst.src0.num,
                    buffer,
                    mask,
                },
            );
            prog.send(
                sfid_dataport1_untyped_write as usize,
                args,
                inst.src0.num,
                send.mlen,
                inst.dst.num,
                send.rlen,
                true,
            );
        }
        other => panic!("unimplemented dataport1 opcode: {other:#x}"),
    }
}

/// Dataport-RO (constant cache) argument block for the one message type
/// `builder_emit_sfid_dataport_ro` fully implements.
#[repr(C)]
struct SfidDataportRoArgs {
    base: u64,
    dst: u32,
}

extern "C" fn sfid_dataport_ro_oword_block_read(t: *mut Thread, args: *const SfidDataportRoArgs) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };
    for half in 0..2u32 {
        let bytes = unsafe { std::slice::from_raw_parts((args.base + half as u64 * 32) as *const u8, 32) };
        let mut chunk = [0u8; 32];
        chunk.copy_from_slice(bytes);
        t.grf[(args.dst + half) as usize] = crate::thread::Grf(chunk);
    }
}

/// Lower one `send` instruction whose SFID field selected dataport-RO
/// (constant cache). Only `MT_CC_OWB` with `OW4` data elements
/// (`builder_emit_sfid_dataport_ro`'s fully-implemented case) is handled;
/// everything else is an explicit stub, matching the original's own
/// `stub()` fallthrough for the rest of that dispatch table.
pub fn emit_sfid_dataport_ro(prog: &mut KirProgram, arena: &mut ShaderArena, host: &dyn HostMemory, inst: &DecodedInst) {
    let send = inst.send.expect("dataport message without send fields");
    let bti = field(send.function_control, 0, 7);
    let message_type = field(send.function_control, 8, 10);
    let data_elements = field(send.function_control, 11, 13);

    const MT_CC_OWB: u32 = 0;
    const OW4: u32 = 3;

    if message_type != MT_CC_OWB || data_elements != OW4 {
        panic!("unimplemented dataport-ro message: type {message_type:#x}, elements {data_elements:#x}");
    }

    let surface = surface::get_surface(host, prog.binding_table_address, bti).expect("invalid binding table entry");
    let pixels = host.translate(surface.pixels, 64).expect("surface not mapped") as u64;

    // The offset comes out of the payload GRF in owords (not baked into
    // `args` here); the original has a FIXME noting a missing constant-
    // propagation optimization for statically-known offsets, which ksim
    // reproduces rather than adding.
    let args = alloc_args(arena, SfidDataportRoArgs { base: pixels, dst: inst.dst.num });
    prog.send(
        sfid_dataport_ro_oword_block_read as usize,
        args,
        inst.src0.num,
        send.mlen,
        inst.dst.num,
        send.rlen,
        false,
    );
}
