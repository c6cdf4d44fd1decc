//! Top-level compile entry point: turns one Gen9 EU kernel into a callable
//! native function.
//!
//! Grounded on `kir.c`'s `kir_program_compile` (decode loop, in that order:
//! per-instruction translate, then `kir_program_optimize`, then
//! `kir_program_emit`) and `loader.c`'s `compile_shader`, which is the
//! original's equivalent top-level entry point threading a GTT-mapped
//! kernel address through decode/translate/codegen into the shader arena.

use crate::arena::ShaderArena;
use crate::config::CompileConfig;
use crate::error::KsimError;
use crate::eu::decode::{Decoder, BRW_OPCODE_SEND, BRW_OPCODE_SENDC, BRW_SFID_THREAD_SPAWNER};
use crate::gpu_addr::HostMemory;
use crate::kir::passes;
use crate::kir::program::KirProgram;
use crate::stage::Stage;
use crate::thread::Thread;
use crate::translate::{translate_inst, translate_send, SendContext};

/// Upper bound on the number of EU instructions `compile_shader` will decode
/// from one kernel before giving up. Real Gen9 kernels are a few hundred
/// instructions at most; this is a safety backstop against a malformed or
/// unterminated (no `eot`) instruction stream, not a real architectural
/// limit.
const MAX_KERNEL_INSTRUCTIONS: usize = 4096;

const INSTRUCTION_SIZE: u64 = 16;

/// A compiled shader's entry address, callable through `dispatch`.
///
/// Thin wrapper around the code pointer `asm::codegen::emit_program`
/// returns, matching `backend_jit.rs`'s `JitFunction` newtype: the pointee
/// is `extern "C" fn(*mut Thread)`, taking the per-thread state pointer in
/// `rdi` per the System V AMD64 ABI, the same convention every
/// `[rdi+disp32]`-addressed `asm::forms` helper assumes.
#[derive(Clone, Copy)]
pub struct EntryPoint(*const u8);

/// Compile the Gen9 EU kernel at `kernel_gpu_addr` into native AVX2 code
/// placed in `arena`, returning its entry point.
///
/// `stage` is accepted but, per spec.md §6, only the kernel body itself is
/// compiled here — fixed-function prologues (payload/CURBE setup, vertex
/// fetch, vertex post-processing) are separate public entry points in
/// `stage::*` that a host composes on its own, since `compile_shader`'s
/// signature carries none of the vertex-buffer/push-constant state those
/// need (see DESIGN.md).
pub fn compile_shader(
    host: &dyn HostMemory,
    arena: &mut ShaderArena,
    kernel_gpu_addr: u64,
    binding_table_gpu_addr: u64,
    sampler_state_gpu_addr: u64,
    stage: Stage,
    config: &CompileConfig,
) -> EntryPoint {
    log::debug!(
        target: "ksim::driver",
        "compile_shader: kernel=0x{kernel_gpu_addr:016x} stage={stage:?} model={:?}",
        config.model
    );

    let mut prog = KirProgram::new(binding_table_gpu_addr, sampler_state_gpu_addr);
    let mut ctx = SendContext {
        host,
        arena,
        urb_offset: 0,
        urb_base: 0,
        // SIMD16 dispatch (the only mode where a `send` can target the
        // second quarter of the execution mask) is out of scope (see
        // `translate::translate_inst`'s `exec_size <= 8` assertion), so
        // every message always scopes to the first quarter.
        scope_is_q2: false,
    };

    for index in 0..MAX_KERNEL_INSTRUCTIONS {
        let byte_offset = index as u64 * INSTRUCTION_SIZE;
        let addr = kernel_gpu_addr + byte_offset;
        let bytes: [u8; 16] = ctx
            .host
            .read(addr, 16)
            .unwrap_or_else(|e| panic!("kernel instruction fetch at 0x{addr:016x} failed: {e}"))
            .try_into()
            .unwrap();

        let inst = match Decoder::decode(bytes, byte_offset) {
            Ok(inst) => inst,
            Err(KsimError::CompactedInstruction(offset)) => {
                panic!("compacted EU instruction at offset {offset}: expansion is out of scope")
            }
            Err(e) => panic!("EU decode failed at offset {byte_offset}: {e}"),
        };

        if config.trace.contains(crate::config::TraceFlags::EU_DECODE) {
            log::trace!(target: "ksim::eu_decode", "inst[{index}] opcode={}", inst.common.opcode);
        }

        let is_send = matches!(inst.common.opcode, BRW_OPCODE_SEND | BRW_OPCODE_SENDC);
        if is_send {
            let send = inst.send.expect("send-opcode instruction decoded without InstSend fields");
            let terminates = send.eot || send.sfid == BRW_SFID_THREAD_SPAWNER;
            translate_send(&mut prog, &inst, &mut ctx);
            if terminates {
                break;
            }
        } else {
            translate_inst(&mut prog, &inst);
        }

        assert!(
            index + 1 < MAX_KERNEL_INSTRUCTIONS,
            "kernel at 0x{kernel_gpu_addr:016x} exceeded {MAX_KERNEL_INSTRUCTIONS} instructions without an eot send"
        );
    }

    passes::run_all(&mut prog);
    let entry = crate::asm::codegen::emit_program(&prog, ctx.arena);
    EntryPoint(entry)
}

/// Invoke a previously compiled shader once, for the 8 lanes described by
/// `thread`.
///
/// # Safety
///
/// `entry` must have been returned by a `compile_shader` call whose arena
/// has not since been `reset`, and `thread` must point at a valid,
/// appropriately laid-out `Thread` for the duration of the call.
pub unsafe fn dispatch(entry: EntryPoint, thread: *mut Thread) {
    let f: extern "C" fn(*mut Thread) = std::mem::transmute(entry.0);
    f(thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileConfig;
    use crate::gpu_addr::FlatMemory;

    fn nop_eot_kernel() -> Vec<u8> {
        // inst[0]: NOP. inst[1]: a `send` to the thread spawner with eot set.
        let mut bytes = vec![0u8; 32];
        bytes[16] = crate::eu::decode::BRW_OPCODE_SEND as u8;
        // sfid (bits 24-27 of the first quadword) = BRW_SFID_THREAD_SPAWNER.
        bytes[16 + 3] |= (BRW_SFID_THREAD_SPAWNER as u8) << 0;
        // eot is bit 127, the top bit of the second quadword.
        bytes[16 + 15] |= 0x80;
        bytes
    }

    #[test]
    fn compiles_a_minimal_kernel_to_a_nonnull_entry_point() {
        let kernel_addr = 0x1000;
        let mem = FlatMemory::new(kernel_addr, nop_eot_kernel());
        let mut arena = ShaderArena::new(1 << 20).unwrap();
        let config = CompileConfig::default();

        let entry = compile_shader(&mem, &mut arena, kernel_addr, 0, 0, Stage::Pixel, &config);
        assert!(!entry.0.is_null());
    }
}
