//! Top-level KIR-to-machine-code driver: walks a register-allocated
//! `KirProgram` and emits the AVX2 sequence `kir_program_emit` would, into
//! a scratch buffer, then places that buffer in a `ShaderArena`.
//!
//! The original emits directly into the shader's final RWX memory, so a
//! RIP-relative displacement or a `call rel32` target is just "the other
//! address minus the current pointer", computed on the spot. ksim doesn't
//! know the final address of its own code until the whole program's length
//! is known (`ShaderArena::alloc_code` takes a size up front), so emission
//! happens in two passes instead: forms are appended to a scratch `Vec<u8>`
//! while every RIP-relative/`rel32` field records a `Reloc` (the absolute
//! target and the offset of the 4-byte field to patch); once the buffer's
//! final length is known, `arena.alloc_code` reserves the real destination,
//! every `Reloc` is resolved against it, and the patched buffer is copied
//! in. Constant-pool data, by contrast, is allocated as each `Immd`/`Immv`/
//! `Gather` is encountered — `ShaderArena`'s constant region is a separate,
//! already-fixed bump area, so those addresses are known immediately.

use crate::arena::ShaderArena;
use crate::asm::forms;
use crate::asm::Emitter;
use crate::eu::EuRegion;
use crate::kir::program::{KirProgram, KirReg, Opcode, Payload};
use crate::region;

struct Reloc {
    patch_offset: usize,
    target: usize,
}

struct CodeGen<'a> {
    e: Emitter,
    relocs: Vec<Reloc>,
    arena: &'a mut ShaderArena,
}

impl<'a> CodeGen<'a> {
    fn new(arena: &'a mut ShaderArena) -> CodeGen<'a> {
        CodeGen { e: Emitter::new(), relocs: Vec::new(), arena }
    }

    /// Record that the 4-byte field ending at the current code position
    /// minus 4 needs `target` patched in as a rip/rel32 displacement once
    /// the buffer's final address is known.
    fn mark_reloc_ending_here(&mut self, target: usize) {
        let patch_offset = self.e.pos() - 4;
        self.relocs.push(Reloc { patch_offset, target });
    }

    /// Store `bytes` in the constant pool and return its absolute address.
    fn const_data(&mut self, bytes: &[u8], align: usize) -> usize {
        let (ptr, _offset) = self.arena.alloc_const(bytes.len(), align).expect("constant pool exhausted");
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        ptr as usize
    }

    /// Emit a RIP-relative load of `target` (an address already placed in
    /// the constant pool) via `emit_form`, which appends the instruction
    /// with a placeholder 0 displacement; the real displacement is patched
    /// in during `finish`.
    fn emit_rip(&mut self, target: usize, emit_form: impl FnOnce(&mut Emitter, i32)) {
        emit_form(&mut self.e, 0);
        self.mark_reloc_ending_here(target);
    }

    fn finish(mut self) -> *const u8 {
        let code = self.e.code;
        let code_ptr = self.arena.alloc_code(code.len()).expect("code pool exhausted");
        for reloc in &self.relocs {
            let next_ip = code_ptr as usize + reloc.patch_offset + 4;
            let disp = reloc.target as i64 - next_ip as i64;
            let disp = i32::try_from(disp).expect("relocation target out of 32-bit displacement range");
            code[reloc.patch_offset..reloc.patch_offset + 4].copy_from_slice(&disp.to_le_bytes());
        }
        unsafe { std::ptr::copy_nonoverlapping(code.as_ptr(), code_ptr, code.len()) };
        code_ptr
    }
}

/// Native function pointer used by `call`/`const_call`/`send`/`const_send`.
/// Stored as a raw `usize` in `kir::program::CallData`/`SendData`; codegen
/// just needs its bit pattern to compute a `call rel32`/`jmp rel32` target.
fn func_addr(func: usize) -> usize {
    func
}

/// Emit every instruction in `prog` (already passed through
/// `kir::passes::run_all`) and place the result in `arena`, returning the
/// code's entry address.
pub fn emit_program(prog: &KirProgram, arena: &mut ShaderArena) -> *const u8 {
    let mut cg = CodeGen::new(arena);

    let last_index = prog.insns.len().saturating_sub(1);
    for (index, insn) in prog.insns.iter().enumerate() {
        emit_insn(&mut cg, insn, index == last_index);
    }

    cg.finish()
}

fn reg(r: KirReg) -> u8 {
    debug_assert!(r.0 < 16, "operand {} was not assigned an AVX register", r.0);
    r.0 as u8
}

fn emit_insn(cg: &mut CodeGen, insn: &crate::kir::program::KirInst, is_last: bool) {
    use Opcode::*;

    match (insn.opcode, &insn.payload) {
        (Comment, _) => {}

        (LoadRegion, Payload::Xfer(xfer)) => {
            region::emit_region_load(&mut cg.e, &xfer.region, reg(insn.dst));
        }
        (StoreRegionMask, Payload::Xfer(xfer)) => {
            region::emit_region_store_mask(&mut cg.e, &xfer.region, reg(xfer.src), reg(xfer.mask));
        }
        (StoreRegion, Payload::Xfer(xfer)) => {
            region::emit_region_store(&mut cg.e, &xfer.region, reg(xfer.src));
        }

        (Immd, Payload::Imm(imm)) | (Immw, Payload::Imm(imm)) => {
            let addr = cg.const_data(&imm.d.to_le_bytes(), 4);
            cg.emit_rip(addr, |e, off| forms::vpbroadcastd_rip_relative(e, reg(insn.dst), off));
        }
        (Immv, Payload::Imm(imm)) => {
            let mut bytes = [0u8; 16];
            for (i, v) in imm.v.iter().enumerate() {
                bytes[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
            }
            let addr = cg.const_data(&bytes, 16);
            cg.emit_rip(addr, |e, off| forms::vbroadcasti128_rip_relative(e, reg(insn.dst), off));
        }
        (Immvf, Payload::Imm(imm)) => {
            let mut bytes = [0u8; 16];
            for (i, v) in imm.vf.iter().enumerate() {
                bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
            let addr = cg.const_data(&bytes, 4);
            cg.emit_rip(addr, |e, off| forms::vbroadcasti128_rip_relative(e, reg(insn.dst), off));
        }

        (Send, Payload::Send(send)) | (ConstSend, Payload::Send(send)) => {
            // `send.src`/`send.mlen`/`send.dst`/`send.rlen` describe which
            // GRF window the message reads/writes; the native helper reads
            // that window straight out of `Thread` via `rdi`, so codegen
            // only needs to pass it `send.args` in `rsi` before
            // jumping/calling into it.
            cg.emit_rip(send.args, |e, off| forms::load_rsi_rip_relative(e, off));
            if is_last {
                cg.emit_rip(func_addr(send.func), |e, off| forms::jmp_relative(e, off));
            } else {
                forms::push_rdi(&mut cg.e);
                cg.emit_rip(func_addr(send.func), |e, off| forms::call_relative(e, off));
                forms::pop_rdi(&mut cg.e);
            }
        }

        (Call, Payload::Call(call)) | (ConstCall, Payload::Call(call)) => {
            debug_assert_eq!(insn.dst.0, 0);
            if call.args >= 1 {
                debug_assert_eq!(call.src0.0, 0);
            }
            if call.args >= 2 {
                debug_assert_eq!(call.src1.0, 1);
            }
            forms::push_rdi(&mut cg.e);
            cg.emit_rip(func_addr(call.func), |e, off| forms::call_relative(e, off));
            forms::pop_rdi(&mut cg.e);
        }

        (Mov, Payload::Alu(alu)) => forms::vmovaps(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Zxwd, Payload::Alu(alu)) => forms::vpmovzxwd(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Sxwd, Payload::Alu(alu)) => forms::vpmovsxwd(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Ps2d, Payload::Alu(alu)) => forms::vcvtps2dq(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (D2ps, Payload::Alu(alu)) => forms::vcvtdq2ps(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Absd, Payload::Alu(alu)) => forms::vpabsd(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Rcp, Payload::Alu(alu)) => forms::vrcpps(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Sqrt, Payload::Alu(alu)) => forms::vsqrtps(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Rsqrt, Payload::Alu(alu)) => forms::vrsqrtps(&mut cg.e, reg(insn.dst), reg(alu.src0)),
        (Rndu, Payload::Alu(alu)) => forms::vroundps(&mut cg.e, reg(insn.dst), forms::FROUND_TO_POS_INF, reg(alu.src0)),
        (Rndd, Payload::Alu(alu)) => forms::vroundps(&mut cg.e, reg(insn.dst), forms::FROUND_TO_NEG_INF, reg(alu.src0)),
        (Rnde, Payload::Alu(alu)) => forms::vroundps(&mut cg.e, reg(insn.dst), forms::FROUND_TO_NEAREST_INT, reg(alu.src0)),
        (Rndz, Payload::Alu(alu)) => forms::vroundps(&mut cg.e, reg(insn.dst), forms::FROUND_TO_ZERO, reg(alu.src0)),
        (Shri, Payload::Alu(alu)) => forms::vpsrld(&mut cg.e, reg(insn.dst), reg(alu.src0), alu.imm1 as u8),
        (Shli, Payload::Alu(alu)) => forms::vpslld(&mut cg.e, reg(insn.dst), reg(alu.src0), alu.imm1 as u8),

        (And, Payload::Alu(alu)) => forms::vpand(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Andn, Payload::Alu(alu)) => forms::vpandn(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Or, Payload::Alu(alu)) => forms::vpor(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Xor, Payload::Alu(alu)) => forms::vpxor(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        // shr/shl/asr take (shift-amount, value) in the underlying vpsrlvd/
        // vpsllvd/vpsravd call, the reverse of src0/src1's KIR order.
        (Shr, Payload::Alu(alu)) => forms::vpsrlvd(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),
        (Shl, Payload::Alu(alu)) => forms::vpsllvd(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),
        (Asr, Payload::Alu(alu)) => forms::vpsravd(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),

        (Maxd, _) => unimplemented!("maxd has no native encoding in the original either"),
        (Maxw, _) => unimplemented!("maxw has no native encoding in the original either"),
        (Maxf, Payload::Alu(alu)) => forms::vmaxps(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Mind, _) => unimplemented!("mind has no native encoding in the original either"),
        (Minw, _) => unimplemented!("minw has no native encoding in the original either"),
        (Minf, Payload::Alu(alu)) => forms::vminps(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),

        // divf/subd/subf/cmp: the VEX.vvvv/ModRM.rm fields of the
        // underlying two-source forms compute `third_arg - second_arg`
        // (resp. `third_arg PRED second_arg`), so the call swaps src0/src1
        // to make `alu_binop`'s documented `src0 OP src1` contract hold.
        (Divf, Payload::Alu(alu)) => forms::vdivps(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),
        (IntDivQAndR, _) | (IntDivQ, _) | (IntDivR, _) | (IntInvm, _) | (IntRsqrtm, _) => {
            unimplemented!("opcode emit: stubbed in the original, never lowered to native code")
        }

        (Addd, Payload::Alu(alu)) => forms::vpaddd(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Addw, Payload::Alu(alu)) => forms::vpaddw(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Addf, Payload::Alu(alu)) => forms::vaddps(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Subd, Payload::Alu(alu)) => forms::vpsubd(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),
        (Subw, _) => unimplemented!("kir_subw: stubbed in the original"),
        (Subf, Payload::Alu(alu)) => forms::vsubps(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src0)),
        (Muld, Payload::Alu(alu)) => forms::vpmulld(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Mulw, Payload::Alu(alu)) => forms::vpmullw(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Mulf, Payload::Alu(alu)) => forms::vmulps(&mut cg.e, reg(insn.dst), reg(alu.src0), reg(alu.src1)),
        (Avg, _) => unimplemented!("kir_avg: stubbed in the original"),

        (Cmp, Payload::Alu(alu)) => forms::vcmpps(&mut cg.e, alu.imm2 as u8, reg(insn.dst), reg(alu.src1), reg(alu.src0)),

        // maddf/nmaddf: regalloc already aliased `insn.dst` to `alu.src0`'s
        // register, so `dst` here doubles as that operand; the actual two
        // multiplicands are src1/src2 (not src0), matching
        // `builder_emit_vfmadd132ps(dst, src1, src2)` in the original.
        (Maddf, Payload::Alu(alu)) => forms::vfmadd132ps(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src2)),
        (Nmaddf, Payload::Alu(alu)) => forms::vfnmadd132ps(&mut cg.e, reg(insn.dst), reg(alu.src1), reg(alu.src2)),
        // blend: the original ships vpblendvps here with a `FIXME: should
        // be vpblendvb` comment; ksim reproduces the shipped behavior (see
        // `asm::forms::vpblendvps`) rather than silently fixing it.
        (Blend, Payload::Alu(alu)) => {
            forms::vpblendvps(&mut cg.e, reg(insn.dst), reg(alu.src2), reg(alu.src0), reg(alu.src1))
        }

        (Gather, Payload::Gather(gather)) => {
            let addr = cg.const_data(&(gather.base as usize).to_le_bytes(), 8);
            cg.emit_rip(addr, |e, off| forms::load_rax_rip_relative(e, off));
            forms::vpgatherdd(
                &mut cg.e,
                reg(insn.dst),
                reg(gather.offset),
                reg(gather.mask),
                gather.scale as u8,
                gather.base_offset as i8,
            );
        }

        (Eot, _) => forms::ret(&mut cg.e),

        (opcode, payload) => panic!("no codegen for {opcode:?} with payload {payload:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::program::{KirProgram, Opcode};

    fn v8(offset: u32) -> EuRegion {
        EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
    }

    #[test]
    fn simple_program_emits_and_places_code() {
        let mut prog = KirProgram::new(0, 0);
        let a = prog.load_region(v8(0));
        let b = prog.load_region(v8(32));
        let c = prog.alu_binop(Opcode::Addf, a, b);
        prog.store_region(v8(64), c);
        prog.eot();

        crate::kir::passes::run_all(&mut prog);

        let mut arena = ShaderArena::new(64 * 1024).unwrap();
        let entry = emit_program(&prog, &mut arena);
        assert!(!entry.is_null());
    }

    #[test]
    fn immediate_materializes_into_constant_pool() {
        let mut prog = KirProgram::new(0, 0);
        let imm = prog.immf(1.0);
        prog.store_region(v8(0), imm);
        prog.eot();

        crate::kir::passes::run_all(&mut prog);

        let mut arena = ShaderArena::new(64 * 1024).unwrap();
        let entry = emit_program(&prog, &mut arena);
        assert!(!entry.is_null());
    }
}
