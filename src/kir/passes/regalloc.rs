//! Linear-scan register allocation with spilling to `Thread::spill`.
//!
//! Ported from `kir.c`'s `struct ra_state` and
//! `kir_program_allocate_registers`: a single forward pass over the
//! instruction list maintains a 16-bit free-AVX2-register bitmask
//! (`regs`), an unbounded spill-slot free-list bitmask (`spill_slots`), and
//! two lookup tables (`reg_to_avx`: KIR register -> AVX2 register or spill
//! slot; `avx_to_reg`: AVX2 register -> the KIR register currently bound to
//! it). After this pass, every `KirInst::dst` and ALU/xfer/gather source
//! operand has been rewritten in place from a KIR virtual register number
//! to either an AVX2 register number (0-15) or a spill-slot reference
//! (`16 + slot`, resolved immediately by inserting a `load_region`/
//! `store_region` around the spill point — there is no separate "spilled"
//! operand encoding downstream).
//!
//! Each instruction is processed in two passes matching the original's two
//! `switch` statements: first, source operands are unspilled (if needed)
//! and bound to AVX registers, freeing any operand whose last use this is
//! (per the `range` table from `kir::passes::dce::compute_live_ranges`);
//! second, a destination register is allocated for every opcode except
//! stores/sends/eot/comment (no destination) and the FMA family (whose
//! destination is aliased to `src0` instead of freshly allocated, per
//! spec.md's FMA-destination-aliasing note).
//!
//! `ymm14`/`ymm15` are never handed out by this allocator: `region`'s
//! multi-step region-load shapes (the frag-coord and general-strided
//! cases) need one or two scratch registers mid-lowering, after KIR-level
//! allocation has already fixed every other register's contents for the
//! rest of the program. The original solves this with a second,
//! builder-local LRU register cache (`avx-builder.c`'s `builder_get_reg`);
//! reserving two registers up front here is simpler and correct by
//! construction, at the cost of two fewer registers for the linear scan —
//! see DESIGN.md.

use crate::eu::EuRegion;
use crate::kir::passes::dce::compute_live_ranges;
use crate::kir::program::{KirInst, KirProgram, KirReg, Opcode, Payload};
use crate::thread::spill_offset;

const UNASSIGNED: u8 = 0xff;

/// `ymm0`-`ymm13`: the registers this allocator may hand out. `ymm14`/
/// `ymm15` are reserved assembler scratch (see module doc comment).
const ALLOCATABLE_MASK: u32 = 0x3fff;

fn spill_region(slot: u32) -> EuRegion {
    EuRegion { offset: spill_offset(slot), type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
}

struct RaState {
    range: Vec<u32>,
    regs: u32,
    spill_slots: u32,
    reg_to_avx: Vec<u8>,
    avx_to_reg: [KirReg; 16],
}

impl RaState {
    fn new(prog: &KirProgram) -> RaState {
        RaState {
            range: compute_live_ranges(prog),
            regs: ALLOCATABLE_MASK,
            spill_slots: 0xffff_ffff,
            reg_to_avx: vec![UNASSIGNED; prog.num_regs() as usize],
            avx_to_reg: [KirReg(0); 16],
        }
    }

    /// Evict the value currently held in `avx_reg` to a free spill slot.
    fn spill_reg(&mut self, out: &mut Vec<KirInst>, avx_reg: u32) {
        debug_assert_ne!(self.spill_slots, 0, "out of spill slots");
        let slot = self.spill_slots.trailing_zeros();
        self.spill_slots &= !(1 << slot);

        let def = self.avx_to_reg[avx_reg as usize];
        self.regs |= 1 << avx_reg;
        self.reg_to_avx[def.0 as usize] = (16 + slot) as u8;

        out.push(KirInst {
            opcode: Opcode::StoreRegion,
            dst: KirReg(0),
            payload: Payload::Xfer(crate::kir::program::XferData {
                region: spill_region(slot),
                src: KirReg(avx_reg),
                mask: KirReg(0),
            }),
        });
    }

    fn unspill_reg(&mut self, out: &mut Vec<KirInst>, reg: KirReg) {
        let avx_reg = self.regs.trailing_zeros();
        let slot = self.reg_to_avx[reg.0 as usize] as u32 - 16;
        self.spill_slots |= 1 << slot;

        out.push(KirInst {
            opcode: Opcode::LoadRegion,
            dst: KirReg(avx_reg),
            payload: Payload::Xfer(crate::kir::program::XferData {
                region: spill_region(slot),
                src: KirReg(0),
                mask: KirReg(0),
            }),
        });
        self.assign_avx(reg, avx_reg);
    }

    fn unspill_if_needed(&mut self, out: &mut Vec<KirInst>, reg: KirReg) {
        if self.reg_to_avx[reg.0 as usize] >= 16 {
            self.unspill_reg(out, reg);
        }
    }

    fn assign_avx(&mut self, reg: KirReg, avx_reg: u32) {
        self.avx_to_reg[avx_reg as usize] = reg;
        self.reg_to_avx[reg.0 as usize] = avx_reg as u8;
        self.regs &= !(1 << avx_reg);
    }

    /// Reads `reg`'s currently bound AVX register, freeing it immediately
    /// if `current_dst` (the position of the using instruction) is past
    /// `reg`'s last live use.
    fn use_reg(&mut self, reg: KirReg, current_dst: u32) -> KirReg {
        let avx_reg = self.reg_to_avx[reg.0 as usize];
        debug_assert_ne!(avx_reg, UNASSIGNED);
        if current_dst >= self.range[reg.0 as usize] {
            self.regs |= 1 << avx_reg;
        }
        KirReg(avx_reg as u32)
    }

    fn spill_all(&mut self, out: &mut Vec<KirInst>) {
        let live = ALLOCATABLE_MASK & !self.regs;
        for avx_reg in 0..16 {
            if live & (1 << avx_reg) != 0 {
                self.spill_reg(out, avx_reg);
            }
        }
    }

    /// Allocate a destination register, spilling the lowest-numbered
    /// eligible busy register first if every allocatable register
    /// (excluding `exclude`) is currently live. Mirrors the original's
    /// clock-hand eviction in `kir_program_allocate_registers`: when the
    /// `Call`/`ConstCall` path's eager `spill_all` hasn't already freed
    /// space, the allocator must still make progress on long straight-line
    /// programs that simply have more live values than registers.
    fn alloc_dst(&mut self, out: &mut Vec<KirInst>, dst: KirReg, exclude: u32) -> u32 {
        let mut avail = self.regs & !exclude;
        if avail == 0 {
            let victim = (ALLOCATABLE_MASK & !exclude).trailing_zeros();
            debug_assert!(victim < 16, "no spillable register available");
            self.spill_reg(out, victim);
            avail = self.regs & !exclude;
        }
        debug_assert_ne!(avail, 0, "ran out of AVX2 registers");
        let avx_reg = avail.trailing_zeros();
        self.assign_avx(dst, avx_reg);
        avx_reg
    }
}

/// Allocate AVX2 registers (and, where necessary, spill slots) for every
/// value in `prog`, rewriting operands in place.
pub fn run(prog: &mut KirProgram) {
    let mut state = RaState::new(prog);
    let mut out = Vec::with_capacity(prog.insns.len());

    for mut insn in std::mem::take(&mut prog.insns) {
        let dst_pos = insn.dst.0;
        let mut exclude_regs = 0u32;

        match (&mut insn.payload, insn.opcode) {
            (Payload::Xfer(xfer), Opcode::StoreRegion) | (Payload::Xfer(xfer), Opcode::StoreRegionMask) => {
                state.unspill_if_needed(&mut out, xfer.src);
                xfer.src = state.use_reg(xfer.src, dst_pos);
            }
            (Payload::Call(call), Opcode::Call) | (Payload::Call(call), Opcode::ConstCall) => {
                state.spill_all(&mut out);
                if call.args >= 1 {
                    state.unspill_if_needed(&mut out, call.src0);
                    call.src0 = state.use_reg(call.src0, dst_pos);
                }
                if call.args >= 2 {
                    state.unspill_if_needed(&mut out, call.src1);
                    call.src1 = state.use_reg(call.src1, dst_pos);
                }
            }
            (Payload::Alu(alu), op) if op.is_unop() => {
                state.unspill_if_needed(&mut out, alu.src0);
                alu.src0 = state.use_reg(alu.src0, dst_pos);
            }
            (Payload::Alu(alu), op) if op.is_binop() => {
                state.unspill_if_needed(&mut out, alu.src0);
                state.unspill_if_needed(&mut out, alu.src1);
                alu.src0 = state.use_reg(alu.src0, dst_pos);
                alu.src1 = state.use_reg(alu.src1, dst_pos);
            }
            (Payload::Alu(alu), Opcode::Maddf) | (Payload::Alu(alu), Opcode::Nmaddf) | (Payload::Alu(alu), Opcode::Blend) => {
                state.unspill_if_needed(&mut out, alu.src0);
                state.unspill_if_needed(&mut out, alu.src1);
                state.unspill_if_needed(&mut out, alu.src2);
                alu.src0 = state.use_reg(alu.src0, dst_pos);
                alu.src1 = state.use_reg(alu.src1, dst_pos);
                alu.src2 = state.use_reg(alu.src2, dst_pos);
            }
            (Payload::Gather(gather), Opcode::Gather) => {
                state.unspill_if_needed(&mut out, gather.mask);
                state.unspill_if_needed(&mut out, gather.offset);
                // dst must differ from mask/offset for vpgatherdd: exclude
                // every currently-assigned register from the later dst
                // allocation, matching the original's `~state.regs`.
                exclude_regs = !state.regs;
                gather.mask = state.use_reg(gather.mask, dst_pos);
                gather.offset = state.use_reg(gather.offset, dst_pos);
            }
            _ => {}
        }

        match insn.opcode {
            Opcode::Comment
            | Opcode::StoreRegion
            | Opcode::StoreRegionMask
            | Opcode::Send
            | Opcode::ConstSend
            | Opcode::Eot => {}
            Opcode::Maddf | Opcode::Nmaddf => {
                // These alias dst to src0 rather than allocating fresh.
                if let Payload::Alu(alu) = &insn.payload {
                    let src0 = alu.src0;
                    state.assign_avx(insn.dst, src0.0);
                    insn.dst = src0;
                }
            }
            _ => {
                let avx_reg = state.alloc_dst(&mut out, insn.dst, exclude_regs);
                insn.dst = KirReg(avx_reg);
            }
        }

        out.push(insn);
    }

    prog.insns = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eu::EuRegion;

    fn v8(offset: u32) -> EuRegion {
        EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
    }

    #[test]
    fn simple_chain_fits_in_registers() {
        let mut prog = KirProgram::new(0, 0);
        let a = prog.load_region(v8(0));
        let b = prog.load_region(v8(32));
        let c = prog.alu_binop(Opcode::Addf, a, b);
        prog.store_region(v8(64), c);

        run(&mut prog);

        for insn in &prog.insns {
            if insn.opcode.has_no_dst() {
                continue;
            }
            assert!(insn.dst.0 < 16, "dst {} not a valid AVX register", insn.dst.0);
        }
    }

    #[test]
    fn spilling_kicks_in_past_sixteen_live_values() {
        let mut prog = KirProgram::new(0, 0);
        let mut loaded = Vec::new();
        for i in 0..20 {
            loaded.push(prog.load_region(v8(i * 32)));
        }
        let mut acc = loaded[0];
        for &r in &loaded[1..] {
            acc = prog.alu_binop(Opcode::Addf, acc, r);
        }
        prog.store_region(v8(20 * 32), acc);

        let before = prog.insns.len();
        run(&mut prog);

        assert!(prog.insns.len() > before, "expected spill code to be inserted");
        for insn in &prog.insns {
            if insn.opcode.has_no_dst() {
                continue;
            }
            assert!(insn.dst.0 < 16, "dst {} not a valid AVX register", insn.dst.0);
        }
    }

    #[test]
    fn maddf_reuses_src0_register() {
        let mut prog = KirProgram::new(0, 0);
        let a = prog.load_region(v8(0));
        let b = prog.load_region(v8(32));
        let c = prog.load_region(v8(64));
        let fma = prog.alu_triop(Opcode::Maddf, a, b, c);
        prog.store_region(v8(96), fma);

        run(&mut prog);

        let fma_insn = prog.insns.iter().find(|i| i.opcode == Opcode::Maddf).unwrap();
        if let Payload::Alu(alu) = &fma_insn.payload {
            assert_eq!(fma_insn.dst, alu.src0);
        } else {
            panic!("expected alu payload");
        }
    }
}
