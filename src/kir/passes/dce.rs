//! Liveness computation and dead-code elimination.
//!
//! Ported from `kir.c::kir_program_compute_live_ranges` and
//! `kir_program_dce`. The liveness walk runs the instruction list in
//! *reverse*, tracking both per-register liveness (`live_regs`/`range`,
//! indexed by KIR register number) and per-byte region residency
//! (`region_map`, one `u32` bitmask per 32-byte EU register plus 384
//! permanently-live guard entries past the real 128-register GRF file, so
//! that a `send`/`call` touching "the rest of the register file" is always
//! treated conservatively as live).
//!
//! `range[r]` is abused, exactly as in the original, to double as an
//! instruction-position marker: because every instruction (including ones
//! with no real result, like stores or `eot`) consumes a fresh `dst`
//! register number in strictly increasing order, `dst.0` *is* the
//! instruction's position. DCE then reduces to: an instruction is dead iff
//! `range[dst] <= dst`, i.e. its own recorded last-live-use position never
//! advanced past its definition point.

use crate::eu::EuRegion;
use crate::kir::program::{KirProgram, Opcode, Payload};

/// Number of 32-byte buckets tracked by the region-residency bitmask: 128
/// real GRF registers plus 384 guard entries that are always live.
const REGION_MAP_LEN: usize = 513;

fn region_for_grf(reg: u32) -> EuRegion {
    EuRegion { offset: reg * 32, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
}

fn region_to_mask(region: &EuRegion) -> [u32; 2] {
    let type_mask: u32 = (1u32 << region.type_size) - 1;
    let mut mask = [0u32; 2];
    let (mut x, mut y) = (0u32, 0u32);
    for _ in 0..region.exec_size {
        let offset = (region.offset & 31) + (x * region.hstride + y * region.vstride) * region.type_size;
        mask[(offset / 32) as usize] |= type_mask << (offset & 31);
        x += 1;
        if x == region.width {
            x = 0;
            y += 1;
        }
    }
    mask
}

fn region_is_live(region: &EuRegion, region_map: &[u32]) -> bool {
    let reg = (region.offset / 32) as usize;
    let mask = region_to_mask(region);
    (region_map[reg] & mask[0]) != 0 || (region_map[reg + 1] & mask[1]) != 0
}

fn set_region_live(region: &EuRegion, live: bool, region_map: &mut [u32]) {
    let reg = (region.offset / 32) as usize;
    let mask = region_to_mask(region);
    if live {
        region_map[reg] |= mask[0];
        region_map[reg + 1] |= mask[1];
    } else {
        region_map[reg] &= !mask[0];
        region_map[reg + 1] &= !mask[1];
    }
}

/// Compute, for every KIR register, the position (`dst.0` of the
/// instruction) of its last live use. A register whose `range` entry never
/// advances past its own definition is dead.
pub fn compute_live_ranges(prog: &KirProgram) -> Vec<u32> {
    let n = prog.num_regs() as usize;
    let mut live_regs = vec![false; n];
    let mut range = vec![0u32; n];
    let mut region_map = vec![0u32; REGION_MAP_LEN];
    for entry in region_map[128..].iter_mut() {
        *entry = !0u32;
    }

    let mut set_live = |r: u32, live: bool, dst: u32, range: &mut [u32], live_regs: &mut [bool]| {
        if live {
            if !live_regs[r as usize] {
                range[r as usize] = dst;
            }
            live_regs[r as usize] = true;
        }
    };

    for insn in prog.insns.iter().rev() {
        let dst = insn.dst.0;
        match (&insn.payload, insn.opcode) {
            (_, Opcode::Comment) => {
                range[dst as usize] = dst + 1;
            }
            (Payload::Xfer(xfer), Opcode::LoadRegion) => {
                let live = live_regs[dst as usize];
                set_region_live(&xfer.region, live, &mut region_map);
            }
            (Payload::Xfer(xfer), Opcode::StoreRegion) | (Payload::Xfer(xfer), Opcode::StoreRegionMask) => {
                let live = region_is_live(&xfer.region, &region_map);
                set_live(xfer.src.0, live, dst, &mut range, &mut live_regs);
                if live {
                    range[dst as usize] = dst + 1;
                }
                set_region_live(&xfer.region, false, &mut region_map);
            }
            (Payload::Imm(_), _) => {}
            (Payload::Send(send), Opcode::Send) | (Payload::Send(send), Opcode::ConstSend) => {
                let mut live = insn.opcode == Opcode::Send;
                for i in 0..send.rlen {
                    let region = region_for_grf(send.dst + i);
                    live |= region_is_live(&region, &region_map);
                    set_region_live(&region, false, &mut region_map);
                }
                if live {
                    range[dst as usize] = dst + 1;
                }
                for i in 0..send.mlen {
                    let region = region_for_grf(send.src + i);
                    set_region_live(&region, live, &mut region_map);
                }
            }
            (_, Opcode::Call) => {
                range[dst as usize] = dst + 1;
                if let Payload::Call(call) = &insn.payload {
                    if call.args > 0 {
                        set_live(call.src0.0, true, dst, &mut range, &mut live_regs);
                    }
                    if call.args > 1 {
                        set_live(call.src1.0, true, dst, &mut range, &mut live_regs);
                    }
                }
            }
            (Payload::Call(call), Opcode::ConstCall) => {
                let live = live_regs[dst as usize];
                if call.args > 0 {
                    set_live(call.src0.0, live, dst, &mut range, &mut live_regs);
                }
                if call.args > 1 {
                    set_live(call.src1.0, live, dst, &mut range, &mut live_regs);
                }
            }
            (Payload::Alu(alu), op) if op.is_unop() => {
                let live = live_regs[dst as usize];
                set_live(alu.src0.0, live, dst, &mut range, &mut live_regs);
            }
            (Payload::Alu(alu), op) if op.is_binop() => {
                let live = live_regs[dst as usize];
                set_live(alu.src0.0, live, dst, &mut range, &mut live_regs);
                set_live(alu.src1.0, live, dst, &mut range, &mut live_regs);
            }
            (Payload::Alu(alu), op) if op.is_triop() => {
                let live = live_regs[dst as usize];
                set_live(alu.src0.0, live, dst, &mut range, &mut live_regs);
                set_live(alu.src1.0, live, dst, &mut range, &mut live_regs);
                set_live(alu.src2.0, live, dst, &mut range, &mut live_regs);
            }
            (Payload::Gather(gather), Opcode::Gather) => {
                let live = live_regs[dst as usize];
                set_live(gather.mask.0, live, dst, &mut range, &mut live_regs);
                set_live(gather.offset.0, live, dst, &mut range, &mut live_regs);
            }
            (_, Opcode::Eot) => {
                range[dst as usize] = dst + 1;
            }
            _ => {}
        }
    }

    range
}

/// Remove every instruction whose `dst` was never live past its own
/// definition point, per the computed `range` table.
pub fn run(prog: &mut KirProgram) {
    let range = compute_live_ranges(prog);
    prog.insns.retain(|insn| insn.dst.0 < range[insn.dst.0 as usize]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kir::program::KirProgram;

    #[test]
    fn unused_load_is_removed() {
        let mut prog = KirProgram::new(0, 0);
        let v8 = EuRegion { offset: 0, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 };
        let _dead = prog.load_region(v8);
        let live = prog.load_region(EuRegion { offset: 64, ..v8 });
        prog.store_region(EuRegion { offset: 128, ..v8 }, live);
        let before = prog.insns.len();
        run(&mut prog);
        assert!(prog.insns.len() < before);
    }

    #[test]
    fn store_keeps_its_source_chain_alive() {
        let mut prog = KirProgram::new(0, 0);
        let v8 = EuRegion { offset: 0, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 };
        let loaded = prog.load_region(v8);
        prog.store_region(EuRegion { offset: 32, ..v8 }, loaded);
        run(&mut prog);
        assert_eq!(prog.insns.len(), 2);
    }
}
