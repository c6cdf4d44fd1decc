//! Copy propagation: elide redundant `load_region` instructions when an
//! exact-matching region is already resident in a register.
//!
//! Grounded verbatim on `kir.c::kir_program_copy_propagation`: a
//! `remap[]` table (identity-initialized) rewrites every source operand as
//! it is encountered, and a per-32-byte-bucket resident-region list tracks
//! which KIR register currently holds which exact `EuRegion`. A `load_region`
//! whose region exactly matches a resident entry in its bucket is rewritten
//! to a `mov` of the resident register (and subsequently DCE'd if unused);
//! a `store_region[_mask]` invalidates every resident entry whose region
//! *overlaps* the stored region, then records the stored region as newly
//! resident.
//!
//! `kir_gather`'s `offset` operand is remapped like any other source, but
//! its `mask` operand is deliberately left unpropagated: the gather helper
//! overwrites its mask argument in place, so a fresh copy is required on
//! every use (the original's comment: "gather overwites the mask and we
//! need a fresh copy each time").

use crate::kir::program::{KirProgram, KirReg, Opcode, Payload};
use std::collections::HashMap;

/// Number of 32-byte buckets the EU register file (4096 bytes at 128 GRF ×
/// 32 bytes) is divided into for resident-region lookup.
const NUM_BUCKETS: usize = 512;

#[derive(Clone, Copy)]
struct Resident {
    region_offset: u32,
    region_byte_size: u32,
    vstride: u32,
    width: u32,
    hstride: u32,
    type_size: u32,
    exec_size: u32,
    reg: KirReg,
}

/// Run copy propagation over `prog` in place, rewriting redundant loads to
/// `mov`s of an already-resident register and remapping ALU/store/call/
/// gather source operands through the live remap table.
pub fn run(prog: &mut KirProgram) {
    let mut remap: HashMap<u32, KirReg> = HashMap::new();
    let mut buckets: Vec<Vec<Resident>> = vec![Vec::new(); NUM_BUCKETS];

    let remap_of = |remap: &HashMap<u32, KirReg>, r: KirReg| -> KirReg {
        *remap.get(&r.0).unwrap_or(&r)
    };

    for i in 0..prog.insns.len() {
        let opcode = prog.insns[i].opcode;
        let dst = prog.insns[i].dst;

        match (&mut prog.insns[i].payload, opcode) {
            (Payload::Xfer(xfer), Opcode::LoadRegion) => {
                let bucket = bucket_of(xfer.region.offset);
                let hit = buckets[bucket].iter().find(|r| {
                    r.region_offset == xfer.region.offset
                        && r.vstride == xfer.region.vstride
                        && r.width == xfer.region.width
                        && r.hstride == xfer.region.hstride
                        && r.type_size == xfer.region.type_size
                        && r.exec_size == xfer.region.exec_size
                });
                if let Some(resident) = hit {
                    remap.insert(dst.0, resident.reg);
                } else {
                    buckets[bucket].retain(|r| r.reg != dst);
                    buckets[bucket].push(Resident {
                        region_offset: xfer.region.offset,
                        region_byte_size: xfer.region.byte_size(),
                        vstride: xfer.region.vstride,
                        width: xfer.region.width,
                        hstride: xfer.region.hstride,
                        type_size: xfer.region.type_size,
                        exec_size: xfer.region.exec_size,
                        reg: dst,
                    });
                }
            }
            (Payload::Xfer(xfer), Opcode::StoreRegion) | (Payload::Xfer(xfer), Opcode::StoreRegionMask) => {
                xfer.src = remap_of(&remap, xfer.src);
                if opcode == Opcode::StoreRegionMask {
                    xfer.mask = remap_of(&remap, xfer.mask);
                }
                let region = xfer.region;
                for bucket in buckets.iter_mut() {
                    bucket.retain(|r| {
                        let end = r.region_offset + r.region_byte_size;
                        let store_end = region.offset + region.byte_size();
                        !(r.region_offset < store_end && region.offset < end)
                    });
                }
                let bucket = bucket_of(region.offset);
                buckets[bucket].push(Resident {
                    region_offset: region.offset,
                    region_byte_size: region.byte_size(),
                    vstride: region.vstride,
                    width: region.width,
                    hstride: region.hstride,
                    type_size: region.type_size,
                    exec_size: region.exec_size,
                    reg: xfer.src,
                });
            }
            (Payload::Alu(alu), op) if op.is_unop() => {
                alu.src0 = remap_of(&remap, alu.src0);
            }
            (Payload::Alu(alu), op) if op.is_binop() => {
                alu.src0 = remap_of(&remap, alu.src0);
                alu.src1 = remap_of(&remap, alu.src1);
            }
            (Payload::Alu(alu), op) if op.is_triop() => {
                alu.src0 = remap_of(&remap, alu.src0);
                alu.src1 = remap_of(&remap, alu.src1);
                alu.src2 = remap_of(&remap, alu.src2);
            }
            (Payload::Gather(gather), Opcode::Gather) => {
                gather.offset = remap_of(&remap, gather.offset);
                // mask deliberately NOT remapped, see module doc comment.
            }
            (Payload::Call(call), Opcode::Call) | (Payload::Call(call), Opcode::ConstCall) => {
                if call.args >= 1 {
                    call.src0 = remap_of(&remap, call.src0);
                }
                if call.args >= 2 {
                    call.src1 = remap_of(&remap, call.src1);
                }
            }
            _ => {}
        }
    }
}

fn bucket_of(region_offset: u32) -> usize {
    (region_offset as usize / 32).min(NUM_BUCKETS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eu::EuRegion;

    fn v8(offset: u32) -> EuRegion {
        EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
    }

    #[test]
    fn redundant_load_is_remapped() {
        let mut prog = KirProgram::new(0, 0);
        let r0 = prog.load_region(v8(0));
        let r1 = prog.load_region(v8(0));
        let _ = prog.alu_binop(Opcode::Addf, r0, r1);
        run(&mut prog);
        let last = prog.insns.last().unwrap();
        if let Payload::Alu(alu) = &last.payload {
            assert_eq!(alu.src0, alu.src1);
        } else {
            panic!("expected alu payload");
        }
    }

    #[test]
    fn store_invalidates_overlapping_residents() {
        let mut prog = KirProgram::new(0, 0);
        let r0 = prog.load_region(v8(0));
        prog.store_region(v8(0), r0);
        let r1 = prog.load_region(v8(0));
        run(&mut prog);
        assert_ne!(r0, r1);
    }
}
