//! Region load/store lowering: translating a Gen9 `EuRegion` access pattern
//! into one of a handful of AVX2 instruction shapes.
//!
//! Ported from `avx-builder.c`'s `builder_emit_region_load`/
//! `_region_store[_mask]`: the original picks a shape by testing
//! `hstride`/`vstride`/`width`/`type_size` in a fixed `if`/`else if` chain,
//! falling through to a fatal `stub()` for anything it doesn't recognize.
//! ksim reproduces that chain, in the same order, including its narrower-
//! than-general-purpose shapes (the qword-insert loop only actually covers
//! two rows; see the case 4 doc comment below) rather than generalizing
//! them — spec.md's Non-goals exclude a fully general region lowering.
//!
//! Two of the shapes (frag-coord, and the `type_size==4` general strided
//! case once it spills past 4 lanes) need a scratch register beyond `reg`
//! itself. The original keeps a separate LRU register cache
//! (`builder_get_reg`/`builder_release_reg`) for this; ksim instead
//! reserves `ymm14`/`ymm15` out of `kir::passes::regalloc`'s allocatable
//! set (see that module's doc comment) and uses them directly here.

use crate::asm::forms;
use crate::asm::Emitter;
use crate::eu::EuRegion;

/// Scratch registers `kir::passes::regalloc` never hands out.
const SCRATCH0: u8 = 14;
const SCRATCH1: u8 = 15;

fn stub(what: &str) -> ! {
    log::error!("unhandled region shape: {what}");
    panic!("unhandled region shape: {what}");
}

/// Emit code to load `region` into AVX register `reg`.
pub fn emit_region_load(e: &mut Emitter, region: &EuRegion, reg: u8) {
    if region.hstride == 1 && region.width == region.vstride {
        match region.type_size * region.exec_size {
            32 => forms::m256i_load(e, reg, region.offset as i32),
            _ => forms::m128i_load(e, reg, region.offset as i32),
        }
    } else if region.hstride == 0 && region.vstride == 0 && region.width == 1 {
        match region.type_size {
            4 => forms::vpbroadcastd(e, reg, region.offset as i32),
            other => stub(&format!("unhandled broadcast load size {other}")),
        }
    } else if region.hstride == 0 && region.width == 4 && region.vstride == 1 && region.type_size == 2 {
        // "frag-coord" shape: four 16-bit lanes broadcast and woven
        // together with vinserti128/vpblendd, per avx-builder.c.
        forms::vpbroadcastw(e, SCRATCH0, region.offset as i32);
        forms::vpbroadcastw(e, SCRATCH1, region.offset as i32 + 4);
        forms::vinserti128(e, SCRATCH0, SCRATCH1, SCRATCH0, 1);

        forms::vpbroadcastw(e, reg, region.offset as i32 + 2);
        forms::vpbroadcastw(e, SCRATCH1, region.offset as i32 + 6);
        forms::vinserti128(e, reg, SCRATCH1, reg, 1);

        forms::vpblendd(e, reg, 0xcc, reg, SCRATCH0);
    } else if region.hstride == 1 && region.width * region.type_size != 0 {
        // Contiguous-run-of-`width`-elements-per-row shape: each row
        // becomes one 64-bit chunk, inserted directly into `reg`'s low
        // 128 bits. `sel` only takes values 0/1, so (as in the original)
        // this shape is only correct for up to two rows.
        let rows = region.exec_size / region.width;
        for i in 0..rows {
            let offset = region.offset + i * region.vstride * region.type_size;
            forms::vpinsrq_rdi_relative(e, reg, reg, offset as i32, (i & 1) as u8);
        }
    } else if region.type_size == 4 {
        // General strided shape: one dword inserted per lane, building the
        // low 128 bits directly into `reg` and, if there are more than 4
        // lanes, the high 128 bits into a scratch register later merged in
        // with vinserti128.
        let mut tmp_reg = reg;
        let mut i = 0u32;
        let rows = region.exec_size / region.width;
        for y in 0..rows {
            for x in 0..region.width {
                if i == 4 {
                    tmp_reg = SCRATCH0;
                }
                let offset = region.offset + (y * region.vstride + x * region.hstride) * region.type_size;
                forms::vpinsrd_rdi_relative(e, tmp_reg, tmp_reg, offset as i32, (i & 3) as u8);
                i += 1;
            }
        }
        if tmp_reg != reg {
            forms::vinserti128(e, reg, tmp_reg, reg, 1);
        }
    } else {
        stub(&format!(
            "src: g{}.{}<{},{},{}>",
            region.offset / 32,
            region.offset & 31,
            region.vstride,
            region.width,
            region.hstride
        ));
    }
}

/// Emit code to store AVX register `src` to `region`.
pub fn emit_region_store(e: &mut Emitter, region: &EuRegion, src: u8) {
    match region.exec_size * region.type_size {
        32 => forms::m256i_store(e, src, region.offset as i32),
        16 => forms::m128i_store(e, src, region.offset as i32),
        4 => forms::u32_store(e, src, region.offset as i32),
        other => stub(&format!("eu: type size {other} in dest store")),
    }
}

/// Emit a masked store of `src` to `region`, predicated by lane mask `mask`.
/// The original only ever calls this for 8 lanes of 4-byte elements.
pub fn emit_region_store_mask(e: &mut Emitter, region: &EuRegion, src: u8, mask: u8) {
    debug_assert!(region.exec_size == 8 && region.type_size == 4);
    match region.exec_size * region.type_size {
        32 => forms::vpmaskmovd_store(e, mask, src, region.offset as i32),
        other => stub(&format!("eu: type size {other} in dest store")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v8(offset: u32) -> EuRegion {
        EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
    }

    #[test]
    fn aligned_load_emits_single_m256i_load() {
        let mut e = Emitter::new();
        emit_region_load(&mut e, &v8(64), 3);
        // m256i_load: 3-byte VEX + opcode + ModRM + disp32 = 9 bytes.
        assert_eq!(e.code.len(), 9);
        assert_eq!(e.code[3], 0x6f);
    }

    #[test]
    fn scalar_broadcast_uses_vpbroadcastd() {
        let region = EuRegion { offset: 16, type_size: 4, exec_size: 8, vstride: 0, width: 1, hstride: 0 };
        let mut e = Emitter::new();
        emit_region_load(&mut e, &region, 2);
        assert_eq!(e.code[3], 0x58);
    }

    #[test]
    fn frag_coord_shape_uses_scratch_registers_not_dst() {
        let region = EuRegion { offset: 0, type_size: 2, exec_size: 8, vstride: 1, width: 4, hstride: 0 };
        let mut e = Emitter::new();
        // dst == 3, distinct from SCRATCH0/SCRATCH1 (14/15).
        emit_region_load(&mut e, &region, 3);
        assert!(!e.code.is_empty());
    }

    #[test]
    fn store_picks_shape_by_byte_size() {
        let mut e = Emitter::new();
        emit_region_store(&mut e, &v8(0), 1);
        assert_eq!(e.code[3], 0x7f);
    }
}
