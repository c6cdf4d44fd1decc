//! Scenario D (spec.md §8): `mad(8) g3<1>f g1<8,8,1>f g2<8,8,1>f g4<8,8,1>f`
//! with `abs` on src2 and `saturate` on the destination, i.e.
//! `clamp(g1 + g2*abs(g4), 0, 1)`.
//!
//! `BRW_OPCODE_MAD` itself is `unimplemented!()` in `translate::
//! translate_inst` (Align16 3-source encoding is out of scope, see
//! DESIGN.md), so this test exercises the underlying KIR machinery MAD
//! would lower to directly: `Opcode::Maddf` (confirmed by `asm::forms::
//! vfmadd132ps`'s own doc comment, `dst = dst*src1 + src0`, to compute
//! `alu_triop(Maddf, src0, src1, src2) = src0*src2 + src1`), an `And` with
//! `0x7fffffff` for `abs`, and the `Maxf`/`Minf` saturate pair `translate::
//! store_dst` uses.

mod common;

use ksim::kir::program::{KirProgram, Opcode};
use ksim::thread::{Grf, Thread};

#[test]
fn mad_equivalent_kir_computes_clamped_fma() {
    let mut prog = KirProgram::new(0, 0);

    let g1 = prog.load_v8(Thread::grf_offset(1));
    let g2 = prog.load_v8(Thread::grf_offset(2));
    let g4 = prog.load_v8(Thread::grf_offset(4));

    let abs_mask = prog.immd(0x7fff_ffffu32 as i32);
    let abs_g4 = prog.alu_binop(Opcode::And, g4, abs_mask);

    // src0 * src2 + src1 = g2 * abs(g4) + g1.
    let raw = prog.alu_triop(Opcode::Maddf, g2, g1, abs_g4);

    let zero = prog.immf(0.0);
    let one = prog.immf(1.0);
    let clamped_lo = prog.alu_binop(Opcode::Maxf, raw, zero);
    let clamped = prog.alu_binop(Opcode::Minf, clamped_lo, one);

    prog.store_v8(Thread::grf_offset(3), clamped);
    prog.eot();

    let (_arena, entry) = common::compile(&mut prog);

    let g1_vals = [0.0f32, 0.5, -0.5, 0.2, 0.9, -0.9, 0.05, 2.0];
    let g2_vals = [0.5f32; 8];
    let g4_vals = [2.0f32, -2.0, 2.0, 1.0, 1.0, 1.0, -1.0, 1.0];

    let mut thread = Thread::new();
    thread.grf[1] = Grf::from_f32(g1_vals);
    thread.grf[2] = Grf::from_f32(g2_vals);
    thread.grf[4] = Grf::from_f32(g4_vals);

    entry(&mut *thread as *mut Thread);

    let expected: Vec<f32> = (0..8)
        .map(|i| (g1_vals[i] + g2_vals[i] * g4_vals[i].abs()).clamp(0.0, 1.0))
        .collect();

    let got = thread.grf[3].as_f32();
    for i in 0..8 {
        assert!(
            (got[i] - expected[i]).abs() < 1e-6,
            "lane {i}: got {}, expected {}",
            got[i],
            expected[i]
        );
    }
}
