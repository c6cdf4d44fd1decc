//! Scenario F and Property 4 (spec.md §8): a kernel with more simultaneously
//! live values than this allocator's 14 allocatable AVX2 registers
//! (`ymm0`-`ymm13`; `ymm14`/`ymm15` are reserved region-lowering scratch, see
//! `kir::passes::regalloc`'s module doc comment and DESIGN.md) must spill
//! the excess to `Thread::spill` and still compute the right answer.
//!
//! 18 values are loaded before any of them is consumed, so all 18 are live
//! at once: the first 14 fit in registers, and each of the remaining 4
//! forces `regalloc::alloc_dst` to evict a register (one `StoreRegion`) and
//! later `unspill_if_needed` to reload it before use (one `LoadRegion`).
//! That is exactly `(18 - 14) * 2 = 8` extra instructions.

mod common;

use ksim::kir::passes::{copy_prop, dce, regalloc};
use ksim::kir::program::{KirProgram, KirReg, Opcode};
use ksim::thread::{Grf, Thread};

const LIVE_VALUES: u32 = 18;
const ALLOCATABLE: u32 = 14;

fn build_program() -> (KirProgram, Vec<u32>) {
    let mut prog = KirProgram::new(0, 0);
    let offsets: Vec<u32> = (0..LIVE_VALUES).map(|i| Thread::grf_offset(1) + i * 32).collect();
    let loaded: Vec<KirReg> = offsets.iter().map(|&off| prog.load_v8(off)).collect();

    let mut acc = loaded[0];
    for &r in &loaded[1..] {
        acc = prog.alu_binop(Opcode::Addf, acc, r);
    }
    prog.store_v8(Thread::grf_offset(1 + LIVE_VALUES), acc);
    prog.eot();
    (prog, offsets)
}

#[test]
fn scenario_f_spilling_inserts_exactly_two_instructions_per_excess_register() {
    let (mut prog, _) = build_program();
    copy_prop::run(&mut prog);
    dce::run(&mut prog);
    let before = prog.insns.len();

    regalloc::run(&mut prog);
    let after = prog.insns.len();

    let expected_extra = ((LIVE_VALUES - ALLOCATABLE) * 2) as usize;
    assert_eq!(after - before, expected_extra, "expected exactly (18-14)*2 spill/fill instructions");

    for insn in &prog.insns {
        if insn.opcode.has_no_dst() {
            continue;
        }
        assert!(insn.dst.0 < 16, "dst {} is not a real AVX register after allocation", insn.dst.0);
    }
}

#[test]
fn property_4_register_allocation_preserves_dispatch_semantics() {
    let (mut prog, offsets) = build_program();
    copy_prop::run(&mut prog);
    dce::run(&mut prog);
    regalloc::run(&mut prog);

    let (_arena, entry) = common::compile_as_is(&prog);

    let mut thread = Thread::new();
    let mut expected = [0.0f32; 8];
    for (i, &off) in offsets.iter().enumerate() {
        let base = (off / 32) as usize;
        let values: [f32; 8] = std::array::from_fn(|lane| (i * 8 + lane) as f32 * 0.25);
        thread.grf[base] = Grf::from_f32(values);
        for lane in 0..8 {
            expected[lane] += values[lane];
        }
    }

    entry(&mut *thread as *mut Thread);

    let got = thread.grf[(1 + LIVE_VALUES) as usize].as_f32();
    for lane in 0..8 {
        assert!(
            (got[lane] - expected[lane]).abs() < 1e-3,
            "lane {lane}: got {}, expected {}",
            got[lane],
            expected[lane]
        );
    }
}
