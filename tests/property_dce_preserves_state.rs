//! Property 3 (spec.md §8): dead-code elimination must not change observable
//! program state. Builds a program with a genuinely dead computation (loaded
//! and combined, but never stored or read again) alongside a live one, and
//! checks that (a) `kir::passes::dce::run` actually drops instructions and
//! (b) dispatching the program with and without that pass produces
//! identical `Thread` state.

mod common;

use ksim::kir::passes::{copy_prop, dce, regalloc};
use ksim::kir::program::{KirProgram, Opcode};
use ksim::thread::{Grf, Thread};

fn build_program() -> KirProgram {
    let mut prog = KirProgram::new(0, 0);

    let g1 = prog.load_v8(Thread::grf_offset(1));

    // Dead: computed, never stored, never read again.
    let ten = prog.immf(10.0);
    let dead = prog.alu_binop(Opcode::Addf, g1, ten);
    let _also_dead = prog.alu_unop(Opcode::Sqrt, dead);

    // Live: stored to grf[2].
    let two = prog.immf(2.0);
    let live = prog.alu_binop(Opcode::Mulf, g1, two);
    prog.store_v8(Thread::grf_offset(2), live);

    prog.eot();
    prog
}

fn dispatch_with(prog: &KirProgram) -> [f32; 8] {
    let (_arena, entry) = common::compile_as_is(prog);
    let mut thread = Thread::new();
    thread.grf[1] = Grf::from_f32([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    entry(&mut *thread as *mut Thread);
    thread.grf[2].as_f32()
}

#[test]
fn dce_drops_dead_instructions() {
    let mut without_dce = build_program();
    copy_prop::run(&mut without_dce);
    let count_before_dce = without_dce.insns.len();
    regalloc::run(&mut without_dce);

    let mut with_dce = build_program();
    copy_prop::run(&mut with_dce);
    dce::run(&mut with_dce);
    let count_after_dce = with_dce.insns.len();
    regalloc::run(&mut with_dce);

    assert!(count_after_dce < count_before_dce, "dce should have removed the dead Addf/Sqrt chain");

    let baseline = dispatch_with(&without_dce);
    let optimized = dispatch_with(&with_dce);
    assert_eq!(baseline, optimized);
}
