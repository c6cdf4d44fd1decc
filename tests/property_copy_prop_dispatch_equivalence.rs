//! Property 2 (spec.md §8): copy propagation must not change observable
//! program state. Builds a program with two `load_region`s of the exact
//! same region (the pattern `kir::passes::copy_prop`'s own
//! `redundant_load_is_remapped` test exercises) and checks that dispatching
//! it with and without the pass produces bit-identical results, while the
//! pass does eliminate the now-dead second load once DCE runs after it.

mod common;

use ksim::eu::EuRegion;
use ksim::kir::passes::{copy_prop, dce, regalloc};
use ksim::kir::program::{KirProgram, Opcode};
use ksim::thread::{Grf, Thread};

fn v8(offset: u32) -> EuRegion {
    EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
}

fn build_program() -> KirProgram {
    let mut prog = KirProgram::new(0, 0);
    let r0 = prog.load_region(v8(Thread::grf_offset(1)));
    let r1 = prog.load_region(v8(Thread::grf_offset(1)));
    let sum = prog.alu_binop(Opcode::Addf, r0, r1);
    prog.store_v8(Thread::grf_offset(2), sum);
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
fn copy_propagation_preserves_dispatch_semantics() {
    let mut without_copy_prop = build_program();
    dce::run(&mut without_copy_prop);
    let count_before = without_copy_prop.insns.len();
    regalloc::run(&mut without_copy_prop);

    let mut with_copy_prop = build_program();
    copy_prop::run(&mut with_copy_prop);
    dce::run(&mut with_copy_prop);
    let count_after = with_copy_prop.insns.len();
    regalloc::run(&mut with_copy_prop);

    assert!(count_after < count_before, "copy propagation should have let dce drop the redundant load");

    let baseline = dispatch_with(&without_copy_prop);
    let propagated = dispatch_with(&with_copy_prop);
    assert_eq!(baseline, propagated);
    assert_eq!(baseline, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0]);
}
