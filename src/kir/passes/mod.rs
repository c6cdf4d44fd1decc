//! Optimization and lowering passes over a `KirProgram`, run in the fixed
//! order `kir_program_compile` uses in the original: copy propagation first
//! (so redundant loads collapse before liveness is computed), then dead-code
//! elimination (which both removes the now-unreferenced loads and shrinks the
//! live set register allocation has to work with), then register allocation
//! last, since it is the only pass that assumes a clean-and-final operand
//! graph.

pub mod copy_prop;
pub mod dce;
pub mod regalloc;

use crate::kir::program::KirProgram;

/// Run the full optimization and lowering pipeline over `prog` in place,
/// leaving it ready for code emission.
pub fn run_all(prog: &mut KirProgram) {
    copy_prop::run(prog);
    dce::run(prog);
    regalloc::run(prog);
}
