//! Shared scaffolding for the integration tests under `tests/`: compile a
//! hand-built `KirProgram` straight through `kir::passes::run_all` and
//! `asm::codegen::emit_program`, bypassing `driver::compile_shader`'s EU
//! decode loop (these tests build KIR directly so they can drive scenarios
//! `compile_shader`'s hardcoded `urb_base: 0` can't reach, per
//! scenario A in spec.md §8) and `driver::EntryPoint`'s private field
//! (`asm::codegen::emit_program` is `pub fn`, so tests call it directly and
//! transmute the resulting pointer themselves, exactly as
//! `asm/codegen.rs`'s own `#[cfg(test)]` module already does).

use ksim::arena::ShaderArena;
use ksim::kir::passes;
use ksim::kir::program::KirProgram;
use ksim::thread::Thread;

pub type Entry = extern "C" fn(*mut Thread);

/// Route `log::trace!`/`log::debug!` breadcrumbs from the passes and
/// lowering code under test to stderr when `RUST_LOG` is set, the same
/// `env_logger::init`-in-the-test-binary convention `pico-gs-pc`'s `main.rs`
/// uses. Idempotent and safe to call once per test process.
fn init_logging() {
    let _ = env_logger::Builder::from_default_env().is_test(true).try_init();
}

/// Run the full optimization pipeline over `prog` and emit it into a fresh
/// arena, returning the arena (which must outlive any call through `Entry`)
/// and the callable entry point.
pub fn compile(prog: &mut KirProgram) -> (ShaderArena, Entry) {
    init_logging();
    passes::run_all(prog);
    let mut arena = ShaderArena::new(1 << 20).expect("arena allocation");
    let entry = ksim::asm::codegen::emit_program(prog, &mut arena);
    let f: Entry = unsafe { std::mem::transmute(entry) };
    (arena, f)
}

/// Same as [`compile`], but skips `kir::passes::run_all` so a caller can run
/// (or not run) individual passes itself and compare the compiled behavior
/// before/after, the shape property 2's and property 4's dispatch-
/// equivalence checks need.
pub fn compile_as_is(prog: &KirProgram) -> (ShaderArena, Entry) {
    init_logging();
    let mut arena = ShaderArena::new(1 << 20).expect("arena allocation");
    let entry = ksim::asm::codegen::emit_program(prog, &mut arena);
    let f: Entry = unsafe { std::mem::transmute(entry) };
    (arena, f)
}

pub fn all_lanes_active() -> ksim::thread::Grf {
    ksim::thread::Grf::from_i32([-1; 8])
}
