//! AVX2 code emission: VEX-prefix construction (`emitter`), per-instruction
//! byte-pattern forms (`forms`), and the top-level KIR-to-machine-code
//! driver (`codegen`).

pub mod codegen;
pub mod emitter;
pub mod forms;

pub use emitter::Emitter;
