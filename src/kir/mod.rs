//! KIR: the compiler's intermediate representation between EU decode and
//! AVX2 code emission, and the optimization passes that run over it.

pub mod passes;
pub mod program;

pub use program::{AluData, CallData, GatherData, ImmData, KirInst, KirProgram, KirReg, Opcode, Payload, SendData, XferData};
