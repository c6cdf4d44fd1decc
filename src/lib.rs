//! ksim — a user-space functional simulator for an Intel Gen9 GPU core.
//!
//! The crate's reason for existing is the EU-to-AVX2 shader JIT: given a
//! pointer to a Gen9 EU shader binary, [`driver::compile_shader`] produces
//! native AVX2 machine code that [`driver::dispatch`] invokes once per
//! 8-lane thread.
//!
//! # Architecture
//! - Decode: [`eu::decode`] turns a raw 128-bit instruction record into a
//!   [`eu::DecodedInst`].
//! - Translate: [`translate`] lowers each decoded instruction into
//!   [`kir::program::KirProgram`], the crate's typed SSA-without-phis IR.
//! - Passes: [`kir::passes`] runs copy propagation, dead-code elimination
//!   and linear-scan register allocation over the program.
//! - Region lowering: [`region`] turns an [`eu::EuRegion`] into the AVX2
//!   load/store sequence its shape calls for.
//! - SFID lowering: [`sfid`] turns `send` messages (sampler, dataport, URB,
//!   render cache) into native helper calls.
//! - Backend: [`asm`] assembles VEX-encoded AVX2 machine code into an
//!   [`arena::ShaderArena`].
//! - Stage front-ends: [`stage`] builds the per-stage prologue (payload/
//!   CURBE, vertex fetch, vertex post-processing) around a translated
//!   kernel body.

pub mod arena;
pub mod asm;
pub mod config;
pub mod driver;
pub mod error;
pub mod eu;
pub mod gpu_addr;
pub mod kir;
pub mod region;
pub mod sfid;
pub mod stage;
pub mod surface;
pub mod thread;
pub mod translate;

pub use config::CompileConfig;
pub use driver::{compile_shader, dispatch, EntryPoint};
pub use error::KsimError;
pub use gpu_addr::HostMemory;
pub use stage::Stage;
pub use thread::Thread;
