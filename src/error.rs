//! Error types for ksim.
//!
//! `KsimError` covers the small set of failure conditions a host embedding
//! ksim can check *before* compilation starts (arena sizing, malformed
//! addresses). Everything spec.md classifies as an unimplemented feature or
//! an internal invariant violation is not represented here: those conditions
//! are fatal by construction (see `driver`/`kir::passes::regalloc` doc
//! comments) and surface as a panic, not a `Result`, mirroring the original
//! implementation's `ksim_assert`/`stub()` which call `abort()`.

use thiserror::Error;

/// Errors a caller of the compile-time API can recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KsimError {
    /// The shader arena was constructed with a size too small to hold the
    /// reserved constant pool.
    #[error("arena size {0} is smaller than the minimum constant pool reservation")]
    ArenaTooSmall(usize),
    /// The constant pool was exhausted while building a shader.
    #[error("constant pool exhausted: {used} of {capacity} bytes used")]
    ConstantPoolExhausted { used: usize, capacity: usize },
    /// The code pool was exhausted while emitting machine code.
    #[error("code pool exhausted: {used} of {capacity} bytes used")]
    CodePoolExhausted { used: usize, capacity: usize },
    /// A GPU virtual address did not resolve to host memory.
    #[error("gpu address 0x{0:016x} does not map to host memory")]
    UnmappedGpuAddress(u64),
    /// The EU instruction stream requested a compacted (64-bit) instruction.
    /// Expanding the compaction table is out of scope (see spec.md's Open
    /// Questions) — the caller may choose to reject the program instead of
    /// crashing the process.
    #[error("compacted EU instruction at offset {0} is not supported")]
    CompactedInstruction(u64),
}

/// Convenience result alias for ksim's fallible, caller-checkable operations.
pub type Result<T> = std::result::Result<T, KsimError>;
