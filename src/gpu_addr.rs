//! Translation between GPU virtual addresses and host memory.
//!
//! The ioctl/GEM shim that owns the real GGTT mapping is out of scope (see
//! spec.md §1): ksim only needs *a* way to turn a `u64` GPU address into a
//! host pointer, so that collaborator is expressed as a trait, the way
//! `libcorevm` expresses its guest memory bus as the `MemoryBus` trait
//! rather than hard-coding a single backing implementation. This keeps
//! `compile_shader` testable against a plain `Vec<u8>`-backed fake.

use crate::error::{KsimError, Result};

/// Host-side view of GPU-addressable memory.
///
/// Implementations back shader binaries, binding tables, sampler state and
/// surface data with whatever storage the embedding process uses (a mapped
/// GEM buffer, a test fixture, ...).
pub trait HostMemory {
    /// Translate a GPU virtual address to a host pointer valid for `len`
    /// bytes. Returns `None` if the address range is not currently mapped.
    fn translate(&self, gpu_addr: u64, len: usize) -> Option<*const u8>;

    /// Read `len` bytes at `gpu_addr` into a fresh `Vec`.
    fn read(&self, gpu_addr: u64, len: usize) -> Result<Vec<u8>> {
        let ptr = self
            .translate(gpu_addr, len)
            .ok_or(KsimError::UnmappedGpuAddress(gpu_addr))?;
        Ok(unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec())
    }

    /// Read a little-endian `u32` at `gpu_addr`.
    fn read_u32(&self, gpu_addr: u64) -> Result<u32> {
        let bytes = self.read(gpu_addr, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

/// A flat, contiguous host buffer addressed by a single base GPU address.
/// Used by tests and by hosts simple enough not to need a real GGTT.
pub struct FlatMemory {
    base: u64,
    data: Vec<u8>,
}

impl FlatMemory {
    pub fn new(base: u64, data: Vec<u8>) -> FlatMemory {
        FlatMemory { base, data }
    }
}

impl HostMemory for FlatMemory {
    fn translate(&self, gpu_addr: u64, len: usize) -> Option<*const u8> {
        let offset = gpu_addr.checked_sub(self.base)? as usize;
        if offset.checked_add(len)? <= self.data.len() {
            Some(unsafe { self.data.as_ptr().add(offset) })
        } else {
            None
        }
    }
}
