//! Shader/constant arena: the RWX-mapped region compiled shaders and their
//! constant pools live in.
//!
//! Grounded on `avx-builder.c`'s `builder_get_const_data` (a plain bump
//! allocator over `shader->constant_pool`) and `avx-builder.h`'s
//! `builder::pool_index`. The original maps its whole `struct shader` RWX
//! once via `mmap` in `loader.c`/`gem.c` and never reprotects it; ksim keeps
//! that single-mapping, no-`mprotect` model since its host process has no
//! W^X enforcement to satisfy (see DESIGN.md).

use crate::error::{KsimError, Result};
use std::alloc::Layout;

/// Bytes reserved at the start of the arena for constant data before the
/// executable code pool begins.
pub const CONSTANT_POOL_SIZE: usize = 4096;

const ARENA_ALIGN: usize = 4096;

/// An RWX-mapped region holding, back to back, a constant pool (bump-grown
/// forward from the arena base) and an executable code pool (bump-grown
/// forward from a fixed split point after it).
///
/// `reset` rewinds both cursors to the start without unmapping the region;
/// any `EntryPoint` obtained from a shader compiled before a `reset` becomes
/// dangling and must not be called again (an unchecked precondition on
/// `dispatch`, matching the original's lack of any liveness tracking for
/// compiled shader pointers).
pub struct ShaderArena {
    base: *mut u8,
    size: usize,
    const_cursor: usize,
    code_cursor: usize,
}

unsafe impl Send for ShaderArena {}

impl ShaderArena {
    /// Map a fresh arena of `size` bytes. `size` must be large enough to
    /// hold `CONSTANT_POOL_SIZE` plus at least one instruction's worth of
    /// code.
    pub fn new(size: usize) -> Result<ShaderArena> {
        if size <= CONSTANT_POOL_SIZE + 64 {
            return Err(KsimError::ArenaTooSmall(size));
        }
        let layout = Layout::from_size_align(size, ARENA_ALIGN).expect("valid arena layout");
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                layout.size(),
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            panic!("mmap failed for shader arena of {size} bytes");
        }
        Ok(ShaderArena {
            base: base as *mut u8,
            size,
            const_cursor: 0,
            code_cursor: CONSTANT_POOL_SIZE,
        })
    }

    /// Rewind both bump cursors. Invalidates every previously compiled
    /// shader's entry point.
    pub fn reset(&mut self) {
        self.const_cursor = 0;
        self.code_cursor = CONSTANT_POOL_SIZE;
    }

    /// Reserve `size` bytes of constant data, aligned to `align`, and
    /// return a pointer to it plus its byte offset from the arena base
    /// (used by the assembler to compute `[rdi+disp32]`-relative loads).
    pub fn alloc_const(&mut self, size: usize, align: usize) -> Result<(*mut u8, u32)> {
        let offset = align_up(self.const_cursor, align);
        if offset + size > CONSTANT_POOL_SIZE {
            return Err(KsimError::ConstantPoolExhausted {
                used: offset + size,
                capacity: CONSTANT_POOL_SIZE,
            });
        }
        self.const_cursor = offset + size;
        Ok((unsafe { self.base.add(offset) }, offset as u32))
    }

    /// Reserve `size` bytes in the executable code pool and return a
    /// pointer to the start of the reservation.
    pub fn alloc_code(&mut self, size: usize) -> Result<*mut u8> {
        if self.code_cursor + size > self.size {
            return Err(KsimError::CodePoolExhausted {
                used: self.code_cursor + size,
                capacity: self.size,
            });
        }
        let ptr = unsafe { self.base.add(self.code_cursor) };
        self.code_cursor += size;
        Ok(ptr)
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }
}

impl Drop for ShaderArena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_arena() {
        assert!(ShaderArena::new(16).is_err());
    }

    #[test]
    fn const_and_code_pools_do_not_overlap() {
        let mut arena = ShaderArena::new(64 * 1024).unwrap();
        let (_, const_off) = arena.alloc_const(16, 4).unwrap();
        let code_ptr = arena.alloc_code(16).unwrap();
        let code_off = unsafe { code_ptr.offset_from(arena.base()) } as usize;
        assert!((const_off as usize) < CONSTANT_POOL_SIZE);
        assert!(code_off >= CONSTANT_POOL_SIZE);
    }

    #[test]
    fn reset_rewinds_cursors() {
        let mut arena = ShaderArena::new(64 * 1024).unwrap();
        arena.alloc_const(256, 4).unwrap();
        arena.alloc_code(256).unwrap();
        arena.reset();
        let (_, off) = arena.alloc_const(16, 4).unwrap();
        assert_eq!(off, 0);
    }
}
