//! Shared-function (SFID) message lowering: once `eu::decode` has decoded a
//! `send` instruction, these modules turn its message descriptor into
//! either inline KIR (the URB simple-write fast path) or a native helper
//! function invoked via `KirProgram::send`/`const_send`.
//!
//! Grounded on `urb.c`/`dataport.c`/`sampler.c`/`render-cache.c`'s
//! `builder_emit_sfid_*` entry points, each keyed off the 4-bit SFID field
//! in the `send` instruction's control word (`InstSend::sfid`).

pub mod dataport;
pub mod render_cache;
pub mod sampler;
pub mod urb;

use crate::arena::ShaderArena;

/// `field(value, lo, hi)`: the inclusive bitfield extractor every
/// `unpack_*_message_descriptor` function in the original is built on.
pub(crate) fn field(value: u32, lo: u32, hi: u32) -> u32 {
    let width = hi - lo + 1;
    let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
    (value >> lo) & mask
}

/// Copy `args` into `arena`'s constant pool and return its absolute host
/// address, exactly `get_const_data`'s role in the original: a message's
/// fixed argument block needs a stable address before codegen runs, since
/// `KirProgram::send`'s `args` field is a plain `usize`, not a deferred
/// relocation.
pub(crate) fn alloc_args<T>(arena: &mut ShaderArena, value: T) -> usize {
    let (ptr, _offset) = arena
        .alloc_const(std::mem::size_of::<T>(), std::mem::align_of::<T>())
        .expect("constant pool exhausted");
    unsafe { std::ptr::write(ptr as *mut T, value) };
    ptr as usize
}

/// `SFID` field values (Vol 2d, "Shared Function IDs") this module routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sfid {
    Sampler,
    DataportRo,
    RenderCache,
    Urb,
    Dataport1,
    Other(u32),
}

impl Sfid {
    pub fn from_bits(bits: u32) -> Sfid {
        match bits {
            2 => Sfid::Sampler,
            0 | 4 | 9 => Sfid::DataportRo,
            5 => Sfid::RenderCache,
            6 => Sfid::Urb,
            12 => Sfid::Dataport1,
            other => Sfid::Other(other),
        }
    }
}
