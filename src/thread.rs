//! Per-thread execution state: the General Register File, masks and spill
//! area a compiled shader reads and writes through `rdi` at dispatch time.
//!
//! Grounded on the original's `struct thread` (`ksim.h`) and the ABI
//! `backend_jit.rs` establishes for its own `JitContext`: a single pointer
//! argument to the compiled function, fields accessed by fixed byte offset.

/// Number of general registers in the EU register file (Gen9: 128 GRF
/// entries of 32 bytes each, i.e. 8 lanes of a 32-bit channel).
pub const GRF_COUNT: usize = 128;

/// Default number of spill slots reserved past the GRF file. The register
/// allocator (`kir::passes::regalloc`) never spills more than this many
/// live values at once for the shader sizes ksim targets; exceeding it is a
/// fatal invariant violation, matching the original's fixed-size
/// `thread.spill[]` array.
pub const DEFAULT_SPILL_SLOTS: usize = 32;

/// A single 256-bit (32-byte) EU register, viewed as 8 lanes of a 32-bit
/// channel type. Kept as a plain byte array (not a C-style union) so every
/// accessor is a safe, explicit reinterpretation rather than relying on
/// union-field aliasing, which Rust does not give the same guarantees for
/// that C does.
#[derive(Clone, Copy)]
#[repr(align(32))]
pub struct Grf(pub [u8; 32]);

impl Grf {
    pub const ZERO: Grf = Grf([0; 32]);

    #[inline]
    pub fn as_f32(&self) -> [f32; 8] {
        let mut out = [0f32; 8];
        for i in 0..8 {
            out[i] = f32::from_le_bytes(self.0[i * 4..i * 4 + 4].try_into().unwrap());
        }
        out
    }

    #[inline]
    pub fn as_i32(&self) -> [i32; 8] {
        let mut out = [0i32; 8];
        for i in 0..8 {
            out[i] = i32::from_le_bytes(self.0[i * 4..i * 4 + 4].try_into().unwrap());
        }
        out
    }

    #[inline]
    pub fn from_f32(v: [f32; 8]) -> Grf {
        let mut bytes = [0u8; 32];
        for i in 0..8 {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v[i].to_le_bytes());
        }
        Grf(bytes)
    }

    #[inline]
    pub fn from_i32(v: [i32; 8]) -> Grf {
        let mut bytes = [0u8; 32];
        for i in 0..8 {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v[i].to_le_bytes());
        }
        Grf(bytes)
    }
}

/// Number of vertex elements (4 components each) the vertex-fetch front end
/// lands into `Thread::vf_buffer` before the shader proper reads them out
/// via `emit_load_vue`'s copy into the GRF file. The original sizes this to
/// `VERTEX_ELEMENTS` in its per-stage `vs_thread`; ksim keeps the same
/// bound.
pub const MAX_VERTEX_ELEMENTS: usize = 34;

/// Per-thread execution state passed to a compiled shader via `rdi`.
///
/// Field order and types are part of the JIT ABI: `kir::passes::regalloc`
/// and `asm::forms` compute byte offsets into this struct and must be kept
/// in sync with any layout change here (see the `THREAD_*` offset constants
/// in `asm::forms`).
///
/// The original splits per-stage state into separate structs
/// (`vs_thread`/`ps_thread`/...) that embed a common `struct thread` as
/// their first member. ksim flattens all of that into one `Thread` with
/// named scratch fields instead, since `dispatch`'s ABI (spec.md §6) passes
/// a single untyped pointer regardless of stage — see DESIGN.md.
#[repr(C, align(32))]
pub struct Thread {
    /// General register file, 128 entries of 32 bytes.
    pub grf: [Grf; GRF_COUNT],
    /// Execution mask for the first quarter (channels 0-7).
    pub mask_q1: Grf,
    /// Execution mask for the second quarter (channels 8-15), unused for
    /// SIMD8 dispatch but kept for layout parity with the original.
    pub mask_q2: Grf,
    /// Per-lane vertex index, written by the driver before dispatch.
    pub vid: Grf,
    /// Per-lane instance index.
    pub iid: Grf,
    /// `start_vertex`/`base_vertex`/`start_instance`, broadcast uniforms
    /// read by `stage::vertex_fetch` via `load_uniform`.
    pub start_vertex: Grf,
    pub base_vertex: Grf,
    pub start_instance: Grf,
    /// Landing zone for fetched vertex attributes, copied into the VUE
    /// (via the GRF file) by `stage::vertex_fetch`'s `emit_load_vue` before
    /// the EU-translated shader body runs. One `Grf` per component per
    /// element.
    /// Element 0 (`vf_buffer[0..4]`) is always clip-space position x/y/z/w,
    /// the layout `stage::post_process` assumes.
    pub vf_buffer: [Grf; MAX_VERTEX_ELEMENTS * 4],
    /// Per-draw clip-rectangle and viewport-matrix uniforms `stage::
    /// post_process` reads via `load_uniform`. Broadcast scalars: only the
    /// low 4 bytes of each `Grf` are meaningful.
    pub viewport: ViewportState,
    /// Per-lane clip-test result, written by `stage::post_process`'s clip
    /// test and read back by the rasterizer. The original overlays this on
    /// the same vertex-element landing buffer as `x`/`y`/`z`/`w`; ksim gives
    /// it its own field instead of widening `vf_buffer`'s per-element
    /// stride to fit it.
    pub clip_flags: Grf,
    /// Spill area used by the register allocator when it runs out of AVX2
    /// registers mid-program.
    pub spill: [Grf; DEFAULT_SPILL_SLOTS],
}

/// Per-draw viewport transform and guardband/clip rectangle, the uniforms
/// behind `pipe.c`'s `vue_offset(base, vp.m00)`/`vue_offset(base, clip.x0)`
/// accesses. ksim hangs these off `Thread` directly rather than the
/// original's per-stage VUE-adjacent layout (see `Thread`'s doc comment).
#[derive(Clone, Copy)]
#[repr(C)]
pub struct ViewportState {
    pub clip_x0: Grf,
    pub clip_x1: Grf,
    pub clip_y0: Grf,
    pub clip_y1: Grf,
    pub m00: Grf,
    pub m11: Grf,
    pub m22: Grf,
    pub m30: Grf,
    pub m31: Grf,
    pub m32: Grf,
}

impl ViewportState {
    pub const ZERO: ViewportState = ViewportState {
        clip_x0: Grf::ZERO,
        clip_x1: Grf::ZERO,
        clip_y0: Grf::ZERO,
        clip_y1: Grf::ZERO,
        m00: Grf::ZERO,
        m11: Grf::ZERO,
        m22: Grf::ZERO,
        m30: Grf::ZERO,
        m31: Grf::ZERO,
        m32: Grf::ZERO,
    };
}

impl Thread {
    pub fn new() -> Box<Thread> {
        Box::new(Thread {
            grf: [Grf::ZERO; GRF_COUNT],
            mask_q1: Grf::ZERO,
            mask_q2: Grf::ZERO,
            vid: Grf::ZERO,
            iid: Grf::ZERO,
            start_vertex: Grf::ZERO,
            base_vertex: Grf::ZERO,
            start_instance: Grf::ZERO,
            vf_buffer: [Grf::ZERO; MAX_VERTEX_ELEMENTS * 4],
            viewport: ViewportState::ZERO,
            clip_flags: Grf::ZERO,
            spill: [Grf::ZERO; DEFAULT_SPILL_SLOTS],
        })
    }

    pub fn grf_offset(grf: u32) -> u32 {
        (std::mem::offset_of!(Thread, grf) + grf as usize * 32) as u32
    }

    pub fn mask_q1_offset() -> u32 {
        std::mem::offset_of!(Thread, mask_q1) as u32
    }

    pub fn vid_offset() -> u32 {
        std::mem::offset_of!(Thread, vid) as u32
    }

    pub fn iid_offset() -> u32 {
        std::mem::offset_of!(Thread, iid) as u32
    }

    pub fn start_vertex_offset() -> u32 {
        std::mem::offset_of!(Thread, start_vertex) as u32
    }

    pub fn base_vertex_offset() -> u32 {
        std::mem::offset_of!(Thread, base_vertex) as u32
    }

    pub fn start_instance_offset() -> u32 {
        std::mem::offset_of!(Thread, start_instance) as u32
    }

    /// Byte offset of `vf_buffer[element * 4 + component]`.
    pub fn vf_buffer_offset(element: u32, component: u32) -> u32 {
        (std::mem::offset_of!(Thread, vf_buffer) + (element * 4 + component) as usize * 32) as u32
    }

    pub fn viewport_clip_x0_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, clip_x0)) as u32
    }
    pub fn viewport_clip_x1_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, clip_x1)) as u32
    }
    pub fn viewport_clip_y0_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, clip_y0)) as u32
    }
    pub fn viewport_clip_y1_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, clip_y1)) as u32
    }
    pub fn viewport_m00_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m00)) as u32
    }
    pub fn viewport_m11_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m11)) as u32
    }
    pub fn viewport_m22_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m22)) as u32
    }
    pub fn viewport_m30_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m30)) as u32
    }
    pub fn viewport_m31_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m31)) as u32
    }
    pub fn viewport_m32_offset() -> u32 {
        (std::mem::offset_of!(Thread, viewport) + std::mem::offset_of!(ViewportState, m32)) as u32
    }

    pub fn clip_flags_offset() -> u32 {
        std::mem::offset_of!(Thread, clip_flags) as u32
    }

    pub fn spill_offset(slot: u32) -> u32 {
        (std::mem::offset_of!(Thread, spill) + slot as usize * 32) as u32
    }
}

/// Byte offset of `Thread::spill[0]` from the start of the struct, kept for
/// callers that only need the base (the register allocator adds `slot *
/// 32` itself via `spill_offset`).
pub fn spill_offset(slot: u32) -> u32 {
    Thread::spill_offset(slot)
}
