//! Payload-header synthesis and push-constant (CURBE) copy.
//!
//! Grounded on `pipe.c::dispatch_vs` (and the equivalent per-stage
//! functions in `geometry.c`/`wm.c`): both write `Thread::grf[0]` and the
//! CURBE GRFs directly from host code *before* the compiled shader runs,
//! rather than emitting IR for it — the original only JIT-emits a push-
//! constant copy (`emit_load_constants`) for the rare case where the same
//! compiled program must re-read CURBE on every dispatch without a host
//! round-trip; that function's body isn't present anywhere in this
//! codebase's retrieval pack. ksim instead performs the copy the way the
//! always-available runtime path (`thread.c::load_constants`) does, as a
//! plain host-side memcpy immediately before `dispatch` — equivalent here
//! since ksim recompiles whenever pipeline state (and therefore CURBE
//! contents) changes, so there is no stale-vs-fresh distinction to
//! preserve. See DESIGN.md.

use crate::gpu_addr::HostMemory;
use crate::thread::{Grf, Thread};

/// Fixed-function R0, per `pipe.c::dispatch_vs`'s `grf[0]` literal.
pub struct PayloadHeader {
    pub sampler_state_address: u32,
    pub scratch_size: u32,
    pub binding_table_address: u32,
    pub scratch_pointer: u32,
    pub fftid: u32,
    pub thread_id: u32,
}

impl PayloadHeader {
    /// Write this header into `thread.grf[0]`.
    pub fn write(&self, thread: &mut Thread) {
        let ud = [
            0,
            0,
            0,
            self.sampler_state_address | self.scratch_size,
            self.binding_table_address,
            self.scratch_pointer | self.fftid,
            self.thread_id & 0xff_ffff,
            0,
        ];
        let mut bytes = [0u8; 32];
        for (i, v) in ud.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        thread.grf[0] = Grf(bytes);
    }
}

/// Per-dispatch monotonic thread-id counter (`gt.vs.tid++` and friends).
/// One instance per stage; `next()` mirrors the original's post-increment
/// read, masked the same way at `PayloadHeader::write` time.
#[derive(Default)]
pub struct ThreadIdCounter(std::sync::atomic::AtomicU32);

impl ThreadIdCounter {
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

/// One of up to four CURBE (push-constant) buffers declared in pipeline
/// state, `struct curbe::buffer[b]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurbeBuffer {
    pub address: u64,
    /// Length in GRFs (32-byte units).
    pub length: u32,
}

/// Copy up to four CURBE buffers into `thread.grf`, starting at
/// `start_grf`. Returns the next free GRF index, exactly `load_constants`'s
/// return value. `dynamic_state_base`, when set, is added to `buffer[0]`'s
/// address only (`gt.curbe_dynamic_state_base`'s effect in the original).
pub fn copy_push_constants(
    thread: &mut Thread,
    host: &dyn HostMemory,
    buffers: &[CurbeBuffer; 4],
    start_grf: u32,
    dynamic_state_base: Option<u64>,
) -> u32 {
    let mut grf = start_grf;
    for (b, buf) in buffers.iter().enumerate() {
        if buf.length == 0 {
            continue;
        }
        let base = if b == 0 { dynamic_state_base.unwrap_or(0) } else { 0 };
        let bytes = host
            .read(buf.address + base, buf.length as usize * 32)
            .expect("CURBE buffer not mapped");
        for i in 0..buf.length as usize {
            let mut chunk = [0u8; 32];
            chunk.copy_from_slice(&bytes[i * 32..i * 32 + 32]);
            thread.grf[grf as usize] = Grf(chunk);
            grf += 1;
        }
    }
    grf
}
