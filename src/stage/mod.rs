//! Per-stage shader entry-point front ends.
//!
//! Every stage (vertex, hull, domain, geometry, pixel, compute) builds the
//! same shape of prologue before the EU-translated shader body runs:
//! payload-header synthesis and push-constant copy (`payload`), vertex fetch
//! (`vertex_fetch`, vertex stage only), and vertex post-processing
//! (`post_process`, vertex stage only when no tessellation/geometry stage
//! follows). Grounded on `pipe.c`'s `dispatch_vs`/`emit_vertex_fetch`/
//! `emit_vertex_post_processing` and the equivalent per-stage dispatch
//! functions in `geometry.c`/`tessellation.c`/`wm.c`/`compute.c`.

pub mod payload;
pub mod post_process;
pub mod vertex_fetch;

/// The five fixed-function pipeline stages plus compute, matching
/// `GEN9_3DSTATE_*` / `gt.vs`/`gt.hs`/`gt.ds`/`gt.gs`/`gt.ps`/`gt.cs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}
