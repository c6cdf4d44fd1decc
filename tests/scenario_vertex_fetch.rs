//! Scenario B (spec.md §8): fetch a `R32G32B32A32_FLOAT` vertex element from
//! VB0 (pitch 16, offset 0) with `vid = [0..7]`, and check the destination
//! GRF holds the SIMD8-transposed equivalent of 8 independent scalar
//! fetches: `grf[c]` lane `v` equals `buffer[v].component[c]`.

mod common;

use ksim::gpu_addr::FlatMemory;
use ksim::kir::program::KirProgram;
use ksim::stage::vertex_fetch::{
    emit_load_vue, emit_vertex_fetch, AccessType, ComponentControl, VertexBufferState, VertexElement, VertexFetchState,
};
use ksim::surface::SurfaceFormat;
use ksim::thread::{Grf, Thread};

#[test]
fn sequential_fetch_transposes_interleaved_attributes_into_grf() {
    const VERTEX_COUNT: usize = 8;
    const PITCH: usize = 16;

    // 8 vertices, 4 floats each, pitch 16: buffer[v] = [v*10, v*10+1, v*10+2, v*10+3].
    let mut buf = vec![0u8; VERTEX_COUNT * PITCH];
    for v in 0..VERTEX_COUNT {
        for c in 0..4 {
            let value = v as f32 * 10.0 + c as f32;
            let offset = v * PITCH + c * 4;
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }
    let vb_data = buf.as_ptr() as u64;

    let vb = VertexBufferState { data: vb_data, pitch: PITCH as u32 };
    let ve = VertexElement {
        valid: true,
        vb: 0,
        offset: 0,
        format: SurfaceFormat::R32G32B32A32Float,
        cc: [ComponentControl::StoreSrc; 4],
        instancing: false,
        step_rate: 1,
    };
    let state = VertexFetchState {
        buffers: vec![vb],
        elements: vec![ve],
        index_buffer: None,
        access_type: AccessType::Sequential,
        start_vertex: 0,
        base_vertex: 0,
        start_instance: 0,
        iid_enable: false,
        iid_element: 0,
        iid_component: 0,
        vid_enable: false,
        vid_element: 0,
        vid_component: 0,
    };

    let mut prog = KirProgram::new(0, 0);
    let host = FlatMemory::new(0, vec![0u8; 4]);
    emit_vertex_fetch(&mut prog, &host, &state);

    const GRF_BASE: u32 = 10;
    emit_load_vue(&mut prog, GRF_BASE, 0, 1);
    prog.eot();

    let (_arena, entry) = common::compile(&mut prog);

    let mut thread = Thread::new();
    thread.vid = Grf::from_i32([0, 1, 2, 3, 4, 5, 6, 7]);
    thread.mask_q1 = common::all_lanes_active();

    entry(&mut *thread as *mut Thread);

    for c in 0..4u32 {
        let got = thread.grf[(GRF_BASE + c) as usize].as_f32();
        for v in 0..VERTEX_COUNT {
            let expected = v as f32 * 10.0 + c as f32;
            assert_eq!(got[v], expected, "component {c}, vertex {v}");
        }
    }
}
