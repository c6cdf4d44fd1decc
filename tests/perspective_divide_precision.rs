//! Scenario E and Property 6 (spec.md §8): `stage::post_process`'s
//! reciprocal-plus-one-Newton-Raphson-step perspective divide must be
//! accurate to at least 22 bits of mantissa, the original's rationale for
//! not shipping a bare `vrcpps` (`emit_perspective_divide`'s doc comment).

mod common;

use ksim::kir::program::KirProgram;
use ksim::stage::post_process::{emit_vertex_post_processing, PostProcessConfig};
use ksim::thread::Thread;

fn divide_w(w: f32) -> f32 {
    let mut prog = KirProgram::new(0, 0);
    let config = PostProcessConfig { perspective_divide_disable: false, ..PostProcessConfig::default() };
    emit_vertex_post_processing(&mut prog, &config);
    prog.eot();

    let (_arena, entry) = common::compile(&mut prog);

    let mut thread = Thread::new();
    thread.vf_buffer[0] = ksim::thread::Grf::from_f32([1.0; 8]); // x
    thread.vf_buffer[1] = ksim::thread::Grf::from_f32([1.0; 8]); // y
    thread.vf_buffer[2] = ksim::thread::Grf::from_f32([1.0; 8]); // z
    thread.vf_buffer[3] = ksim::thread::Grf::from_f32([w; 8]); // w

    entry(&mut *thread as *mut Thread);

    // `emit_perspective_divide` overwrites the w slot with 1/w.
    thread.vf_buffer[3].as_f32()[0]
}

#[test]
fn scenario_e_rcp_of_point_one_is_accurate_to_22_bits() {
    let w = 0.1f32;
    let got = divide_w(w);
    let exact = 1.0f32 / w;
    let rel_err = ((got - exact) / exact).abs();
    assert!(rel_err < 2f32.powi(-22), "relative error {rel_err} too large for w={w}");
}

#[test]
fn property_6_divide_stays_within_22_bits_across_the_w_range() {
    for exp in -10..=10i32 {
        let w = 2f32.powi(exp);
        let got = divide_w(w);
        let exact = 1.0f32 / w;
        let rel_err = ((got - exact) / exact).abs();
        assert!(rel_err < 2f32.powi(-22), "relative error {rel_err} too large for w=2^{exp}");
    }
}

#[test]
fn perspective_divide_also_scales_x_y_z() {
    let mut prog = KirProgram::new(0, 0);
    emit_vertex_post_processing(&mut prog, &PostProcessConfig::default());
    prog.eot();

    let (_arena, entry) = common::compile(&mut prog);

    let mut thread = Thread::new();
    thread.vf_buffer[0] = ksim::thread::Grf::from_f32([2.0; 8]);
    thread.vf_buffer[1] = ksim::thread::Grf::from_f32([4.0; 8]);
    thread.vf_buffer[2] = ksim::thread::Grf::from_f32([6.0; 8]);
    thread.vf_buffer[3] = ksim::thread::Grf::from_f32([2.0; 8]);

    entry(&mut *thread as *mut Thread);

    let xs = thread.vf_buffer[0].as_f32();
    let ys = thread.vf_buffer[1].as_f32();
    let zs = thread.vf_buffer[2].as_f32();
    for lane in 0..8 {
        assert!((xs[lane] - 1.0).abs() < 1e-6);
        assert!((ys[lane] - 2.0).abs() < 1e-6);
        assert!((zs[lane] - 3.0).abs() < 1e-6);
    }
}
