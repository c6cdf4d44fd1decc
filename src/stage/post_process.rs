//! Vertex post-processing: perspective divide, clip test, viewport
//! transform, run on the position vertex element after `vertex_fetch` and
//! the translated shader body have both run.
//!
//! Grounded on `pipe.c`'s `emit_perspective_divide`/`emit_clip_test`/
//! `emit_viewport_transform`/`emit_vertex_post_processing`.

use crate::kir::program::{KirProgram, Opcode};
use crate::thread::Thread;

/// `vcmpps` predicate immediates (Intel SDM, Table "Comparison Predicate").
const CMP_LT_OS: u8 = 0x01;
const CMP_GT_OS: u8 = 0x0e;

/// Which of the three post-processing steps a draw call enables, `gt.clip`/
/// `gt.sf`'s relevant bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcessConfig {
    pub perspective_divide_disable: bool,
    pub guardband_clip_test_enable: bool,
    pub viewport_clip_test_enable: bool,
    pub viewport_transform_enable: bool,
}

/// Element within `Thread::vf_buffer` holding clip-space `x/y/z/w`,
/// matching `vf_buffer`'s doc comment ("element 0 is always position").
fn position_offset(component: u32) -> u32 {
    Thread::vf_buffer_offset(0, component)
}

/// `emit_perspective_divide`: divide x/y/z by w via a reciprocal plus one
/// Newton-Raphson step (`vrcpps` alone is too imprecise for this; a full
/// `vdivps` is slower). `inv_w` also overwrites the stored `w`, so later
/// stages see `1/w` there rather than `w`.
fn emit_perspective_divide(prog: &mut KirProgram) {
    prog.comment("perspective divide");

    let w = prog.load_v8(position_offset(3));
    let inv_w0 = prog.alu_unop(Opcode::Rcp, w);

    let two = prog.immf(2.0);
    let nr = prog.alu_triop(Opcode::Nmaddf, w, inv_w0, two);
    let inv_w = prog.alu_binop(Opcode::Mulf, inv_w0, nr);

    let x = prog.load_v8(position_offset(0));
    let xs = prog.alu_binop(Opcode::Mulf, x, inv_w);
    prog.store_v8(position_offset(0), xs);

    let y = prog.load_v8(position_offset(1));
    let ys = prog.alu_binop(Opcode::Mulf, y, inv_w);
    prog.store_v8(position_offset(1), ys);

    let z = prog.load_v8(position_offset(2));
    let zs = prog.alu_binop(Opcode::Mulf, z, inv_w);
    prog.store_v8(position_offset(2), zs);

    prog.store_v8(position_offset(3), inv_w);
}

/// `emit_clip_test`: OR together the four guardband/viewport edge tests into
/// one per-lane clip-flags mask.
fn emit_clip_test(prog: &mut KirProgram) {
    prog.comment("clip tests");

    let x0 = prog.load_uniform(Thread::viewport_clip_x0_offset());
    let x1 = prog.load_uniform(Thread::viewport_clip_x1_offset());
    let y0 = prog.load_uniform(Thread::viewport_clip_y0_offset());
    let y1 = prog.load_uniform(Thread::viewport_clip_y1_offset());
    let x = prog.load_v8(position_offset(0));
    let y = prog.load_v8(position_offset(1));

    let x0f = prog.cmp(CMP_LT_OS, x0, x);
    let x1f = prog.cmp(CMP_GT_OS, x1, x);
    let y0f = prog.cmp(CMP_LT_OS, y0, y);
    let y1f = prog.cmp(CMP_GT_OS, y1, y);

    let xf = prog.alu_binop(Opcode::Or, x0f, x1f);
    let yf = prog.alu_binop(Opcode::Or, y0f, y1f);
    let f = prog.alu_binop(Opcode::Or, xf, yf);

    prog.store_v8(Thread::clip_flags_offset(), f);
}

/// `emit_viewport_transform`: apply the viewport matrix's diagonal and
/// translation terms to x/y/z (a full 4x4 matrix is never needed here: the
/// original only ever produces this restricted form from `SF_CLIP_VIEWPORT`
/// state).
fn emit_viewport_transform(prog: &mut KirProgram) {
    prog.comment("viewport transform");

    let m00 = prog.load_uniform(Thread::viewport_m00_offset());
    let m11 = prog.load_uniform(Thread::viewport_m11_offset());
    let m22 = prog.load_uniform(Thread::viewport_m22_offset());
    let m30 = prog.load_uniform(Thread::viewport_m30_offset());
    let m31 = prog.load_uniform(Thread::viewport_m31_offset());
    let m32 = prog.load_uniform(Thread::viewport_m32_offset());

    let x = prog.load_v8(position_offset(0));
    let y = prog.load_v8(position_offset(1));
    let z = prog.load_v8(position_offset(2));

    let xs = prog.alu_triop(Opcode::Maddf, x, m00, m30);
    let ys = prog.alu_triop(Opcode::Maddf, y, m11, m31);
    let zs = prog.alu_triop(Opcode::Maddf, z, m22, m32);

    prog.store_v8(position_offset(0), xs);
    prog.store_v8(position_offset(1), ys);
    prog.store_v8(position_offset(2), zs);
}

/// `emit_vertex_post_processing`: run whichever of the three steps `config`
/// enables, in the original's fixed order (divide, then clip, then
/// viewport).
pub fn emit_vertex_post_processing(prog: &mut KirProgram, config: &PostProcessConfig) {
    if !config.perspective_divide_disable {
        emit_perspective_divide(prog);
    }

    if config.guardband_clip_test_enable || config.viewport_clip_test_enable {
        emit_clip_test(prog);
    }

    if config.viewport_transform_enable {
        emit_viewport_transform(prog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_only_perspective_divide() {
        let mut prog = KirProgram::new(0, 0);
        emit_vertex_post_processing(&mut prog, &PostProcessConfig::default());
        assert!(prog.insns.iter().any(|i| i.opcode == Opcode::Rcp));
        assert!(!prog.insns.iter().any(|i| i.opcode == Opcode::Cmp));
        assert!(!prog.insns.iter().any(|i| i.opcode == Opcode::Maddf));
    }

    #[test]
    fn full_pipeline_runs_all_three_steps() {
        let mut prog = KirProgram::new(0, 0);
        let config = PostProcessConfig {
            perspective_divide_disable: false,
            guardband_clip_test_enable: true,
            viewport_clip_test_enable: false,
            viewport_transform_enable: true,
        };
        emit_vertex_post_processing(&mut prog, &config);
        assert!(prog.insns.iter().any(|i| i.opcode == Opcode::Rcp));
        assert!(prog.insns.iter().any(|i| i.opcode == Opcode::Cmp));
        assert!(prog.insns.iter().any(|i| i.opcode == Opcode::Maddf));
    }
}
