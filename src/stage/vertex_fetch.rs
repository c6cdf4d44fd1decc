//! Vertex fetch: read vertex-buffer attributes (and, for indexed draws, the
//! index buffer) into `Thread::vf_buffer`, ready for `emit_load_vue` to copy
//! into the VUE.
//!
//! Grounded on `pipe.c`'s `emit_vertex_fetch`/`emit_load_format_simd8`/
//! `emit_gather`/`emit_load_vue`.

use crate::eu::EuRegion;
use crate::gpu_addr::HostMemory;
use crate::kir::program::{KirProgram, KirReg, Opcode};
use crate::surface::SurfaceFormat;
use crate::thread::Thread;

/// `VERTEX_BUFFER_STATE::format` (`GEN9_INDEX_FORMAT`), selecting the gather
/// scale and sign-/zero-extension width for a random-access (indexed) fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Byte,
    Word,
    Dword,
}

/// Random-access (indexed) draw state, `gt.vf.ib`.
#[derive(Debug, Clone, Copy)]
pub struct IndexBufferState {
    /// Host-translated base address of the index buffer.
    pub address: u64,
    pub format: IndexFormat,
}

/// One `VERTEX_BUFFER_STATE`, `gt.vf.vb[n]`.
#[derive(Debug, Clone, Copy)]
pub struct VertexBufferState {
    /// Host-translated base address of the buffer.
    pub data: u64,
    pub pitch: u32,
}

/// `VFCOMP_*`, one per destination component of a vertex element.
/// `VFCOMP_STORE_PID` isn't modeled: the original marks it unreachable for
/// every element the command-stream decoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentControl {
    NoStore,
    StoreSrc,
    Store0,
    Store1Fp,
    Store1Int,
}

/// One `VERTEX_ELEMENT_STATE`, `gt.vf.ve[n]`.
#[derive(Debug, Clone)]
pub struct VertexElement {
    pub valid: bool,
    /// Index into `VertexFetchState::buffers`.
    pub vb: usize,
    pub offset: u32,
    pub format: SurfaceFormat,
    pub cc: [ComponentControl; 4],
    pub instancing: bool,
    /// `step_rate > 1` is a fatal stub, matching the original's FIXME.
    pub step_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Sequential,
    Random,
}

/// Everything `emit_vertex_fetch` reads out of pipeline state, `gt.vf`/
/// `gt.prim` combined (ksim has no separate `gt` global; the driver builds
/// this per draw call instead).
pub struct VertexFetchState {
    pub buffers: Vec<VertexBufferState>,
    pub elements: Vec<VertexElement>,
    pub index_buffer: Option<IndexBufferState>,
    pub access_type: AccessType,
    pub start_vertex: u32,
    pub base_vertex: u32,
    pub start_instance: u32,
    pub iid_enable: bool,
    pub iid_element: u32,
    pub iid_component: u32,
    pub vid_enable: bool,
    pub vid_element: u32,
    pub vid_component: u32,
}

fn is_power_of_two(v: u32) -> bool {
    v != 0 && (v & (v - 1)) == 0
}

/// `emit_gather`: reload the execution mask on every call, since
/// `vpgatherdd` zeros its mask operand as a side effect.
fn emit_gather(prog: &mut KirProgram, base: u64, offset: KirReg, scale: u32, base_offset: u32) -> KirReg {
    let mask = prog.load_v8(Thread::mask_q1_offset());
    prog.gather(base, offset, mask, scale, base_offset)
}

/// `emit_load_format_simd8`: gather the 1-4 dwords a `format` needs and fill
/// the remaining destination components per the format's implicit default
/// (`0` for missing color channels, `1.0` for a missing alpha).
fn emit_load_format_simd8(prog: &mut KirProgram, format: SurfaceFormat, base: u64, offset: KirReg) -> [KirReg; 4] {
    use SurfaceFormat::*;
    match format {
        R32Float | R32Sint | R32Uint => [
            emit_gather(prog, base, offset, 1, 0),
            prog.immd(0),
            prog.immd(0),
            prog.immf(1.0),
        ],
        R32G32Float | R32G32Sint | R32G32Uint => [
            emit_gather(prog, base, offset, 1, 0),
            emit_gather(prog, base, offset, 1, 4),
            prog.immd(0),
            prog.immf(1.0),
        ],
        R32G32B32Float | R32G32B32Sint | R32G32B32Uint => [
            emit_gather(prog, base, offset, 1, 0),
            emit_gather(prog, base, offset, 1, 4),
            emit_gather(prog, base, offset, 1, 8),
            prog.immf(1.0),
        ],
        R32G32B32A32Float | R32G32B32A32Sint | R32G32B32A32Uint => [
            emit_gather(prog, base, offset, 1, 0),
            emit_gather(prog, base, offset, 1, 4),
            emit_gather(prog, base, offset, 1, 8),
            emit_gather(prog, base, offset, 1, 12),
        ],
        other => panic!("unimplemented vertex fetch format: {other:?}"),
    }
}

/// `emit_vertex_fetch`: the vertex stage's full prologue, landing fetched
/// attributes into `thread.vf_buffer` for `emit_load_vue` to pick up.
pub fn emit_vertex_fetch(prog: &mut KirProgram, _host: &dyn HostMemory, state: &VertexFetchState) {
    prog.comment("vertex fetch");

    let mut vid = prog.load_v8(Thread::vid_offset());
    if state.start_vertex > 0 {
        let sv = prog.load_uniform(Thread::start_vertex_offset());
        vid = prog.alu_binop(Opcode::Addd, vid, sv);
    }

    if state.access_type == AccessType::Random {
        prog.comment("vertex fetch: index buffer fetch");
        let ib = state.index_buffer.expect("random access draw without an index buffer");

        // FIXME: INDEX_BYTE and INDEX_WORD can read outside the index
        // buffer (matches the original's own comment at this call site).
        let mut dst = match ib.format {
            IndexFormat::Byte => {
                let g = emit_gather(prog, ib.address, vid, 1, 0);
                let g = prog.shift_imm(Opcode::Shli, g, 24);
                prog.shift_imm(Opcode::Shri, g, 24)
            }
            IndexFormat::Word => {
                let g = emit_gather(prog, ib.address, vid, 2, 0);
                let g = prog.shift_imm(Opcode::Shli, g, 16);
                prog.shift_imm(Opcode::Shri, g, 16)
            }
            IndexFormat::Dword => emit_gather(prog, ib.address, vid, 4, 0),
        };

        if state.base_vertex > 0 {
            let bv = prog.load_uniform(Thread::base_vertex_offset());
            dst = prog.alu_binop(Opcode::Addd, dst, bv);
        }
        vid = dst;
    }

    for (i, ve) in state.elements.iter().enumerate() {
        if !ve.valid {
            continue;
        }
        let vb = &state.buffers[ve.vb];

        prog.comment(format!("vertex fetch: ve {i}: offset {}, pitch {}", ve.offset, vb.pitch));

        let index = if ve.instancing {
            if ve.step_rate > 1 {
                panic!("instancing step rate > 1 is not implemented");
            }
            let mut index = prog.load_uniform(Thread::iid_offset());
            if state.start_instance > 0 {
                let si = prog.load_uniform(Thread::start_instance_offset());
                index = prog.alu_binop(Opcode::Addd, index, si);
            }
            index
        } else {
            vid
        };

        let mut offset = if vb.pitch == 0 {
            prog.immd(ve.offset as i32)
        } else if is_power_of_two(vb.pitch) {
            let pitch_log2 = vb.pitch.trailing_zeros();
            prog.shift_imm(Opcode::Shli, index, pitch_log2)
        } else if vb.pitch % 3 == 0 && is_power_of_two(vb.pitch / 3) {
            let doubled = prog.shift_imm(Opcode::Shli, index, 1);
            let tripled = prog.alu_binop(Opcode::Addd, doubled, index);
            let pitch_log2 = (vb.pitch / 3).trailing_zeros();
            prog.shift_imm(Opcode::Shli, tripled, pitch_log2)
        } else {
            let pitch = prog.immd(vb.pitch as i32);
            prog.alu_binop(Opcode::Muld, index, pitch)
        };

        if vb.pitch > 0 && ve.offset > 0 {
            let off = prog.immd(ve.offset as i32);
            offset = prog.alu_binop(Opcode::Addd, offset, off);
        }

        let dst = emit_load_format_simd8(prog, ve.format, vb.data, offset);

        for (c, src) in dst.iter().enumerate() {
            let src = match ve.cc[c] {
                ComponentControl::NoStore => continue,
                ComponentControl::StoreSrc => *src,
                ComponentControl::Store0 => prog.immf(0.0),
                ComponentControl::Store1Fp => prog.immf(1.0),
                ComponentControl::Store1Int => prog.immd(1),
            };
            prog.store_v8(Thread::vf_buffer_offset(i as u32, c as u32), src);
        }
    }

    if state.iid_enable || state.vid_enable {
        prog.comment("vertex fetch: system generated values");
        if state.iid_enable {
            let iid = prog.load_uniform(Thread::iid_offset());
            prog.store_v8(Thread::vf_buffer_offset(state.iid_element, state.iid_component), iid);
        }
        if state.vid_enable {
            let vid = prog.load_v8(Thread::vid_offset());
            prog.store_v8(Thread::vf_buffer_offset(state.vid_element, state.vid_component), vid);
        }
    }
}

/// `emit_load_vue`: copy `vue_read_length` VUE entries (2 GRFs each: the two
/// 4-component halves the Gen9 VUE packs per vertex) from `vf_buffer` into
/// the GRF file starting at `grf`, as the translated shader body expects.
pub fn emit_load_vue(prog: &mut KirProgram, grf: u32, vue_read_offset: u32, vue_read_length: u32) {
    prog.comment("copy vue");
    let src = Thread::vf_buffer_offset(vue_read_offset * 2, 0);
    let dst = Thread::grf_offset(grf);
    let count = vue_read_length * 2 * 4;
    for i in 0..count {
        let v = prog.load_region(EuRegion {
            offset: src + i * 32,
            type_size: 4,
            exec_size: 8,
            vstride: 8,
            width: 8,
            hstride: 1,
        });
        prog.store_region(
            EuRegion { offset: dst + i * 32, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 },
            v,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_pitch_uses_shift() {
        assert!(is_power_of_two(32));
        assert!(!is_power_of_two(12));
        assert_eq!(32u32.trailing_zeros(), 5);
    }

    #[test]
    fn sequential_fetch_with_no_elements_just_loads_vid() {
        let mut prog = KirProgram::new(0, 0);
        let host = crate::gpu_addr::FlatMemory::new(0, vec![0u8; 4096]);
        let state = VertexFetchState {
            buffers: vec![],
            elements: vec![],
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
        emit_vertex_fetch(&mut prog, &host, &state);
        assert!(prog.insns.iter().any(|i| i.opcode == Opcode::LoadRegion));
    }
}
