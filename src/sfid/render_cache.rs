//! Render cache message lowering, SFID 5 (render target reads/writes).
//!
//! Grounded on `render-cache.c`'s `pick_render_cache_function`,
//! `sfid_render_cache_rt_write_simd8_rgba_unorm8_linear`/`_uint8_linear`,
//! `write_uint8_linear`, `builder_emit_sfid_render_cache_helper`,
//! `builder_emit_sfid_render_cache`.

use crate::arena::ShaderArena;
use crate::eu::DecodedInst;
use crate::gpu_addr::HostMemory;
use crate::kir::program::KirProgram;
use crate::sfid::{alloc_args, field};
use crate::surface::{self, SurfaceFormat, TileMode};
use crate::thread::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    RtWrite,
    RtRead,
    Other(u32),
}

impl MessageType {
    fn from_bits(bits: u32) -> MessageType {
        match bits {
            0x0c => MessageType::RtWrite,
            0x0d => MessageType::RtRead,
            other => MessageType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageSubtype {
    Simd16,
    Simd16RepData,
    Simd8DualsrcLo,
    Simd8DualsrcHi,
    Simd8Lo,
    Simd16RepDataTiled,
    Other(u32),
}

impl MessageSubtype {
    fn from_bits(bits: u32) -> MessageSubtype {
        match bits {
            0 => MessageSubtype::Simd16,
            1 => MessageSubtype::Simd16RepData,
            2 => MessageSubtype::Simd8DualsrcLo,
            3 => MessageSubtype::Simd8DualsrcHi,
            4 => MessageSubtype::Simd8Lo,
            7 => MessageSubtype::Simd16RepDataTiled,
            other => MessageSubtype::Other(other),
        }
    }
}

/// Argument block for every render-cache native helper, `struct
/// sfid_render_cache_args`. ksim's `surface::Surface` doesn't decode array
/// surfaces (`minimum_array_element`/`qpitch`), so every write targets slice
/// 0; see DESIGN.md.
#[repr(C)]
struct SfidRenderCacheArgs {
    src: u32,
    pixels: u64,
    format: SurfaceFormat,
    stride: u32,
    cpp: u32,
}

fn to_unorm8(v: f32) -> u32 {
    let clamped = v.clamp(0.0, 1.0);
    (clamped * 255.0 + 0.5) as u32
}

/// `write_uint8_linear`: pack 4 already-8-bit-ranged dword lanes into RGBA8
/// and mask-store them at the fragment's `(x, y)` from `grf[1]`.
fn write_uint8_linear(t: &mut Thread, args: &SfidRenderCacheArgs, r: [u32; 8], g: [u32; 8], b: [u32; 8], a: [u32; 8]) {
    let x = t.grf[1].as_i32()[4] as u16 as u32;
    let y = t.grf[1].as_i32()[5] as u16 as u32;
    let mask = t.mask_q1.as_i32();

    let base = (args.pixels + x as u64 * args.cpp as u64 + y as u64 * args.stride as u64) as *mut u32;
    for c in 0..8usize {
        if mask[c] >= 0 {
            continue;
        }
        let rgba = (a[c] << 24) | (b[c] << 16) | (g[c] << 8) | r[c];
        unsafe { *base.add(c) = rgba };
    }
}

extern "C" fn rt_write_simd8_rgba_unorm8_linear(t: *mut Thread, args: *const SfidRenderCacheArgs) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };
    let src = &t.grf[args.src as usize..args.src as usize + 4];
    let r = src[0].as_f32().map(to_unorm8);
    let g = src[1].as_f32().map(to_unorm8);
    let b = src[2].as_f32().map(to_unorm8);
    let a = src[3].as_f32().map(to_unorm8);
    write_uint8_linear(t, args, r, g, b, a);
}

extern "C" fn rt_write_simd8_rgba_uint8_linear(t: *mut Thread, args: *const SfidRenderCacheArgs) {
    let t = unsafe { &mut *t };
    let args = unsafe { &*args };
    let src = &t.grf[args.src as usize..args.src as usize + 4];
    let r = src[0].as_i32().map(|v| v as u32 & 0xff);
    let g = src[1].as_i32().map(|v| v as u32 & 0xff);
    let b = src[2].as_i32().map(|v| v as u32 & 0xff);
    let a = src[3].as_i32().map(|v| v as u32 & 0xff);
    write_uint8_linear(t, args, r, g, b, a);
}

/// `pick_render_cache_function`: only the `MSD_RTW`/`SIMD8_LO`, linear-tile,
/// 8-bit-RGBA cases are implemented; every other format/tile-mode/subtype
/// combination the original's dispatch table covers is an explicit panic,
/// matching its own `stub()` fallthroughs.
fn pick_function(message_type: MessageType, subtype: MessageSubtype, format: SurfaceFormat, tile_mode: TileMode) -> usize {
    match (message_type, subtype) {
        (MessageType::RtWrite, MessageSubtype::Simd8Lo) => match (format, tile_mode) {
            (SurfaceFormat::R8G8B8A8Unorm, TileMode::Linear) => rt_write_simd8_rgba_unorm8_linear as usize,
            (SurfaceFormat::R8G8B8A8Uint, TileMode::Linear) => rt_write_simd8_rgba_uint8_linear as usize,
            _ => panic!("unimplemented simd8 rt write format/tile_mode: {format:?} {tile_mode:?}"),
        },
        _ => panic!("unimplemented render cache message: {message_type:?} {subtype:?}"),
    }
}

pub fn emit_sfid_render_cache_helper(
    prog: &mut KirProgram,
    arena: &mut ShaderArena,
    host: &dyn HostMemory,
    message_type_bits: u32,
    subtype_bits: u32,
    src: u32,
    mlen: u32,
    surface_index: u32,
) {
    let message_type = MessageType::from_bits(message_type_bits);
    let subtype = MessageSubtype::from_bits(subtype_bits);

    let rt = surface::get_surface(host, prog.binding_table_address, surface_index).expect("invalid binding table entry");
    let pixels = host.translate(rt.pixels, rt.pitch as usize * rt.height as usize).expect("surface not mapped") as u64;

    let func = pick_function(message_type, subtype, rt.format, rt.tile_mode);
    let args = alloc_args(arena, SfidRenderCacheArgs { src, pixels, format: rt.format, stride: rt.pitch, cpp: rt.format.cpp() });
    prog.send(func, args, src, mlen, 0, 0, true);
}

/// Lower one `send` instruction whose SFID field selected the render cache.
pub fn emit_sfid_render_cache(prog: &mut KirProgram, arena: &mut ShaderArena, host: &dyn HostMemory, inst: &DecodedInst) {
    let send = inst.send.expect("render cache message without send fields");
    let bti = field(send.function_control, 0, 7);
    let message_subtype = field(send.function_control, 8, 10);
    let message_type = field(send.function_control, 14, 17);

    emit_sfid_render_cache_helper(prog, arena, host, message_type, message_subtype, inst.src0.num, send.mlen, bti);
}
