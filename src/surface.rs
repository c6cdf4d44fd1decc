//! Binding-table surface resolution.
//!
//! Grounded on `surface.c`'s `get_surface`: walk the binding table at
//! `binding_table_address`, read the `i`th `RENDER_SURFACE_STATE` dword
//! array it points to, and decode the handful of fields `sfid::*` actually
//! needs (base address, format, tile mode, pitch). The original decodes the
//! full Gen9 `RENDER_SURFACE_STATE` bitfield layout via a genxml-generated
//! unpacker (`GEN9_RENDER_SURFACE_STATE_unpack`, not present anywhere in
//! this codebase's sources); ksim decodes only the fields it needs directly
//! from the documented dword offsets (Vol 2d, "RENDER_SURFACE_STATE") and
//! leaves the rest (array/depth surfaces, MOCS, aux surfaces, compression)
//! unread — see DESIGN.md.

use crate::gpu_addr::HostMemory;

/// `SURFACE_FORMAT` values this module can decode a gather/store sequence
/// for. Anything else is a fatal `stub()`, matching the original's
/// `format_size`/`rt_write` dispatch tables, which are themselves
/// exhaustive only over the formats the reference command streams use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    R32G32B32Float,
    R32G32B32Sint,
    R32G32B32Uint,
    R32G32Float,
    R32G32Sint,
    R32G32Uint,
    R32Float,
    R32Sint,
    R32Uint,
    R16G16B16A16Uint,
    R8G8B8A8Unorm,
    R8G8B8A8Uint,
    B8G8R8A8Unorm,
    R8Uint,
    Other(u32),
}

impl SurfaceFormat {
    /// `SURFACE_FORMAT` field values (Vol 2d, "SURFACE_FORMAT"), limited to
    /// what `sfid`/`stage::vertex_fetch` dispatch on.
    fn from_bits(bits: u32) -> SurfaceFormat {
        match bits {
            0x00 => SurfaceFormat::R32G32B32A32Float,
            0x01 => SurfaceFormat::R32G32B32A32Sint,
            0x02 => SurfaceFormat::R32G32B32A32Uint,
            0x06 => SurfaceFormat::R32G32B32Float,
            0x07 => SurfaceFormat::R32G32B32Sint,
            0x08 => SurfaceFormat::R32G32B32Uint,
            0x0d => SurfaceFormat::R32G32Float,
            0x0e => SurfaceFormat::R32G32Sint,
            0x0f => SurfaceFormat::R32G32Uint,
            0x1b => SurfaceFormat::R32Float,
            0x1c => SurfaceFormat::R32Sint,
            0x1d => SurfaceFormat::R32Uint,
            0x38 => SurfaceFormat::R16G16B16A16Uint,
            0xc0 => SurfaceFormat::B8G8R8A8Unorm,
            0xc7 => SurfaceFormat::R8G8B8A8Unorm,
            0xc9 => SurfaceFormat::R8G8B8A8Uint,
            0x0129 => SurfaceFormat::R8Uint,
            other => SurfaceFormat::Other(other),
        }
    }

    /// Bytes per texel, for the formats this module decodes. Matches
    /// `formats.c::format_size` for these entries.
    pub fn cpp(self) -> u32 {
        match self {
            SurfaceFormat::R32G32B32A32Float
            | SurfaceFormat::R32G32B32A32Uint
            | SurfaceFormat::R32G32B32A32Sint => 16,
            SurfaceFormat::R32G32B32Float | SurfaceFormat::R32G32B32Sint | SurfaceFormat::R32G32B32Uint => 12,
            SurfaceFormat::R32G32Float | SurfaceFormat::R32G32Sint | SurfaceFormat::R32G32Uint => 8,
            SurfaceFormat::R32Float | SurfaceFormat::R32Sint | SurfaceFormat::R32Uint => 4,
            SurfaceFormat::R16G16B16A16Uint => 8,
            SurfaceFormat::R8G8B8A8Unorm | SurfaceFormat::R8G8B8A8Uint | SurfaceFormat::B8G8R8A8Unorm => 4,
            SurfaceFormat::R8Uint => 1,
            SurfaceFormat::Other(_) => 0,
        }
    }
}

/// `TILE_MODE` (Vol 2d, "Tiled Resource Mode"/"TiledSurface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    Linear,
    XMajor,
    YMajor,
}

impl TileMode {
    fn from_bits(bits: u32) -> TileMode {
        match bits {
            0 => TileMode::Linear,
            2 => TileMode::XMajor,
            3 => TileMode::YMajor,
            other => panic!("unknown tile mode {other}"),
        }
    }
}

/// The fields `sfid`/`stage::vertex_fetch` need out of a binding-table
/// surface entry.
#[derive(Debug, Clone, Copy)]
pub struct Surface {
    pub pixels: u64,
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub tile_mode: TileMode,
}

/// Resolve binding table index `index` at `binding_table_address` against
/// `host`. Returns `None` if the binding table or surface-state dword range
/// isn't mapped, mirroring `get_surface`'s `bool` return (the original
/// treats an invalid binding-table slot as "unbound", not fatal).
pub fn get_surface(host: &dyn HostMemory, binding_table_address: u64, index: u32) -> Option<Surface> {
    let entry_addr = host.read_u32(binding_table_address + index as u64 * 4).ok()? as u64;
    let state = host.read(entry_addr, 16 * 4).ok()?;
    let dword = |i: usize| u32::from_le_bytes(state[i * 4..i * 4 + 4].try_into().unwrap());

    let dw0 = dword(0);
    let format = SurfaceFormat::from_bits((dw0 >> 18) & 0x1ff);
    let tile_mode = TileMode::from_bits((dw0 >> 10) & 0x3);

    let dw2 = dword(2);
    let height = (dw2 >> 16) + 1;
    let width = (dw2 & 0x3fff) + 1;

    let dw3 = dword(3);
    let pitch = (dw3 & 0x3ffff) + 1;

    let base_lo = dword(8) as u64;
    let base_hi = (dword(9) & 0xffff) as u64;
    let pixels = base_lo | (base_hi << 32);

    Some(Surface { pixels, format, width, height, pitch, tile_mode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_r32g32b32a32_float_linear() {
        assert_eq!(SurfaceFormat::from_bits(0x00), SurfaceFormat::R32G32B32A32Float);
        assert_eq!(TileMode::from_bits(0), TileMode::Linear);
    }

    #[test]
    fn cpp_matches_format_size_for_known_formats() {
        assert_eq!(SurfaceFormat::R32G32B32A32Float.cpp(), 16);
        assert_eq!(SurfaceFormat::R8Uint.cpp(), 1);
    }
}
