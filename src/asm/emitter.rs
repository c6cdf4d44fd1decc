//! Machine-code byte buffer and VEX-prefix construction.
//!
//! `Emitter` generalizes the teacher's `backend_jit.rs` `Emitter` (a plain
//! `Vec<u8>` wrapper with `emit`/`emit2`/`emit_i32`/`rex` helpers for
//! REX+`0F xx` legacy SSE) to VEX-encoded AVX2: instead of a one-byte REX
//! prefix, every instruction needs a 2- or 3-byte VEX prefix whose `vvvv`
//! field carries a second source register and whose `R`/`X`/`B` bits extend
//! `ModRM.reg`/`SIB.index`/`ModRM.rm`-or-`SIB.base` to reach `ymm8`-`ymm15`.
//!
//! `avx-builder.h`'s macros hardcode those extension bits to "no extension"
//! and fold a source register number directly into the opcode byte with
//! addition (`0xc0 + src0 + dst * 8`), which only reaches `ymm0`-`ymm7`; ksim's
//! register allocator treats all 16 `ymm` registers as available (see
//! `kir::passes::regalloc`), so `Emitter` constructs the VEX prefix bit by
//! bit instead, extending to the full register file. The opcode maps,
//! `pp`/`L`/`W` selections and ModRM/SIB shapes below are otherwise taken
//! directly from `avx-builder.h`/`avx-builder.c`.

/// Opcode map selector carried in the low 5 bits of the second byte of a
/// 3-byte VEX prefix.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VexMap {
    Map0f,
    Map0f38,
    Map0f3a,
}

/// Implied legacy prefix carried in the `pp` field of a VEX prefix.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VexPrefix {
    None,
    P66,
    Pf3,
    Pf2,
}

pub struct Emitter {
    pub code: Vec<u8>,
}

impl Emitter {
    pub fn new() -> Emitter {
        Emitter { code: Vec::with_capacity(4096) }
    }

    #[inline(always)]
    pub fn emit(&mut self, byte: u8) {
        self.code.push(byte);
    }

    #[inline(always)]
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    #[inline(always)]
    pub fn emit_i32(&mut self, v: i32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    #[inline(always)]
    pub fn emit_u64(&mut self, v: u64) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.code.len()
    }

    /// Emit a VEX prefix. `reg`/`rm`/`index` are the raw register numbers
    /// (0-15) that will go into `ModRM.reg`/`ModRM.rm`-or-`SIB.base`/
    /// `SIB.index`; `vvvv` is the second source register (0-15, or 0 if the
    /// form has none).
    ///
    /// Always emits the 3-byte form. The 2-byte form is a pure size
    /// optimization available only when `map == Map0f`, `w == false` and
    /// every register fits in 0-7; since ksim's register allocator treats
    /// all 16 `ymm` registers as live candidates, using the 3-byte form
    /// unconditionally avoids a register-number-dependent prefix length and
    /// is accepted identically by the CPU.
    pub fn vex(&mut self, reg: u8, index: u8, rm: u8, map: VexMap, w: bool, vvvv: u8, l256: bool, pp: VexPrefix) {
        let r_bit = reg < 8;
        let x_bit = index < 8;
        let b_bit = rm < 8;
        let pp_bits = match pp {
            VexPrefix::None => 0u8,
            VexPrefix::P66 => 1,
            VexPrefix::Pf3 => 2,
            VexPrefix::Pf2 => 3,
        };
        let l_bit = if l256 { 1u8 } else { 0 };
        let vvvv_bits = (!vvvv) & 0xf;
        let map_bits = match map {
            VexMap::Map0f => 1u8,
            VexMap::Map0f38 => 2,
            VexMap::Map0f3a => 3,
        };

        let byte1 = ((r_bit as u8) << 7) | ((x_bit as u8) << 6) | ((b_bit as u8) << 5) | map_bits;
        let byte2 = ((w as u8) << 7) | (vvvv_bits << 3) | (l_bit << 2) | pp_bits;
        self.emit(0xc4);
        self.emit(byte1);
        self.emit(byte2);
    }

    /// `ModRM` byte for a register-direct operand (`mod == 11`).
    pub fn modrm_reg(&mut self, reg: u8, rm: u8) {
        self.emit(0xc0 | ((reg & 7) << 3) | (rm & 7));
    }

    /// `ModRM` + `disp32` for `[rdi + disp32]` addressing (`mod == 10`,
    /// `rm == RDI`, no SIB needed since the base is never `rsp`/`r12`).
    pub fn modrm_rdi_disp32(&mut self, reg: u8, offset: i32) {
        self.emit(0x80 | ((reg & 7) << 3) | 0x07);
        self.emit_i32(offset);
    }

    /// `ModRM` + `disp32` for RIP-relative addressing (`mod == 00`, `rm ==
    /// 101`), used for constant-pool loads.
    pub fn modrm_rip_disp32(&mut self, reg: u8, offset: i32) {
        self.emit(((reg & 7) << 3) | 0x05);
        self.emit_i32(offset);
    }

    /// `ModRM` + `SIB` for `[rax + ymm_index * scale + disp8]` VSIB
    /// addressing, used by `vpgatherdd`.
    pub fn modrm_vsib(&mut self, reg: u8, index: u8, scale: u8, disp8: i8) {
        let mod_bits = if disp8 == 0 { 0x00 } else { 0x40 };
        self.emit(mod_bits | ((reg & 7) << 3) | 0x04);
        let scale_bits = match scale {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            other => panic!("invalid gather scale {other}"),
        };
        self.emit((scale_bits << 6) | ((index & 7) << 3) | 0x00);
        if disp8 != 0 {
            self.emit(disp8 as u8);
        }
    }
}
