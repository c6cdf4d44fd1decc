//! Decoded EU instruction record types.
//!
//! Field names and bit positions are taken from `eu.h`'s `struct
//! inst_common`/`inst_dst`/`inst_src`/`inst_send` and their `unpack_inst_*`
//! helpers, generalized into owned Rust structs rather than the original's
//! read-on-demand accessor functions — `eu::decode` extracts every field up
//! front into one of these, the way `libcorevm::instruction::DecodedInst`
//! is a fully-populated record rather than a lazy view over raw bytes.

/// The raw 128-bit EU instruction record, two little-endian quadwords.
#[derive(Debug, Clone, Copy)]
pub struct EuInst {
    pub qw: [u64; 2],
}

impl EuInst {
    pub fn from_bytes(bytes: [u8; 16]) -> EuInst {
        EuInst {
            qw: [
                u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
                u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            ],
        }
    }

    /// Extract an inclusive bit range `[start, end]`, spanning the two
    /// quadwords as needed. Mirrors `eu.h::get_inst_bits` exactly.
    pub fn bits(&self, start: u32, end: u32) -> u32 {
        assert!(end + 1 - start < 64);
        let mask: u64 = !0u64 >> (63 - (end - start));
        if start < 64 {
            ((self.qw[0] >> start) & mask) as u32
        } else {
            ((self.qw[1] >> (start - 64)) & mask) as u32
        }
    }
}

/// Hardware register/immediate element type (`enum brw_eu_type` in `eu.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegType {
    Ud,
    D,
    Uw,
    W,
    Ub,
    B,
    DfDouble,
    F,
    Uq,
    Q,
    Hf,
}

impl RegType {
    pub fn from_bits(bits: u32) -> RegType {
        match bits {
            0 => RegType::Ud,
            1 => RegType::D,
            2 => RegType::Uw,
            3 => RegType::W,
            4 => RegType::Ub,
            5 => RegType::B,
            6 => RegType::DfDouble,
            7 => RegType::F,
            8 => RegType::Uq,
            9 => RegType::Q,
            10 => RegType::Hf,
            other => panic!("unknown EU register type {other}"),
        }
    }

    /// Byte size of one element of this type (`eu.h::type_size`).
    pub fn size(self) -> u32 {
        match self {
            RegType::Ud | RegType::D | RegType::F => 4,
            RegType::Uw | RegType::W | RegType::Hf => 2,
            RegType::Ub | RegType::B => 1,
            RegType::DfDouble | RegType::Uq | RegType::Q => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, RegType::F | RegType::Hf | RegType::DfDouble)
    }
}

/// Register file selector (`BRW_*_REGISTER_FILE` / `BRW_IMMEDIATE_VALUE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegFile {
    Architecture,
    General,
    Message,
    Immediate,
}

impl RegFile {
    pub fn from_bits(bits: u32) -> RegFile {
        match bits {
            0 => RegFile::Architecture,
            1 => RegFile::General,
            2 => RegFile::Message,
            3 => RegFile::Immediate,
            other => panic!("unknown register file {other}"),
        }
    }
}

/// Instruction-wide control fields shared by every opcode.
#[derive(Debug, Clone, Copy)]
pub struct InstCommon {
    pub opcode: u32,
    pub access_mode: u32,
    pub exec_size: u32,
    pub pred_control: u32,
    pub pred_inv: bool,
    pub cond_modifier: u32,
    pub saturate: bool,
    pub mask_control: u32,
    pub cmpt_control: bool,
}

/// Destination operand fields (`unpack_inst_2src_dst` / `_3src_dst`).
#[derive(Debug, Clone, Copy)]
pub struct InstDst {
    pub file: RegFile,
    pub reg_type: RegType,
    pub num: u32,
    pub subnum: u32,
    pub hstride: u32,
}

/// Source operand fields for a register-file source (`unpack_inst_2src_src0/1`).
#[derive(Debug, Clone, Copy)]
pub struct InstSrc {
    pub file: RegFile,
    pub reg_type: RegType,
    pub num: u32,
    pub subnum: u32,
    pub vstride: u32,
    pub width: u32,
    pub hstride: u32,
    pub negate: bool,
    pub abs: bool,
}

/// SEND-specific fields (`unpack_inst_send`).
#[derive(Debug, Clone, Copy)]
pub struct InstSend {
    pub sfid: u32,
    pub function_control: u32,
    pub header_present: bool,
    pub rlen: u32,
    pub mlen: u32,
    pub eot: bool,
}

/// A fully decoded EU instruction: the shared control word plus whichever
/// operand fields the opcode actually uses. Stage front-ends (`stage::*`)
/// match on `common.opcode` and read the operand fields that apply.
#[derive(Debug, Clone, Copy)]
pub struct DecodedInst {
    pub common: InstCommon,
    pub dst: InstDst,
    pub src0: InstSrc,
    pub src1: InstSrc,
    pub send: Option<InstSend>,
    /// Raw bits 96-127 (`unpack_inst_imm`), meaningful only when
    /// `src0.file == RegFile::Immediate`.
    pub imm: u32,
}

/// EU region descriptor: describes how an operand addresses the register
/// file as a 2-D grid of `width`-element rows repeated `exec_size / width`
/// times with row stride `vstride` and per-element stride `hstride`, all in
/// units of `type_size` bytes, rooted at byte `offset`.
///
/// Equality and overlap are exactly the original's `regions_equal` (field
/// comparison) and `regions_overlap` (bounding-box test on
/// `[offset, offset + region_byte_size)`), per `kir.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EuRegion {
    pub offset: u32,
    pub vstride: u32,
    pub width: u32,
    pub hstride: u32,
    pub type_size: u32,
    pub exec_size: u32,
}

impl EuRegion {
    pub fn byte_size(&self) -> u32 {
        (self.exec_size / self.width.max(1)) * self.vstride.max(self.hstride) * self.type_size
    }

    pub fn overlaps(&self, other: &EuRegion) -> bool {
        let a_end = self.offset + self.byte_size();
        let b_end = other.offset + other.byte_size();
        self.offset < b_end && other.offset < a_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v8_region(offset: u32) -> EuRegion {
        EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 }
    }

    #[test]
    fn region_equality_is_reflexive() {
        let r = v8_region(64);
        assert_eq!(r, r);
    }

    #[test]
    fn non_overlapping_regions_do_not_overlap() {
        let a = v8_region(0);
        let b = v8_region(32);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = v8_region(0);
        let b = v8_region(16);
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
        assert!(a.overlaps(&b));
    }
}
