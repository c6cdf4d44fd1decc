//! Decoding of raw 128-bit EU instruction records into `DecodedInst`.
//!
//! Bit ranges are taken verbatim from `eu.h`'s `unpack_inst_common`,
//! `unpack_inst_2src_dst`, `unpack_inst_2src_src0`, `unpack_inst_2src_src1`
//! and `unpack_inst_send`. The original reads these lazily, field by field,
//! from the packed 128-bit record each time a pass needs one; ksim follows
//! `libcorevm::decoder`'s stateless-decoder-over-a-cursor shape instead,
//! producing one fully-populated `DecodedInst` per call so later passes
//! never touch the raw bit layout again.

use crate::error::{KsimError, Result};
use crate::eu::types::*;

/// Bit offset of the compaction-control bit within the first quadword.
const CMPT_CONTROL_BIT: u32 = 29;

pub struct Decoder;

impl Decoder {
    /// Decode one 16-byte EU instruction record.
    ///
    /// Returns `Err(KsimError::CompactedInstruction)` if the record is
    /// compacted (64-bit form): expanding the compaction table from the
    /// hardware's fixed dictionary is out of scope (spec.md Open
    /// Questions) and is reported to the caller rather than silently
    /// misdecoded.
    pub fn decode(bytes: [u8; 16], byte_offset: u64) -> Result<DecodedInst> {
        let inst = EuInst::from_bytes(bytes);
        if inst.bits(CMPT_CONTROL_BIT, CMPT_CONTROL_BIT) != 0 {
            return Err(KsimError::CompactedInstruction(byte_offset));
        }

        let common = unpack_common(&inst);
        let dst = unpack_dst(&inst);
        let src0 = unpack_src0(&inst);
        let src1 = unpack_src1(&inst);
        let send = if common.opcode == BRW_OPCODE_SEND || common.opcode == BRW_OPCODE_SENDC {
            Some(unpack_send(&inst))
        } else {
            None
        };
        // `unpack_inst_imm`: the raw 32-bit immediate field, reinterpreted
        // by `translate` according to src0's hardware register type (UD/D,
        // F, or one of the packed-vector immediate encodings).
        let imm = inst.bits(96, 127);

        Ok(DecodedInst { common, dst, src0, src1, send, imm })
    }
}

pub const BRW_OPCODE_MOV: u32 = 1;
pub const BRW_OPCODE_SEL: u32 = 2;
pub const BRW_OPCODE_NOT: u32 = 4;
pub const BRW_OPCODE_AND: u32 = 5;
pub const BRW_OPCODE_OR: u32 = 6;
pub const BRW_OPCODE_XOR: u32 = 7;
pub const BRW_OPCODE_SHR: u32 = 8;
pub const BRW_OPCODE_SHL: u32 = 9;
pub const BRW_OPCODE_ASR: u32 = 12;
pub const BRW_OPCODE_CMP: u32 = 16;
pub const BRW_OPCODE_SEND: u32 = 49;
pub const BRW_OPCODE_SENDC: u32 = 50;
pub const BRW_OPCODE_MATH: u32 = 56;
pub const BRW_OPCODE_ADD: u32 = 64;
pub const BRW_OPCODE_MUL: u32 = 65;
pub const BRW_OPCODE_AVG: u32 = 66;
pub const BRW_OPCODE_FRC: u32 = 67;
pub const BRW_OPCODE_RNDU: u32 = 68;
pub const BRW_OPCODE_RNDD: u32 = 69;
pub const BRW_OPCODE_RNDE: u32 = 70;
pub const BRW_OPCODE_RNDZ: u32 = 71;
pub const BRW_OPCODE_MAC: u32 = 72;
pub const BRW_OPCODE_DP4: u32 = 84;
pub const BRW_OPCODE_DP3: u32 = 86;
pub const BRW_OPCODE_DP2: u32 = 87;
pub const BRW_OPCODE_MAD: u32 = 91;
pub const BRW_OPCODE_NOP: u32 = 126;

/// Architecture-register-file sub-register selecting the null register
/// (`BRW_ARF_NULL`), the one ARF case `translate` handles.
pub const BRW_ARF_NULL: u32 = 0x00;

/// `enum brw_math_function`. Gen9 reuses the `cond_modifier` bit field to
/// carry this selector on `BRW_OPCODE_MATH` instructions, since MATH never
/// has a condition code of its own.
pub const BRW_MATH_FUNCTION_INV: u32 = 1;
pub const BRW_MATH_FUNCTION_LOG: u32 = 2;
pub const BRW_MATH_FUNCTION_EXP: u32 = 3;
pub const BRW_MATH_FUNCTION_SQRT: u32 = 4;
pub const BRW_MATH_FUNCTION_RSQ: u32 = 5;
pub const BRW_MATH_FUNCTION_SIN: u32 = 6;
pub const BRW_MATH_FUNCTION_COS: u32 = 7;
pub const BRW_MATH_FUNCTION_SINCOS: u32 = 8;
pub const BRW_MATH_FUNCTION_FDIV: u32 = 9;
pub const BRW_MATH_FUNCTION_POW: u32 = 10;
pub const BRW_MATH_FUNCTION_INT_DIV_QUOTIENT_AND_REMAINDER: u32 = 11;
pub const BRW_MATH_FUNCTION_INT_DIV_QUOTIENT: u32 = 12;
pub const BRW_MATH_FUNCTION_INT_DIV_REMAINDER: u32 = 13;
pub const GEN8_MATH_FUNCTION_INVM: u32 = 14;
pub const GEN8_MATH_FUNCTION_RSQRTM: u32 = 15;

/// `enum brw_conditional_mod`.
pub const BRW_CONDITIONAL_NONE: u32 = 0;
pub const BRW_CONDITIONAL_Z: u32 = 1;
pub const BRW_CONDITIONAL_NZ: u32 = 2;
pub const BRW_CONDITIONAL_G: u32 = 3;
pub const BRW_CONDITIONAL_GE: u32 = 4;
pub const BRW_CONDITIONAL_L: u32 = 5;
pub const BRW_CONDITIONAL_LE: u32 = 6;
pub const BRW_CONDITIONAL_R: u32 = 7;
pub const BRW_CONDITIONAL_O: u32 = 8;
pub const BRW_CONDITIONAL_U: u32 = 9;

/// SFID field value for the compute-thread-termination special case
/// (`send.sfid == BRW_SFID_THREAD_SPAWNER` with no real message function).
pub const BRW_SFID_THREAD_SPAWNER: u32 = 7;

fn unpack_common(inst: &EuInst) -> InstCommon {
    InstCommon {
        opcode: inst.bits(0, 6),
        access_mode: inst.bits(8, 8),
        exec_size: inst.bits(21, 23),
        pred_control: inst.bits(16, 19),
        pred_inv: inst.bits(20, 20) != 0,
        cond_modifier: inst.bits(24, 27),
        saturate: inst.bits(31, 31) != 0,
        mask_control: inst.bits(34, 34),
        cmpt_control: inst.bits(29, 29) != 0,
    }
}

fn unpack_dst(inst: &EuInst) -> InstDst {
    let file = RegFile::from_bits(inst.bits(35, 36));
    let hstride_exp = inst.bits(61, 63);
    InstDst {
        file,
        reg_type: RegType::from_bits(inst.bits(37, 40)),
        num: inst.bits(53, 60),
        subnum: inst.bits(48, 52),
        hstride: if hstride_exp == 0 { 0 } else { 1 << (hstride_exp - 1) },
    }
}

fn unpack_src0(inst: &EuInst) -> InstSrc {
    let file = RegFile::from_bits(inst.bits(41, 42));
    let vstride_exp = inst.bits(85, 88);
    let width_exp = inst.bits(82, 84);
    let hstride_exp = inst.bits(80, 81);
    InstSrc {
        file,
        reg_type: RegType::from_bits(inst.bits(43, 46)),
        num: inst.bits(69, 76),
        subnum: inst.bits(64, 68),
        vstride: if vstride_exp == 0 { 0 } else { 1 << (vstride_exp - 1) },
        width: 1 << width_exp,
        hstride: if hstride_exp == 0 { 0 } else { 1 << (hstride_exp - 1) },
        negate: inst.bits(78, 78) != 0,
        abs: inst.bits(77, 77) != 0,
    }
}

fn unpack_src1(inst: &EuInst) -> InstSrc {
    let file = RegFile::from_bits(inst.bits(89, 90));
    let hstride_exp = inst.bits(112, 113);
    let width_exp = inst.bits(114, 116);
    let vstride_exp = inst.bits(117, 120);
    InstSrc {
        file,
        reg_type: RegType::from_bits(inst.bits(91, 94)),
        num: inst.bits(101, 108),
        subnum: inst.bits(96, 100),
        vstride: if vstride_exp == 0 { 0 } else { 1 << (vstride_exp - 1) },
        width: 1 << width_exp,
        hstride: if hstride_exp == 0 { 0 } else { 1 << (hstride_exp - 1) },
        negate: inst.bits(110, 110) != 0,
        abs: inst.bits(109, 109) != 0,
    }
}

fn unpack_send(inst: &EuInst) -> InstSend {
    InstSend {
        sfid: inst.bits(24, 27),
        function_control: inst.bits(96, 127),
        header_present: inst.bits(115, 115) != 0,
        rlen: inst.bits(116, 120),
        mlen: inst.bits(121, 124),
        eot: inst.bits(127, 127) != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_compacted_instructions() {
        let mut bytes = [0u8; 16];
        bytes[3] |= 1 << 5; // bit 29 of qw[0]
        let err = Decoder::decode(bytes, 0).unwrap_err();
        assert!(matches!(err, KsimError::CompactedInstruction(0)));
    }

    #[test]
    fn decodes_mov_opcode() {
        let mut bytes = [0u8; 16];
        bytes[0] = BRW_OPCODE_MOV as u8;
        let inst = Decoder::decode(bytes, 0).unwrap();
        assert_eq!(inst.common.opcode, BRW_OPCODE_MOV);
        assert!(inst.send.is_none());
    }

    fn set_bits(packed: &mut u128, start: u32, end: u32, value: u32) {
        let mask: u128 = !0u128 >> (127 - (end - start));
        *packed &= !(mask << start);
        *packed |= (value as u128 & mask) << start;
    }

    /// `add(8) g3<1>f g1<8,8,1>f g2<8,8,1>f` with `-abs(g2)` on src1: a real
    /// two-vector-operand instruction, not the scalar-broadcast/hand-built
    /// `DecodedInst`s every other test in the crate constructs directly.
    /// Exercises `unpack_src1` against raw packed bits end to end, the one
    /// path those hand-built tests never touch.
    #[test]
    fn decodes_genuine_two_vector_operand_src1_region_and_modifiers() {
        let mut packed: u128 = 0;
        set_bits(&mut packed, 0, 6, BRW_OPCODE_ADD);
        set_bits(&mut packed, 89, 90, 1); // src1 file: General
        set_bits(&mut packed, 91, 94, 7); // src1 type: F
        set_bits(&mut packed, 96, 100, 0); // src1 subnum
        set_bits(&mut packed, 101, 108, 2); // src1 num: g2
        set_bits(&mut packed, 109, 109, 1); // abs
        set_bits(&mut packed, 110, 110, 1); // negate
        set_bits(&mut packed, 112, 113, 1); // hstride_exp -> hstride 1
        set_bits(&mut packed, 114, 116, 3); // width_exp -> width 8
        set_bits(&mut packed, 117, 120, 4); // vstride_exp -> vstride 8

        let bytes = packed.to_le_bytes();
        let inst = Decoder::decode(bytes, 0).unwrap();

        assert_eq!(inst.src1.file, RegFile::General);
        assert_eq!(inst.src1.reg_type, RegType::F);
        assert_eq!(inst.src1.num, 2);
        assert_eq!(inst.src1.vstride, 8, "src1 must carry a real vector stride, not a scalar broadcast");
        assert_eq!(inst.src1.width, 8);
        assert_eq!(inst.src1.hstride, 1);
        assert!(inst.src1.abs);
        assert!(inst.src1.negate);
    }
}
