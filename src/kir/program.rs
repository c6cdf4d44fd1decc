//! KIR: the shader compiler's typed SSA-without-phis intermediate
//! representation.
//!
//! Shaped directly on the original's `struct kir_program` / `struct
//! kir_insn` (`kir.h`): a flat `Vec` of instructions (the original's
//! doubly-linked `struct list`) over an unbounded virtual register space,
//! each instruction a tagged union of operand kinds. Rust expresses the
//! union as an `enum` with per-opcode payloads instead of C's single
//! `union` field reused across opcodes — `libgl::compiler::ir::Inst`
//! (`compiler/ir.rs`) is the teacher's version of the same idea, generalized
//! here from GLSL operations to Gen9 EU semantics.
//!
//! No control flow (IF/ELSE/ENDIF/WHILE/BREAK) is represented: per spec.md
//! Non-goals, straight-line SIMD8 programs only. `kir_eot` terminates a
//! program the way the original's `kir_eot` does.

use crate::eu::EuRegion;

/// A KIR virtual register. Assigned densely from 0 by `KirProgram::alloc_reg`;
/// never reused until register allocation rewrites them to AVX2 register
/// numbers (0-15) or spill-slot references (16+) in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KirReg(pub u32);

/// KIR opcodes.
///
/// This is the full opcode set from the original's `enum kir_opcode`,
/// including `kir_mov`, the integer-division family
/// (`kir_int_div_q_and_r`/`_q`/`_r`), and the Gen8 math-machine helpers
/// (`kir_int_invm`/`kir_int_rsqrtm`) that spec.md's distilled opcode list
/// dropped. These are supplemented here because spec.md's Non-goal is
/// "most math-box functions", not *all* of them, and the original's
/// `thread.c` math-function dispatch table implements exactly this set —
/// see DESIGN.md for the Open Question this resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Comment,

    LoadRegion,
    StoreRegionMask,
    StoreRegion,
    Gather,

    Immd,
    Immw,
    Immv,
    Immvf,

    Send,
    ConstSend,
    Call,
    ConstCall,

    // ALU unops
    Mov,
    Zxwd,
    Sxwd,
    Ps2d,
    D2ps,
    Absd,
    Rcp,
    Sqrt,
    Rsqrt,
    Rndu,
    Rndd,
    Rnde,
    Rndz,
    Shri,
    Shli,

    // ALU binops
    And,
    Andn,
    Or,
    Xor,
    Shr,
    Shl,
    Asr,

    Maxd,
    Maxw,
    Maxf,
    Mind,
    Minw,
    Minf,

    Divf,
    IntDivQAndR,
    IntDivQ,
    IntDivR,
    IntInvm,
    IntRsqrtm,

    Addd,
    Addw,
    Addf,

    Subd,
    Subw,
    Subf,

    Muld,
    Mulw,
    Mulf,

    Avg,

    Cmp,

    // ALU triops
    Nmaddf,
    Maddf,
    Blend,

    Eot,
}

impl Opcode {
    /// ALU ops needing two source operands (binops and cmp).
    pub fn is_binop(self) -> bool {
        matches!(
            self,
            Opcode::And
                | Opcode::Andn
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shr
                | Opcode::Shl
                | Opcode::Asr
                | Opcode::Maxd
                | Opcode::Maxw
                | Opcode::Maxf
                | Opcode::Mind
                | Opcode::Minw
                | Opcode::Minf
                | Opcode::Divf
                | Opcode::IntDivQAndR
                | Opcode::IntDivQ
                | Opcode::IntDivR
                | Opcode::Addd
                | Opcode::Addw
                | Opcode::Addf
                | Opcode::Subd
                | Opcode::Subw
                | Opcode::Subf
                | Opcode::Muld
                | Opcode::Mulw
                | Opcode::Mulf
                | Opcode::Avg
                | Opcode::Cmp
        )
    }

    /// ALU ops needing a single source operand.
    pub fn is_unop(self) -> bool {
        matches!(
            self,
            Opcode::Mov
                | Opcode::Zxwd
                | Opcode::Sxwd
                | Opcode::Ps2d
                | Opcode::D2ps
                | Opcode::Absd
                | Opcode::Rcp
                | Opcode::Sqrt
                | Opcode::Rsqrt
                | Opcode::Rndu
                | Opcode::Rndd
                | Opcode::Rnde
                | Opcode::Rndz
                | Opcode::Shri
                | Opcode::Shli
                | Opcode::IntInvm
                | Opcode::IntRsqrtm
        )
    }

    /// ALU ops needing three source operands (FMA family and blend).
    pub fn is_triop(self) -> bool {
        matches!(self, Opcode::Nmaddf | Opcode::Maddf | Opcode::Blend)
    }

    /// FMA-family ops whose destination the register allocator must alias
    /// to `src0` rather than allocate freshly (spec.md's FMA-destination-
    /// aliasing design note; `kir.c::kir_program_allocate_registers`'s
    /// special case for `kir_maddf`/`kir_nmaddf`).
    pub fn dst_aliases_src0(self) -> bool {
        matches!(self, Opcode::Maddf | Opcode::Nmaddf)
    }

    /// True for instructions that never produce a destination register
    /// (stores, sends with no return value, eot, comments).
    pub fn has_no_dst(self) -> bool {
        matches!(
            self,
            Opcode::Comment | Opcode::StoreRegion | Opcode::StoreRegionMask | Opcode::Eot
        )
    }
}

/// Transfer instruction payload: `load_region`/`store_region[_mask]`.
#[derive(Debug, Clone, Copy)]
pub struct XferData {
    pub region: EuRegion,
    pub src: KirReg,
    pub mask: KirReg,
}

/// ALU instruction payload. `src1`/`src2` may instead be read as immediates
/// via `imm1`/`imm2` for shift-by-immediate forms (`kir_shri`/`kir_shli`)
/// and `kir_cmp`'s comparison-op immediate, matching the original's nested
/// union.
#[derive(Debug, Clone, Copy)]
pub struct AluData {
    pub src0: KirReg,
    pub src1: KirReg,
    pub src2: KirReg,
    pub imm1: u32,
    pub imm2: u32,
}

/// Gather instruction payload: indexed load from a host-memory base.
#[derive(Debug, Clone, Copy)]
pub struct GatherData {
    pub base: u64,
    pub offset: KirReg,
    pub mask: KirReg,
    pub scale: u32,
    pub base_offset: u32,
}

/// Immediate instruction payload.
#[derive(Debug, Clone, Copy)]
pub struct ImmData {
    pub d: i32,
    pub v: [i16; 8],
    pub vf: [f32; 4],
}

/// Send/call instruction payload: a native function invoked with operands
/// read out of the EU register file (`send`) or following the C calling
/// convention (`call`), mirroring `kir_insn.send`/`kir_insn.call`.
///
/// `args` is a host pointer to the fixed argument block the `sfid` lowering
/// built for this message (surface/sampler state, strides, and the like) —
/// the same role as the original's `insn->send.args`, loaded into `rsi`
/// right before the jump/call into `func`. `src`/`mlen`/`dst`/`rlen` name
/// the GRF window the message payload/response live in.
#[derive(Debug, Clone, Copy)]
pub struct SendData {
    pub src: u32,
    pub mlen: u32,
    pub dst: u32,
    pub rlen: u32,
    pub func: usize,
    pub args: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CallData {
    pub func: usize,
    pub src0: KirReg,
    pub src1: KirReg,
    pub args: u32,
}

/// Operand/payload data for a `KirInst`, keyed by its `Opcode`.
#[derive(Debug, Clone, Copy)]
pub enum Payload {
    None,
    Xfer(XferData),
    Alu(AluData),
    Gather(GatherData),
    Imm(ImmData),
    Send(SendData),
    Call(CallData),
}

#[derive(Debug, Clone, Copy)]
pub struct KirInst {
    pub opcode: Opcode,
    pub dst: KirReg,
    pub payload: Payload,
}

/// A straight-line KIR program for one shader invocation.
pub struct KirProgram {
    pub insns: Vec<KirInst>,
    next_reg: u32,
    pub binding_table_address: u64,
    pub sampler_state_address: u64,
}

impl KirProgram {
    pub fn new(binding_table_address: u64, sampler_state_address: u64) -> KirProgram {
        KirProgram {
            insns: Vec::new(),
            next_reg: 0,
            binding_table_address,
            sampler_state_address,
        }
    }

    pub fn alloc_reg(&mut self) -> KirReg {
        let r = KirReg(self.next_reg);
        self.next_reg += 1;
        r
    }

    pub fn num_regs(&self) -> u32 {
        self.next_reg
    }

    /// Every instruction gets a fresh `dst` register number, even ones that
    /// never produce a value (stores, `eot`, comments): the original's
    /// liveness pass and DCE both rely on `dst.n` doubling as a dense,
    /// monotonically increasing instruction index (`kir.c`'s `range[]`
    /// table is indexed by register number, not instruction position,
    /// because the two coincide 1:1). `Opcode::has_no_dst` instead governs
    /// whether register allocation binds an AVX register to this `dst`.
    fn push(&mut self, opcode: Opcode, payload: Payload) -> KirReg {
        let dst = self.alloc_reg();
        self.insns.push(KirInst { opcode, dst, payload });
        dst
    }

    pub fn immd(&mut self, d: i32) -> KirReg {
        self.push(Opcode::Immd, Payload::Imm(ImmData { d, v: [0; 8], vf: [0.0; 4] }))
    }

    pub fn immf(&mut self, f: f32) -> KirReg {
        self.immd(f.to_bits() as i32)
    }

    pub fn load_region(&mut self, region: EuRegion) -> KirReg {
        self.push(
            Opcode::LoadRegion,
            Payload::Xfer(XferData { region, src: KirReg(0), mask: KirReg(0) }),
        )
    }

    pub fn store_region(&mut self, region: EuRegion, src: KirReg) {
        self.push(
            Opcode::StoreRegion,
            Payload::Xfer(XferData { region, src, mask: KirReg(0) }),
        );
    }

    pub fn store_region_mask(&mut self, region: EuRegion, src: KirReg, mask: KirReg) {
        self.push(Opcode::StoreRegionMask, Payload::Xfer(XferData { region, src, mask }));
    }

    pub fn alu_unop(&mut self, opcode: Opcode, src0: KirReg) -> KirReg {
        debug_assert!(opcode.is_unop());
        self.push(
            opcode,
            Payload::Alu(AluData { src0, src1: KirReg(0), src2: KirReg(0), imm1: 0, imm2: 0 }),
        )
    }

    pub fn alu_binop(&mut self, opcode: Opcode, src0: KirReg, src1: KirReg) -> KirReg {
        debug_assert!(opcode.is_binop());
        self.push(
            opcode,
            Payload::Alu(AluData { src0, src1, src2: KirReg(0), imm1: 0, imm2: 0 }),
        )
    }

    pub fn alu_triop(&mut self, opcode: Opcode, src0: KirReg, src1: KirReg, src2: KirReg) -> KirReg {
        debug_assert!(opcode.is_triop());
        self.push(opcode, Payload::Alu(AluData { src0, src1, src2, imm1: 0, imm2: 0 }))
    }

    /// `kir_shri`/`kir_shli`: shift `src0` by the immediate `amount`, logical
    /// (not arithmetic) in both directions — `asm::codegen` lowers both to
    /// `vpsrld`/`vpslld`. Callers relying on this to sign-extend a narrower
    /// value (as the original's index-buffer fetch does for `INDEX_BYTE`/
    /// `INDEX_WORD`) get zero-extension instead; see `stage::vertex_fetch`.
    pub fn shift_imm(&mut self, opcode: Opcode, src0: KirReg, amount: u32) -> KirReg {
        debug_assert!(matches!(opcode, Opcode::Shri | Opcode::Shli));
        self.push(
            opcode,
            Payload::Alu(AluData { src0, src1: KirReg(0), src2: KirReg(0), imm1: amount, imm2: 0 }),
        )
    }

    /// `kir_cmp`: compare `src0` against `src1` with the `vcmpps` predicate
    /// `pred` (e.g. `_CMP_LT_OS`/`_CMP_GT_OS`), producing an all-ones/all-
    /// zeros lane mask.
    pub fn cmp(&mut self, pred: u8, src0: KirReg, src1: KirReg) -> KirReg {
        self.push(
            Opcode::Cmp,
            Payload::Alu(AluData { src0, src1, src2: KirReg(0), imm1: 0, imm2: pred as u32 }),
        )
    }

    pub fn gather(&mut self, base: u64, offset: KirReg, mask: KirReg, scale: u32, base_offset: u32) -> KirReg {
        self.push(
            Opcode::Gather,
            Payload::Gather(GatherData { base, offset, mask, scale, base_offset }),
        )
    }

    pub fn const_call(&mut self, func: usize, args: u32, src0: KirReg, src1: KirReg) -> KirReg {
        self.push(Opcode::ConstCall, Payload::Call(CallData { func, src0, src1, args }))
    }

    pub fn call(&mut self, func: usize, args: u32, src0: KirReg, src1: KirReg) -> KirReg {
        self.push(Opcode::Call, Payload::Call(CallData { func, src0, src1, args }))
    }

    /// A `send` message: `src`/`mlen` name the EU-register window read as
    /// the message payload, `dst`/`rlen` the window the response is
    /// written to, `args` a host pointer to the fixed argument block `sfid`
    /// built for this message. `has_side_effects` selects `kir_send`
    /// (always considered live, e.g. render cache writes) vs
    /// `kir_const_send` (dead-code eligible, e.g. sampler/constant-cache
    /// reads).
    pub fn send(
        &mut self,
        func: usize,
        args: usize,
        src: u32,
        mlen: u32,
        dst: u32,
        rlen: u32,
        has_side_effects: bool,
    ) -> KirReg {
        let opcode = if has_side_effects { Opcode::Send } else { Opcode::ConstSend };
        self.push(opcode, Payload::Send(SendData { src, mlen, dst, rlen, func, args }))
    }

    pub fn eot(&mut self) {
        self.push(Opcode::Eot, Payload::None);
    }

    /// A no-op marker instruction carrying only a debug label; emitted
    /// liberally by the stage front-ends the way the original's
    /// `kir_program_comment` threads a breadcrumb trail through the
    /// generated program for `TRACE_ASM` dumps. Dropped by codegen.
    pub fn comment(&mut self, text: impl AsRef<str>) {
        log::trace!("{}", text.as_ref());
        self.push(Opcode::Comment, Payload::None);
    }

    /// Loads a contiguous 8-lane `f32` uniform/attribute value (one GRF's
    /// worth), exactly the original's `kir_program_load_v8`.
    pub fn load_v8(&mut self, offset: u32) -> KirReg {
        self.load_region(EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 })
    }

    /// Stores a contiguous 8-lane `f32` value, the original's
    /// `kir_program_store_v8`.
    pub fn store_v8(&mut self, offset: u32, src: KirReg) {
        self.store_region(
            EuRegion { offset, type_size: 4, exec_size: 8, vstride: 8, width: 8, hstride: 1 },
            src,
        );
    }

    /// Loads a single scalar uniform, broadcast across 8 lanes at use time;
    /// the original's `kir_program_load_uniform`.
    pub fn load_uniform(&mut self, offset: u32) -> KirReg {
        self.load_region(EuRegion { offset, type_size: 4, exec_size: 1, vstride: 0, width: 1, hstride: 0 })
    }
}
