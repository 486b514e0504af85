//! The decoded operation tagged sum: a Rust enum whose variants each carry only the fields that
//! matter for that family, so every translator in [`crate::translate`] is a total function over
//! the tag instead of reaching into a shared union.

use crate::state::Condition;

/// The barrel-shifter kind applied to a register operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => ShiftKind::Lsl,
            0b01 => ShiftKind::Lsr,
            0b10 => ShiftKind::Asr,
            _ => ShiftKind::Ror,
        }
    }
}

/// The right-hand operand of a two-operand ALU/compare form: either a shifted register or an
/// immediate with its own (left) shift.
#[derive(Clone, Copy, Debug)]
pub enum RhsOperand {
    Register { reg: u8, shift: ShiftKind, amount: u8 },
    Immediate { value: u64, shift_left_12: bool },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AluKind {
    Add,
    Sub,
    And,
    Orr,
    Eor,
    Bic,
    Orn,
    Eon,
}

#[derive(Clone, Copy, Debug)]
pub struct AluOp {
    pub kind: AluKind,
    pub rd: u8,
    pub rn: u8,
    pub rhs: RhsOperand,
    pub set_flags: bool,
    pub is_64bit: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareKind {
    /// `CMP`, i.e. `SUBS` with a discarded destination.
    Cmp,
    /// `CMN`, i.e. `ADDS` with a discarded destination.
    Cmn,
    /// `TST`, i.e. `ANDS` with a discarded destination.
    Tst,
}

#[derive(Clone, Copy, Debug)]
pub struct CompareOp {
    pub kind: CompareKind,
    pub rn: u8,
    pub rhs: RhsOperand,
    pub is_64bit: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MoveWideKind {
    Movz,
    Movk,
    Movn,
}

#[derive(Clone, Copy, Debug)]
pub struct MoveWideOp {
    pub kind: MoveWideKind,
    pub rd: u8,
    pub imm16: u16,
    /// 0, 16, 32 or 48.
    pub shift: u8,
    pub is_64bit: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum AddrMode {
    /// `[Xn, #imm]`, scaled or unscaled — both forms share this same displacement path.
    BaseOffset { offset: i64 },
    /// `[Xn, Xm{, extend}]`.
    BaseRegister { rm: u8 },
    /// `[Xn, #imm]!` — base is written back with `base + imm` before the access.
    PreIndex { offset: i64 },
    /// `[Xn], #imm` — base is written back with `base + imm` after the access.
    PostIndex { offset: i64 },
}

#[derive(Clone, Copy, Debug)]
pub struct MemOp {
    pub rt: u8,
    /// Second register for `LDP`/`STP`.
    pub rt2: Option<u8>,
    pub rn: u8,
    pub addr: AddrMode,
    /// Access size in bytes: 1, 2, 4 or 8.
    pub size: u8,
    pub sign_extend: bool,
    /// Destination is 64-bit wide (affects zero/sign-extension of sub-64-bit loads).
    pub is_64bit: bool,
    /// `LDXR`/`STXR` and acquire/release forms.
    pub exclusive: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum BranchOp {
    B { byte_offset: i64 },
    Bl { byte_offset: i64 },
    Br { rn: u8 },
    Blr { rn: u8 },
    Ret { rn: u8 },
    BCond { cond: Condition, byte_offset: i64 },
    Cbz { rt: u8, byte_offset: i64, is_64bit: bool },
    Cbnz { rt: u8, byte_offset: i64, is_64bit: bool },
    Tbz { rt: u8, bit: u8, byte_offset: i64 },
    Tbnz { rt: u8, bit: u8, byte_offset: i64 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CondSelectKind {
    Csel,
    Csinc,
    Csinv,
    Csneg,
}

#[derive(Clone, Copy, Debug)]
pub struct CondSelectOp {
    pub kind: CondSelectKind,
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub cond: Condition,
    pub is_64bit: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitfieldKind {
    Sbfm,
    Bfm,
    Ubfm,
    /// The `EXTR`/`ROR` alias (`Rm == Rn`): a plain rotate-right by `immr`, with no field
    /// extraction or zero/sign masking. `imms` is unused for this kind.
    Ror,
}

#[derive(Clone, Copy, Debug)]
pub struct BitfieldOp {
    pub kind: BitfieldKind,
    pub rd: u8,
    pub rn: u8,
    pub immr: u8,
    pub imms: u8,
    pub is_64bit: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum SystemOp {
    Svc { imm16: u16 },
    Hvc { imm16: u16 },
    Smc { imm16: u16 },
    Brk { imm16: u16 },
    Hlt { imm16: u16 },
    Udf { imm16: u16 },
    Dmb,
    Dsb,
    Isb,
    DcZva { rt: u8 },
    DcCvac { rt: u8 },
    DcCivac { rt: u8 },
    IcIvau { rt: u8 },
    Tlbi,
    Wfe,
    Wfi,
    Yield,
    Nop,
    Sev,
    Sevl,
    MrsCntvct { rt: u8 },
    MrsCntfrq { rt: u8 },
    MrsTpidrEl0 { rt: u8 },
    MsrTpidrEl0 { rt: u8 },
    MrsFpcr { rt: u8 },
    MsrFpcr { rt: u8 },
    MrsFpsr { rt: u8 },
    MsrFpsr { rt: u8 },
    /// Any other, unrecognized `MRS`/`MSR` system register access.
    MrsMsrOther,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FpArithKind {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug)]
pub enum FpScalarOp {
    Arith { kind: FpArithKind, rd: u8, rn: u8, rm: u8, is_double: bool },
    Sqrt { rd: u8, rn: u8, is_double: bool },
    Abs { rd: u8, rn: u8, is_double: bool },
    Neg { rd: u8, rn: u8, is_double: bool },
    Cvt { rd: u8, rn: u8, to_double: bool },
    Cmp { rn: u8, rm: u8, is_double: bool, signal_nans: bool },
    Csel { rd: u8, rn: u8, rm: u8, cond: Condition, is_double: bool },
    Mov { rd: u8, rn: u8, is_double: bool },
    Recpe { rd: u8, rn: u8, is_double: bool },
    Rsqrte { rd: u8, rn: u8, is_double: bool },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdArithKind {
    Add,
    Sub,
    Mul,
    SignedSatAdd,
    SignedSatSub,
    UnsignedSatAdd,
    UnsignedSatSub,
    SignedDoublingMulHigh,
    SignedMax,
    SignedMin,
    UnsignedMax,
    UnsignedMin,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdLogicKind {
    And,
    Orr,
    Eor,
    Bic,
    Orn,
    Not,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdCompareKind {
    Eq,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdShiftKind {
    Shl,
    Ushr,
    Sshr,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimdReduceKind {
    AddAcross,
    SignedMaxAcross,
    SignedMinAcross,
    UnsignedMaxAcross,
    UnsignedMinAcross,
}

#[derive(Clone, Copy, Debug)]
pub enum SimdOp {
    Arith { kind: SimdArithKind, rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    Logic { kind: SimdLogicKind, rd: u8, rn: u8, rm: u8, is_128: bool },
    Compare { kind: SimdCompareKind, rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    ShiftImm { kind: SimdShiftKind, rd: u8, rn: u8, amount: u8, elem_width: u8, is_128: bool },
    Abs { rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Neg { rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Clz { rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Cls { rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Rbit { rd: u8, rn: u8, is_128: bool },
    Tbl { rd: u8, rn: u8, rm: u8, is_128: bool },
    Zip1 { rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    Zip2 { rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    Uzp1 { rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    Trn1 { rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool },
    Reduce { kind: SimdReduceKind, rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Dup { rd: u8, rn: u8, elem_width: u8, is_128: bool },
    Mov { rd: u8, rn: u8, is_128: bool },
}

#[derive(Clone, Copy, Debug)]
pub enum CryptoOp {
    Aese { rd: u8, rn: u8 },
    Aesd { rd: u8, rn: u8 },
    Aesmc { rd: u8, rn: u8 },
    Aesimc { rd: u8, rn: u8 },
    Pmull { rd: u8, rn: u8, rm: u8, high: bool },
    Crc32 { rd: u8, rn: u8, rm: u8, size: u8, castagnoli: bool },
}

/// The decoded operation: the tagged sum produced by [`super::classify`] and consumed by every
/// translator family in [`crate::translate`].
///
/// `Unknown` carries no further operand constraints; every other variant is fully populated.
/// Translators are total over the non-`Unknown` variants.
#[derive(Clone, Copy, Debug)]
pub enum Operation {
    Alu(AluOp),
    Compare(CompareOp),
    MoveWide(MoveWideOp),
    Load(MemOp),
    Store(MemOp),
    Branch(BranchOp),
    ConditionalSelect(CondSelectOp),
    Bitfield(BitfieldOp),
    System(SystemOp),
    FpScalar(FpScalarOp),
    Simd(SimdOp),
    Crypto(CryptoOp),
    /// The guest word did not match any classification rule. Carries the raw word for
    /// diagnostics; the translator responds by emitting a NOP and continuing, recording one
    /// counter tick, without surfacing an error.
    Unknown(u32),
}

impl Operation {
    /// Returns `true` for the operations after which block discovery must stop: unconditional `B`,
    /// `BR`/`BLR`/`RET`, and `SVC`/`HVC`/`SMC`/`HLT`/`BRK`/`UDF`. `BL` is included too — control
    /// genuinely leaves this instruction stream at the call target, the same as plain `B`, it just
    /// also records a return address. Conditional and compare-and-branch forms are intentionally
    /// excluded.
    pub fn is_terminator(&self) -> bool {
        match self {
            Operation::Branch(BranchOp::B { .. })
            | Operation::Branch(BranchOp::Bl { .. })
            | Operation::Branch(BranchOp::Br { .. })
            | Operation::Branch(BranchOp::Blr { .. })
            | Operation::Branch(BranchOp::Ret { .. }) => true,
            Operation::System(SystemOp::Svc { .. })
            | Operation::System(SystemOp::Hvc { .. })
            | Operation::System(SystemOp::Smc { .. })
            | Operation::System(SystemOp::Hlt { .. })
            | Operation::System(SystemOp::Brk { .. })
            | Operation::System(SystemOp::Udf { .. }) => true,
            _ => false,
        }
    }
}
