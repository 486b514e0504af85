//! Integer ALU and compare translation.

use crate::buffer::CodeBuffer;
use crate::decode::op::{AluKind, AluOp, CompareKind, CompareOp, RhsOperand, ShiftKind};
use crate::emit::regs::GpReg;
use crate::emit::{self, ArithOp, ShiftOp, X86Cond};

use super::regmap::{self, SCRATCH_0, SCRATCH_1, SCRATCH_2, SCRATCH_3, SCRATCH_4, SCRATCH_5};

/// Materializes an `RhsOperand` into `dst`: a (possibly shifted) register, or a (possibly
/// left-shifted-by-12) immediate.
fn resolve_rhs(buf: &mut CodeBuffer, rhs: RhsOperand, dst: GpReg, is_64bit: bool) {
    match rhs {
        RhsOperand::Register { reg, shift, amount } => {
            regmap::load_gpr_or_zero(buf, dst, reg, is_64bit);
            if amount != 0 {
                let op = match shift {
                    ShiftKind::Lsl => ShiftOp::Shl,
                    ShiftKind::Lsr => ShiftOp::Shr,
                    ShiftKind::Asr => ShiftOp::Sar,
                    ShiftKind::Ror => ShiftOp::Ror,
                };
                emit::shift_reg_imm8(buf, op, dst, amount, is_64bit);
            }
        }
        RhsOperand::Immediate { value, shift_left_12 } => {
            let value = if shift_left_12 { value << 12 } else { value };
            if is_64bit {
                emit::mov_reg_imm64(buf, dst, value);
            } else {
                emit::mov_reg_imm32(buf, dst, value as u32, false);
            }
        }
    }
}

/// Zeroes the four NZCV capture registers. Must run strictly before the flag-producing
/// arithmetic instruction, since the zeroing itself touches flags we don't care about yet.
fn zero_capture_regs(buf: &mut CodeBuffer) {
    emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_2, SCRATCH_2, true);
    emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_3, SCRATCH_3, true);
    emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_4, SCRATCH_4, true);
    emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_5, SCRATCH_5, true);
}

/// Captures N/Z/C/V from the host flags left by the immediately preceding arithmetic instruction
/// and stores the assembled PSTATE word. `is_subtraction` selects which sense of the host carry
/// flag corresponds to AArch64 `C`: a subtraction's carry-out is the logical complement of x86's
/// borrow flag, while an addition's carry-out matches x86's `CF` directly (this is also why
/// [`X86Cond::from_aarch64`] maps `HS`/`LO` straight onto `AE`/`B` — both architectures agree on the
/// *sense* of carry after a subtract, it's only the raw `CF` bit that's inverted relative to it).
fn store_captured_nzcv(buf: &mut CodeBuffer, is_subtraction: bool) {
    emit::setcc_reg(buf, X86Cond::Js, SCRATCH_2); // N
    emit::setcc_reg(buf, X86Cond::Je, SCRATCH_3); // Z
    let c_cond = if is_subtraction { X86Cond::Jae } else { X86Cond::Jb };
    emit::setcc_reg(buf, c_cond, SCRATCH_4); // C
    emit::setcc_reg(buf, X86Cond::Jo, SCRATCH_5); // V

    emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_2, 31, true);
    emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_3, 30, true);
    emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_4, 29, true);
    emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_5, 28, true);

    emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_2, SCRATCH_3, true);
    emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_2, SCRATCH_4, true);
    emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_2, SCRATCH_5, true);

    emit::store_reg_mem(buf, SCRATCH_2, regmap::STATE_BASE, regmap::pstate_offset(), 4);
}

pub fn translate_alu(buf: &mut CodeBuffer, op: AluOp) {
    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rn, op.is_64bit);
    resolve_rhs(buf, op.rhs, SCRATCH_1, op.is_64bit);

    let invert_rhs = matches!(op.kind, AluKind::Bic | AluKind::Orn | AluKind::Eon);
    if invert_rhs {
        emit::not_reg(buf, SCRATCH_1, op.is_64bit);
    }

    if op.set_flags {
        zero_capture_regs(buf);
    }

    let arith = match op.kind {
        AluKind::Add => ArithOp::Add,
        AluKind::Sub => ArithOp::Sub,
        AluKind::And | AluKind::Bic => ArithOp::And,
        AluKind::Orr | AluKind::Orn => ArithOp::Or,
        AluKind::Eor | AluKind::Eon => ArithOp::Xor,
    };
    emit::arith_reg_reg(buf, arith, SCRATCH_0, SCRATCH_1, op.is_64bit);

    if op.set_flags {
        store_captured_nzcv(buf, op.kind == AluKind::Sub);
    }

    regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
}

pub fn translate_compare(buf: &mut CodeBuffer, op: CompareOp) {
    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rn, op.is_64bit);
    resolve_rhs(buf, op.rhs, SCRATCH_1, op.is_64bit);

    zero_capture_regs(buf);

    let (arith, is_subtraction) = match op.kind {
        CompareKind::Cmp => (ArithOp::Sub, true),
        CompareKind::Cmn => (ArithOp::Add, false),
        CompareKind::Tst => (ArithOp::And, false),
    };
    emit::arith_reg_reg(buf, arith, SCRATCH_0, SCRATCH_1, op.is_64bit);

    store_captured_nzcv(buf, is_subtraction);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::op::AluKind;

    #[test]
    fn add_immediate_sets_flags_without_overflowing() {
        let mut buf = CodeBuffer::new(512);
        translate_alu(
            &mut buf,
            AluOp {
                kind: AluKind::Add,
                rd: 0,
                rn: 1,
                rhs: RhsOperand::Immediate { value: 1, shift_left_12: false },
                set_flags: true,
                is_64bit: true,
            },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn bic_inverts_rhs_before_anding() {
        let mut buf = CodeBuffer::new(512);
        translate_alu(
            &mut buf,
            AluOp {
                kind: AluKind::Bic,
                rd: 2,
                rn: 3,
                rhs: RhsOperand::Register { reg: 4, shift: ShiftKind::Lsl, amount: 0 },
                set_flags: false,
                is_64bit: false,
            },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn compare_discards_destination() {
        let mut buf = CodeBuffer::new(512);
        translate_compare(
            &mut buf,
            CompareOp {
                kind: CompareKind::Cmp,
                rn: 5,
                rhs: RhsOperand::Register { reg: 6, shift: ShiftKind::Lsl, amount: 0 },
                is_64bit: true,
            },
        );
        assert!(!buf.is_overflowed());
    }
}
