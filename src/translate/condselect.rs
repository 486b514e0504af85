//! Conditional-select translation: `CSEL`/`CSINC`/`CSINV`/`CSNEG`.
//!
//! Each of the three "increment/invert/negate" variants is expressed as transforming the
//! false-arm value before the select, so one shared select sequence covers all four. Selection
//! itself goes through [`super::cond::eval_into`] (see that module's doc comment for why this
//! recomputes the condition from the PSTATE image rather than trusting host EFLAGS) and a single
//! `TEST`+`CMOVNE`.

use crate::buffer::CodeBuffer;
use crate::decode::op::{CondSelectKind, CondSelectOp};
use crate::emit::{self, X86Cond};
use crate::state::Condition;

use super::cond;
use super::regmap::{self, SCRATCH_0, SCRATCH_1, SCRATCH_2};

pub fn translate_condselect(buf: &mut CodeBuffer, op: CondSelectOp) {
    // SCRATCH_0: false-arm value (rm, transformed per kind). SCRATCH_1: true-arm value (rn).
    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rm, op.is_64bit);
    match op.kind {
        CondSelectKind::Csel => {}
        CondSelectKind::Csinc => emit::arith_reg_imm8(buf, emit::ArithOp::Add, SCRATCH_0, 1, op.is_64bit),
        CondSelectKind::Csinv => emit::not_reg(buf, SCRATCH_0, op.is_64bit),
        CondSelectKind::Csneg => emit::neg_reg(buf, SCRATCH_0, op.is_64bit),
    }
    regmap::load_gpr_or_zero(buf, SCRATCH_1, op.rn, op.is_64bit);

    match op.cond {
        Condition::Al => {
            regmap::store_gpr_or_discard(buf, SCRATCH_1, op.rd);
        }
        Condition::Nv => {
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        _ => {
            cond::eval_into(buf, op.cond, SCRATCH_2);
            emit::test_reg_reg(buf, SCRATCH_2, SCRATCH_2, false);
            emit::cmovcc_reg_reg(buf, X86Cond::Jne, SCRATCH_0, SCRATCH_1, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csinc_transforms_false_arm_before_selecting() {
        let mut buf = CodeBuffer::new(128);
        translate_condselect(
            &mut buf,
            CondSelectOp { kind: CondSelectKind::Csinc, rd: 0, rn: 1, rm: 2, cond: Condition::Eq, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn csel_al_always_takes_true_arm() {
        let mut buf = CodeBuffer::new(128);
        translate_condselect(
            &mut buf,
            CondSelectOp { kind: CondSelectKind::Csel, rd: 0, rn: 1, rm: 2, cond: Condition::Al, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }
}
