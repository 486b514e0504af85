//! `MOVZ`/`MOVK`/`MOVN` translation.

use crate::buffer::CodeBuffer;
use crate::decode::op::{MoveWideKind, MoveWideOp};
use crate::emit::{self, ArithOp};

use super::regmap::{self, SCRATCH_0, SCRATCH_1};

pub fn translate_move_wide(buf: &mut CodeBuffer, op: MoveWideOp) {
    let width_mask: u64 = if op.is_64bit { u64::MAX } else { 0xFFFF_FFFF };

    match op.kind {
        MoveWideKind::Movz => {
            let value = (u64::from(op.imm16) << op.shift) & width_mask;
            load_imm(buf, SCRATCH_0, value, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        MoveWideKind::Movn => {
            let value = !(u64::from(op.imm16) << op.shift) & width_mask;
            load_imm(buf, SCRATCH_0, value, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        MoveWideKind::Movk => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rd, op.is_64bit);

            let field_mask = !(0xFFFFu64 << op.shift) & width_mask;
            emit::mov_reg_imm64(buf, SCRATCH_1, field_mask);
            emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_0, SCRATCH_1, true);

            let field_value = (u64::from(op.imm16) << op.shift) & width_mask;
            emit::mov_reg_imm64(buf, SCRATCH_1, field_value);
            emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_0, SCRATCH_1, true);

            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
    }
}

fn load_imm(buf: &mut CodeBuffer, dst: crate::emit::regs::GpReg, value: u64, is_64bit: bool) {
    if is_64bit {
        emit::mov_reg_imm64(buf, dst, value);
    } else {
        emit::mov_reg_imm32(buf, dst, value as u32, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movz_with_shift_16() {
        let mut buf = CodeBuffer::new(64);
        translate_move_wide(
            &mut buf,
            MoveWideOp { kind: MoveWideKind::Movz, rd: 0, imm16: 0x1234, shift: 16, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn movk_preserves_other_halfwords() {
        let mut buf = CodeBuffer::new(64);
        translate_move_wide(
            &mut buf,
            MoveWideOp { kind: MoveWideKind::Movk, rd: 3, imm16: 0xbeef, shift: 32, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn movn_32bit_zero_extends() {
        let mut buf = CodeBuffer::new(64);
        translate_move_wide(
            &mut buf,
            MoveWideOp { kind: MoveWideKind::Movn, rd: 1, imm16: 0, shift: 0, is_64bit: false },
        );
        assert!(!buf.is_overflowed());
    }
}
