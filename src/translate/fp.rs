//! Scalar floating-point translation: the `FADD`/`FSUB`/`FMUL`/`FDIV` family, `FSQRT`,
//! `FABS`/`FNEG`, `FCVT` (single/double precision conversion), `FCMP`/`FCMPE`, `FCSEL`, `FMOV`,
//! and the reciprocal-estimate instructions.
//!
//! Every guest `V` register lives in [`GuestState::vreg`] (see [`super::regmap::load_vreg_scalar`]);
//! there is no persistent host-XMM residency across instructions, the same convention the integer
//! side uses for `GuestState::gpr`.

use crate::buffer::CodeBuffer;
use crate::decode::op::{FpArithKind, FpScalarOp};
use crate::emit::{self, X86Cond};
use crate::state::Condition;

use super::cond;
use super::regmap::{self, SCRATCH_0, SCRATCH_XMM0, SCRATCH_XMM1};

pub fn translate_fp_scalar(buf: &mut CodeBuffer, op: FpScalarOp) {
    match op {
        FpScalarOp::Arith { kind, rd, rn, rm, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            regmap::load_vreg_scalar(buf, SCRATCH_XMM1, rm, is_double);
            match kind {
                FpArithKind::Add => emit::adds_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double),
                FpArithKind::Sub => emit::subs_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double),
                FpArithKind::Mul => emit::muls_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double),
                FpArithKind::Div => emit::divs_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double),
            }
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
        }

        FpScalarOp::Sqrt { rd, rn, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            emit::sqrts_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM0, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
        }

        FpScalarOp::Abs { rd, rn, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            load_sign_mask(buf, SCRATCH_XMM1, is_double, !0u64 >> 1);
            emit::andp_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
        }

        FpScalarOp::Neg { rd, rn, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            load_sign_mask(buf, SCRATCH_XMM1, is_double, 1u64 << 63);
            emit::xorp_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
        }

        FpScalarOp::Cvt { rd, rn, to_double } => {
            // `to_double` names the destination width; the source is read at the opposite width.
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, !to_double);
            emit::cvt_scalar_precision(buf, SCRATCH_XMM0, SCRATCH_XMM0, to_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, to_double);
        }

        FpScalarOp::Cmp { rn, rm, is_double, signal_nans: _ } => {
            // FCMP and FCMPE leave NZCV identically set; the `signal_nans` flag only changes
            // whether a quiet NaN additionally raises the invalid-operation FP exception, which
            // this translator doesn't model (no FPSR exception-flag emulation).
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            regmap::load_vreg_scalar(buf, SCRATCH_XMM1, rm, is_double);
            zero_fp_capture_regs(buf);
            emit::ucomis_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double);
            store_nzcv_from_ucomis(buf);
        }

        FpScalarOp::Csel { rd, rn, rm, cond: guest_cond, is_double } => {
            translate_fcsel(buf, rd, rn, rm, guest_cond, is_double);
        }

        FpScalarOp::Mov { rd, rn, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
        }

        // No host reciprocal/rsqrt-estimate instruction exists for scalar SSE; the full-precision
        // divide/sqrt is a faithful (if slower) stand-in for the single Newton-Raphson step guest
        // code expects to refine.
        FpScalarOp::Recpe { rd, rn, is_double } => {
            load_one(buf, SCRATCH_XMM1, is_double);
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            emit::divs_xmm_xmm(buf, SCRATCH_XMM1, SCRATCH_XMM0, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM1, rd, is_double);
        }
        FpScalarOp::Rsqrte { rd, rn, is_double } => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            emit::sqrts_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM0, is_double);
            load_one(buf, SCRATCH_XMM1, is_double);
            emit::divs_xmm_xmm(buf, SCRATCH_XMM1, SCRATCH_XMM0, is_double);
            regmap::store_vreg_scalar(buf, SCRATCH_XMM1, rd, is_double);
        }
    }
}

/// x86 has no scalar FP `CMOV`; `FCSEL` is lowered the same way [`super::branch`] lowers a
/// conditional branch, skipping a plain move instead of skipping an exit.
fn translate_fcsel(buf: &mut CodeBuffer, rd: u8, rn: u8, rm: u8, guest_cond: Condition, is_double: bool) {
    regmap::load_vreg_scalar(buf, SCRATCH_XMM1, rm, is_double);
    match guest_cond {
        Condition::Al => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
        }
        Condition::Nv => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rm, is_double);
        }
        _ => {
            regmap::load_vreg_scalar(buf, SCRATCH_XMM0, rn, is_double);
            cond::eval_into(buf, guest_cond, SCRATCH_0);
            emit::test_reg_reg(buf, SCRATCH_0, SCRATCH_0, false);
            let jcc_at = buf.current_size();
            emit::jcc_rel32(buf, X86Cond::Jne, 0);
            emit::movs_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1, is_double);
            let after = buf.current_size();
            if !buf.is_overflowed() {
                let rel = (after - (jcc_at + 6)) as i32;
                buf.patch_word32_at(jcc_at + 2, rel as u32);
            }
        }
    }
    regmap::store_vreg_scalar(buf, SCRATCH_XMM0, rd, is_double);
}

/// Materializes a sign-bit mask (all-ones for `FABS`, just the sign bit for `FNEG`) at the right
/// scalar width via a GPR round trip, since there's no vector-immediate-load instruction.
fn load_sign_mask(buf: &mut CodeBuffer, dst: crate::emit::regs::XmmReg, is_double: bool, bits64: u64) {
    let value = if is_double { bits64 } else { (bits64 & 0xFFFF_FFFF) as u64 };
    emit::mov_reg_imm64(buf, SCRATCH_0, value);
    emit::movq_xmm_from_gpr(buf, dst, SCRATCH_0);
}

fn load_one(buf: &mut CodeBuffer, dst: crate::emit::regs::XmmReg, is_double: bool) {
    let bits: u64 = if is_double { 1f64.to_bits() } else { 1f32.to_bits() as u64 };
    emit::mov_reg_imm64(buf, SCRATCH_0, bits);
    emit::movq_xmm_from_gpr(buf, dst, SCRATCH_0);
}

/// Zeroes the flag-capture registers. Must run strictly before `UCOMISS`/`UCOMISD`, the same
/// ordering constraint [`super::alu::translate_alu`]'s NZCV capture observes.
fn zero_fp_capture_regs(buf: &mut CodeBuffer) {
    use super::regmap::{SCRATCH_1, SCRATCH_2, SCRATCH_3, SCRATCH_4, SCRATCH_5};
    emit::arith_reg_reg(buf, emit::ArithOp::Xor, SCRATCH_1, SCRATCH_1, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Xor, SCRATCH_2, SCRATCH_2, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Xor, SCRATCH_3, SCRATCH_3, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Xor, SCRATCH_4, SCRATCH_4, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Xor, SCRATCH_5, SCRATCH_5, true);
}

/// Assembles an AArch64 NZCV word from the host flags `UCOMISS`/`UCOMISD` just set:
/// `N = CF & !ZF`, `Z = ZF & !PF`, `C = !CF | ZF`, `V = PF` (`PF` marks an unordered — NaN-involving
/// — comparison, which maps onto ARM's `V` bit for FP compares). `Z` must exclude the unordered
/// case explicitly: x86 `UCOMISx` sets `ZF=1` on an unordered compare, but AArch64 requires
/// `NZCV = 0b0011` (`Z=0`) there, or a subsequent `B.EQ` would wrongly take a NaN compare. Relies
/// on [`zero_fp_capture_regs`] having run before the comparison, so every `SETcc` destination here
/// is a clean 0/1 value with no garbage above bit 0.
fn store_nzcv_from_ucomis(buf: &mut CodeBuffer) {
    use super::regmap::{SCRATCH_0, SCRATCH_1, SCRATCH_2, SCRATCH_3, SCRATCH_4, SCRATCH_5};

    emit::setcc_reg(buf, X86Cond::Jb, SCRATCH_2); // host CF
    emit::setcc_reg(buf, X86Cond::Je, SCRATCH_3); // host ZF
    emit::setcc_reg(buf, X86Cond::Jp, SCRATCH_5); // host PF -> V

    // N = CF & !ZF
    emit::mov_reg_reg(buf, SCRATCH_1, SCRATCH_3, true);
    emit::not_reg(buf, SCRATCH_1, true);
    emit::arith_reg_imm8(buf, emit::ArithOp::And, SCRATCH_1, 1, true);
    emit::arith_reg_reg(buf, emit::ArithOp::And, SCRATCH_1, SCRATCH_2, true);
    // C = !CF | ZF
    emit::mov_reg_reg(buf, SCRATCH_4, SCRATCH_2, true);
    emit::not_reg(buf, SCRATCH_4, true);
    emit::arith_reg_imm8(buf, emit::ArithOp::And, SCRATCH_4, 1, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Or, SCRATCH_4, SCRATCH_3, true);
    // Z = ZF & !PF, computed last since N/C above still needed the raw ZF in SCRATCH_3.
    emit::mov_reg_reg(buf, SCRATCH_0, SCRATCH_5, true);
    emit::not_reg(buf, SCRATCH_0, true);
    emit::arith_reg_imm8(buf, emit::ArithOp::And, SCRATCH_0, 1, true);
    emit::arith_reg_reg(buf, emit::ArithOp::And, SCRATCH_3, SCRATCH_0, true);

    emit::shift_reg_imm8(buf, emit::ShiftOp::Shl, SCRATCH_1, 31, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shl, SCRATCH_3, 30, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shl, SCRATCH_4, 29, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shl, SCRATCH_5, 28, true);

    emit::arith_reg_reg(buf, emit::ArithOp::Or, SCRATCH_1, SCRATCH_3, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Or, SCRATCH_1, SCRATCH_4, true);
    emit::arith_reg_reg(buf, emit::ArithOp::Or, SCRATCH_1, SCRATCH_5, true);

    emit::store_reg_mem(buf, SCRATCH_1, regmap::STATE_BASE, regmap::pstate_offset(), 4);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_add_emits_without_overflowing() {
        let mut buf = CodeBuffer::new(256);
        translate_fp_scalar(
            &mut buf,
            FpScalarOp::Arith { kind: FpArithKind::Add, rd: 0, rn: 1, rm: 2, is_double: false },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn fcmp_assembles_nzcv_from_host_flags() {
        let mut buf = CodeBuffer::new(256);
        translate_fp_scalar(&mut buf, FpScalarOp::Cmp { rn: 0, rm: 1, is_double: true, signal_nans: false });
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn fcsel_al_skips_the_conditional_path() {
        let mut buf = CodeBuffer::new(256);
        translate_fp_scalar(
            &mut buf,
            FpScalarOp::Csel { rd: 0, rn: 1, rm: 2, cond: Condition::Al, is_double: false },
        );
        assert!(!buf.is_overflowed());
    }
}
