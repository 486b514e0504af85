//! Condition evaluation shared by every translator that branches or selects on a guest condition
//! code (`B.cond`, `CBZ`/`CBNZ`/`TBZ`/`TBNZ`, `CSEL` and friends, `FCSEL`).
//!
//! PSTATE is kept as a 32-bit image inside [`crate::state::GuestState`] rather than trusting live
//! host EFLAGS across instruction boundaries; host EFLAGS are reconstructed whenever a conditional
//! operation is emitted. There is no single x86 instruction that sets an arbitrary, independent
//! SF/ZF/CF/OF combination without side effects, so the reconstruction here works one level up: it
//! recomputes the *boolean outcome* of the guest condition straight from the
//! stored PSTATE bits (the same boolean algebra as [`crate::state::Condition::evaluate`], just
//! spelled in host machine code) into a scratch GPR, then every caller tests that single GPR with
//! one fixed host condition (`TEST reg,reg` / `JNE`/`CMOVNE`/`SETNE`). This is equivalent to
//! widening the 14-entry AArch64-to-x86 condition table to cover every case uniformly, without
//! depending on a specific preceding instruction having just left the right flags behind.

use crate::buffer::CodeBuffer;
use crate::emit::regs::GpReg;
use crate::emit::{self, ArithOp, ShiftOp};
use crate::state::Condition;

use super::regmap::{pstate_offset, STATE_BASE};

const SC_RAW: GpReg = GpReg::Rax;
const SC_N: GpReg = GpReg::Rcx;
const SC_Z: GpReg = GpReg::Rdx;
const SC_C: GpReg = GpReg::Rsi;
const SC_V: GpReg = GpReg::Rdi;

/// Loads the stored PSTATE word and splits N/Z/C/V out into four fixed scratch registers (0 or 1
/// each). Every [`eval_into`] call starts from here.
fn extract_nzcv(buf: &mut CodeBuffer) {
    emit::load_reg_mem(buf, SC_RAW, STATE_BASE, pstate_offset(), 4, false, false);

    emit::mov_reg_reg(buf, SC_N, SC_RAW, false);
    emit::shift_reg_imm8(buf, ShiftOp::Shr, SC_N, 31, false);

    emit::mov_reg_reg(buf, SC_Z, SC_RAW, false);
    emit::shift_reg_imm8(buf, ShiftOp::Shr, SC_Z, 30, false);
    emit::arith_reg_imm8(buf, ArithOp::And, SC_Z, 1, false);

    emit::mov_reg_reg(buf, SC_C, SC_RAW, false);
    emit::shift_reg_imm8(buf, ShiftOp::Shr, SC_C, 29, false);
    emit::arith_reg_imm8(buf, ArithOp::And, SC_C, 1, false);

    emit::mov_reg_reg(buf, SC_V, SC_RAW, false);
    emit::shift_reg_imm8(buf, ShiftOp::Shr, SC_V, 28, false);
    emit::arith_reg_imm8(buf, ArithOp::And, SC_V, 1, false);
}

/// Computes the 0/1 boolean outcome of `cond` into `dst` (which must not be any of
/// [`SC_RAW`]/[`SC_N`]/[`SC_Z`]/[`SC_C`]/[`SC_V`]). Callers follow this with
/// `TEST dst, dst` and branch on `JNE`/`CMOVNE`/`SETNE` as appropriate. `AL` and `NV` are not
/// handled here — they never need a runtime test and callers special-case them before reaching
/// this function.
pub fn eval_into(buf: &mut CodeBuffer, cond: Condition, dst: GpReg) {
    extract_nzcv(buf);

    use Condition::*;
    match cond {
        Eq => emit::mov_reg_reg(buf, dst, SC_Z, false),
        Ne => invert_into(buf, dst, SC_Z),
        Cs => emit::mov_reg_reg(buf, dst, SC_C, false),
        Cc => invert_into(buf, dst, SC_C),
        Mi => emit::mov_reg_reg(buf, dst, SC_N, false),
        Pl => invert_into(buf, dst, SC_N),
        Vs => emit::mov_reg_reg(buf, dst, SC_V, false),
        Vc => invert_into(buf, dst, SC_V),
        Hi => {
            // C & !Z
            emit::mov_reg_reg(buf, dst, SC_Z, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false);
            emit::arith_reg_reg(buf, ArithOp::And, dst, SC_C, false);
        }
        Ls => {
            // !(C & !Z) = !C | Z
            emit::mov_reg_reg(buf, dst, SC_Z, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false);
            emit::arith_reg_reg(buf, ArithOp::And, dst, SC_C, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false);
        }
        Ge => {
            // N == V
            emit::mov_reg_reg(buf, dst, SC_N, false);
            emit::arith_reg_reg(buf, ArithOp::Xor, dst, SC_V, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false);
        }
        Lt => {
            // N != V
            emit::mov_reg_reg(buf, dst, SC_N, false);
            emit::arith_reg_reg(buf, ArithOp::Xor, dst, SC_V, false);
        }
        Gt => {
            // !Z & (N == V)
            emit::mov_reg_reg(buf, dst, SC_N, false);
            emit::arith_reg_reg(buf, ArithOp::Xor, dst, SC_V, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false); // ge
            emit::mov_reg_reg(buf, SC_RAW, SC_Z, false);
            emit::arith_reg_imm8(buf, ArithOp::Xor, SC_RAW, 1, false); // !z, SC_RAW is free again
            emit::arith_reg_reg(buf, ArithOp::And, dst, SC_RAW, false);
        }
        Le => {
            // Z | (N != V)
            emit::mov_reg_reg(buf, dst, SC_N, false);
            emit::arith_reg_reg(buf, ArithOp::Xor, dst, SC_V, false);
            emit::arith_reg_reg(buf, ArithOp::Or, dst, SC_Z, false);
        }
        Al | Nv => unreachable!("AL/NV are special-cased by callers, never reach condition evaluation"),
    }
}

fn invert_into(buf: &mut CodeBuffer, dst: GpReg, src: GpReg) {
    emit::mov_reg_reg(buf, dst, src, false);
    emit::arith_reg_imm8(buf, ArithOp::Xor, dst, 1, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CodeBuffer;

    #[test]
    fn eval_into_emits_without_overflowing_a_small_buffer() {
        let mut buf = CodeBuffer::new(256);
        eval_into(&mut buf, Condition::Gt, GpReg::R8);
        assert!(!buf.is_overflowed());
        assert!(buf.current_size() > 0);
    }
}
