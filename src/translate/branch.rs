//! Branch translation. Unconditional/register-indirect forms are
//! block terminators (see [`crate::decode::op::Operation::is_terminator`]) and exit straight to
//! the dispatch loop via [`super::exit`]. Conditional and compare-and-branch forms are not
//! terminators: block discovery keeps translating the fall-through path, so these wrap the same
//! exit sequence in a host conditional skip.

use crate::buffer::CodeBuffer;
use crate::decode::op::BranchOp;
use crate::emit::{self, X86Cond};
use crate::state::Condition;

use super::cond;
use super::exit;
use super::regmap::{self, SCRATCH_0, SCRATCH_5};

pub fn translate_branch(buf: &mut CodeBuffer, op: BranchOp, pc: u64) {
    match op {
        BranchOp::B { byte_offset } => {
            exit::emit_exit_pc_imm(buf, SCRATCH_0, target_of(pc, byte_offset));
        }
        BranchOp::Bl { byte_offset } => {
            let link = pc.wrapping_add(4);
            emit::mov_reg_imm64(buf, SCRATCH_0, link);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, 30);
            exit::emit_exit_pc_imm(buf, SCRATCH_0, target_of(pc, byte_offset));
        }
        BranchOp::Br { rn } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rn, true);
            exit::emit_exit_pc_reg(buf, SCRATCH_0);
        }
        BranchOp::Blr { rn } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rn, true);
            let link = pc.wrapping_add(4);
            emit::mov_reg_imm64(buf, SCRATCH_5, link);
            regmap::store_gpr_or_discard(buf, SCRATCH_5, 30);
            exit::emit_exit_pc_reg(buf, SCRATCH_0);
        }
        BranchOp::Ret { rn } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rn, true);
            exit::emit_exit_pc_reg(buf, SCRATCH_0);
        }
        BranchOp::BCond { cond: c, byte_offset } => {
            translate_conditional_branch(buf, c, target_of(pc, byte_offset));
        }
        BranchOp::Cbz { rt, byte_offset, is_64bit } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, is_64bit);
            emit::test_reg_reg(buf, SCRATCH_0, SCRATCH_0, is_64bit);
            // Taken when the value is zero (ZF=1); skip the exit when ZF=0.
            emit_skip_then_exit(buf, X86Cond::Jne, target_of(pc, byte_offset));
        }
        BranchOp::Cbnz { rt, byte_offset, is_64bit } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, is_64bit);
            emit::test_reg_reg(buf, SCRATCH_0, SCRATCH_0, is_64bit);
            // Taken when nonzero (ZF=0); skip the exit when ZF=1.
            emit_skip_then_exit(buf, X86Cond::Je, target_of(pc, byte_offset));
        }
        BranchOp::Tbz { rt, bit, byte_offset } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, true);
            emit::bt_reg_imm8(buf, SCRATCH_0, bit, true);
            // CF now holds the tested bit. Taken when the bit is clear (CF=0); skip when CF=1.
            emit_skip_then_exit(buf, X86Cond::Jb, target_of(pc, byte_offset));
        }
        BranchOp::Tbnz { rt, bit, byte_offset } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, true);
            emit::bt_reg_imm8(buf, SCRATCH_0, bit, true);
            // Taken when the bit is set (CF=1); skip when CF=0.
            emit_skip_then_exit(buf, X86Cond::Jae, target_of(pc, byte_offset));
        }
    }
}

fn target_of(pc: u64, byte_offset: i64) -> u64 {
    pc.wrapping_add(byte_offset as u64)
}

fn translate_conditional_branch(buf: &mut CodeBuffer, guest_cond: Condition, target: u64) {
    match guest_cond {
        Condition::Al => {
            exit::emit_exit_pc_imm(buf, SCRATCH_0, target);
        }
        Condition::Nv => {
            // Never taken; nothing to emit.
        }
        _ => {
            cond::eval_into(buf, guest_cond, SCRATCH_0);
            emit::test_reg_reg(buf, SCRATCH_0, SCRATCH_0, false);
            // Taken when the computed boolean is nonzero (ZF=0); skip when ZF=1.
            emit_skip_then_exit(buf, X86Cond::Je, target);
        }
    }
}

/// Emits `Jcc skip_cond, <past the exit stub>` followed by the "take the branch" exit sequence,
/// back-patching the forward displacement once the stub's length is known.
fn emit_skip_then_exit(buf: &mut CodeBuffer, skip_cond: X86Cond, target: u64) {
    let jcc_at = buf.current_size();
    emit::jcc_rel32(buf, skip_cond, 0);
    exit::emit_exit_pc_imm(buf, SCRATCH_0, target);
    let after = buf.current_size();

    if !buf.is_overflowed() {
        let rel = (after - (jcc_at + 6)) as i32;
        buf.patch_word32_at(jcc_at + 2, rel as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_branch_exits_with_computed_target() {
        let mut buf = CodeBuffer::new(128);
        translate_branch(&mut buf, BranchOp::B { byte_offset: 16 }, 0x1000);
        assert!(!buf.is_overflowed());
        assert_eq!(*buf.as_slice().last().unwrap(), 0xC3);
    }

    #[test]
    fn bcond_al_behaves_like_unconditional() {
        let mut buf = CodeBuffer::new(128);
        translate_branch(&mut buf, BranchOp::BCond { cond: Condition::Al, byte_offset: 8 }, 0x2000);
        assert_eq!(*buf.as_slice().last().unwrap(), 0xC3);
    }

    #[test]
    fn bcond_nv_emits_nothing() {
        let mut buf = CodeBuffer::new(128);
        translate_branch(&mut buf, BranchOp::BCond { cond: Condition::Nv, byte_offset: 8 }, 0x2000);
        assert_eq!(buf.current_size(), 0);
    }

    #[test]
    fn tbz_patches_a_forward_displacement() {
        let mut buf = CodeBuffer::new(128);
        translate_branch(&mut buf, BranchOp::Tbz { rt: 0, bit: 3, byte_offset: 4 }, 0x3000);
        assert!(!buf.is_overflowed());
    }
}
