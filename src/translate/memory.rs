//! Load/store translation: base-offset, base-register, pre/post-index, register pairs
//! (`LDP`/`STP`), and the weakened exclusive forms.
//!
//! Guest loads and stores address a separate guest memory space, not [`crate::state::GuestState`].
//! [`crate::translate::regmap::MEM_BASE`] holds a host pointer such that guest address 0 maps to
//! host address `MEM_BASE` — the same identity-mapping contract [`crate::memory::GuestMemory`]
//! documents, realized as a fixed host register rather than a function call so translated code
//! can dereference guest memory inline.

use crate::buffer::CodeBuffer;
use crate::decode::op::{AddrMode, MemOp};
use crate::emit::{self, ArithOp};

use super::regmap::{self, MEM_BASE, SCRATCH_0, SCRATCH_2, SCRATCH_3, SCRATCH_4, SCRATCH_5};

/// Resolves the access address into [`SCRATCH_2`] as a guest virtual address, performing any
/// pre-index writeback immediately. Returns `Some(offset)` when a post-index writeback of `rn`
/// must happen after the access completes.
fn prepare_address(buf: &mut CodeBuffer, rn: u8, addr: AddrMode) -> Option<i64> {
    regmap::load_base_or_sp(buf, SCRATCH_2, rn);

    match addr {
        AddrMode::BaseOffset { offset } => {
            add_signed_imm(buf, SCRATCH_2, offset);
            None
        }
        AddrMode::BaseRegister { rm } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_3, rm, true);
            emit::arith_reg_reg(buf, ArithOp::Add, SCRATCH_2, SCRATCH_3, true);
            None
        }
        AddrMode::PreIndex { offset } => {
            add_signed_imm(buf, SCRATCH_2, offset);
            regmap::store_base_or_sp(buf, SCRATCH_2, rn);
            None
        }
        AddrMode::PostIndex { offset } => Some(offset),
    }
}

fn finish_post_index(buf: &mut CodeBuffer, rn: u8, pre_addr: crate::emit::regs::GpReg, offset: i64) {
    emit::mov_reg_reg(buf, SCRATCH_2, pre_addr, true);
    add_signed_imm(buf, SCRATCH_2, offset);
    regmap::store_base_or_sp(buf, SCRATCH_2, rn);
}

fn add_signed_imm(buf: &mut CodeBuffer, reg: crate::emit::regs::GpReg, imm: i64) {
    if imm == 0 {
        return;
    }
    if let Ok(imm8) = i8::try_from(imm) {
        emit::arith_reg_imm8(buf, ArithOp::Add, reg, imm8, true);
    } else if let Ok(imm32) = i32::try_from(imm) {
        emit::arith_reg_imm32(buf, ArithOp::Add, reg, imm32 as u32, true);
    } else {
        emit::mov_reg_imm64(buf, SCRATCH_5, imm as u64);
        emit::arith_reg_reg(buf, ArithOp::Add, reg, SCRATCH_5, true);
    }
}

pub fn translate_load(buf: &mut CodeBuffer, op: MemOp) {
    let post = prepare_address(buf, op.rn, op.addr);
    // Keep a copy of the pure guest address around for a post-index writeback, since the next
    // step clobbers SCRATCH_2 with the host-relocated pointer.
    emit::mov_reg_reg(buf, SCRATCH_4, SCRATCH_2, true);
    emit::arith_reg_reg(buf, ArithOp::Add, SCRATCH_2, MEM_BASE, true);

    emit::load_reg_mem(buf, SCRATCH_0, SCRATCH_2, 0, op.size, op.sign_extend, op.is_64bit);
    regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rt);

    if let Some(rt2) = op.rt2 {
        emit::load_reg_mem(buf, SCRATCH_0, SCRATCH_2, op.size as i32, op.size, op.sign_extend, op.is_64bit);
        regmap::store_gpr_or_discard(buf, SCRATCH_0, rt2);
    }

    if op.exclusive {
        // LDXR's exclusive-monitor tracking is out of scope; the plain load above already
        // observes the current value, so only the ordering fence remains.
        emit::mfence(buf);
    }

    if let Some(offset) = post {
        finish_post_index(buf, op.rn, SCRATCH_4, offset);
    }
}

pub fn translate_store(buf: &mut CodeBuffer, op: MemOp) {
    let post = prepare_address(buf, op.rn, op.addr);
    emit::mov_reg_reg(buf, SCRATCH_4, SCRATCH_2, true);
    emit::arith_reg_reg(buf, ArithOp::Add, SCRATCH_2, MEM_BASE, true);

    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rt, op.is_64bit);
    emit::store_reg_mem(buf, SCRATCH_0, SCRATCH_2, 0, op.size);

    if let Some(rt2) = op.rt2 {
        regmap::load_gpr_or_zero(buf, SCRATCH_0, rt2, op.is_64bit);
        emit::store_reg_mem(buf, SCRATCH_0, SCRATCH_2, op.size as i32, op.size);
    }

    if op.exclusive {
        // STXR always reports success; the status-register destination `MemOp` doesn't model is
        // simply never written.
        emit::mfence(buf);
    }

    if let Some(offset) = post {
        finish_post_index(buf, op.rn, SCRATCH_4, offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_offset_load_roundtrips_through_buffer() {
        let mut buf = CodeBuffer::new(256);
        translate_load(
            &mut buf,
            MemOp {
                rt: 0,
                rt2: None,
                rn: 1,
                addr: AddrMode::BaseOffset { offset: 16 },
                size: 8,
                sign_extend: false,
                is_64bit: true,
                exclusive: false,
            },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn post_index_store_writes_back_after_access() {
        let mut buf = CodeBuffer::new(256);
        translate_store(
            &mut buf,
            MemOp {
                rt: 2,
                rt2: None,
                rn: 3,
                addr: AddrMode::PostIndex { offset: 8 },
                size: 8,
                sign_extend: false,
                is_64bit: true,
                exclusive: false,
            },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn pair_load_reads_two_registers() {
        let mut buf = CodeBuffer::new(256);
        translate_load(
            &mut buf,
            MemOp {
                rt: 4,
                rt2: Some(5),
                rn: 6,
                addr: AddrMode::BaseOffset { offset: 0 },
                size: 8,
                sign_extend: false,
                is_64bit: true,
                exclusive: false,
            },
        );
        assert!(!buf.is_overflowed());
    }
}
