//! The static AArch64-register-to-host-location table. A register allocator is out of scope; a
//! fixed AArch64->x86 map is adequate because the translator is a direct per-instruction lowering
//! rather than an optimizing compiler.
//!
//! x86_64 only has 16 general-purpose registers, one of which the dispatch trampoline reserves as
//! a pointer to the live [`GuestState`] for the duration of a block, so a literal 1:1 mapping of
//! all 31 addressable AArch64 integer registers onto distinct host registers isn't possible. This
//! module resolves that the same way a template-based (non-optimizing) JIT conventionally does:
//! every guest register lives in [`GuestState`] memory, and a translator materializes the operands
//! it needs into a small set of caller-owned scratch registers immediately before using them. The
//! mapping is still static and centralized — one function computes where a given guest register's
//! value lives, and every translator goes through it — it is just a memory location rather than a
//! pinned register for all but the reserved pointer.

use core::mem::offset_of;

use crate::buffer::CodeBuffer;
use crate::emit::regs::{GpReg, XmmReg};
use crate::emit::{self, ArithOp};
use crate::state::GuestState;

/// Host register permanently holding a pointer to the current [`GuestState`] for the duration of
/// a translated block. Set once by `dispatch.rs`'s trampoline on entry; no translator may use it
/// as scratch or spill a value into it.
pub const STATE_BASE: GpReg = GpReg::R15;

/// A small fixed pool of scratch registers available to a translator while lowering one guest
/// instruction. None of these are expected to hold a meaningful value across instruction
/// boundaries — every translator reloads its operands from [`GuestState`] and stores its results
/// back before returning.
pub const SCRATCH_0: GpReg = GpReg::Rax;
pub const SCRATCH_1: GpReg = GpReg::Rcx;
pub const SCRATCH_2: GpReg = GpReg::Rdx;
pub const SCRATCH_3: GpReg = GpReg::Rsi;
pub const SCRATCH_4: GpReg = GpReg::Rdi;
pub const SCRATCH_5: GpReg = GpReg::R8;

/// Host register permanently holding a pointer to guest virtual address 0 within a flat,
/// identity-relocated host mapping of guest memory (see [`crate::memory`]). Load/store
/// translators add a computed guest address to this base to get a dereferenceable host pointer;
/// no translator may use it as scratch.
pub const MEM_BASE: GpReg = GpReg::R14;

/// Scratch XMM registers available to the FP-scalar, packed-SIMD and crypto translators while
/// lowering one guest instruction, on the same "reload every time, nothing survives across
/// instructions" convention as [`SCRATCH_0`]..[`SCRATCH_5`]. Every guest `V` register lives in
/// [`GuestState::vreg`]; these hold a live copy only for the duration of one lowering.
pub const SCRATCH_XMM0: XmmReg = XmmReg::Xmm0;
pub const SCRATCH_XMM1: XmmReg = XmmReg::Xmm1;
pub const SCRATCH_XMM2: XmmReg = XmmReg::Xmm2;

const GPR_BASE: i32 = offset_of!(GuestState, gpr) as i32;
const SP_OFFSET: i32 = offset_of!(GuestState, sp) as i32;
const PC_OFFSET: i32 = offset_of!(GuestState, pc) as i32;
const PSTATE_OFFSET: i32 = offset_of!(GuestState, pstate) as i32;
const VREG_BASE: i32 = offset_of!(GuestState, vreg) as i32;
const FPCR_OFFSET: i32 = offset_of!(GuestState, fpcr) as i32;
const FPSR_OFFSET: i32 = offset_of!(GuestState, fpsr) as i32;
const TPIDR_OFFSET: i32 = offset_of!(GuestState, tpidr_el0) as i32;

/// Byte offset of `gpr[index]` within [`GuestState`]. Valid for `index` in `0..=30`; index 31 is
/// never stored (it is the zero register or the stack pointer depending on context — see
/// [`load_gpr_or_zero`] and [`load_base_or_sp`]).
pub fn gpr_offset(index: u8) -> i32 {
    debug_assert!(index <= 30);
    GPR_BASE + (index as i32) * 8
}

/// Byte offset of `vreg[index]` (a 16-byte [`crate::state::VectorRegister`]) within [`GuestState`].
pub fn vreg_offset(index: u8) -> i32 {
    VREG_BASE + (index as i32 & 0x1f) * 16
}

pub fn sp_offset() -> i32 {
    SP_OFFSET
}

pub fn pc_offset() -> i32 {
    PC_OFFSET
}

pub fn pstate_offset() -> i32 {
    PSTATE_OFFSET
}

pub fn fpcr_offset() -> i32 {
    FPCR_OFFSET
}

pub fn fpsr_offset() -> i32 {
    FPSR_OFFSET
}

pub fn tpidr_offset() -> i32 {
    TPIDR_OFFSET
}

/// Loads guest register `index` into `scratch`, treating index 31 as the zero register (the
/// convention every ALU/compare/move/conditional-select family uses for Rd/Rn/Rm, matching
/// [`GuestState::read_gpr_or_zero`]).
pub fn load_gpr_or_zero(buf: &mut CodeBuffer, scratch: GpReg, index: u8, is_64bit: bool) {
    if index == 31 {
        emit::arith_reg_reg(buf, ArithOp::Xor, scratch, scratch, is_64bit);
    } else {
        emit::load_reg_mem(buf, scratch, STATE_BASE, gpr_offset(index), 8, false, is_64bit);
    }
}

/// Stores `scratch` into guest register `index`, discarding the write entirely when `index == 31`
/// (the zero register never retains a write), matching [`GuestState::write_gpr_or_discard`].
pub fn store_gpr_or_discard(buf: &mut CodeBuffer, scratch: GpReg, index: u8) {
    if index != 31 {
        emit::store_reg_mem(buf, scratch, STATE_BASE, gpr_offset(index), 8);
    }
}

/// Loads guest register `index` into `scratch`, treating index 31 as the stack pointer (the
/// convention every memory-addressing base register and pre/post-index write-back target uses).
pub fn load_base_or_sp(buf: &mut CodeBuffer, scratch: GpReg, index: u8) {
    if index == 31 {
        emit::load_reg_mem(buf, scratch, STATE_BASE, sp_offset(), 8, false, true);
    } else {
        emit::load_reg_mem(buf, scratch, STATE_BASE, gpr_offset(index), 8, false, true);
    }
}

/// Stores `scratch` back to guest register `index`, or to the stack pointer when `index == 31`.
pub fn store_base_or_sp(buf: &mut CodeBuffer, scratch: GpReg, index: u8) {
    if index == 31 {
        emit::store_reg_mem(buf, scratch, STATE_BASE, sp_offset(), 8);
    } else {
        emit::store_reg_mem(buf, scratch, STATE_BASE, gpr_offset(index), 8);
    }
}

/// Loads guest vector register `index` (full 128 bits) into `scratch`.
pub fn load_vreg(buf: &mut CodeBuffer, scratch: XmmReg, index: u8) {
    emit::movdqu_load_xmm_mem(buf, scratch, STATE_BASE, vreg_offset(index));
}

/// Stores `scratch` (full 128 bits) back into guest vector register `index`.
pub fn store_vreg(buf: &mut CodeBuffer, scratch: XmmReg, index: u8) {
    emit::movdqu_store_xmm_mem(buf, scratch, STATE_BASE, vreg_offset(index));
}

/// Loads the scalar single/double float occupying the low bits of guest vector register `index`.
/// The upper bits of the destination register beyond the scalar width are left however
/// `MOVSS`/`MOVSD` defines them (zeroed), matching AArch64's own "upper bits of Vd become zero"
/// rule for scalar FP destinations.
pub fn load_vreg_scalar(buf: &mut CodeBuffer, scratch: XmmReg, index: u8, is_double: bool) {
    emit::movs_load_xmm_mem(buf, scratch, STATE_BASE, vreg_offset(index), is_double);
}

/// Stores a scalar single/double float into the low bits of guest vector register `index`,
/// without disturbing the register's upper bits already resident in [`GuestState`].
pub fn store_vreg_scalar(buf: &mut CodeBuffer, scratch: XmmReg, index: u8, is_double: bool) {
    emit::movs_store_xmm_mem(buf, scratch, STATE_BASE, vreg_offset(index), is_double);
}

/// Stores `scratch` into guest vector register `index`, honoring AArch64's "a write through the
/// 64-bit `D`-register form of a `V` register zeroes the upper 64 bits" rule: the full 128 bits
/// are written when `is_128`, otherwise only the low 64 bits come from `scratch` and the upper 64
/// are written as zero. `gpr_scratch` is a GPR used to round-trip the low 64 bits; it is clobbered.
pub fn store_vreg_sized(
    buf: &mut CodeBuffer,
    scratch: XmmReg,
    gpr_scratch: GpReg,
    index: u8,
    is_128: bool,
) {
    if is_128 {
        store_vreg(buf, scratch, index);
    } else {
        emit::movq_gpr_from_xmm(buf, gpr_scratch, scratch);
        emit::store_reg_mem(buf, gpr_scratch, STATE_BASE, vreg_offset(index), 8);
        emit::arith_reg_reg(buf, ArithOp::Xor, gpr_scratch, gpr_scratch, true);
        emit::store_reg_mem(buf, gpr_scratch, STATE_BASE, vreg_offset(index) + 8, 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpr_offsets_are_distinct_and_word_aligned() {
        for i in 0..=30u8 {
            assert_eq!(gpr_offset(i) % 8, 0);
        }
        assert_ne!(gpr_offset(0), gpr_offset(1));
        assert_eq!(gpr_offset(1) - gpr_offset(0), 8);
    }

    #[test]
    fn vreg_offset_wraps_index_to_five_bits() {
        assert_eq!(vreg_offset(0), vreg_offset(32));
    }
}
