//! Packed SIMD translation. Every guest `V` register is a 16-byte
//! [`crate::state::VectorRegister`] resident in [`GuestState`]; lane-wise operations round-trip
//! through [`super::regmap::SCRATCH_XMM0`]/`SCRATCH_XMM1` the same way the integer side
//! round-trips through [`super::regmap::SCRATCH_0`]. A 64-bit (`.8B`/`.4H`/`.2S`/`1D`, `is_128 ==
//! false`) operation zeroes the upper 64 bits of the destination on write, per AArch64's rule that
//! a `D`-register-form write clears the rest of the owning `V` register
//! ([`super::regmap::store_vreg_sized`]).
//!
//! x86 has no native 32/64-bit-lane packed saturating arithmetic and no single instruction that
//! permutes two distinct source registers together; those are built out of primitives that exist
//! (plain wraparound add/sub as a documented approximation, and a `PSHUFB`-based two-mask merge
//! for `ZIP`/`UZP`/`TRN`, respectively).

use crate::buffer::CodeBuffer;
use crate::decode::op::{
    SimdArithKind, SimdCompareKind, SimdLogicKind, SimdOp, SimdReduceKind, SimdShiftKind,
};
use crate::emit::regs::{GpReg, XmmReg};
use crate::emit::{self, ArithOp, PackedMinMaxKind, PackedShiftKind, SatArithOp, X86Cond};

use super::regmap::{self, SCRATCH_0, SCRATCH_1, SCRATCH_XMM0, SCRATCH_XMM1};

pub fn translate_simd(buf: &mut CodeBuffer, op: SimdOp) {
    match op {
        SimdOp::Arith { kind, rd, rn, rm, elem_width, is_128 } => {
            translate_arith(buf, kind, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::Logic { kind, rd, rn, rm, is_128 } => translate_logic(buf, kind, rd, rn, rm, is_128),
        SimdOp::Compare { kind, rd, rn, rm, elem_width, is_128 } => {
            translate_compare(buf, kind, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::ShiftImm { kind, rd, rn, amount, elem_width, is_128 } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            let pkind = match kind {
                SimdShiftKind::Shl => PackedShiftKind::Shl,
                SimdShiftKind::Ushr => PackedShiftKind::Ushr,
                SimdShiftKind::Sshr => PackedShiftKind::Sshr,
            };
            emit::pshift_imm(buf, pkind, SCRATCH_XMM0, amount, elem_width);
            regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
        }
        SimdOp::Abs { rd, rn, elem_width, is_128 } => translate_abs(buf, rd, rn, elem_width, is_128),
        SimdOp::Neg { rd, rn, elem_width, is_128 } => {
            emit::pxor(buf, SCRATCH_XMM1, SCRATCH_XMM1);
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            emit::psub(buf, SCRATCH_XMM1, SCRATCH_XMM0, elem_width);
            regmap::store_vreg_sized(buf, SCRATCH_XMM1, SCRATCH_0, rd, is_128);
        }
        SimdOp::Clz { rd, rn, elem_width, is_128 } => {
            lane_map(buf, rd, rn, elem_width, is_128, |buf, gpr| clz_lane(buf, gpr, elem_width as u32 * 8))
        }
        SimdOp::Cls { rd, rn, elem_width, is_128 } => {
            lane_map(buf, rd, rn, elem_width, is_128, |buf, gpr| cls_lane(buf, gpr, elem_width as u32 * 8))
        }
        SimdOp::Rbit { rd, rn, is_128 } => translate_rbit(buf, rd, rn, is_128),
        SimdOp::Tbl { rd, rn, rm, is_128 } => {
            // Approximation: indices beyond the single source register's length should read as
            // zero (ARM's multi-table-register form isn't modeled); PSHUFB only zeroes indices
            // with bit 7 set, so out-of-range-but-under-0x80 indices are not masked to zero here.
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            regmap::load_vreg(buf, SCRATCH_XMM1, rm);
            emit::pshufb(buf, SCRATCH_XMM0, SCRATCH_XMM1);
            regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
        }
        SimdOp::Zip1 { rd, rn, rm, elem_width, is_128 } => {
            permute_two_source(buf, PermuteKind::Zip1, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::Zip2 { rd, rn, rm, elem_width, is_128 } => {
            permute_two_source(buf, PermuteKind::Zip2, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::Uzp1 { rd, rn, rm, elem_width, is_128 } => {
            permute_two_source(buf, PermuteKind::Uzp1, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::Trn1 { rd, rn, rm, elem_width, is_128 } => {
            permute_two_source(buf, PermuteKind::Trn1, rd, rn, rm, elem_width, is_128)
        }
        SimdOp::Reduce { kind, rd, rn, elem_width, is_128 } => {
            translate_reduce(buf, kind, rd, rn, elem_width, is_128)
        }
        SimdOp::Dup { rd, rn, elem_width, is_128 } => translate_dup(buf, rd, rn, elem_width, is_128),
        SimdOp::Mov { rd, rn, is_128 } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
        }
    }
}

fn lane_count(elem_width: u8, is_128: bool) -> u8 {
    (if is_128 { 16 } else { 8 }) / elem_width
}

fn translate_arith(buf: &mut CodeBuffer, kind: SimdArithKind, rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    regmap::load_vreg(buf, SCRATCH_XMM1, rm);
    match kind {
        SimdArithKind::Add => emit::padd(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::Sub => emit::psub(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::Mul => emit::pmull(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::SignedSatAdd if elem_width <= 2 => {
            emit::psat_arith(buf, SatArithOp::AddS, SCRATCH_XMM0, SCRATCH_XMM1, elem_width)
        }
        SimdArithKind::SignedSatAdd => emit::padd(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::UnsignedSatAdd if elem_width <= 2 => {
            emit::psat_arith(buf, SatArithOp::AddU, SCRATCH_XMM0, SCRATCH_XMM1, elem_width)
        }
        SimdArithKind::UnsignedSatAdd => emit::padd(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::SignedSatSub if elem_width <= 2 => {
            emit::psat_arith(buf, SatArithOp::SubS, SCRATCH_XMM0, SCRATCH_XMM1, elem_width)
        }
        SimdArithKind::SignedSatSub => emit::psub(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::UnsignedSatSub if elem_width <= 2 => {
            emit::psat_arith(buf, SatArithOp::SubU, SCRATCH_XMM0, SCRATCH_XMM1, elem_width)
        }
        SimdArithKind::UnsignedSatSub => emit::psub(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        // SQDMULH: signed doubling multiply, high half. PMULHW gives the plain (undoubled) high
        // half; doubling a product's high half is equivalent to adding the high half to itself
        // plus folding in the carry out of the low half, which this approximation ignores.
        SimdArithKind::SignedDoublingMulHigh => {
            emit::pmulhw(buf, SCRATCH_XMM0, SCRATCH_XMM1);
            emit::padd(buf, SCRATCH_XMM0, SCRATCH_XMM0, elem_width);
        }
        SimdArithKind::SignedMax => emit::pminmax(buf, PackedMinMaxKind::MaxS, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::SignedMin => emit::pminmax(buf, PackedMinMaxKind::MinS, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::UnsignedMax => emit::pminmax(buf, PackedMinMaxKind::MaxU, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdArithKind::UnsignedMin => emit::pminmax(buf, PackedMinMaxKind::MinU, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
}

fn translate_logic(buf: &mut CodeBuffer, kind: SimdLogicKind, rd: u8, rn: u8, rm: u8, is_128: bool) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    match kind {
        SimdLogicKind::Not => {
            // No packed NOT; XOR against all-ones (built from PCMPEQ of a register against itself).
            emit::pcmpeq(buf, SCRATCH_XMM1, SCRATCH_XMM1, 1);
            emit::pxor(buf, SCRATCH_XMM0, SCRATCH_XMM1);
        }
        _ => {
            regmap::load_vreg(buf, SCRATCH_XMM1, rm);
            match kind {
                SimdLogicKind::And => emit::pand(buf, SCRATCH_XMM0, SCRATCH_XMM1),
                SimdLogicKind::Orr => emit::por(buf, SCRATCH_XMM0, SCRATCH_XMM1),
                SimdLogicKind::Eor => emit::pxor(buf, SCRATCH_XMM0, SCRATCH_XMM1),
                // BIC: dst & !rm. PANDN computes (!dst) & src, so swap operands to get what we want.
                SimdLogicKind::Bic => {
                    emit::pandn(buf, SCRATCH_XMM1, SCRATCH_XMM0);
                    emit::movaps_xmm_xmm(buf, SCRATCH_XMM0, SCRATCH_XMM1);
                }
                // ORN: dst | !rm.
                SimdLogicKind::Orn => {
                    use super::regmap::SCRATCH_XMM2;
                    emit::pcmpeq(buf, SCRATCH_XMM2, SCRATCH_XMM2, 1);
                    emit::pandn(buf, SCRATCH_XMM1, SCRATCH_XMM2);
                    emit::por(buf, SCRATCH_XMM0, SCRATCH_XMM1);
                }
                SimdLogicKind::Not => unreachable!(),
            }
        }
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
}

fn translate_compare(buf: &mut CodeBuffer, kind: SimdCompareKind, rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    regmap::load_vreg(buf, SCRATCH_XMM1, rm);
    match kind {
        SimdCompareKind::Eq => emit::pcmpeq(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        SimdCompareKind::Gt => emit::pcmpgt(buf, SCRATCH_XMM0, SCRATCH_XMM1, elem_width),
        // GE(a,b) = !GT(b,a): swap the compare, then invert every lane.
        SimdCompareKind::Ge => {
            emit::pcmpgt(buf, SCRATCH_XMM1, SCRATCH_XMM0, elem_width);
            emit::pcmpeq(buf, SCRATCH_XMM0, SCRATCH_XMM0, elem_width);
            emit::pxor(buf, SCRATCH_XMM0, SCRATCH_XMM1);
        }
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
}

fn translate_abs(buf: &mut CodeBuffer, rd: u8, rn: u8, elem_width: u8, is_128: bool) {
    if elem_width <= 4 {
        regmap::load_vreg(buf, SCRATCH_XMM0, rn);
        emit::pabs(buf, SCRATCH_XMM0, SCRATCH_XMM0, elem_width);
        regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
    } else {
        // No PABSQ pre-AVX512; fall back to a per-lane software absolute value.
        lane_map(buf, rd, rn, elem_width, is_128, |buf, gpr| {
            emit::test_reg_reg(buf, gpr, gpr, true);
            let js_at = buf.current_size();
            emit::jcc_rel32(buf, X86Cond::Jns, 0);
            emit::neg_reg(buf, gpr, true);
            let after = buf.current_size();
            if !buf.is_overflowed() {
                let rel = (after - (js_at + 6)) as i32;
                buf.patch_word32_at(js_at + 2, rel as u32);
            }
        });
    }
}

/// Bit-reversal within each byte of the vector (AArch64 `RBIT` on a vector register always
/// operates byte-wise, regardless of any lane-width notion). Reverses both 64-bit halves with the
/// classic three-step swap-mask trick, since the repeating byte-pattern masks (`0x55`, `0x33`,
/// `0x0F`) make this exact across a whole 64-bit register at once, without a per-byte loop.
fn translate_rbit(buf: &mut CodeBuffer, rd: u8, rn: u8, is_128: bool) {
    use super::regmap::SCRATCH_4;

    regmap::load_vreg(buf, SCRATCH_XMM0, rn);

    let mut high: Option<GpReg> = None;
    if is_128 {
        emit::pextr(buf, SCRATCH_0, SCRATCH_XMM0, 1, 8);
        reverse_bits_in_each_byte(buf, SCRATCH_0);
        emit::mov_reg_reg(buf, SCRATCH_4, SCRATCH_0, true);
        high = Some(SCRATCH_4);
    }

    emit::movq_gpr_from_xmm(buf, SCRATCH_0, SCRATCH_XMM0);
    reverse_bits_in_each_byte(buf, SCRATCH_0);
    emit::movq_xmm_from_gpr(buf, SCRATCH_XMM0, SCRATCH_0); // also zeroes the upper 64 bits

    if let Some(high) = high {
        emit::pinsr(buf, SCRATCH_XMM0, high, 1, 8);
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_0, rd, is_128);
}

fn reverse_bits_in_each_byte(buf: &mut CodeBuffer, reg: GpReg) {
    reverse_step(buf, reg, 1, 0x5555_5555_5555_5555);
    reverse_step(buf, reg, 2, 0x3333_3333_3333_3333);
    reverse_step(buf, reg, 4, 0x0F0F_0F0F_0F0F_0F0F);
}

fn reverse_step(buf: &mut CodeBuffer, reg: GpReg, shift: u8, mask: u64) {
    emit::mov_reg_reg(buf, SCRATCH_1, reg, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shr, SCRATCH_1, shift, true);
    emit::mov_reg_imm64(buf, SCRATCH_0, mask);
    emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_1, SCRATCH_0, true);
    emit::arith_reg_reg(buf, ArithOp::And, reg, SCRATCH_0, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shl, reg, shift, true);
    emit::arith_reg_reg(buf, ArithOp::Or, reg, SCRATCH_1, true);
}

/// `CLZ(x) = width - 1 - BSR(x)` for nonzero `x`; `CLZ(0) = width` by AArch64 convention. `gpr`
/// holds a zero-extended `width`-bit lane value on entry and the lane's leading-zero count on
/// exit.
fn clz_lane(buf: &mut CodeBuffer, gpr: GpReg, width: u32) {
    emit::test_reg_reg(buf, gpr, gpr, width == 64);
    let jz_at = buf.current_size();
    emit::jcc_rel32(buf, X86Cond::Je, 0);
    emit::bsr_reg_reg(buf, gpr, gpr, width == 64);
    emit::neg_reg(buf, gpr, width == 64);
    emit::arith_reg_imm32(buf, ArithOp::Add, gpr, width - 1, width == 64);
    let jmp_at = buf.current_size();
    emit::jmp_rel32(buf, 0);
    let set_width_at = buf.current_size();
    if !buf.is_overflowed() {
        let rel = (set_width_at - (jz_at + 6)) as i32;
        buf.patch_word32_at(jz_at + 2, rel as u32);
    }
    emit::mov_reg_imm32(buf, gpr, width, false);
    let after = buf.current_size();
    if !buf.is_overflowed() {
        let rel = (after - (jmp_at + 5)) as i32;
        buf.patch_word32_at(jmp_at + 1, rel as u32);
    }
}

/// `CLS(x) = CLZ(x XOR sign_extend(x >> (width-1))) - 1`: normalizing by the replicated sign bit
/// turns "count leading bits equal to the sign" into an ordinary leading-zero count of the
/// normalized value, one greater than `CLS` itself (which counts leading sign bits excluding the
/// sign bit).
fn cls_lane(buf: &mut CodeBuffer, gpr: GpReg, width: u32) {
    emit::mov_reg_reg(buf, SCRATCH_1, gpr, true);
    emit::shift_reg_imm8(buf, emit::ShiftOp::Shr, SCRATCH_1, (width - 1) as u8, true);
    emit::arith_reg_imm8(buf, ArithOp::And, SCRATCH_1, 1, true);
    emit::neg_reg(buf, SCRATCH_1, true);
    let width_mask: u64 = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    emit::mov_reg_imm64(buf, regmap::SCRATCH_2, width_mask);
    emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_1, regmap::SCRATCH_2, true);
    emit::arith_reg_reg(buf, ArithOp::Xor, gpr, SCRATCH_1, true);
    clz_lane(buf, gpr, width);
    emit::arith_reg_imm8(buf, ArithOp::Sub, gpr, 1, true);
}

/// Extracts every active lane of `rn` into a GPR, applies `f`, and writes the lanes back into
/// `rd`. Used for the software sequences (`CLZ`/`CLS`/software `ABS`) that have no single packed
/// host instruction.
fn lane_map(
    buf: &mut CodeBuffer,
    rd: u8,
    rn: u8,
    elem_width: u8,
    is_128: bool,
    mut f: impl FnMut(&mut CodeBuffer, GpReg),
) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    let count = lane_count(elem_width, is_128);
    for lane in 0..count {
        emit::pextr(buf, SCRATCH_0, SCRATCH_XMM0, lane, elem_width);
        f(buf, SCRATCH_0);
        emit::pinsr(buf, SCRATCH_XMM0, SCRATCH_0, lane, elem_width);
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_1, rd, is_128);
}

fn translate_reduce(buf: &mut CodeBuffer, kind: SimdReduceKind, rd: u8, rn: u8, elem_width: u8, is_128: bool) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    let count = lane_count(elem_width, is_128);
    emit::pextr(buf, SCRATCH_0, SCRATCH_XMM0, 0, elem_width);
    for lane in 1..count {
        emit::pextr(buf, SCRATCH_1, SCRATCH_XMM0, lane, elem_width);
        match kind {
            SimdReduceKind::AddAcross => emit::arith_reg_reg(buf, ArithOp::Add, SCRATCH_0, SCRATCH_1, true),
            SimdReduceKind::SignedMaxAcross => cmov_extreme(buf, X86Cond::Jg, SCRATCH_0, SCRATCH_1),
            SimdReduceKind::SignedMinAcross => cmov_extreme(buf, X86Cond::Jl, SCRATCH_0, SCRATCH_1),
            SimdReduceKind::UnsignedMaxAcross => cmov_extreme(buf, X86Cond::Ja, SCRATCH_0, SCRATCH_1),
            SimdReduceKind::UnsignedMinAcross => cmov_extreme(buf, X86Cond::Jb, SCRATCH_0, SCRATCH_1),
        }
    }
    emit::movq_xmm_from_gpr(buf, SCRATCH_XMM0, SCRATCH_0);
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_1, rd, false);
}

/// Keeps `acc` if `acc <cond> candidate` already holds, otherwise replaces it with `candidate`:
/// `CMP acc, candidate` then `CMOVcc acc, candidate` with the complementary condition, i.e. moves
/// when `acc` does *not* already satisfy the ordering being folded in.
fn cmov_extreme(buf: &mut CodeBuffer, keep_cond: X86Cond, acc: GpReg, candidate: GpReg) {
    emit::arith_reg_reg(buf, ArithOp::Cmp, acc, candidate, true);
    emit::cmovcc_reg_reg(buf, keep_cond.invert(), acc, candidate, true);
}

fn translate_dup(buf: &mut CodeBuffer, rd: u8, rn: u8, elem_width: u8, is_128: bool) {
    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    emit::pextr(buf, SCRATCH_0, SCRATCH_XMM0, 0, elem_width);
    let count = lane_count(elem_width, is_128);
    for lane in 0..count {
        emit::pinsr(buf, SCRATCH_XMM0, SCRATCH_0, lane, elem_width);
    }
    regmap::store_vreg_sized(buf, SCRATCH_XMM0, SCRATCH_1, rd, is_128);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PermuteKind {
    Zip1,
    Zip2,
    Uzp1,
    Trn1,
}

/// Which source vector and which of its lanes supplies output lane `j`, out of `count` active
/// lanes, for a given two-register permute.
fn permute_source(kind: PermuteKind, j: u8, count: u8) -> (bool, u8) {
    let half = count / 2;
    match kind {
        PermuteKind::Zip1 => (j % 2 == 1, j / 2),
        PermuteKind::Zip2 => (j % 2 == 1, half + j / 2),
        PermuteKind::Uzp1 => {
            if j < half {
                (false, j * 2)
            } else {
                (true, (j - half) * 2)
            }
        }
        PermuteKind::Trn1 => (j % 2 == 1, j - (j % 2)),
    }
}

/// Builds the two `PSHUFB` control masks (one per source register) that together realize a
/// two-source lane permute: byte `p` of `maskN`/`maskM` names the source byte to pull into output
/// position `p` when that byte comes from `Vn`/`Vm` respectively, or `0x80` (PSHUFB's "zero this
/// byte" marker) when it comes from the other source or lies outside the active lane range.
fn build_permute_masks(kind: PermuteKind, elem_width: u8, is_128: bool) -> ([u8; 16], [u8; 16]) {
    let active_bytes = if is_128 { 16 } else { 8 };
    let count = lane_count(elem_width, is_128);
    let mut mask_n = [0x80u8; 16];
    let mut mask_m = [0x80u8; 16];

    for p in 0..active_bytes {
        let lane = p / elem_width;
        let byte_in_lane = p % elem_width;
        let (from_m, src_lane) = permute_source(kind, lane, count);
        let src_byte = src_lane * elem_width + byte_in_lane;
        if from_m {
            mask_m[p as usize] = src_byte;
        } else {
            mask_n[p as usize] = src_byte;
        }
    }
    (mask_n, mask_m)
}

fn load_xmm_mask(buf: &mut CodeBuffer, dst: XmmReg, mask: [u8; 16]) {
    let lo = u64::from_le_bytes(mask[0..8].try_into().unwrap());
    let hi = u64::from_le_bytes(mask[8..16].try_into().unwrap());
    emit::mov_reg_imm64(buf, SCRATCH_0, lo);
    emit::movq_xmm_from_gpr(buf, dst, SCRATCH_0);
    emit::mov_reg_imm64(buf, SCRATCH_0, hi);
    emit::pinsr(buf, dst, SCRATCH_0, 1, 8);
}

fn permute_two_source(buf: &mut CodeBuffer, kind: PermuteKind, rd: u8, rn: u8, rm: u8, elem_width: u8, is_128: bool) {
    let (mask_n, mask_m) = build_permute_masks(kind, elem_width, is_128);

    regmap::load_vreg(buf, SCRATCH_XMM0, rn);
    load_xmm_mask(buf, regmap::SCRATCH_XMM1, mask_n);
    emit::pshufb(buf, SCRATCH_XMM0, regmap::SCRATCH_XMM1);

    let result_from_n = SCRATCH_XMM0;
    let result_from_m = regmap::SCRATCH_XMM2;
    regmap::load_vreg(buf, result_from_m, rm);
    load_xmm_mask(buf, regmap::SCRATCH_XMM1, mask_m);
    emit::pshufb(buf, result_from_m, regmap::SCRATCH_XMM1);

    emit::por(buf, result_from_n, result_from_m);
    regmap::store_vreg_sized(buf, result_from_n, SCRATCH_0, rd, is_128);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_add_roundtrips() {
        let mut buf = CodeBuffer::new(256);
        translate_simd(
            &mut buf,
            SimdOp::Arith { kind: SimdArithKind::Add, rd: 0, rn: 1, rm: 2, elem_width: 4, is_128: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn clz_handles_the_zero_lane() {
        let mut buf = CodeBuffer::new(512);
        translate_simd(&mut buf, SimdOp::Clz { rd: 0, rn: 1, elem_width: 4, is_128: true });
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn zip1_permute_emits_without_overflowing() {
        let mut buf = CodeBuffer::new(512);
        translate_simd(
            &mut buf,
            SimdOp::Zip1 { rd: 0, rn: 1, rm: 2, elem_width: 4, is_128: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn reduce_add_across_folds_every_lane() {
        let mut buf = CodeBuffer::new(512);
        translate_simd(&mut buf, SimdOp::Reduce { kind: SimdReduceKind::AddAcross, rd: 0, rn: 1, elem_width: 4, is_128: true });
        assert!(!buf.is_overflowed());
    }
}
