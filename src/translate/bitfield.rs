//! Bitfield-move translation: `SBFM`/`BFM`/`UBFM` (covering the guest's `SXTB`/`SXTH`/`SXTW`/
//! `UXTB`/`UXTH`/`LSL`/`LSR`/`ASR`/`BFI`/`BFIZ`/`BFXIL` aliases) plus the `EXTR`/`ROR` alias.
//!
//! `imms >= immr` ("extract" class — `UBFX`/`SBFX`/`BFXIL`, and the plain-shift aliases `LSR`/
//! `ASR`) and `imms < immr` ("insert" class — `LSL`/`UBFIZ`/`SBFIZ`/`BFI`) are genuinely different
//! operations and are translated along separate paths rather than through one shared rotate-then-
//! mask formula:
//!
//! - Extract: the field lives at source bits `[imms:immr]`; shift it down to bit 0 and mask to its
//!   `len = imms - immr + 1` bits.
//! - Insert: the field is the source's low `imms + 1` bits, inserted at destination bit
//!   `lsb = width - immr`. Rotating the whole source right by `immr` first (as the extract case
//!   does) would pull in source bits above the field and land them in the gap below `lsb` instead
//!   of the zero/sign fill that `UBFIZ`/`SBFIZ` specify there — the field must be masked out of
//!   the source *before* it is repositioned, not after.

use crate::buffer::CodeBuffer;
use crate::decode::op::{BitfieldKind, BitfieldOp};
use crate::emit::{self, ArithOp, ShiftOp};

use super::regmap::{self, SCRATCH_0, SCRATCH_1, SCRATCH_2};

pub fn translate_bitfield(buf: &mut CodeBuffer, op: BitfieldOp) {
    let width: u32 = if op.is_64bit { 64 } else { 32 };
    let immr = op.immr as u32;
    let imms = op.imms as u32;

    if matches!(op.kind, BitfieldKind::Ror) {
        // EXTR/ROR alias: a plain rotate, no field extraction or masking involved.
        regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rn, op.is_64bit);
        if immr != 0 {
            emit::shift_reg_imm8(buf, ShiftOp::Ror, SCRATCH_0, immr as u8, op.is_64bit);
        }
        regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        return;
    }

    if imms >= immr {
        translate_extract(buf, op, width, immr, imms);
    } else {
        translate_insert(buf, op, width, immr, imms);
    }
}

/// `imms >= immr`: the field occupies source bits `[imms:immr]`. Shift it down to bit 0 and mask
/// to its `len` bits (`UBFX`/`LSR`/`LSL`-by-ASR-alias), sign-extend it (`SBFX`/`ASR`), or merge it
/// into the low `len` bits of the untouched destination (`BFXIL`).
fn translate_extract(buf: &mut CodeBuffer, op: BitfieldOp, width: u32, immr: u32, imms: u32) {
    let len = imms - immr + 1;
    let mask: u64 = if len >= 64 { u64::MAX } else { (1u64 << len) - 1 };

    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rn, op.is_64bit);
    if immr != 0 {
        emit::shift_reg_imm8(buf, ShiftOp::Shr, SCRATCH_0, immr as u8, op.is_64bit);
    }
    emit::mov_reg_imm64(buf, SCRATCH_1, mask);
    emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_0, SCRATCH_1, op.is_64bit);

    match op.kind {
        BitfieldKind::Ubfm => {
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        BitfieldKind::Sbfm => {
            let shift_amount = (width - len) as u8;
            if shift_amount != 0 {
                emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_0, shift_amount, op.is_64bit);
                emit::shift_reg_imm8(buf, ShiftOp::Sar, SCRATCH_0, shift_amount, op.is_64bit);
            }
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        BitfieldKind::Bfm => {
            // Merge the extracted field (SCRATCH_0) into the untouched bits of the current
            // destination value (loaded into SCRATCH_1).
            regmap::load_gpr_or_zero(buf, SCRATCH_1, op.rd, op.is_64bit);
            emit::mov_reg_imm64(buf, SCRATCH_2, !mask);
            emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_1, SCRATCH_2, op.is_64bit);
            emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_1, SCRATCH_0, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_1, op.rd);
        }
        BitfieldKind::Ror => unreachable!("handled before the extract/insert split"),
    }
}

/// `imms < immr`: the field is the source's low `width_ins = imms + 1` bits, inserted at
/// destination bit `lsb = width - immr`. `UBFM`/`UBFIZ`/`LSL` zero-fill everywhere else; `SBFM`/
/// `SBFIZ` fill both above *and* below the field with the field's own sign bit (source bit
/// `imms`); `BFM`/`BFI` leave the rest of the destination untouched.
fn translate_insert(buf: &mut CodeBuffer, op: BitfieldOp, width: u32, immr: u32, imms: u32) {
    let width_ins = imms + 1;
    let lsb = width - immr;
    let field_mask: u64 = (1u64 << width_ins) - 1;
    let positioned_mask: u64 = field_mask << lsb;

    // SCRATCH_0 = (Rn & field_mask) << lsb: the field positioned in place, zero everywhere else.
    regmap::load_gpr_or_zero(buf, SCRATCH_0, op.rn, op.is_64bit);
    emit::mov_reg_imm64(buf, SCRATCH_1, field_mask);
    emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_0, SCRATCH_1, op.is_64bit);
    emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_0, lsb as u8, op.is_64bit);

    match op.kind {
        BitfieldKind::Ubfm => {
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        BitfieldKind::Sbfm => {
            // Broadcast the field's sign bit (Rn bit `imms`) across a full register: shift it up
            // into the MSB, then arithmetic-shift back down so every bit equals the sign bit.
            regmap::load_gpr_or_zero(buf, SCRATCH_1, op.rn, op.is_64bit);
            let sign_shift = (width - 1 - imms) as u8;
            if sign_shift != 0 {
                emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_1, sign_shift, op.is_64bit);
            }
            emit::shift_reg_imm8(buf, ShiftOp::Sar, SCRATCH_1, (width - 1) as u8, op.is_64bit);
            // Keep the broadcast sign bit only outside the field, then merge it with the field.
            emit::mov_reg_imm64(buf, SCRATCH_2, !positioned_mask);
            emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_1, SCRATCH_2, op.is_64bit);
            emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_0, SCRATCH_1, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, op.rd);
        }
        BitfieldKind::Bfm => {
            regmap::load_gpr_or_zero(buf, SCRATCH_1, op.rd, op.is_64bit);
            emit::mov_reg_imm64(buf, SCRATCH_2, !positioned_mask);
            emit::arith_reg_reg(buf, ArithOp::And, SCRATCH_1, SCRATCH_2, op.is_64bit);
            emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_1, SCRATCH_0, op.is_64bit);
            regmap::store_gpr_or_discard(buf, SCRATCH_1, op.rd);
        }
        BitfieldKind::Ror => unreachable!("handled before the extract/insert split"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubfm_extract_field_without_wraparound() {
        let mut buf = CodeBuffer::new(128);
        translate_bitfield(
            &mut buf,
            BitfieldOp { kind: BitfieldKind::Ubfm, rd: 0, rn: 1, immr: 8, imms: 15, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn sbfm_sign_extends_a_byte() {
        let mut buf = CodeBuffer::new(128);
        // SXTB: SBFM rd, rn, #0, #7 -> len = 8, sign-extend from bit 7.
        translate_bitfield(
            &mut buf,
            BitfieldOp { kind: BitfieldKind::Sbfm, rd: 0, rn: 1, immr: 0, imms: 7, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn bfm_wraparound_field_preserves_length() {
        let mut buf = CodeBuffer::new(128);
        // immr > imms: an insertion-class field (e.g. BFI), not an extract.
        translate_bitfield(
            &mut buf,
            BitfieldOp { kind: BitfieldKind::Bfm, rd: 0, rn: 1, immr: 60, imms: 3, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn lsl_immediate_class_emits_without_overflowing() {
        // LSL X0, X1, #4 == UBFM X0, X1, #60, #59: an insertion-class (imms < immr) encoding.
        let mut buf = CodeBuffer::new(128);
        translate_bitfield(
            &mut buf,
            BitfieldOp { kind: BitfieldKind::Ubfm, rd: 0, rn: 1, immr: 60, imms: 59, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn ror_alias_emits_without_overflowing() {
        let mut buf = CodeBuffer::new(128);
        translate_bitfield(
            &mut buf,
            BitfieldOp { kind: BitfieldKind::Ror, rd: 0, rn: 1, immr: 4, imms: 0, is_64bit: true },
        );
        assert!(!buf.is_overflowed());
    }
}
