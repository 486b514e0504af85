//! Cryptography-extension translation: `AESE`/`AESD`/`AESMC`/`AESIMC`, `PMULL`/`PMULL2`, and
//! `CRC32`/`CRC32C`.
//!
//! AES-NI's round instructions don't line up with ARM's one-for-one: x86's `AESENC`/`AESDEC`
//! perform a full round including `MixColumns`, while ARM's `AESE`/`AESD` perform only
//! `AddRoundKey`+`SubBytes`+`ShiftRows` (no `MixColumns` — that is `AESMC`'s job as a separate
//! instruction). The "last round" forms, `AESENCLAST`/`AESDECLAST`, drop `MixColumns` and match
//! ARM's step split, with one remaining difference: ARM XORs the round key in *before*
//! `SubBytes`/`ShiftRows`, x86 XORs it in *after*. Folding `rn` into `rd` first and then feeding
//! `AESENCLAST`/`AESDECLAST` a zero "round key" reconciles the two: `ShiftRows(SubBytes(rd ^ rn))
//! ^ 0` is exactly ARM's `AESE` result.
//!
//! x86 has no forward-only `MixColumns` instruction, only `AESIMC` (`InvMixColumns`). The AES
//! `MixColumns` matrix has order 4 (`M^4 = I`), so `M = M^{-1} . M^{-1} . M^{-1}`: applying
//! `AESIMC` three times computes forward `AESMC`.

use crate::buffer::CodeBuffer;
use crate::decode::op::CryptoOp;
use crate::emit::{self, ArithOp, ShiftOp};

use super::regmap::{
    self, SCRATCH_0, SCRATCH_1, SCRATCH_2, SCRATCH_4, SCRATCH_XMM0, SCRATCH_XMM1, SCRATCH_XMM2,
};

/// Reflected polynomial for plain `CRC32` (ISO 3309 / the zlib-style polynomial), used only by the
/// software fallback below.
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

/// Reflected polynomial for `CRC32C` (Castagnoli), matching what the host `CRC32` instruction
/// computes directly.
const CRC32C_POLY_REFLECTED: u32 = 0x82F6_3B78;

pub fn translate_crypto(buf: &mut CodeBuffer, op: CryptoOp) {
    match op {
        CryptoOp::Aese { rd, rn } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rd);
            regmap::load_vreg(buf, SCRATCH_XMM1, rn);
            emit::pxor(buf, SCRATCH_XMM0, SCRATCH_XMM1);
            emit::pxor(buf, SCRATCH_XMM2, SCRATCH_XMM2);
            emit::aesenclast(buf, SCRATCH_XMM0, SCRATCH_XMM2);
            regmap::store_vreg(buf, SCRATCH_XMM0, rd);
        }
        CryptoOp::Aesd { rd, rn } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rd);
            regmap::load_vreg(buf, SCRATCH_XMM1, rn);
            emit::pxor(buf, SCRATCH_XMM0, SCRATCH_XMM1);
            emit::pxor(buf, SCRATCH_XMM2, SCRATCH_XMM2);
            emit::aesdeclast(buf, SCRATCH_XMM0, SCRATCH_XMM2);
            regmap::store_vreg(buf, SCRATCH_XMM0, rd);
        }
        CryptoOp::Aesmc { rd, rn } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            // InvMixColumns applied three times equals forward MixColumns (order-4 matrix).
            emit::aesimc(buf, SCRATCH_XMM0, SCRATCH_XMM0);
            emit::aesimc(buf, SCRATCH_XMM0, SCRATCH_XMM0);
            emit::aesimc(buf, SCRATCH_XMM0, SCRATCH_XMM0);
            regmap::store_vreg(buf, SCRATCH_XMM0, rd);
        }
        CryptoOp::Aesimc { rd, rn } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            emit::aesimc(buf, SCRATCH_XMM0, SCRATCH_XMM0);
            regmap::store_vreg(buf, SCRATCH_XMM0, rd);
        }
        CryptoOp::Pmull { rd, rn, rm, high } => {
            regmap::load_vreg(buf, SCRATCH_XMM0, rn);
            regmap::load_vreg(buf, SCRATCH_XMM1, rm);
            let imm8 = if high { 0x11 } else { 0x00 };
            emit::pclmulqdq(buf, SCRATCH_XMM0, SCRATCH_XMM1, imm8);
            regmap::store_vreg(buf, SCRATCH_XMM0, rd);
        }
        CryptoOp::Crc32 { rd, rn, rm, size, castagnoli } => {
            // The accumulator (`rn`/`rd`) is always 32 bits wide, even for the `CRC32X` form whose
            // data operand is 64-bit.
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rn, false);
            regmap::load_gpr_or_zero(buf, SCRATCH_1, rm, size == 8);

            // The host `CRC32` instruction (SSE4.2) only ever computes Castagnoli, so it is used
            // when both the host supports it and the guest asked for that polynomial; every other
            // combination goes through the bit-serial software fallback below.
            if castagnoli && std::is_x86_feature_detected!("sse4.2") {
                emit::crc32(buf, SCRATCH_0, SCRATCH_1, size, false);
            } else {
                let poly = if castagnoli { CRC32C_POLY_REFLECTED } else { CRC32_POLY_REFLECTED };
                emit_software_crc32(buf, poly, size);
            }

            regmap::store_gpr_or_discard(buf, SCRATCH_0, rd);
        }
    }
}

/// Bit-serial reflected CRC update, covering the host's lack of a plain (non-Castagnoli) `CRC32`
/// instruction and pre-SSE4.2 hosts entirely. Mirrors the textbook byte-at-a-time table-free
/// algorithm — fold the next input byte into the accumulator's low byte, then shift/XOR eight
/// times — fully unrolled at translation time since `size` (1, 2, 4 or 8) is known here, not at
/// guest runtime. The per-bit step avoids a data-dependent branch via the standard
/// `mask = -(acc & 1)` trick: `acc = (acc >> 1) ^ (poly & mask)`.
///
/// Expects the accumulator in `SCRATCH_0` and the data operand in `SCRATCH_1`; leaves the updated
/// accumulator in `SCRATCH_0`. Clobbers `SCRATCH_1`/`SCRATCH_2`/`SCRATCH_4`.
fn emit_software_crc32(buf: &mut CodeBuffer, poly: u32, size: u8) {
    for byte_index in 0..size {
        emit::mov_reg_reg(buf, SCRATCH_2, SCRATCH_1, false);
        if byte_index != 0 {
            emit::shift_reg_imm8(buf, ShiftOp::Shr, SCRATCH_2, byte_index * 8, false);
        }
        emit::arith_reg_imm32(buf, ArithOp::And, SCRATCH_2, 0xFF, false);
        emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_0, SCRATCH_2, false);

        for _ in 0..8 {
            emit::mov_reg_reg(buf, SCRATCH_4, SCRATCH_0, false);
            emit::arith_reg_imm8(buf, ArithOp::And, SCRATCH_4, 1, false);
            emit::neg_reg(buf, SCRATCH_4, false);
            emit::arith_reg_imm32(buf, ArithOp::And, SCRATCH_4, poly, false);
            emit::shift_reg_imm8(buf, ShiftOp::Shr, SCRATCH_0, 1, false);
            emit::arith_reg_reg(buf, ArithOp::Xor, SCRATCH_0, SCRATCH_4, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aese_folds_round_key_in_before_subbytes() {
        let mut buf = CodeBuffer::new(128);
        translate_crypto(&mut buf, CryptoOp::Aese { rd: 0, rn: 1 });
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn aesmc_applies_aesimc_three_times() {
        let mut buf = CodeBuffer::new(128);
        translate_crypto(&mut buf, CryptoOp::Aesmc { rd: 0, rn: 1 });
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn pmull2_selects_the_high_lane() {
        let mut buf = CodeBuffer::new(128);
        translate_crypto(&mut buf, CryptoOp::Pmull { rd: 0, rn: 1, rm: 2, high: true });
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn crc32_roundtrips_through_the_host_instruction() {
        let mut buf = CodeBuffer::new(128);
        translate_crypto(
            &mut buf,
            CryptoOp::Crc32 { rd: 0, rn: 1, rm: 2, size: 4, castagnoli: true },
        );
        assert!(!buf.is_overflowed());
    }

    #[test]
    fn plain_crc32_always_takes_the_software_path() {
        // The host instruction only ever computes Castagnoli, so the non-`C` polynomial must
        // never reach `emit::crc32`, regardless of what the host supports.
        let mut buf = CodeBuffer::new(4096);
        translate_crypto(
            &mut buf,
            CryptoOp::Crc32 { rd: 0, rn: 1, rm: 2, size: 8, castagnoli: false },
        );
        assert!(!buf.is_overflowed());
    }
}
