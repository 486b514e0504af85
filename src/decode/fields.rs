//! Position-indexed bit-field extraction helpers shared by every rule in [`super::classify`].

/// Extracts the inclusive bit range `[lo, hi]` of `word`, right-aligned.
#[inline]
pub fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    debug_assert!(hi >= lo && hi < 32);
    let width = hi - lo + 1;
    let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
    (word >> lo) & mask
}

#[inline]
pub fn bit(word: u32, index: u32) -> bool {
    bits(word, index, index) != 0
}

/// Sign-extends the low `width` bits of `value` to an `i64`.
#[inline]
pub fn sign_extend(value: u32, width: u32) -> i64 {
    debug_assert!(width > 0 && width <= 32);
    let shift = 32 - width;
    (((value << shift) as i32) >> shift) as i64
}

/// Sign-extends a PC-relative word-offset field and scales it to a byte offset in one step:
/// `((encoding_slice << (32 - width)) as signed) >> (32 - width - scale)`, with `scale = 2` since
/// AArch64 branch targets are word (4-byte) aligned.
#[inline]
pub fn pc_rel_byte_offset(field: u32, width: u32) -> i64 {
    debug_assert!(width > 0 && width <= 30);
    let shift_up = 32 - width;
    let shift_down = 32 - width - 2;
    (((field << shift_up) as i32) >> shift_down) as i64
}

/// `Rd`, the destination register field, bits [4:0].
#[inline]
pub fn rd(word: u32) -> u8 {
    bits(word, 4, 0) as u8
}

/// `Rn`, the first source register field, bits [9:5].
#[inline]
pub fn rn(word: u32) -> u8 {
    bits(word, 9, 5) as u8
}

/// `Rm`, the second source register field, bits [20:16].
#[inline]
pub fn rm(word: u32) -> u8 {
    bits(word, 20, 16) as u8
}

/// `Rt`, the transfer register field for loads/stores, bits [4:0] (same position as `Rd`).
#[inline]
pub fn rt(word: u32) -> u8 {
    rd(word)
}

/// `Rt2`, the second transfer register for load/store pair, bits [14:10].
#[inline]
pub fn rt2(word: u32) -> u8 {
    bits(word, 14, 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_named_fields_of_adds_immediate() {
        // ADDS X1, X1, #1 = 0x91000421
        let w = 0x9100_0421u32;
        assert_eq!(rd(w), 1);
        assert_eq!(rn(w), 1);
        assert_eq!(bits(w, 21, 10), 1); // imm12
    }

    #[test]
    fn sign_extend_round_trips_negative_values() {
        assert_eq!(sign_extend(0x1FF, 9), -1);
        assert_eq!(sign_extend(0x0FF, 9), 255);
    }

    #[test]
    fn pc_rel_offset_scales_by_four() {
        // Word offset of 2 (i.e. +8 bytes), 26-bit field, as in `B +8`.
        assert_eq!(pc_rel_byte_offset(2, 26), 8);
        assert_eq!(pc_rel_byte_offset((-2i32 as u32) & 0x03FF_FFFF, 26), -8);
    }
}
