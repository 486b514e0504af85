//! Host x86_64 register enumerations used by [`super::x86`]'s encoding functions.

/// A general-purpose host register, numbered exactly as the x86_64 ModR/M and REX encodings
/// number them (0..=15; `4` is `RSP`, `5` is `RBP`, both of which need SIB/disp8 special-casing
/// wherever they appear as a base register).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum GpReg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl GpReg {
    /// The 0..15 register index used to number ModR/M and SIB fields, as well as REX.R/X/B.
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// The low 3 bits of the register number, i.e. what fits directly in a ModR/M or SIB field
    /// before REX extends it with a fourth bit.
    #[inline]
    pub fn low3(self) -> u8 {
        self.index() & 0b111
    }

    /// Whether this register needs a REX prefix just to be named (`R8`..`R15`).
    #[inline]
    pub fn is_extended(self) -> bool {
        self.index() >= 8
    }

    /// Builds a register from a raw 0..15 index (caller-checked).
    pub fn from_index(index: u8) -> Self {
        debug_assert!(index < 16);
        // SAFETY-free: all values 0..16 are valid discriminants of this field-less repr(u8) enum.
        unsafe { core::mem::transmute(index & 0x0f) }
    }
}

/// A host SSE/AVX vector register (`XMM0`..`XMM15`), numbered the same way as [`GpReg`] for
/// ModR/M/REX purposes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum XmmReg {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
    Xmm8 = 8,
    Xmm9 = 9,
    Xmm10 = 10,
    Xmm11 = 11,
    Xmm12 = 12,
    Xmm13 = 13,
    Xmm14 = 14,
    Xmm15 = 15,
}

impl XmmReg {
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn low3(self) -> u8 {
        self.index() & 0b111
    }

    #[inline]
    pub fn is_extended(self) -> bool {
        self.index() >= 8
    }

    pub fn from_index(index: u8) -> Self {
        debug_assert!(index < 16);
        unsafe { core::mem::transmute(index & 0x0f) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_registers_are_recognized() {
        assert!(!GpReg::Rax.is_extended());
        assert!(GpReg::R8.is_extended());
        assert_eq!(GpReg::R12.low3(), 0b100);
    }

    #[test]
    fn from_index_round_trips() {
        for i in 0..16u8 {
            assert_eq!(GpReg::from_index(i).index(), i);
            assert_eq!(XmmReg::from_index(i).index(), i);
        }
    }
}
