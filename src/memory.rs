//! This module provides the [`GuestMemory`] trait, the abstraction that [`block`](crate::block)
//! discovery reads guest instruction words through. Guest memory is addressed with an identity
//! mapping acceptable to the translator; this trait splits that single idea into the two
//! accessors block discovery and the load/store translators actually need.

use crate::error::Error;

/// A readable view of the guest's instruction (and, for PC-relative literal loads, data) address
/// space.
pub trait GuestMemory {
    /// Reads the little-endian 32-bit instruction word at `guest_addr`.
    fn read_instruction_word(&self, guest_addr: u64) -> Result<u32, Error>;

    /// Returns a byte slice view into the guest memory starting at `guest_addr`, of at least
    /// `len` bytes, for translators that need to read a run of bytes directly (e.g. to fold a
    /// PC-relative literal load at translation time). Returns [`Error::InvalidGuestAddress`] if
    /// the requested range falls outside the backing region.
    fn read_bytes(&self, guest_addr: u64, len: usize) -> Result<&[u8], Error>;
}

/// The simplest possible [`GuestMemory`]: a single contiguous, identity-mapped byte slice.
pub struct FlatGuestMemory<'a> {
    base: u64,
    bytes: &'a [u8],
}

impl<'a> FlatGuestMemory<'a> {
    /// Creates a view over `bytes`, whose first byte is guest address `base`.
    pub fn new(base: u64, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    fn offset_of(&self, guest_addr: u64, len: usize) -> Result<usize, Error> {
        let offset = guest_addr
            .checked_sub(self.base)
            .ok_or(Error::InvalidGuestAddress(guest_addr))?;

        let offset = usize::try_from(offset).map_err(|_| Error::InvalidGuestAddress(guest_addr))?;

        if offset.checked_add(len).map_or(true, |end| end > self.bytes.len()) {
            return Err(Error::InvalidGuestAddress(guest_addr));
        }

        Ok(offset)
    }
}

impl<'a> GuestMemory for FlatGuestMemory<'a> {
    fn read_instruction_word(&self, guest_addr: u64) -> Result<u32, Error> {
        let offset = self.offset_of(guest_addr, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        Ok(u32::from_le_bytes(word))
    }

    fn read_bytes(&self, guest_addr: u64, len: usize) -> Result<&[u8], Error> {
        let offset = self.offset_of(guest_addr, len)?;
        Ok(&self.bytes[offset..offset + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_word_at_base() {
        let bytes = [0x21, 0x04, 0x00, 0x91, 0xC0, 0x03, 0x5F, 0xD6];
        let mem = FlatGuestMemory::new(0x1000, &bytes);
        assert_eq!(mem.read_instruction_word(0x1000).unwrap(), 0x9100_0421);
        assert_eq!(mem.read_instruction_word(0x1004).unwrap(), 0xD65F_03C0);
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let bytes = [0u8; 4];
        let mem = FlatGuestMemory::new(0x1000, &bytes);
        assert!(mem.read_instruction_word(0x0ff0).is_err());
        assert!(mem.read_instruction_word(0x1004).is_err());
    }
}
