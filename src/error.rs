//! This module provides an `Error` type for the crate using the [`thiserror`] crate.
use thiserror::Error;

/// The `Error` type.
#[derive(Debug, Error)]
pub enum Error {
    /// The executable arena has no room left for another block and no further pages could be
    /// reserved.
    #[error("executable arena exhausted")]
    ArenaExhausted,
    /// The requested translation cache capacity is not a power of two.
    #[error("cache capacity must be a power of two, got {0}")]
    InvalidCacheCapacity(usize),
    /// The guest address fell outside of the bounds of the backing [`GuestMemory`](crate::memory::GuestMemory).
    #[error("guest address 0x{0:x} is out of bounds")]
    InvalidGuestAddress(u64),
    /// Wraps [`std::io::Error`].
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Wraps [`mmap_rs::Error`].
    #[error(transparent)]
    Mmap(#[from] mmap_rs::error::Error),
}
