//! This module provides [`ExecutableArena`], the opaque allocator that backs committed
//! translations with read+execute host memory: `alloc(size) -> pointer` and `teardown()`.
//!
//! A region starts out writable, gets the translated bytes copied in, and is then converted to a
//! read+execute mapping, the same shape [`crate::error::Error::Mmap`] wraps `mmap_rs`'s own
//! `Mmap`/`MmapMut` pair around. `mmap_rs` only exposes protection transitions on a whole mapping
//! object rather than a sub-range of one, so each committed block gets its own page-rounded
//! mapping instead of being bump-allocated out of one shared slab; the arena's role is to own the
//! resulting collection of mappings for the lifetime of the translator and to hand back stable
//! pointers into them.

use mmap_rs::MmapOptions;

use crate::error::Error;

/// A committed, executable region of host code.
pub struct ExecutableArena {
    regions: Vec<mmap_rs::Mmap>,
}

impl ExecutableArena {
    pub fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Copies `bytes` into a freshly allocated read+execute mapping and returns a pointer to the
    /// start of the copy. The host code region a valid descriptor points at stays readable and
    /// executable until [`ExecutableArena::teardown`] drops the whole arena.
    ///
    /// Returns [`Error::ArenaExhausted`] if the host refuses to grant the mapping.
    pub fn alloc(&mut self, bytes: &[u8]) -> Result<*const u8, Error> {
        if bytes.is_empty() {
            return Err(Error::ArenaExhausted);
        }

        let mut mapping = MmapOptions::new(bytes.len())
            .map_err(|_| Error::ArenaExhausted)?
            .map_mut()
            .map_err(|_| Error::ArenaExhausted)?;

        mapping[..bytes.len()].copy_from_slice(bytes);

        let mapping = mapping.make_exec().map_err(|(_, e)| Error::Mmap(e))?;
        mapping.flush_icache().map_err(Error::Mmap)?;

        let ptr = mapping.as_ptr();
        self.regions.push(mapping);

        Ok(ptr)
    }

    /// The number of distinct committed regions currently held by the arena.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Releases every region owned by this arena. Any pointers previously returned by
    /// [`ExecutableArena::alloc`] become dangling after this call.
    pub fn teardown(&mut self) {
        self.regions.clear();
    }
}

impl Default for ExecutableArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_stable_pointer_until_teardown() {
        let mut arena = ExecutableArena::new();
        let code = [0xC3u8]; // RET
        let ptr = arena.alloc(&code).expect("allocation should succeed");
        assert!(!ptr.is_null());
        assert_eq!(arena.region_count(), 1);

        arena.teardown();
        assert_eq!(arena.region_count(), 0);
    }

    #[test]
    fn empty_emission_is_rejected() {
        let mut arena = ExecutableArena::new();
        assert!(arena.alloc(&[]).is_err());
    }
}
