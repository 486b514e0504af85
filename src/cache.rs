//! The translation cache: a fixed-capacity, direct-mapped table from guest PC to
//! [`BlockDescriptor`], the identity and metadata of one committed translation living in the
//! [`crate::arena::ExecutableArena`].
//!
//! Capacity must be a power of two so the hash-to-slot step is a mask instead of a modulo.
//! Collisions are resolved by last-writer-wins eviction — no chaining, no probing.

use bitflags::bitflags;

use crate::error::Error;

bitflags! {
    /// A 16-bit bitfield: `valid=0x01, cached=0x02, hot=0x04, branch-terminated=0x08,
    /// syscall-terminated=0x10`. `TRUNCATED` and `UNSUPPORTED` extend that canonical five-bit list
    /// with two additional descriptor-level markers (a block whose code buffer overflowed, and one
    /// whose `HVC`/`SMC` translation had no host equivalent); see `DESIGN.md` for this resolution.
    pub struct BlockFlags: u16 {
        const VALID = 0x01;
        const CACHED = 0x02;
        const HOT = 0x04;
        const BRANCH_TERMINATED = 0x08;
        const SYSCALL_TERMINATED = 0x10;
        const TRUNCATED = 0x20;
        const UNSUPPORTED = 0x40;
    }
}

/// One committed translation's identity and metadata.
///
/// Identity is `guest_pc`; the referenced host code itself lives in the executable arena and
/// outlives any particular descriptor describing it.
#[derive(Clone, Copy, Debug)]
pub struct BlockDescriptor {
    pub guest_pc: u64,
    pub host_pc: u64,
    pub guest_size: u32,
    pub host_size: u32,
    pub insn_count: u16,
    pub flags: BlockFlags,
    pub hash: u32,
    pub refcount: u32,
    pub hit_count: u32,
}

/// Aggregate cache counters: total valid-slot count, hits, misses, hit rate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub valid_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// `mix(x) = ((x ^ (x >> 32)) as u32) * 0x9E3779B1` (Knuth's multiplicative hash).
fn mix(pc: u64) -> u32 {
    ((pc ^ (pc >> 32)) as u32).wrapping_mul(0x9E37_79B1)
}

pub struct TranslationCache {
    mask: u32,
    slots: Vec<Option<BlockDescriptor>>,
    hits: u64,
    misses: u64,
}

impl TranslationCache {
    /// Creates an empty cache with room for `capacity` descriptors. `capacity` must be a power of
    /// two; anything else is [`Error::InvalidCacheCapacity`].
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(Error::InvalidCacheCapacity(capacity));
        }

        Ok(Self {
            mask: (capacity - 1) as u32,
            slots: vec![None; capacity],
            hits: 0,
            misses: 0,
        })
    }

    fn slot_index(&self, pc: u64) -> usize {
        (mix(pc) & self.mask) as usize
    }

    /// Looks up `pc`. A hit requires both a valid descriptor in the computed slot *and* that its
    /// stored `guest_pc` matches the query — two different PCs can compute the same slot, so the
    /// stored PC is still checked. A hit increments `refcount` and `hit_count` on the descriptor
    /// and the cache-wide hit counter; a miss increments the miss counter.
    pub fn lookup(&mut self, pc: u64) -> Option<&BlockDescriptor> {
        let idx = self.slot_index(pc);
        let is_hit = matches!(
            &self.slots[idx],
            Some(desc) if desc.flags.contains(BlockFlags::VALID) && desc.guest_pc == pc
        );

        if is_hit {
            let desc = self.slots[idx].as_mut().expect("checked above");
            desc.refcount = desc.refcount.saturating_add(1);
            desc.hit_count = desc.hit_count.saturating_add(1);
            self.hits += 1;
            self.slots[idx].as_ref()
        } else {
            self.misses += 1;
            None
        }
    }

    /// Inserts a freshly translated block, unconditionally overwriting whatever previously
    /// occupied the computed slot (last-writer-wins). `extra_flags` carries the caller's
    /// block-shape bits
    /// (`BRANCH_TERMINATED`/`SYSCALL_TERMINATED`/`TRUNCATED`/`UNSUPPORTED`); `VALID` and `CACHED`
    /// are set here regardless of what the caller passes.
    pub fn insert(
        &mut self,
        pc: u64,
        host_pc: u64,
        guest_size: u32,
        host_size: u32,
        insn_count: u16,
        extra_flags: BlockFlags,
    ) {
        let idx = self.slot_index(pc);
        let hash = mix(pc);

        self.slots[idx] = Some(BlockDescriptor {
            guest_pc: pc,
            host_pc,
            guest_size,
            host_size,
            insn_count,
            flags: extra_flags | BlockFlags::VALID | BlockFlags::CACHED,
            hash,
            refcount: 1,
            hit_count: 0,
        });
    }

    /// Removes the descriptor for `pc` if the computed slot actually holds it. Returns `true` if
    /// anything was removed.
    pub fn remove(&mut self, pc: u64) -> bool {
        let idx = self.slot_index(pc);
        match &self.slots[idx] {
            Some(desc) if desc.guest_pc == pc => {
                self.slots[idx] = None;
                true
            }
            _ => false,
        }
    }

    /// Destroys every descriptor in the table — a block descriptor's only other end of life is
    /// whole-cache invalidation like this, never an individual timeout or eviction sweep. Callers
    /// reach for this when the host detects that a page backing translated guest code changed
    /// underneath it, since there is no per-page write-protection hook in this design.
    pub fn invalidate_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let valid_count = self
            .slots
            .iter()
            .filter(|slot| matches!(slot, Some(desc) if desc.flags.contains(BlockFlags::VALID)))
            .count();
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 { 0.0 } else { self.hits as f64 / total as f64 };

        CacheStats { valid_count, hits: self.hits, misses: self.misses, hit_rate }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_power_of_two_capacity_is_rejected() {
        assert!(matches!(TranslationCache::new(100), Err(Error::InvalidCacheCapacity(100))));
        assert!(matches!(TranslationCache::new(0), Err(Error::InvalidCacheCapacity(0))));
        assert!(TranslationCache::new(128).is_ok());
    }

    #[test]
    fn miss_then_hit_after_insert() {
        let mut cache = TranslationCache::new(16).unwrap();
        assert!(cache.lookup(0x1000).is_none());

        cache.insert(0x1000, 0xdead_0000, 4, 16, 1, BlockFlags::empty());
        let desc = cache.lookup(0x1000).unwrap();
        assert_eq!(desc.host_pc, 0xdead_0000);
        assert_eq!(desc.refcount, 2); // insert sets 1, the lookup above adds 1
        assert_eq!(desc.hit_count, 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.valid_count, 1);
    }

    #[test]
    fn colliding_pc_evicts_the_prior_entry() {
        let mut cache = TranslationCache::new(4).unwrap();
        let pc_a = 0x1000u64;
        // Find a second PC that collides with pc_a's slot under this small table.
        let slot_a = cache.slot_index(pc_a);
        let pc_b = (0..4096u64).map(|i| pc_a + i * 4).find(|&pc| pc != pc_a && cache.slot_index(pc) == slot_a).unwrap();

        cache.insert(pc_a, 0x1111, 4, 16, 1, BlockFlags::empty());
        cache.insert(pc_b, 0x2222, 4, 16, 1, BlockFlags::empty());

        assert!(cache.lookup(pc_a).is_none());
        assert_eq!(cache.lookup(pc_b).unwrap().host_pc, 0x2222);
    }

    #[test]
    fn invalidate_all_clears_every_slot() {
        let mut cache = TranslationCache::new(8).unwrap();
        cache.insert(0x2000, 0x3000, 4, 16, 1, BlockFlags::empty());
        assert_eq!(cache.stats().valid_count, 1);

        cache.invalidate_all();
        assert_eq!(cache.stats().valid_count, 0);
        assert!(cache.lookup(0x2000).is_none());
    }

    #[test]
    fn remove_reports_whether_anything_was_there() {
        let mut cache = TranslationCache::new(8).unwrap();
        assert!(!cache.remove(0x4000));

        cache.insert(0x4000, 0x5000, 4, 16, 1, BlockFlags::empty());
        assert!(cache.remove(0x4000));
        assert!(!cache.remove(0x4000));
    }
}
