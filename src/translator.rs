//! The public facade: `TranslatorBuilder` → `Translator`, a construction-time builder handing off
//! to an immutable-shape runtime object that owns a translation cache, an executable arena, a
//! trace sink and a guest CPU state image.
//!
//! Everything this module does is a thin composition of [`crate::cache`], [`crate::arena`],
//! [`crate::block`] and [`crate::dispatch`]; it adds no translation logic of its own. Its reason
//! to exist is construction-time configuration (cache capacity, code buffer size, instruction
//! cap) and ownership of the pieces a caller would otherwise have to wire up by hand.

use crate::arena::ExecutableArena;
use crate::block::{self, DEFAULT_CODE_BUFFER_CAPACITY, DEFAULT_MAX_INSTRUCTIONS};
use crate::cache::{BlockDescriptor, CacheStats, TranslationCache};
use crate::dispatch;
use crate::error::Error;
use crate::memory::GuestMemory;
use crate::state::GuestState;
use crate::trace::TraceSink;

/// The translation cache's default slot count. Always a power of two.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// The immutable, construction-time knobs for a [`Translator`].
pub struct TranslatorBuilder {
    cache_capacity: usize,
    code_buffer_capacity: usize,
    max_instructions: usize,
    trace_capacity: usize,
}

impl Default for TranslatorBuilder {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            code_buffer_capacity: DEFAULT_CODE_BUFFER_CAPACITY,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            trace_capacity: 256,
        }
    }
}

impl TranslatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the translation cache's slot count. Must be a power of two; validated in
    /// [`TranslatorBuilder::build`], not here, since a builder method cannot fail.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the byte capacity of the code buffer each block is translated into.
    pub fn code_buffer_capacity(mut self, capacity: usize) -> Self {
        self.code_buffer_capacity = capacity;
        self
    }

    /// Sets the per-block instruction cap that bounds how far block discovery walks forward
    /// before handing control back to the dispatch loop.
    pub fn max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the ring-buffer capacity of the debug/trace sink.
    pub fn trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }

    /// Builds the [`Translator`], starting `state` at every field defaulted ([`GuestState::new`]).
    /// Returns [`Error::InvalidCacheCapacity`] if `cache_capacity` is not a power of two.
    pub fn build(self) -> Result<Translator, Error> {
        Ok(Translator {
            cache: TranslationCache::new(self.cache_capacity)?,
            arena: ExecutableArena::new(),
            trace: TraceSink::new(self.trace_capacity),
            state: GuestState::new(),
            code_buffer_capacity: self.code_buffer_capacity,
            max_instructions: self.max_instructions,
        })
    }
}

/// Owns every piece needed to translate and run AArch64 guest code on this host: the translation
/// cache, the executable arena, the debug/trace sink and the guest CPU state image. One
/// `Translator` corresponds to one guest execution context — multi-threaded guest execution is
/// modeled by one translator instance per guest thread.
pub struct Translator {
    cache: TranslationCache,
    arena: ExecutableArena,
    trace: TraceSink,
    state: GuestState,
    code_buffer_capacity: usize,
    max_instructions: usize,
}

impl Translator {
    /// Starts from [`TranslatorBuilder::default`].
    pub fn new() -> Result<Self, Error> {
        TranslatorBuilder::new().build()
    }

    pub fn state(&self) -> &GuestState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GuestState {
        &mut self.state
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn trace(&self) -> &TraceSink {
        &self.trace
    }

    /// Looks up a previously translated block without side effects beyond the cache's own hit
    /// counters.
    pub fn lookup(&mut self, guest_pc: u64) -> Option<&BlockDescriptor> {
        self.cache.lookup(guest_pc)
    }

    /// Drops every cached translation. Callers reach for this when they detect that a page
    /// backing translated guest code changed underneath it.
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }

    /// Translates (on a cache miss) and runs exactly one basic block starting at `self.state.pc`,
    /// leaving `self.state.pc` at the next block's guest entry point on return.
    ///
    /// `mem_base` must be a valid host pointer for every guest address the block's load/store
    /// translators may compute; see [`dispatch::step`]'s safety note, which this forwards to.
    pub fn step(&mut self, memory: &dyn GuestMemory, mem_base: *mut u8) -> Result<(), Error> {
        dispatch::step(
            memory,
            &mut self.state,
            mem_base,
            &mut self.cache,
            &mut self.arena,
            &mut self.trace,
            self.code_buffer_capacity,
            self.max_instructions,
        )
    }

    /// Repeatedly calls [`Translator::step`] until `should_continue` returns `false`.
    pub fn run_until(
        &mut self,
        memory: &dyn GuestMemory,
        mem_base: *mut u8,
        should_continue: impl FnMut(&GuestState) -> bool,
    ) -> Result<(), Error> {
        dispatch::run_until(
            memory,
            &mut self.state,
            mem_base,
            &mut self.cache,
            &mut self.arena,
            &mut self.trace,
            self.code_buffer_capacity,
            self.max_instructions,
            should_continue,
        )
    }

    /// Translates the block at `guest_pc` without invoking it, inserting it into the cache as a
    /// side effect. Exposed for callers that want to warm the cache or inspect a
    /// [`crate::block::TranslatedBlock`]'s shape without running it.
    pub fn translate_block_at(
        &mut self,
        memory: &dyn GuestMemory,
        guest_pc: u64,
    ) -> Result<&BlockDescriptor, Error> {
        if self.cache.lookup(guest_pc).is_none() {
            let translated = block::discover_and_translate(
                memory,
                guest_pc,
                self.code_buffer_capacity,
                self.max_instructions,
                &mut self.trace,
            )?;
            let host_ptr = self.arena.alloc(&translated.code)?;
            self.cache.insert(
                guest_pc,
                host_ptr as u64,
                translated.guest_size,
                translated.code.len() as u32,
                translated.insn_count,
                translated.flags,
            );
        }

        Ok(self.cache.lookup(guest_pc).expect("just inserted or already present"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlockFlags;
    use crate::memory::FlatGuestMemory;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// `0xB1000421` is `ADDS X1, X1, #1` (see `DESIGN.md`'s open-question resolution: a
    /// flag-setting add is needed here, and the `S` bit distinguishes it from plain `ADD`).
    #[test]
    fn scenario_1_adds_immediate_overflow_to_min_negative() {
        let words = [0xB100_0421u32, 0xD65F_03C0]; // ADDS X1, X1, #1 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x1000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x1000;
        t.state_mut().gpr[1] = 0x7FFF_FFFF_FFFF_FFFF;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert_eq!(t.state().gpr[1], 0x8000_0000_0000_0000);
        assert!(t.state().pstate.contains(crate::state::Pstate::N));
        assert!(!t.state().pstate.contains(crate::state::Pstate::Z));
        assert!(!t.state().pstate.contains(crate::state::Pstate::C));
        assert!(t.state().pstate.contains(crate::state::Pstate::V));
    }

    /// `SUBS W0, W0, #1` then `CSEL X0, X1, X2, EQ` (64-bit form, `0x9A820020`; see `DESIGN.md`).
    #[test]
    fn scenario_2_conditional_select_takes_the_true_arm() {
        let words = [0x7100_0400u32, 0x9A82_0020, 0xD65F_03C0]; // SUBS W0,W0,#1 ; CSEL X0,X1,X2,EQ ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x1000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x1000;
        t.state_mut().gpr[0] = 1;
        t.state_mut().gpr[1] = 0xAA;
        t.state_mut().gpr[2] = 0xBB;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert_eq!(t.state().gpr[0], 0xAA);
    }

    /// An unconditional branch is the only instruction in the block; the block terminates
    /// immediately and never reaches a manufactured exit.
    #[test]
    fn scenario_3_unconditional_branch_terminates_the_block_alone() {
        let words = [0x1400_0002u32]; // B +8 (word offset 2)
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x2000, &bytes);
        let mut trace = TraceSink::new(16);

        let block = block::discover_and_translate(&mem, 0x2000, 256, 64, &mut trace).unwrap();
        assert_eq!(block.insn_count, 1);
        assert!(block.flags.contains(BlockFlags::BRANCH_TERMINATED));
    }

    /// A miss, then a hit at the same pointer with incrementing hit count.
    #[test]
    fn scenario_4_cache_hit_after_first_miss() {
        let words = [0xD65F_03C0u32]; // RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x4000, &bytes);

        let mut t = Translator::new().unwrap();
        let desc = t.translate_block_at(&mem, 0x4000).unwrap();
        let p = desc.host_pc;
        assert_eq!(desc.hit_count, 0);

        let desc = t.lookup(0x4000).unwrap();
        assert_eq!(desc.host_pc, p);
        assert_eq!(desc.hit_count, 1);

        let desc = t.lookup(0x4000).unwrap();
        assert_eq!(desc.host_pc, p);
        assert_eq!(desc.hit_count, 2);

        let stats = t.cache_stats();
        assert_eq!(stats.hits, 2);
    }

    /// `0x1AC04020` has `Rm == 0`, i.e. `CRC32B W0, W1, W0` (see `DESIGN.md`).
    #[test]
    fn scenario_5_crc32b_matches_the_standard_polynomial() {
        let words = [0x1AC0_4020u32, 0xD65F_03C0]; // CRC32B W0, W1, W0 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x5000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x5000;
        t.state_mut().gpr[1] = 0x1234_5678;
        t.state_mut().gpr[0] = 0xA5;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        let expected = crc32b_reference(0x1234_5678, &[0xA5]);
        assert_eq!(t.state().gpr[0] as u32, expected);
    }

    /// Software reference CRC32 (the CRC32 instruction's own polynomial, 0xEDB88320 reflected),
    /// used only to check the translated block's output against the expected running checksum.
    fn crc32b_reference(running: u32, bytes: &[u8]) -> u32 {
        let mut crc = running;
        for &byte in bytes {
            crc ^= byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        crc
    }

    /// `LSL X0, X1, #4` (`UBFM X0, X1, #60, #59`, an insertion-class encoding since
    /// `imms(59) < immr(60)`): the vacated low bits must be zero-filled, not rotated in from the
    /// top of the source (see `DESIGN.md`'s bitfield note).
    #[test]
    fn lsl_immediate_zero_fills_rather_than_rotating() {
        let words = [0xD37C_EC20u32, 0xD65F_03C0]; // LSL X0, X1, #4 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x6000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x6000;
        t.state_mut().gpr[1] = 0xF000_0000_0000_000F;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert_eq!(t.state().gpr[0], 0xF000_0000_0000_000Fu64 << 4);
    }

    /// `UBFIZ X0, X1, #4, #4` (`UBFM X0, X1, #60, #3`): the inserted field replaces the whole
    /// destination (zero elsewhere), so a garbage-filled `X0` beforehand must not leak through.
    #[test]
    fn ubfiz_zero_fills_outside_the_inserted_field() {
        let words = [0xD37C_0C20u32, 0xD65F_03C0]; // UBFIZ X0, X1, #4, #4 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x7000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x7000;
        t.state_mut().gpr[1] = 0xFF;
        t.state_mut().gpr[0] = 0xFFFF_FFFF_FFFF_FFFF;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert_eq!(t.state().gpr[0], 0xF0);
    }

    /// `ROR X0, X1, #4` (the `EXTR`/`ROR` alias, `Rm == Rn`): bits rotated off the bottom must
    /// reappear at the top, not fall off the end the way a masked `UBFM`-style extract would.
    #[test]
    fn ror_alias_rotates_bits_back_in_at_the_top() {
        let words = [0x93C1_1020u32, 0xD65F_03C0]; // ROR X0, X1, #4 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x8000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x8000;
        t.state_mut().gpr[1] = 0x1;

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert_eq!(t.state().gpr[0], 0x1u64.rotate_right(4));
    }

    /// `FCMP D0, D1` with `D0 = NaN`: an unordered compare must produce `NZCV = 0b0011`
    /// (`Z = 0`), not the `Z = 1` a raw copy of host `ZF` would give (`UCOMISD` sets `ZF` on an
    /// unordered compare too). A subsequent `B.EQ` must not be taken.
    #[test]
    fn fcmp_unordered_clears_the_z_flag() {
        let words = [0x1E61_2000u32, 0xD65F_03C0]; // FCMP D0, D1 ; RET
        let bytes = words_to_bytes(&words);
        let mem = FlatGuestMemory::new(0x9000, &bytes);

        let mut t = Translator::new().unwrap();
        t.state_mut().pc = 0x9000;
        t.state_mut().vreg[0] = crate::state::VectorRegister { lo: f64::NAN.to_bits(), hi: 0 };
        t.state_mut().vreg[1] = crate::state::VectorRegister { lo: 1.0f64.to_bits(), hi: 0 };

        let mut scratch_mem = [0u8; 16];
        t.step(&mem, scratch_mem.as_mut_ptr()).unwrap();

        assert!(!t.state().pstate.contains(crate::state::Pstate::N));
        assert!(!t.state().pstate.contains(crate::state::Pstate::Z));
        assert!(t.state().pstate.contains(crate::state::Pstate::C));
        assert!(t.state().pstate.contains(crate::state::Pstate::V));
    }
}
