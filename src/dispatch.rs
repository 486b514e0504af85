//! The execution trampoline and dispatch loop. Host code pointers returned from block translation
//! are directly callable via the host ABI: the entry establishes the guest register mapping in
//! host registers on entry and commits it back on exit.
//!
//! [`crate::translate::exit`] already documents why every translated block ends in a host `RET`
//! rather than chaining directly into its successor: each call into translated code runs exactly
//! one block and then returns here, where the next block is looked up (or translated and cached)
//! from the guest PC the block just wrote into [`GuestState::pc`]. This module owns that loop and
//! the one piece of inline assembly needed to pin the two reserved host registers
//! ([`crate::translate::regmap::STATE_BASE`], [`crate::translate::regmap::MEM_BASE`]) across the
//! call — the same "hand control to foreign code and recover state afterwards" shape a
//! hypervisor's per-platform vCPU run loop has, here collapsed to the one host ABI this crate
//! targets instead of one shape per virtualization backend.

use std::arch::asm;

use crate::arena::ExecutableArena;
use crate::block;
use crate::cache::TranslationCache;
use crate::error::Error;
use crate::memory::GuestMemory;
use crate::state::GuestState;
use crate::trace::{EventKind, TraceSink};

/// Executes exactly one translated block starting at `state.pc`: a cache hit invokes the existing
/// translation directly, a miss translates and commits a fresh one first. On return, `state.pc`
/// holds the next block's guest entry point.
pub fn step(
    memory: &dyn GuestMemory,
    state: &mut GuestState,
    mem_base: *mut u8,
    cache: &mut TranslationCache,
    arena: &mut ExecutableArena,
    trace: &mut TraceSink,
    code_buffer_capacity: usize,
    max_instructions: usize,
) -> Result<(), Error> {
    let pc = state.pc;

    let host_pc = if let Some(desc) = cache.lookup(pc) {
        trace.record(EventKind::CacheHit, pc, desc.host_pc, 0);
        desc.host_pc
    } else {
        trace.record(EventKind::CacheMiss, pc, 0, 0);
        let translated =
            block::discover_and_translate(memory, pc, code_buffer_capacity, max_instructions, trace)?;

        let host_ptr = arena.alloc(&translated.code)?;
        cache.insert(
            pc,
            host_ptr as u64,
            translated.guest_size,
            translated.code.len() as u32,
            translated.insn_count,
            translated.flags,
        );
        host_ptr as u64
    };

    unsafe {
        invoke_block(host_pc as *const u8, state as *mut GuestState, mem_base);
    }

    Ok(())
}

/// Repeatedly calls [`step`] until `should_continue` returns `false` for the current state (e.g.
/// a caller watching for a sentinel PC, an exit syscall having set a flag elsewhere, or a simple
/// step budget).
pub fn run_until(
    memory: &dyn GuestMemory,
    state: &mut GuestState,
    mem_base: *mut u8,
    cache: &mut TranslationCache,
    arena: &mut ExecutableArena,
    trace: &mut TraceSink,
    code_buffer_capacity: usize,
    max_instructions: usize,
    mut should_continue: impl FnMut(&GuestState) -> bool,
) -> Result<(), Error> {
    while should_continue(state) {
        step(memory, state, mem_base, cache, arena, trace, code_buffer_capacity, max_instructions)?;
    }
    Ok(())
}

/// Calls into translated host code with the two reserved registers pinned for the duration of the
/// call. Every translated block only ever reads these two registers, never saves or restores
/// them, so the C calling convention's callee-saved guarantee for `r14`/`r15` is exactly what
/// keeps them intact across the `RET` back to this function.
///
/// # Safety
/// `entry` must point at currently-valid executable code previously produced by
/// [`crate::translate`] (e.g. via [`crate::arena::ExecutableArena::alloc`]); `state` must be a
/// unique, live pointer to the [`GuestState`] that code was translated against; `mem_base` must be
/// a valid base for every guest address that code's load/store translators may compute.
#[cfg(target_arch = "x86_64")]
unsafe fn invoke_block(entry: *const u8, state: *mut GuestState, mem_base: *mut u8) {
    asm!(
        "call {entry}",
        entry = in(reg) entry,
        in("r15") state,
        in("r14") mem_base,
        clobber_abi("C"),
    );
}

#[cfg(not(target_arch = "x86_64"))]
unsafe fn invoke_block(_entry: *const u8, _state: *mut GuestState, _mem_base: *mut u8) {
    unreachable!("translated code is x86_64-only");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatGuestMemory;

    #[test]
    fn a_self_targeting_branch_block_runs_and_returns() {
        // B #0: branches to its own address, but since every block exit is a store-then-RET back
        // to this dispatch loop rather than a real host jump, invoking it once is safe and just
        // leaves state.pc unchanged.
        let words: [u32; 1] = [0x1400_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mem = FlatGuestMemory::new(0x1000, &bytes);

        let mut state = GuestState::new();
        state.pc = 0x1000;
        let mut cache = TranslationCache::new(64).unwrap();
        let mut arena = ExecutableArena::new();
        let mut trace = TraceSink::new(16);
        let mut scratch_mem = [0u8; 16];

        step(
            &mem,
            &mut state,
            scratch_mem.as_mut_ptr(),
            &mut cache,
            &mut arena,
            &mut trace,
            4096,
            block::DEFAULT_MAX_INSTRUCTIONS,
        )
        .unwrap();

        assert_eq!(state.pc, 0x1000);
        assert_eq!(cache.stats().valid_count, 1);

        // A second call at the same PC is a cache hit.
        state.pc = 0x1000;
        step(
            &mem,
            &mut state,
            scratch_mem.as_mut_ptr(),
            &mut cache,
            &mut arena,
            &mut trace,
            4096,
            block::DEFAULT_MAX_INSTRUCTIONS,
        )
        .unwrap();

        assert_eq!(
            trace.events().filter(|e| e.kind == EventKind::CacheHit).count(),
            1
        );
    }
}
