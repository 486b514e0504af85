//! Block discovery: walks guest memory forward from a starting PC, decoding and translating one
//! instruction at a time, until either a terminator is reached or the per-block instruction cap
//! fires.
//!
//! This is the one place the decoder (`crate::decode`), the per-family translators
//! (`crate::translate`) and the debug sink (`crate::trace`) all meet; everything downstream of
//! here (the cache, the arena) only ever sees the finished [`TranslatedBlock`].

use crate::buffer::CodeBuffer;
use crate::cache::BlockFlags;
use crate::decode::{self, op::Operation};
use crate::error::Error;
use crate::memory::GuestMemory;
use crate::trace::{EventKind, TraceSink};
use crate::translate::{self, exit, regmap};

/// The per-block instruction cap.
pub const DEFAULT_MAX_INSTRUCTIONS: usize = 64;

/// Default code buffer capacity per block, in bytes.
pub const DEFAULT_CODE_BUFFER_CAPACITY: usize = 4096;

/// The result of translating one basic block: the host code bytes plus the metadata a
/// [`crate::cache::BlockDescriptor`] is built from once the bytes are committed to the executable
/// arena.
pub struct TranslatedBlock {
    pub guest_pc: u64,
    pub guest_size: u32,
    pub insn_count: u16,
    pub flags: BlockFlags,
    pub code: Vec<u8>,
}

/// Translates the basic block starting at `start_pc`.
///
/// Stops after translating a terminator instruction (`Operation::is_terminator`), or after
/// `max_instructions` instructions have been translated, whichever comes first. In the latter
/// case a host `RET` to the dispatch loop is appended, targeting the guest PC immediately after
/// the last translated instruction, so the cap never strands control without handing it back.
///
/// Returns [`Error`] only if `memory` fails to resolve an instruction word; a code-buffer
/// overflow is not an error — the returned block simply carries [`BlockFlags::TRUNCATED`] and
/// whatever bytes fit.
pub fn discover_and_translate(
    memory: &dyn GuestMemory,
    start_pc: u64,
    code_buffer_capacity: usize,
    max_instructions: usize,
    trace: &mut TraceSink,
) -> Result<TranslatedBlock, Error> {
    trace.record(EventKind::BlockTranslateStart, start_pc, 0, 0);

    let mut buf = CodeBuffer::new(code_buffer_capacity);
    let mut pc = start_pc;
    let mut insn_count: u16 = 0;
    let mut flags = BlockFlags::empty();
    let mut terminated = false;

    while (insn_count as usize) < max_instructions {
        let word = memory.read_instruction_word(pc)?;
        let op = decode::classify(word);

        if let Operation::Unknown(raw) = op {
            trace.record(EventKind::UnknownInstruction, pc, 0, raw as u64);
        }

        translate::translate_one(&mut buf, op, pc);
        insn_count = insn_count.saturating_add(1);
        pc = pc.wrapping_add(4);

        if op.is_terminator() {
            flags |= terminator_flags(&op);
            terminated = true;
            break;
        }
    }

    if !terminated {
        exit::emit_exit_pc_imm(&mut buf, regmap::SCRATCH_0, pc);
    }

    if buf.is_overflowed() {
        flags |= BlockFlags::TRUNCATED;
        trace.record(EventKind::BufferOverflow, start_pc, 0, buf.current_size() as u64);
    }

    let guest_size = (pc - start_pc) as u32;
    trace.record(EventKind::BlockTranslateEnd, start_pc, 0, buf.current_size() as u64);

    Ok(TranslatedBlock {
        guest_pc: start_pc,
        guest_size,
        insn_count,
        flags,
        code: buf.as_slice().to_vec(),
    })
}

/// Distinguishes the two terminator shapes block discovery cares about for the descriptor's
/// flags (`BRANCH_TERMINATED` vs `SYSCALL_TERMINATED`).
fn terminator_flags(op: &Operation) -> BlockFlags {
    match op {
        Operation::System(_) => BlockFlags::SYSCALL_TERMINATED,
        _ => BlockFlags::BRANCH_TERMINATED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatGuestMemory;

    #[test]
    fn stops_at_an_unconditional_branch() {
        // B #0 (branch to self): high six bits 000101, zero offset.
        let words: [u32; 1] = [0x1400_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mem = FlatGuestMemory::new(0x1000, &bytes);
        let mut trace = TraceSink::new(16);

        let block = discover_and_translate(&mem, 0x1000, 256, 64, &mut trace).unwrap();
        assert_eq!(block.insn_count, 1);
        assert!(block.flags.contains(BlockFlags::BRANCH_TERMINATED));
        assert!(!block.flags.contains(BlockFlags::TRUNCATED));
    }

    #[test]
    fn stops_at_an_svc() {
        // SVC #0: 0xD4000001.
        let words: [u32; 1] = [0xD400_0001];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mem = FlatGuestMemory::new(0x2000, &bytes);
        let mut trace = TraceSink::new(16);

        let block = discover_and_translate(&mem, 0x2000, 256, 64, &mut trace).unwrap();
        assert!(block.flags.contains(BlockFlags::SYSCALL_TERMINATED));
    }

    #[test]
    fn instruction_cap_appends_a_return_without_a_terminator() {
        // A run of NOPs (0xD503201F), longer than the cap, none of which terminate.
        let words: Vec<u32> = vec![0xD503_201F; 8];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mem = FlatGuestMemory::new(0x3000, &bytes);
        let mut trace = TraceSink::new(16);

        let block = discover_and_translate(&mem, 0x3000, 4096, 8, &mut trace).unwrap();
        assert_eq!(block.insn_count, 8);
        assert!(!block.flags.contains(BlockFlags::BRANCH_TERMINATED));
        assert!(!block.flags.contains(BlockFlags::SYSCALL_TERMINATED));
        // The appended RET after the manufactured exit sequence.
        assert_eq!(*block.code.last().unwrap(), 0xC3);
    }

    #[test]
    fn unknown_instruction_is_recorded_and_translation_continues() {
        let words: [u32; 2] = [0xFFFF_FFFF, 0x1400_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mem = FlatGuestMemory::new(0x4000, &bytes);
        let mut trace = TraceSink::new(16);

        let block = discover_and_translate(&mem, 0x4000, 256, 64, &mut trace).unwrap();
        assert_eq!(block.insn_count, 2);
        assert_eq!(
            trace.events().filter(|e| e.kind == EventKind::UnknownInstruction).count(),
            1
        );
    }
}
