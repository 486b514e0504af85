//! Block-exit sequences.
//!
//! [`crate::arena::ExecutableArena`] gives every translated block its own independent `mmap_rs`
//! region, so a direct host `JMP rel32`/`Jcc rel32` from one block into another is not computable
//! at code-generation time — the target block may not exist yet, and even once it does its host
//! address has no fixed relationship to the current block's. Cross-block chaining is out of scope
//! here, so rather than special-case "jump directly to an already-cached neighbor", every block
//! exit uniformly writes its resolved guest target PC into [`crate::state::GuestState::pc`] and
//! returns (host `RET`) to the dispatch loop in [`crate::dispatch`], which performs the cache
//! lookup/translate-on-miss and invokes the next block. This is the same shape a block that hits
//! the instruction cap without reaching a terminator already uses — a plain return to the dispatch
//! loop — generalized here to every terminator, not just that one case.

use crate::buffer::CodeBuffer;
use crate::emit;
use crate::emit::regs::GpReg;

use super::regmap::{pc_offset, STATE_BASE};

/// Writes a compile-time-constant target guest PC to [`crate::state::GuestState::pc`] and returns
/// to the dispatch loop. `scratch` is clobbered.
pub fn emit_exit_pc_imm(buf: &mut CodeBuffer, scratch: GpReg, target_pc: u64) {
    emit::mov_reg_imm64(buf, scratch, target_pc);
    emit::store_reg_mem(buf, scratch, STATE_BASE, pc_offset(), 8);
    emit::ret(buf);
}

/// Writes a runtime-computed target guest PC (already materialized in `src`) to
/// [`crate::state::GuestState::pc`] and returns to the dispatch loop.
pub fn emit_exit_pc_reg(buf: &mut CodeBuffer, src: GpReg) {
    emit::store_reg_mem(buf, src, STATE_BASE, pc_offset(), 8);
    emit::ret(buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CodeBuffer;

    #[test]
    fn exit_with_imm_ends_in_ret() {
        let mut buf = CodeBuffer::new(64);
        emit_exit_pc_imm(&mut buf, GpReg::Rax, 0x4000);
        assert_eq!(*buf.as_slice().last().unwrap(), 0xC3);
    }
}
