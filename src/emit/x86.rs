//! Core x86_64 instruction encoding: REX-prefix synthesis and ModR/M/SIB byte construction.
//!
//! Grounded on the prefix-flag/opcode-constant style of a retrieved TCG-style x86_64 emitter
//! (`other_examples/ec0e268c_..._x86_64-emitter.rs`): opcodes are `u32`s that pack both the
//! literal opcode byte and the prefix bytes it needs (`0x0F` escape, `66`/`F2`/`F3` mandatory
//! prefixes, REX.W) into high bits that [`emit_opcode`] strips back off before emitting.

use crate::buffer::CodeBuffer;
use crate::emit::regs::{GpReg, XmmReg};

/// `0x0F` two-byte-opcode escape prefix.
pub const P_EXT: u32 = 0x100;
/// `0x0F 0x38` three-byte-opcode escape prefix.
pub const P_EXT38: u32 = 0x200;
/// `0x0F 0x3A` three-byte-opcode escape prefix.
pub const P_EXT3A: u32 = 0x400;
/// Mandatory `0x66` operand-size prefix (selects the packed-integer SSE2 encoding of an opcode
/// that is otherwise a scalar-float or MMX one).
pub const P_DATA16: u32 = 0x800;
/// Mandatory `0xF3` prefix (scalar-single SSE opcodes, `REP`-prefixed string forms).
pub const P_SIMDF3: u32 = 0x1000;
/// Mandatory `0xF2` prefix (scalar-double SSE opcodes).
pub const P_SIMDF2: u32 = 0x2000;
/// Sets REX.W, selecting the 64-bit operand-size form of an otherwise 32-bit opcode.
pub const P_REXW: u32 = 0x4000;

/// A register operand that can be encoded generically across GPRs and XMM registers (both are
/// numbered 0..15 and interact with REX/ModR/M identically).
pub trait Operand: Copy {
    fn index(self) -> u8;
    fn low3(self) -> u8 {
        self.index() & 0b111
    }
    fn is_extended(self) -> bool {
        self.index() >= 8
    }
}

impl Operand for GpReg {
    fn index(self) -> u8 {
        GpReg::index(self)
    }
}

impl Operand for XmmReg {
    fn index(self) -> u8 {
        XmmReg::index(self)
    }
}

/// Emits the prefix bytes (mandatory SIMD prefix, REX, opcode-escape bytes) and the final opcode
/// byte for a register-field/r-m-field instruction. `reg_field` and `rm_field` are the raw 0..15
/// register indices that will occupy ModR/M's `reg` and `r/m` sub-fields (or, for group opcodes,
/// `reg_field` is the `/digit` extension and has no REX.R implication beyond its value).
fn emit_opcode_with_rex(buf: &mut CodeBuffer, opc: u32, reg_field: u8, rm_field: u8, force_rex: bool) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if reg_field >= 8 {
        rex |= 0x04;
    }
    if rm_field >= 8 {
        rex |= 0x01;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_byte(0x66);
    }
    if opc & P_SIMDF3 != 0 {
        buf.emit_byte(0xF3);
    } else if opc & P_SIMDF2 != 0 {
        buf.emit_byte(0xF2);
    }

    if rex != 0 || force_rex {
        buf.emit_byte(0x40 | rex);
    }

    if opc & (P_EXT | P_EXT38 | P_EXT3A) != 0 {
        buf.emit_byte(0x0F);
        if opc & P_EXT38 != 0 {
            buf.emit_byte(0x38);
        } else if opc & P_EXT3A != 0 {
            buf.emit_byte(0x3A);
        }
    }

    buf.emit_byte(opc as u8);
}

/// Emits a full register-to-register instruction: prefixes, opcode, and a ModR/M byte with
/// `mod == 11`.
pub fn emit_modrm_reg<R: Operand, M: Operand>(buf: &mut CodeBuffer, opc: u32, reg: R, rm: M) {
    emit_opcode_with_rex(buf, opc, reg.index(), rm.index(), false);
    buf.emit_byte(0xC0 | (reg.low3() << 3) | rm.low3());
}

/// Emits a group-opcode instruction (ModR/M `reg` field is a literal `/digit`, not a register).
pub fn emit_modrm_digit<M: Operand>(buf: &mut CodeBuffer, opc: u32, digit: u8, rm: M) {
    emit_opcode_with_rex(buf, opc, digit, rm.index(), false);
    buf.emit_byte(0xC0 | (digit << 3) | rm.low3());
}

/// Emits a memory-operand instruction addressing `[base + offset]`, handling the two encodings
/// x86_64 special-cases: `RSP`/`R12` as a base require a SIB byte (`base` alone cannot be
/// distinguished from a SIB-escape/RIP-relative encoding in ModR/M), and `RBP`/`R13` as a base
/// with a zero offset cannot use `mod == 00` (that encoding is reserved for RIP-relative
/// addressing), so a zero `disp8` is forced instead.
pub fn emit_modrm_mem_reg(buf: &mut CodeBuffer, opc: u32, reg: GpReg, base: GpReg, offset: i32) {
    emit_opcode_with_rex(buf, opc, reg.index(), base.index(), false);
    emit_modrm_mem_tail(buf, reg.low3(), base, offset);
}

/// As [`emit_modrm_mem_reg`], but the ModR/M `reg` field is a group `/digit` rather than a
/// register (used for e.g. `GRP3 [base+off]` shapes like `NOT dword [rax+4]`).
pub fn emit_modrm_mem_digit(buf: &mut CodeBuffer, opc: u32, digit: u8, base: GpReg, offset: i32) {
    emit_opcode_with_rex(buf, opc, digit, base.index(), false);
    emit_modrm_mem_tail(buf, digit, base, offset);
}

/// As [`emit_modrm_mem_reg`], generalized over any [`Operand`] register file — used by the FP
/// scalar and packed-vector load/store emitters in [`super`], where the "register" side of the
/// memory operand is an `XmmReg` rather than a `GpReg`.
pub fn emit_modrm_mem_op<R: Operand>(buf: &mut CodeBuffer, opc: u32, reg: R, base: GpReg, offset: i32) {
    emit_opcode_with_rex(buf, opc, reg.index(), base.index(), false);
    emit_modrm_mem_tail(buf, reg.low3(), base, offset);
}

fn emit_modrm_mem_tail(buf: &mut CodeBuffer, reg_low3: u8, base: GpReg, offset: i32) {
    let b3 = base.low3();

    if offset == 0 && b3 != 0b101 {
        if b3 == 0b100 {
            buf.emit_byte((reg_low3 << 3) | 0x04);
            buf.emit_byte(0x24);
        } else {
            buf.emit_byte((reg_low3 << 3) | b3);
        }
    } else if (-128..=127).contains(&offset) {
        if b3 == 0b100 {
            buf.emit_byte(0x44 | (reg_low3 << 3));
            buf.emit_byte(0x24);
        } else {
            buf.emit_byte(0x40 | (reg_low3 << 3) | b3);
        }
        buf.emit_byte(offset as u8);
    } else {
        if b3 == 0b100 {
            buf.emit_byte(0x84 | (reg_low3 << 3));
            buf.emit_byte(0x24);
        } else {
            buf.emit_byte(0x80 | (reg_low3 << 3) | b3);
        }
        buf.emit_word32(offset as u32);
    }
}

/// Emits an opcode with no ModR/M byte at all, where the register is folded into the low 3 bits
/// of the opcode byte itself (`PUSH r64` = `0x50+rd`, `POP r64` = `0x58+rd`, and similar).
/// `opc`'s low byte must already have its low 3 bits zeroed.
pub fn emit_opcode_plus_reg(buf: &mut CodeBuffer, opc: u32, reg: GpReg) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if reg.is_extended() {
        rex |= 0x01;
    }
    if rex != 0 {
        buf.emit_byte(0x40 | rex);
    }
    buf.emit_byte((opc as u8) | reg.low3());
}

/// Emits a bare opcode (no ModR/M, no REX beyond what the opcode's flags request) followed by an
/// immediate 32-bit displacement — the shape every `Jcc rel32`/`JMP rel32`/`CALL rel32` shares.
pub fn emit_opcode_rel32(buf: &mut CodeBuffer, opc: u32, rel32: i32) {
    emit_opcode_with_rex(buf, opc, 0, 0, false);
    buf.emit_word32(rel32 as u32);
}

/// Emits a bare opcode with no operands at all (`RET`, `NOP`, fences via their group-digit forms
/// handled elsewhere).
pub fn emit_opcode_bare(buf: &mut CodeBuffer, opc: u32) {
    emit_opcode_with_rex(buf, opc, 0, 0, false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_reg_encodes_rex_for_extended_registers() {
        let mut buf = CodeBuffer::new(16);
        // ADD r64 form: REX.W + 0x01 /r, e.g. ADD R8, RAX -> 4C 01 C0? (reg=RAX as r/m, R8 as reg)
        emit_modrm_reg(&mut buf, 0x01 | P_REXW, GpReg::R8, GpReg::Rax);
        assert_eq!(buf.as_slice(), &[0x4C, 0x01, 0xC0]);
    }

    #[test]
    fn mem_operand_with_rbp_base_and_zero_offset_forces_disp8() {
        let mut buf = CodeBuffer::new(16);
        emit_modrm_mem_reg(&mut buf, 0x8B, GpReg::Rax, GpReg::Rbp, 0);
        // mod=01 (disp8) rather than mod=00, with an explicit zero displacement byte.
        assert_eq!(buf.as_slice(), &[0x8B, 0x45, 0x00]);
    }

    #[test]
    fn mem_operand_with_rsp_base_needs_sib() {
        let mut buf = CodeBuffer::new(16);
        emit_modrm_mem_reg(&mut buf, 0x8B, GpReg::Rax, GpReg::Rsp, 8);
        assert_eq!(buf.as_slice(), &[0x8B, 0x44, 0x24, 0x08]);
    }

    #[test]
    fn two_byte_opcode_emits_escape() {
        let mut buf = CodeBuffer::new(16);
        emit_modrm_reg(&mut buf, 0xAF | P_EXT, GpReg::Rax, GpReg::Rcx); // IMUL Gv,Ev
        assert_eq!(buf.as_slice(), &[0x0F, 0xAF, 0xC1]);
    }
}
