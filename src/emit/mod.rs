//! The host x86_64 emitter. Translators in [`crate::translate`] call the functions in this module
//! to append host machine code to a [`crate::buffer::CodeBuffer`]; nothing here ever reads guest
//! state or makes a translation decision, it only knows how to spell a given host operation as
//! bytes.

pub mod regs;
pub mod x86;

use crate::buffer::CodeBuffer;
use crate::state::Condition;
use regs::{GpReg, XmmReg};
use x86::*;

/// Sub-opcode digit for the shared "ALU group" encoding (`op Ev,Gv`/`op Ev,Iz`/`op Ev,Ib`), in
/// the same order x86 assigns them (also the `/digit` used by the immediate forms).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Sub-opcode digit for the shift-group encoding (`0xC1`/`0xD1`/`0xD3`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// x86 condition codes used by `Jcc`/`SETcc`/`CMOVcc`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

impl X86Cond {
    /// Maps an AArch64 condition to the x86 condition that tests the equivalent flag combination.
    /// Both architectures carry N/Z/C/V (resp. SF/ZF/CF/OF), and AArch64's `HS`/`LO` are x86's
    /// `AE`/`B` exactly, since both `SUBS`/`CMP` set the carry/borrow flag the same way on x86's
    /// `SUB`.
    pub fn from_aarch64(cond: Condition) -> Self {
        match cond {
            Condition::Eq => X86Cond::Je,
            Condition::Ne => X86Cond::Jne,
            Condition::Cs => X86Cond::Jae,
            Condition::Cc => X86Cond::Jb,
            Condition::Mi => X86Cond::Js,
            Condition::Pl => X86Cond::Jns,
            Condition::Vs => X86Cond::Jo,
            Condition::Vc => X86Cond::Jno,
            Condition::Hi => X86Cond::Ja,
            Condition::Ls => X86Cond::Jbe,
            Condition::Ge => X86Cond::Jge,
            Condition::Lt => X86Cond::Jl,
            Condition::Gt => X86Cond::Jg,
            Condition::Le => X86Cond::Jle,
            Condition::Al | Condition::Nv => X86Cond::Je, // caller must special-case AL/NV, never emits a Jcc for them
        }
    }

    pub fn invert(self) -> Self {
        // The 16 condition codes are paired up (Jo/Jno, Jb/Jae, ...) by flipping the low bit.
        X86Cond::from_u8(self as u8 ^ 1)
    }

    fn from_u8(v: u8) -> Self {
        match v & 0xF {
            0x0 => X86Cond::Jo,
            0x1 => X86Cond::Jno,
            0x2 => X86Cond::Jb,
            0x3 => X86Cond::Jae,
            0x4 => X86Cond::Je,
            0x5 => X86Cond::Jne,
            0x6 => X86Cond::Jbe,
            0x7 => X86Cond::Ja,
            0x8 => X86Cond::Js,
            0x9 => X86Cond::Jns,
            0xA => X86Cond::Jp,
            0xB => X86Cond::Jnp,
            0xC => X86Cond::Jl,
            0xD => X86Cond::Jge,
            0xE => X86Cond::Jle,
            _ => X86Cond::Jg,
        }
    }
}

// --- GPR data movement --------------------------------------------------------------------------

/// `MOV dst, src` (register to register), 32- or 64-bit.
pub fn mov_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0x89 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, src, dst); // MOV Ev,Gv: reg field is the source
}

/// `MOVZX`/plain `MOV` that zero-extends a 32-bit write to the full 64-bit register (the default
/// x86_64 behavior of any 32-bit destination write) or truly moves 64 bits.
pub fn mov_reg_imm64(buf: &mut CodeBuffer, dst: GpReg, imm: u64) {
    x86::emit_opcode_plus_reg(buf, 0xB8 | P_REXW, dst);
    buf.emit_word64(imm);
}

/// `MOV dst, imm32` — zero-extends into the 64-bit register when `is_64bit` is false (standard
/// x86_64 32-bit-write semantics), or sign-extends when `is_64bit` is true (`REX.W + C7 /0`).
pub fn mov_reg_imm32(buf: &mut CodeBuffer, dst: GpReg, imm: u32, is_64bit: bool) {
    let opc = 0xC7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 0, dst);
    buf.emit_word32(imm);
}

/// Loads `size` bytes (1/2/4/8) from `[base + offset]` into `dst`, zero-extending unless
/// `sign_extend` is set.
pub fn load_reg_mem(buf: &mut CodeBuffer, dst: GpReg, base: GpReg, offset: i32, size: u8, sign_extend: bool, dst_is_64bit: bool) {
    let opc = match (size, sign_extend) {
        (1, false) => 0xB6 | P_EXT,
        (1, true) => 0xBE | P_EXT,
        (2, false) => 0xB7 | P_EXT,
        (2, true) => 0xBF | P_EXT,
        (4, false) if dst_is_64bit => 0x8B, // 32-bit load zero-extends implicitly; no REX.W
        (4, true) => 0x63 | P_REXW,         // MOVSXD
        (4, false) => 0x8B,
        _ => 0x8B | P_REXW,
    };
    emit_modrm_mem_reg(buf, opc, dst, base, offset);
}

/// Stores the low `size` bytes (1/2/4/8) of `src` to `[base + offset]`.
pub fn store_reg_mem(buf: &mut CodeBuffer, src: GpReg, base: GpReg, offset: i32, size: u8) {
    let opc = match size {
        1 => 0x88,
        2 => 0x89 | P_DATA16,
        4 => 0x89,
        _ => 0x89 | P_REXW,
    };
    emit_modrm_mem_reg(buf, opc, src, base, offset);
}

/// `LEA dst, [base + offset]`.
pub fn lea(buf: &mut CodeBuffer, dst: GpReg, base: GpReg, offset: i32) {
    emit_modrm_mem_reg(buf, 0x8D | P_REXW, dst, base, offset);
}

// --- GPR arithmetic and logic --------------------------------------------------------------------

/// `op dst, src` register-register ALU form (`ADD`/`SUB`/`AND`/`OR`/`XOR`/`CMP`/...).
pub fn arith_reg_reg(buf: &mut CodeBuffer, op: ArithOp, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = (0x01 + (op as u32) * 8) | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, src, dst);
}

/// `op dst, imm32` ALU form (sign-extended to the operand width).
pub fn arith_reg_imm32(buf: &mut CodeBuffer, op: ArithOp, dst: GpReg, imm: u32, is_64bit: bool) {
    let opc = 0x81 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, op as u8, dst);
    buf.emit_word32(imm);
}

/// `op dst, imm8` ALU form (sign-extended), for the common small-immediate case.
pub fn arith_reg_imm8(buf: &mut CodeBuffer, op: ArithOp, dst: GpReg, imm: i8, is_64bit: bool) {
    let opc = 0x83 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, op as u8, dst);
    buf.emit_byte(imm as u8);
}

/// `TEST dst, src`.
pub fn test_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0x85 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, src, dst);
}

/// `NOT dst` (one's complement, `GRP3 /2`).
pub fn not_reg(buf: &mut CodeBuffer, dst: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 2, dst);
}

/// `NEG dst` (two's complement negate, `GRP3 /3`).
pub fn neg_reg(buf: &mut CodeBuffer, dst: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 3, dst);
}

/// `IMUL dst, src` (two-operand signed multiply, `0F AF /r`).
pub fn imul_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0xAF | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `MUL src` (unsigned `RDX:RAX = RAX * src`, `GRP3 /4`) — used for the high-half of a 64x64
/// unsigned multiply (`UMULH`-style sequences).
pub fn mul_rax_reg(buf: &mut CodeBuffer, src: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 4, src);
}

/// `IMUL src` (signed `RDX:RAX = RAX * src`, `GRP3 /5`) — the high-half of a signed multiply
/// (`SMULH`-style sequences).
pub fn imul_rax_reg(buf: &mut CodeBuffer, src: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 5, src);
}

/// `DIV src` (unsigned `RAX = RDX:RAX / src`, remainder in `RDX`, `GRP3 /6`).
pub fn div_rax_reg(buf: &mut CodeBuffer, src: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 6, src);
}

/// `IDIV src` (signed division, `GRP3 /7`).
pub fn idiv_rax_reg(buf: &mut CodeBuffer, src: GpReg, is_64bit: bool) {
    let opc = 0xF7 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 7, src);
}

// --- Shifts and bit manipulation ------------------------------------------------------------------

/// `shift dst, imm8` (`SHL`/`SHR`/`SAR`/`ROL`/`ROR` by an immediate count).
pub fn shift_reg_imm8(buf: &mut CodeBuffer, op: ShiftOp, dst: GpReg, amount: u8, is_64bit: bool) {
    let opc = 0xC1 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, op as u8, dst);
    buf.emit_byte(amount);
}

/// `shift dst, CL` (shift count taken from `CL`).
pub fn shift_reg_cl(buf: &mut CodeBuffer, op: ShiftOp, dst: GpReg, is_64bit: bool) {
    let opc = 0xD3 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, op as u8, dst);
}

/// `BSF dst, src` (bit scan forward — index of lowest set bit; used for the trailing-zero half
/// of `RBIT`/`CLZ`-style sequences on operands known to be nonzero).
pub fn bsf_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0xBC | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `BSR dst, src` (bit scan reverse — index of highest set bit; the basis of a software `CLZ`
/// sequence: `CLZ(x) = (width-1) - BSR(x)` for nonzero `x`).
pub fn bsr_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0xBD | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `POPCNT dst, src`.
pub fn popcnt_reg_reg(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = 0xB8 | P_EXT | P_SIMDF3 | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `BT`/`BTS`/`BTR`/`BTC reg, imm8` (`GRP8 0F BA /digit ib`) — tests (and optionally sets, resets
/// or complements) a single bit named by an immediate index, leaving the result in the host carry
/// flag. The basis of the `TBZ`/`TBNZ` translator.
pub fn bt_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, bit: u8, is_64bit: bool) {
    let opc = 0xBA | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 4, dst);
    buf.emit_byte(bit);
}

pub fn bts_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, bit: u8, is_64bit: bool) {
    let opc = 0xBA | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 5, dst);
    buf.emit_byte(bit);
}

pub fn btr_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, bit: u8, is_64bit: bool) {
    let opc = 0xBA | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 6, dst);
    buf.emit_byte(bit);
}

pub fn btc_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, bit: u8, is_64bit: bool) {
    let opc = 0xBA | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_digit(buf, opc, 7, dst);
    buf.emit_byte(bit);
}

/// `SHLD dst, src, imm8` (double-precision left shift — shifts `dst` left, filling the vacated
/// low bits from `src`'s high bits).
pub fn shld_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, amount: u8, is_64bit: bool) {
    let opc = 0xA4 | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, src, dst);
    buf.emit_byte(amount);
}

/// `SHRD dst, src, imm8` (double-precision right shift).
pub fn shrd_reg_imm8(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, amount: u8, is_64bit: bool) {
    let opc = 0xAC | P_EXT | if is_64bit { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, src, dst);
    buf.emit_byte(amount);
}

/// `BSWAP dst` (byte-swap the full register width; `0F C8+rd`, a two-byte-opcode "plus register"
/// form [`x86::emit_opcode_plus_reg`] doesn't cover, so the escape byte is emitted by hand).
pub fn bswap_reg(buf: &mut CodeBuffer, dst: GpReg, is_64bit: bool) {
    let mut rex: u8 = 0;
    if is_64bit {
        rex |= 0x08;
    }
    if dst.is_extended() {
        rex |= 0x01;
    }
    if rex != 0 {
        buf.emit_byte(0x40 | rex);
    }
    buf.emit_byte(0x0F);
    buf.emit_byte(0xC8 | dst.low3());
}

// --- Compare and conditional forms -----------------------------------------------------------------

/// `SETcc dst8` (writes 0/1 to the low byte of `dst`, zero-extension of the upper bits is left
/// to a following `MOVZX` if the caller needs the full register clean).
pub fn setcc_reg(buf: &mut CodeBuffer, cond: X86Cond, dst: GpReg) {
    let opc = (0x90 | P_EXT) + cond as u32;
    emit_modrm_digit(buf, opc, 0, dst);
}

/// `CMOVcc dst, src`.
pub fn cmovcc_reg_reg(buf: &mut CodeBuffer, cond: X86Cond, dst: GpReg, src: GpReg, is_64bit: bool) {
    let opc = (0x40 | P_EXT | if is_64bit { P_REXW } else { 0 }) + cond as u32;
    emit_modrm_reg(buf, opc, dst, src);
}

/// `Jcc rel32` (near conditional jump, `0F 8x`).
pub fn jcc_rel32(buf: &mut CodeBuffer, cond: X86Cond, rel32: i32) {
    let opc = (0x80 | P_EXT) + cond as u32;
    emit_opcode_rel32(buf, opc, rel32);
}

/// `JMP rel32` (near unconditional jump).
pub fn jmp_rel32(buf: &mut CodeBuffer, rel32: i32) {
    emit_opcode_rel32(buf, 0xE9, rel32);
}

/// `CALL rel32`.
pub fn call_rel32(buf: &mut CodeBuffer, rel32: i32) {
    emit_opcode_rel32(buf, 0xE8, rel32);
}

/// `JMP src` (indirect near jump through a register).
pub fn jmp_reg(buf: &mut CodeBuffer, src: GpReg) {
    emit_modrm_digit(buf, 0xFF, 4, src);
}

/// `CALL src` (indirect near call through a register).
pub fn call_reg(buf: &mut CodeBuffer, src: GpReg) {
    emit_modrm_digit(buf, 0xFF, 2, src);
}

/// `RET`.
pub fn ret(buf: &mut CodeBuffer) {
    emit_opcode_bare(buf, 0xC3);
}

/// `PUSH src`.
pub fn push_reg(buf: &mut CodeBuffer, src: GpReg) {
    x86::emit_opcode_plus_reg(buf, 0x50 & !0b111, src);
}

/// `POP dst`.
pub fn pop_reg(buf: &mut CodeBuffer, dst: GpReg) {
    x86::emit_opcode_plus_reg(buf, 0x58 & !0b111, dst);
}

/// `UD2` — emitted for guest `UDF` and as the tail of an exhausted-arena bailout.
pub fn ud2(buf: &mut CodeBuffer) {
    emit_opcode_bare(buf, 0x0B | P_EXT);
}

/// `NOP` (single-byte form; used for the "unknown instruction" and declared-no-op cases).
pub fn nop(buf: &mut CodeBuffer) {
    buf.emit_byte(0x90);
}

/// `PAUSE` (`F3 90`) — the spin-wait hint used for guest `WFE`/`WFI`/`YIELD`.
pub fn pause(buf: &mut CodeBuffer) {
    buf.emit_byte(0xF3);
    buf.emit_byte(0x90);
}

/// `HLT` — emitted for guest `HLT`.
pub fn hlt(buf: &mut CodeBuffer) {
    buf.emit_byte(0xF4);
}

/// `INT3` — emitted for guest `BRK`.
pub fn int3(buf: &mut CodeBuffer) {
    buf.emit_byte(0xCC);
}

/// `SYSCALL` — the host primitive guest `SVC` lowers to.
pub fn syscall(buf: &mut CodeBuffer) {
    emit_opcode_bare(buf, 0x05 | P_EXT);
}

/// `RDTSC` — used as the host primitive for `MRS <Xt>, CNTVCT_EL0`.
pub fn rdtsc(buf: &mut CodeBuffer) {
    emit_opcode_bare(buf, 0x31 | P_EXT);
}

/// `CPUID` — a cheap serializing instruction, used by the `ISB` translation alongside
/// [`lfence`] when full instruction-stream-flush behavior needs approximating more strongly.
pub fn cpuid(buf: &mut CodeBuffer) {
    emit_opcode_bare(buf, 0xA2 | P_EXT);
}

/// `CLI`.
pub fn cli(buf: &mut CodeBuffer) {
    buf.emit_byte(0xFA);
}

/// `STI`.
pub fn sti(buf: &mut CodeBuffer) {
    buf.emit_byte(0xFB);
}

/// `CQO` (sign-extend `RAX` into `RDX:RAX`) — the 64-bit-width counterpart the signed-division
/// sequences need ahead of `IDIV`; `CDQ` is the implicit 32-bit form (no `REX.W`).
pub fn cqo(buf: &mut CodeBuffer, is_64bit: bool) {
    let opc = 0x99 | if is_64bit { P_REXW } else { 0 };
    emit_opcode_bare(buf, opc);
}

// --- Fences --------------------------------------------------------------------------------------

/// `MFENCE` (full barrier; used for both `DMB` and `DSB`, since this translator has no
/// multi-core guest model to exploit a weaker host fence for).
pub fn mfence(buf: &mut CodeBuffer) {
    emit_opcode_with_rex_bare_modrm(buf, 0xAE | P_EXT, 0b11110000);
}

/// `LFENCE` — used for `ISB`, approximating "discard any speculated instruction stream state"
/// with "serialize loads", the closest cheap primitive available in user space.
pub fn lfence(buf: &mut CodeBuffer) {
    emit_opcode_with_rex_bare_modrm(buf, 0xAE | P_EXT, 0b11101000);
}

fn emit_opcode_with_rex_bare_modrm(buf: &mut CodeBuffer, opc: u32, modrm: u8) {
    if opc & (P_EXT | P_EXT38 | P_EXT3A) != 0 {
        buf.emit_byte(0x0F);
    }
    buf.emit_byte(opc as u8);
    buf.emit_byte(modrm);
}

// --- Scalar floating point (SSE/SSE2) ---------------------------------------------------------------

/// `MOVSS`/`MOVSD xmm, xmm` (scalar single/double move, register to register).
pub fn movs_xmm_xmm(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, is_double: bool) {
    let opc = 0x10 | P_EXT | if is_double { P_SIMDF2 } else { P_SIMDF3 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `MOVQ gpr, xmm` (`66 REX.W 0F 7E /r`) — moves the low 64 bits of an XMM register into a GPR.
pub fn movq_gpr_from_xmm(buf: &mut CodeBuffer, dst: GpReg, src: XmmReg) {
    let opc = 0x7E | P_EXT | P_DATA16 | P_REXW;
    emit_modrm_xmm_gpr(buf, opc, src, dst);
}

/// `MOVQ xmm, gpr` (`66 REX.W 0F 6E /r`) — the inverse of [`movq_gpr_from_xmm`].
pub fn movq_xmm_from_gpr(buf: &mut CodeBuffer, dst: XmmReg, src: GpReg) {
    let opc = 0x6E | P_EXT | P_DATA16 | P_REXW;
    emit_modrm_xmm_gpr(buf, opc, dst, src);
}

fn emit_modrm_xmm_gpr(buf: &mut CodeBuffer, opc: u32, xmm: XmmReg, gpr: GpReg) {
    // Both register files share the ModR/M numbering; the generic reg-reg path is reused by
    // passing each operand through the `Operand` trait in `x86`.
    emit_modrm_reg(buf, opc, xmm, gpr);
}

macro_rules! scalar_fp_op {
    ($name:ident, $opc:literal) => {
        pub fn $name(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, is_double: bool) {
            let opc = $opc | P_EXT | if is_double { P_SIMDF2 } else { P_SIMDF3 };
            emit_modrm_reg(buf, opc, dst, src);
        }
    };
}

scalar_fp_op!(adds_xmm_xmm, 0x58);
scalar_fp_op!(subs_xmm_xmm, 0x5C);
scalar_fp_op!(muls_xmm_xmm, 0x59);
scalar_fp_op!(divs_xmm_xmm, 0x5E);
scalar_fp_op!(sqrts_xmm_xmm, 0x51);

/// `UCOMISS`/`UCOMISD` — unordered compare, sets host ZF/PF/CF with PF=1 and ZF=CF=1 on an
/// unordered result, the pattern the scalar FP compare translator expects.
pub fn ucomis_xmm_xmm(buf: &mut CodeBuffer, a: XmmReg, b: XmmReg, is_double: bool) {
    let opc = 0x2E | P_EXT | if is_double { P_DATA16 } else { 0 };
    emit_modrm_reg(buf, opc, a, b);
}

/// `CVTSS2SD`/`CVTSD2SS` (precision conversion).
pub fn cvt_scalar_precision(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, to_double: bool) {
    let opc = 0x5A | P_EXT | if to_double { P_SIMDF3 } else { P_SIMDF2 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `PXOR xmm, xmm` (also used to zero a register: `PXOR xmm, xmm`).
pub fn pxor(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xEF | P_EXT | P_DATA16, dst, src);
}

/// `ANDPS`/`ANDPD xmm, xmm` — used by `FABS` sign-mask-AND sequences.
pub fn andp_xmm_xmm(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, is_double: bool) {
    let opc = 0x54 | P_EXT | if is_double { P_DATA16 } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `XORPS`/`XORPD xmm, xmm` — used by `FNEG` sign-bit-flip sequences.
pub fn xorp_xmm_xmm(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, is_double: bool) {
    let opc = 0x57 | P_EXT | if is_double { P_DATA16 } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

/// `MOVAPS xmm, xmm` (aligned packed move; the generic "copy one vector register to another"
/// primitive used wherever no arithmetic accompanies the move).
pub fn movaps_xmm_xmm(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0x28 | P_EXT, dst, src);
}

/// `MOVSS`/`MOVSD xmm, [base+offset]` — loads a scalar single/double directly out of
/// [`crate::state::GuestState`] memory without round-tripping through a GPR.
pub fn movs_load_xmm_mem(buf: &mut CodeBuffer, dst: XmmReg, base: GpReg, offset: i32, is_double: bool) {
    let opc = 0x10 | P_EXT | if is_double { P_SIMDF2 } else { P_SIMDF3 };
    emit_modrm_mem_op(buf, opc, dst, base, offset);
}

/// `MOVSS`/`MOVSD [base+offset], xmm` — the store counterpart of [`movs_load_xmm_mem`].
pub fn movs_store_xmm_mem(buf: &mut CodeBuffer, src: XmmReg, base: GpReg, offset: i32, is_double: bool) {
    let opc = 0x11 | P_EXT | if is_double { P_SIMDF2 } else { P_SIMDF3 };
    emit_modrm_mem_op(buf, opc, src, base, offset);
}

/// `MOVDQU xmm, [base+offset]` — unaligned 128-bit load (`GuestState::vreg` entries are not
/// guaranteed 16-byte aligned, so the packed SIMD translators always use the unaligned form
/// rather than `MOVDQA`).
pub fn movdqu_load_xmm_mem(buf: &mut CodeBuffer, dst: XmmReg, base: GpReg, offset: i32) {
    emit_modrm_mem_op(buf, 0x6F | P_EXT | P_SIMDF3, dst, base, offset);
}

/// `MOVDQU [base+offset], xmm` — the store counterpart of [`movdqu_load_xmm_mem`].
pub fn movdqu_store_xmm_mem(buf: &mut CodeBuffer, src: XmmReg, base: GpReg, offset: i32) {
    emit_modrm_mem_op(buf, 0x7F | P_EXT | P_SIMDF3, src, base, offset);
}

/// `PMULHW xmm, xmm` (packed signed multiply, high half) — the approximation basis for
/// `SQDMULH`, built from this plus a self-add.
pub fn pmulhw(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xE5 | P_EXT | P_DATA16, dst, src);
}

/// Selects the `PEXTRB`/`PEXTRW`/`PEXTRD` opcode triple for a given lane width. `PEXTRW` has both
/// a legacy MMX-era encoding (`0F C5`, GPR destination only) and an SSE4.1 one (`0F 3A 15`, memory
/// destination allowed); since every caller here extracts into a GPR, the legacy form is used for
/// 16-bit lanes for brevity, and the SSE4.1 form for 8/32/64-bit lanes (`PEXTRB`/`PEXTRD`/`PEXTRQ`).
pub fn pextr(buf: &mut CodeBuffer, dst: GpReg, src: XmmReg, lane: u8, elem_width: u8) {
    match elem_width {
        2 => {
            // PEXTRW r32, xmm, imm8 (reg field = dst, rm field = src; legacy MMX operand order).
            emit_modrm_reg(buf, 0xC5 | P_EXT | P_DATA16, dst, src);
        }
        8 => {
            emit_modrm_reg(buf, 0x16 | P_EXT3A | P_DATA16 | P_REXW, src, dst);
        }
        4 => {
            emit_modrm_reg(buf, 0x16 | P_EXT3A | P_DATA16, src, dst);
        }
        _ => {
            emit_modrm_reg(buf, 0x14 | P_EXT3A | P_DATA16, src, dst);
        }
    }
    buf.emit_byte(lane);
}

/// Selects the `PINSRB`/`PINSRW`/`PINSRD`/`PINSRQ` opcode for a given lane width (the insert
/// counterpart of [`pextr`]).
pub fn pinsr(buf: &mut CodeBuffer, dst: XmmReg, src: GpReg, lane: u8, elem_width: u8) {
    match elem_width {
        2 => emit_modrm_reg(buf, 0xC4 | P_EXT | P_DATA16, dst, src),
        8 => emit_modrm_reg(buf, 0x22 | P_EXT3A | P_DATA16 | P_REXW, dst, src),
        4 => emit_modrm_reg(buf, 0x22 | P_EXT3A | P_DATA16, dst, src),
        _ => emit_modrm_reg(buf, 0x20 | P_EXT3A | P_DATA16, dst, src),
    }
    buf.emit_byte(lane);
}

// --- Packed SIMD (SSE2/SSSE3/SSE4.1) -----------------------------------------------------------------

/// Selects the opcode byte for a lane-width-parameterized packed op given the per-width opcode
/// table `[8-bit, 16-bit, 32-bit, 64-bit]` (`0` marks "not encodable at this width").
fn width_index(elem_width: u8) -> usize {
    match elem_width {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

macro_rules! packed_simd_op {
    ($name:ident, [$b:expr, $h:expr, $w:expr, $q:expr]) => {
        pub fn $name(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
            let table = [$b, $h, $w, $q];
            let opc = table[width_index(elem_width)];
            emit_modrm_reg(buf, opc | P_EXT | P_DATA16, dst, src);
        }
    };
}

packed_simd_op!(padd, [0xFCu32, 0xFD, 0xFE, 0xD4]);
packed_simd_op!(psub, [0xF8u32, 0xF9, 0xFA, 0xFB]);
packed_simd_op!(pcmpeq, [0x74u32, 0x75, 0x76, 0x76]); // no 64-bit PCMPEQQ pre-SSE4.1; callers avoid q width
packed_simd_op!(pcmpgt, [0x64u32, 0x65, 0x66, 0x66]);

/// Byte/word-lane packed saturating arithmetic (`PADDSB`/`PADDSW`, `PADDUSB`/`PADDUSW`,
/// `PSUBSB`/`PSUBSW`, `PSUBUSB`/`PSUBUSW`). x86 has no 32/64-bit-lane packed saturating add or
/// subtract; the SIMD translator falls back to plain wraparound [`padd`]/[`psub`] at those widths
/// and documents the resulting loss of saturation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SatArithOp {
    AddS,
    AddU,
    SubS,
    SubU,
}

pub fn psat_arith(buf: &mut CodeBuffer, op: SatArithOp, dst: XmmReg, src: XmmReg, elem_width: u8) {
    let opc: u32 = match (op, elem_width) {
        (SatArithOp::AddS, 1) => 0xEC,
        (SatArithOp::AddS, _) => 0xED,
        (SatArithOp::AddU, 1) => 0xDC,
        (SatArithOp::AddU, _) => 0xDD,
        (SatArithOp::SubS, 1) => 0xE8,
        (SatArithOp::SubS, _) => 0xE9,
        (SatArithOp::SubU, 1) => 0xD8,
        (SatArithOp::SubU, _) => 0xD9,
    };
    emit_modrm_reg(buf, opc | P_EXT | P_DATA16, dst, src);
}

/// `PAND xmm, xmm`.
pub fn pand(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDB | P_EXT | P_DATA16, dst, src);
}

/// `POR xmm, xmm`.
pub fn por(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xEB | P_EXT | P_DATA16, dst, src);
}

/// `PANDN xmm, xmm` (`dst = (!dst) & src`) — used for `BIC`/`ORN` sequences together with
/// [`pand`]/[`por`].
pub fn pandn(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDF | P_EXT | P_DATA16, dst, src);
}

/// `PMULLW`/`PMULLD xmm, xmm` (low-half packed multiply). 8-bit and 64-bit lane widths have no
/// direct packed-multiply opcode; callers only use this at 16/32-bit widths.
pub fn pmull(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
    if elem_width == 2 {
        emit_modrm_reg(buf, 0xD5 | P_EXT | P_DATA16, dst, src);
    } else {
        emit_modrm_reg(buf, 0x40 | P_EXT38 | P_DATA16, dst, src); // PMULLD (SSE4.1)
    }
}

/// Signed or unsigned packed min/max at a given lane width. The SSE family splits these across
/// plain SSE2 (16-bit lanes only) and SSE4.1 (8/32-bit lanes), so unlike the other packed ops
/// this can't share one flat opcode table — `elem_width == 8` (64-bit) has no packed min/max and
/// is never requested by a translator.
pub fn pminmax(buf: &mut CodeBuffer, kind: PackedMinMaxKind, dst: XmmReg, src: XmmReg, elem_width: u8) {
    use PackedMinMaxKind::*;
    let (opc, needs_ext38) = match (kind, elem_width) {
        (MinS, 2) => (0xEA, false), // PMINSW (SSE2)
        (MaxS, 2) => (0xEE, false), // PMAXSW (SSE2)
        (MinU, 1) => (0xDA, false), // PMINUB (SSE2)
        (MaxU, 1) => (0xDE, false), // PMAXUB (SSE2)
        (MinS, 1) => (0x38, true),  // PMINSB (SSE4.1)
        (MaxS, 1) => (0x3C, true),  // PMAXSB (SSE4.1)
        (MinS, 4) => (0x39, true),  // PMINSD (SSE4.1)
        (MaxS, 4) => (0x3D, true),  // PMAXSD (SSE4.1)
        (MinU, 2) => (0x3A, true),  // PMINUW (SSE4.1)
        (MaxU, 2) => (0x3E, true),  // PMAXUW (SSE4.1)
        (MinU, 4) => (0x3B, true),  // PMINUD (SSE4.1)
        (MaxU, 4) => (0x3F, true),  // PMAXUD (SSE4.1)
        _ => (0xEA, false),
    };
    let opc = opc | P_DATA16 | if needs_ext38 { P_EXT38 } else { P_EXT };
    emit_modrm_reg(buf, opc, dst, src);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackedMinMaxKind {
    MinS,
    MaxS,
    MinU,
    MaxU,
}

/// `PSLL`/`PSRL`/`PSRA xmm, imm8` — packed shift by an immediate count, `GRP /digit` form.
pub fn pshift_imm(buf: &mut CodeBuffer, kind: PackedShiftKind, dst: XmmReg, amount: u8, elem_width: u8) {
    let (opc, digit): (u32, u8) = match (kind, elem_width) {
        (PackedShiftKind::Shl, 2) => (0x71, 6),
        (PackedShiftKind::Shl, 4) => (0x72, 6),
        (PackedShiftKind::Shl, _) => (0x73, 6),
        (PackedShiftKind::Ushr, 2) => (0x71, 2),
        (PackedShiftKind::Ushr, 4) => (0x72, 2),
        (PackedShiftKind::Ushr, _) => (0x73, 2),
        (PackedShiftKind::Sshr, 2) => (0x71, 4),
        (PackedShiftKind::Sshr, _) => (0x72, 4), // no packed 64-bit arithmetic shift; translate layer avoids this combination
    };
    emit_modrm_digit(buf, opc | P_EXT | P_DATA16, digit, dst);
    buf.emit_byte(amount);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackedShiftKind {
    Shl,
    Ushr,
    Sshr,
}

/// `PSHUFB xmm, xmm` (SSSE3; table[`Tbl`] lookup and the basis of the `ZIP`/`UZP`/`TRN` permute
/// sequences when a single fixed shuffle mask suffices).
pub fn pshufb(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0x00 | P_EXT38 | P_DATA16, dst, src);
}

/// `PUNPCKLBW`/`WD`/`DQ`/`QDQ` — interleave the low halves of two registers (`ZIP1`).
pub fn punpckl(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
    let opc = match elem_width {
        1 => 0x60,
        2 => 0x61,
        4 => 0x62,
        _ => 0x6C,
    };
    emit_modrm_reg(buf, opc | P_EXT | P_DATA16, dst, src);
}

/// `PUNPCKHBW`/`WD`/`DQ`/`QDQ` — interleave the high halves (`ZIP2`).
pub fn punpckh(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
    let opc = match elem_width {
        1 => 0x68,
        2 => 0x69,
        4 => 0x6A,
        _ => 0x6D,
    };
    emit_modrm_reg(buf, opc | P_EXT | P_DATA16, dst, src);
}

/// `PABSB`/`W`/`D` (SSSE3) — packed absolute value.
pub fn pabs(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
    let opc = match elem_width {
        1 => 0x1C,
        2 => 0x1D,
        _ => 0x1E,
    };
    emit_modrm_reg(buf, opc | P_EXT38 | P_DATA16, dst, src);
}

/// `PHADDW`/`D` (SSSE3) — horizontal packed add, the building block for a pairwise `ADDV`
/// reduction sequence.
pub fn phadd(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, elem_width: u8) {
    let opc = if elem_width == 2 { 0x01 } else { 0x02 };
    emit_modrm_reg(buf, opc | P_EXT38 | P_DATA16, dst, src);
}

/// `PSHUFD xmm, xmm, imm8` — lane shuffle, used to finish an across-vector reduction once the
/// working value has been folded into the low lane(s).
pub fn pshufd(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, imm8: u8) {
    emit_modrm_reg(buf, 0x70 | P_EXT | P_DATA16, dst, src);
    buf.emit_byte(imm8);
}

// --- Crypto (AES-NI / PCLMULQDQ / CRC32) -----------------------------------------------------------

/// `AESENC xmm, xmm`.
pub fn aesenc(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDC | P_EXT38 | P_DATA16, dst, src);
}

/// `AESDEC xmm, xmm`.
pub fn aesdec(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDE | P_EXT38 | P_DATA16, dst, src);
}

/// `AESENCLAST xmm, xmm` — one AES round with no `MixColumns`: `dst = ShiftRows(SubBytes(dst)) ^
/// src`. Used as the host primitive for guest `AESE`, which performs the same two steps but XORs
/// the round key in *before* `SubBytes`/`ShiftRows` rather than after; see the crypto translator
/// for how it folds that XOR in ahead of time so `src` can be zero here.
pub fn aesenclast(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDD | P_EXT38 | P_DATA16, dst, src);
}

/// `AESDECLAST xmm, xmm` — the inverse-round counterpart of [`aesenclast`], used as the host
/// primitive for guest `AESD`.
pub fn aesdeclast(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDF | P_EXT38 | P_DATA16, dst, src);
}

/// `AESIMC xmm, xmm` (`InvMixColumns`) — also used as the host primitive for guest `AESMC`,
/// since x86 has no forward `MixColumns`-only instruction; see the crypto translator for the
/// compensating sequence this requires.
pub fn aesimc(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg) {
    emit_modrm_reg(buf, 0xDB | P_EXT38 | P_DATA16, dst, src);
}

/// `PCLMULQDQ xmm, xmm, imm8` (carry-less multiply of one 64-bit lane from each operand, chosen
/// by `imm8`'s bit 0 and bit 4).
pub fn pclmulqdq(buf: &mut CodeBuffer, dst: XmmReg, src: XmmReg, imm8: u8) {
    emit_modrm_reg(buf, 0x44 | P_EXT3A | P_DATA16, dst, src);
    buf.emit_byte(imm8);
}

/// `CRC32 dst, src` (the SSE4.2 `CRC32C` instruction; `size` selects the source operand width in
/// bytes).
pub fn crc32(buf: &mut CodeBuffer, dst: GpReg, src: GpReg, size: u8, is_64bit_dst: bool) {
    let opc = match size {
        1 => 0xF0 | P_EXT38 | P_SIMDF2,
        _ if size == 2 => 0xF1 | P_EXT38 | P_SIMDF2 | P_DATA16,
        _ => 0xF1 | P_EXT38 | P_SIMDF2,
    } | if is_64bit_dst { P_REXW } else { 0 };
    emit_modrm_reg(buf, opc, dst, src);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ret_is_single_byte() {
        let mut buf = CodeBuffer::new(4);
        ret(&mut buf);
        assert_eq!(buf.as_slice(), &[0xC3]);
    }

    #[test]
    fn jmp_rel32_encodes_e9_plus_displacement() {
        let mut buf = CodeBuffer::new(8);
        jmp_rel32(&mut buf, 3);
        assert_eq!(buf.as_slice(), &[0xE9, 0x03, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn add_reg_imm8_uses_rexw_for_64bit() {
        let mut buf = CodeBuffer::new(8);
        arith_reg_imm8(&mut buf, ArithOp::Add, GpReg::Rcx, 1, true);
        assert_eq!(buf.as_slice(), &[0x48, 0x83, 0xC1, 0x01]);
    }

    #[test]
    fn x86cond_invert_flips_low_bit() {
        assert_eq!(X86Cond::Je.invert() as u8, X86Cond::Jne as u8);
        assert_eq!(X86Cond::Jl.invert() as u8, X86Cond::Jge as u8);
    }

    #[test]
    fn setcc_encodes_group0_digit() {
        let mut buf = CodeBuffer::new(8);
        setcc_reg(&mut buf, X86Cond::Je, GpReg::Rax);
        assert_eq!(buf.as_slice(), &[0x0F, 0x94, 0xC0]);
    }

    #[test]
    fn mov_reg_imm64_uses_opcode_plus_register() {
        let mut buf = CodeBuffer::new(16);
        mov_reg_imm64(&mut buf, GpReg::Rax, 0x1122_3344_5566_7788);
        assert_eq!(buf.as_slice()[0], 0x48);
        assert_eq!(buf.as_slice()[1], 0xB8);
    }
}
