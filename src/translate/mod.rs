//! Per-family operation translation.
//!
//! Each submodule owns one guest instruction family and is a total function from its decoded
//! operand struct to emitted host bytes. [`translate_one`] is the single entry point block
//! discovery (`crate::block`) calls for every decoded [`Operation`]; it does no decoding or
//! control-flow bookkeeping of its own; that is block discovery's job, using
//! [`crate::decode::op::Operation::is_terminator`] to know when to stop.

pub mod alu;
pub mod bitfield;
pub mod branch;
pub mod cond;
pub mod condselect;
pub mod crypto;
pub mod exit;
pub mod fp;
pub mod memory;
pub mod move_wide;
pub mod regmap;
pub mod simd;
pub mod system;

use crate::buffer::CodeBuffer;
use crate::decode::op::Operation;
use crate::emit;

/// Lowers one decoded guest instruction, located at guest address `pc`, into `buf`.
///
/// `pc` is only consulted by the branch family, to turn a `byte_offset` into an absolute target
/// and to compute `BL`/`BLR`'s link value; every other family addresses guest state purely
/// through its own operand fields. `Operation::Unknown` lowers to a host `NOP` and otherwise does
/// nothing — the decoder's contract is to keep translating rather than surface an error.
pub fn translate_one(buf: &mut CodeBuffer, op: Operation, pc: u64) {
    match op {
        Operation::Alu(op) => alu::translate_alu(buf, op),
        Operation::Compare(op) => alu::translate_compare(buf, op),
        Operation::MoveWide(op) => move_wide::translate_move_wide(buf, op),
        Operation::Load(op) => memory::translate_load(buf, op),
        Operation::Store(op) => memory::translate_store(buf, op),
        Operation::Branch(op) => branch::translate_branch(buf, op, pc),
        Operation::ConditionalSelect(op) => condselect::translate_condselect(buf, op),
        Operation::Bitfield(op) => bitfield::translate_bitfield(buf, op),
        Operation::System(op) => system::translate_system(buf, op),
        Operation::FpScalar(op) => fp::translate_fp_scalar(buf, op),
        Operation::Simd(op) => simd::translate_simd(buf, op),
        Operation::Crypto(op) => crypto::translate_crypto(buf, op),
        Operation::Unknown(_) => emit::nop(buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::op::{MoveWideKind, MoveWideOp};

    #[test]
    fn unknown_lowers_to_a_single_nop() {
        let mut buf = CodeBuffer::new(16);
        translate_one(&mut buf, Operation::Unknown(0xdead_beef), 0x1000);
        assert_eq!(buf.as_slice(), &[0x90]);
    }

    #[test]
    fn dispatches_move_wide_by_tag() {
        let mut buf = CodeBuffer::new(64);
        translate_one(
            &mut buf,
            Operation::MoveWide(MoveWideOp {
                kind: MoveWideKind::Movz,
                rd: 0,
                imm16: 1,
                shift: 0,
                is_64bit: true,
            }),
            0x2000,
        );
        assert!(!buf.is_overflowed());
        assert!(buf.current_size() > 0);
    }
}
