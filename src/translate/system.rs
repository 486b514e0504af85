//! System, barrier and MSR/MRS translation.
//!
//! Most of this family has no faithful host equivalent and is approximated: there is no
//! multi-core guest model to make `SEV`/cache-maintenance instructions meaningful, so those are
//! architectural no-ops; `HVC`/`SMC` (a different, unsupported privilege level) become `UD2`; and
//! `ISB`'s "flush the instruction stream" semantics is approximated with `LFENCE` plus a
//! zero-leaf `CPUID`, the cheapest user-space-available serializing sequence.

use crate::buffer::CodeBuffer;
use crate::decode::op::SystemOp;
use crate::emit::{self, ArithOp, ShiftOp};

use super::regmap::{self, fpcr_offset, fpsr_offset, tpidr_offset, SCRATCH_0, SCRATCH_2, STATE_BASE};

/// Synthetic `CNTFRQ_EL0` value reported to guest code. 1 GHz is a plausible host counter
/// frequency and matches what `RDTSC`-based `CNTVCT_EL0` reports this translator's
/// `MRS CNTVCT_EL0` on most modern x86_64 hosts.
const SYNTHETIC_CNTFRQ_HZ: u64 = 1_000_000_000;

pub fn translate_system(buf: &mut CodeBuffer, op: SystemOp) {
    match op {
        SystemOp::Svc { .. } => emit::syscall(buf),
        SystemOp::Hvc { .. } | SystemOp::Smc { .. } => emit::ud2(buf),
        SystemOp::Brk { .. } => emit::int3(buf),
        SystemOp::Hlt { .. } => emit::hlt(buf),
        SystemOp::Udf { .. } => emit::ud2(buf),

        SystemOp::Dmb | SystemOp::Dsb => emit::mfence(buf),
        SystemOp::Isb => {
            emit::lfence(buf);
            emit::mov_reg_imm32(buf, SCRATCH_0, 0, false);
            emit::cpuid(buf);
        }

        // No explicit guest cache/TLB model: this translator runs every guest instruction stream
        // through the same flat host mapping, so cache-maintenance and TLB-invalidation ops are
        // no-ops.
        SystemOp::DcZva { .. }
        | SystemOp::DcCvac { .. }
        | SystemOp::DcCivac { .. }
        | SystemOp::IcIvau { .. }
        | SystemOp::Tlbi => {}

        SystemOp::Wfe | SystemOp::Wfi | SystemOp::Yield => emit::pause(buf),
        SystemOp::Nop => emit::nop(buf),
        // No multi-core event-register model to signal through.
        SystemOp::Sev | SystemOp::Sevl => {}

        SystemOp::MrsCntvct { rt } => {
            emit::rdtsc(buf);
            // RDTSC always targets the physical RAX/RDX pair, which are exactly SCRATCH_0/SCRATCH_2.
            emit::shift_reg_imm8(buf, ShiftOp::Shl, SCRATCH_2, 32, true);
            emit::arith_reg_reg(buf, ArithOp::Or, SCRATCH_0, SCRATCH_2, true);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, rt);
        }
        SystemOp::MrsCntfrq { rt } => {
            emit::mov_reg_imm64(buf, SCRATCH_0, SYNTHETIC_CNTFRQ_HZ);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, rt);
        }

        SystemOp::MrsTpidrEl0 { rt } => {
            emit::load_reg_mem(buf, SCRATCH_0, STATE_BASE, tpidr_offset(), 8, false, true);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, rt);
        }
        SystemOp::MsrTpidrEl0 { rt } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, true);
            emit::store_reg_mem(buf, SCRATCH_0, STATE_BASE, tpidr_offset(), 8);
        }

        SystemOp::MrsFpcr { rt } => {
            emit::load_reg_mem(buf, SCRATCH_0, STATE_BASE, fpcr_offset(), 4, false, true);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, rt);
        }
        SystemOp::MsrFpcr { rt } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, true);
            emit::store_reg_mem(buf, SCRATCH_0, STATE_BASE, fpcr_offset(), 4);
        }
        SystemOp::MrsFpsr { rt } => {
            emit::load_reg_mem(buf, SCRATCH_0, STATE_BASE, fpsr_offset(), 4, false, true);
            regmap::store_gpr_or_discard(buf, SCRATCH_0, rt);
        }
        SystemOp::MsrFpsr { rt } => {
            regmap::load_gpr_or_zero(buf, SCRATCH_0, rt, true);
            emit::store_reg_mem(buf, SCRATCH_0, STATE_BASE, fpsr_offset(), 4);
        }

        SystemOp::MrsMsrOther => emit::ud2(buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svc_lowers_to_syscall() {
        let mut buf = CodeBuffer::new(16);
        translate_system(&mut buf, SystemOp::Svc { imm16: 0 });
        assert_eq!(buf.as_slice(), &[0x0F, 0x05]);
    }

    #[test]
    fn brk_lowers_to_int3() {
        let mut buf = CodeBuffer::new(16);
        translate_system(&mut buf, SystemOp::Brk { imm16: 0xf000 });
        assert_eq!(buf.as_slice(), &[0xCC]);
    }

    #[test]
    fn unrecognized_system_register_access_is_undefined() {
        let mut buf = CodeBuffer::new(16);
        translate_system(&mut buf, SystemOp::MrsMsrOther);
        assert_eq!(buf.as_slice(), &[0x0F, 0x0B]);
    }

    #[test]
    fn cache_maintenance_is_a_no_op() {
        let mut buf = CodeBuffer::new(16);
        translate_system(&mut buf, SystemOp::DcZva { rt: 0 });
        assert_eq!(buf.current_size(), 0);
    }
}
