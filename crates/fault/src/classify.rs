//! Fault classifier and escalation resolver.
//!
//! A hard fault on ARMv7-M is a catch-all: it fires for genuinely
//! unrecoverable conditions (vector table read failure) and for configurable
//! faults that could not be dispatched to their own handler (escalation,
//! HFSR.FORCED). The classifier collapses a [`FaultRecordSet`] into exactly
//! one canonical [`FaultCause`] per trap:
//!
//! 1. Vector-table read failure wins outright — the processor cannot trust
//!    its own exception dispatch, so no further resolution is attempted.
//! 2. Otherwise, if a specific fault class (memory, bus, usage) is latched,
//!    the cause is built from that record — the hard-fault record, when
//!    present, only says the specific fault was escalated.
//! 3. Otherwise the cause is `Unknown`; policy treats it as fatal.
//!
//! # Tie-breaks
//!
//! Within a record, stacking and unstacking faults take precedence over data
//! and instruction access faults: they mean the stack pointer itself is
//! suspect, which invalidates the address latched for the other sub-causes
//! (the address is therefore dropped, not propagated). Lazy floating-point
//! state-preservation faults sit with the stacking group — they fire on the
//! same context-save path. Precise bus faults take precedence over imprecise
//! ones for address reporting. Usage faults rank control-flow-integrity
//! violations first.
//!
//! Across classes, memory > bus > usage, following CFSR byte order.

use crate::record::{BusFaultRecord, FaultRecordSet, MemFaultRecord, UsageFaultRecord};

/// When the faulting access happened relative to exception processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultPhase {
    /// While stacking context on exception entry (including lazy FP
    /// state preservation).
    ExceptionEntry,
    /// While unstacking context on exception return.
    ExceptionExit,
    /// During ordinary instruction execution.
    Execution,
}

/// Whether a bus fault's reported state corresponds to the instruction that
/// caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusPrecision {
    /// Synchronous: the reported address and context are trustworthy.
    Precise,
    /// Asynchronous: detection lagged the access; the interrupted instruction
    /// and any latched address may be unrelated.
    Imprecise,
}

/// Reason payload for undefined-behavior faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UbReason {
    /// Invalid EXC_RETURN loaded on exception return.
    InvalidExceptionReturn,
    /// Invalid EPSR execution state.
    InvalidState,
    /// Undefined instruction encoding.
    UndefinedInstruction,
    /// Coprocessor access with the coprocessor absent or disabled. With lazy
    /// FP context switching this is the expected first-use trap.
    NoCoprocessor,
    /// Unaligned access with trapping enabled.
    UnalignedAccess,
    /// Divide by zero with trapping enabled.
    DivideByZero,
}

/// The canonical, escalation-resolved description of one trap.
///
/// Exactly one value is produced per trap, however many raw sub-flags were
/// simultaneously latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultCause {
    /// MPU-reported access violation.
    MemoryAccessViolation {
        /// Faulting address, when the hardware latched a trustworthy one.
        address: Option<u32>,
        /// Phase of the violating access.
        during: FaultPhase,
    },
    /// Bus error from the memory system.
    BusError {
        /// Faulting address; absent for imprecise, instruction-fetch, and
        /// stacking-phase errors.
        address: Option<u32>,
        /// Whether the report corresponds to the faulting instruction.
        precision: BusPrecision,
        /// Phase of the erroring access.
        during: FaultPhase,
    },
    /// The faulting context executed something architecturally undefined.
    UndefinedBehavior {
        /// What was undefined about it.
        reason: UbReason,
    },
    /// The processor failed to read its own exception vector table. The
    /// exception dispatch machinery itself cannot be trusted.
    VectorTableCorruption,
    /// A hard fault with no specific cause latched. Never assumed benign.
    Unknown,
}

impl FaultCause {
    /// Short static name for logs and post-mortem dumps.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MemoryAccessViolation { .. } => "memory-access-violation",
            Self::BusError { .. } => "bus-error",
            Self::UndefinedBehavior { .. } => "undefined-behavior",
            Self::VectorTableCorruption => "vector-table-corruption",
            Self::Unknown => "unknown",
        }
    }
}

/// Resolve a record set into the single canonical cause for this trap.
#[must_use]
pub fn classify(records: &FaultRecordSet) -> FaultCause {
    if let Some(hard) = records.hard {
        if hard.vector_table_read {
            return FaultCause::VectorTableCorruption;
        }
    }
    if let Some(mem) = records.mem {
        return classify_mem(&mem);
    }
    if let Some(bus) = records.bus {
        return classify_bus(&bus);
    }
    if let Some(usage) = records.usage {
        return classify_usage(&usage);
    }
    FaultCause::Unknown
}

fn classify_mem(mem: &MemFaultRecord) -> FaultCause {
    // Stacking-group faults invalidate the latched address for everything
    // else in the byte, so they win and carry no address.
    if mem.stacking {
        return FaultCause::MemoryAccessViolation {
            address: None,
            during: FaultPhase::ExceptionEntry,
        };
    }
    if mem.unstacking {
        return FaultCause::MemoryAccessViolation {
            address: None,
            during: FaultPhase::ExceptionExit,
        };
    }
    if mem.lazy_fp_preservation {
        return FaultCause::MemoryAccessViolation {
            address: None,
            during: FaultPhase::ExceptionEntry,
        };
    }
    if mem.data_access {
        return FaultCause::MemoryAccessViolation {
            address: mem.address,
            during: FaultPhase::Execution,
        };
    }
    // Instruction access violation: MMFAR is never valid for this sub-cause.
    FaultCause::MemoryAccessViolation {
        address: None,
        during: FaultPhase::Execution,
    }
}

fn classify_bus(bus: &BusFaultRecord) -> FaultCause {
    if bus.stacking {
        return FaultCause::BusError {
            address: None,
            precision: BusPrecision::Precise,
            during: FaultPhase::ExceptionEntry,
        };
    }
    if bus.unstacking {
        return FaultCause::BusError {
            address: None,
            precision: BusPrecision::Precise,
            during: FaultPhase::ExceptionExit,
        };
    }
    if bus.lazy_fp_preservation {
        return FaultCause::BusError {
            address: None,
            precision: BusPrecision::Precise,
            during: FaultPhase::ExceptionEntry,
        };
    }
    // Precise beats imprecise for address reporting when both are latched.
    if bus.precise {
        return FaultCause::BusError {
            address: bus.address,
            precision: BusPrecision::Precise,
            during: FaultPhase::Execution,
        };
    }
    if bus.instruction_bus {
        // BFAR is never valid for instruction fetch errors.
        return FaultCause::BusError {
            address: None,
            precision: BusPrecision::Precise,
            during: FaultPhase::Execution,
        };
    }
    FaultCause::BusError {
        address: None,
        precision: BusPrecision::Imprecise,
        during: FaultPhase::Execution,
    }
}

fn classify_usage(usage: &UsageFaultRecord) -> FaultCause {
    // Control-flow-integrity violations outrank everything else.
    let reason = if usage.invalid_pc {
        UbReason::InvalidExceptionReturn
    } else if usage.invalid_state {
        UbReason::InvalidState
    } else if usage.undefined_instruction {
        UbReason::UndefinedInstruction
    } else if usage.no_coprocessor {
        UbReason::NoCoprocessor
    } else if usage.unaligned {
        UbReason::UnalignedAccess
    } else {
        UbReason::DivideByZero
    };
    FaultCause::UndefinedBehavior { reason }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::record::HardFaultRecord;
    use crate::registers::*;

    fn classify_snapshot(cfsr: u32, hfsr: u32, mmfar: u32, bfar: u32) -> FaultCause {
        classify(&decode(&RawFaultRegisters {
            cfsr,
            hfsr,
            mmfar,
            bfar,
        }))
    }

    #[test]
    fn test_vector_table_read_failure_wins_over_everything() {
        // Even with a memory fault latched alongside, VECTTBL resolves first.
        let cause = classify_snapshot(
            MMFSR_DACCVIOL | MMFSR_MMARVALID,
            HFSR_VECTTBL | HFSR_FORCED,
            0x2000_0100,
            0,
        );
        assert_eq!(cause, FaultCause::VectorTableCorruption);
    }

    #[test]
    fn test_escalated_fault_resolves_to_specific_cause() {
        // FORCED + latched BFSR: the hard fault is an escalation wrapper and
        // the bus record supplies the cause.
        let cause = classify_snapshot(
            BFSR_PRECISERR | BFSR_BFARVALID,
            HFSR_FORCED,
            0,
            0x6000_0010,
        );
        assert_eq!(
            cause,
            FaultCause::BusError {
                address: Some(0x6000_0010),
                precision: BusPrecision::Precise,
                during: FaultPhase::Execution,
            }
        );
    }

    #[test]
    fn test_forced_hard_fault_without_specific_byte_is_unknown() {
        let cause = classify_snapshot(0, HFSR_FORCED, 0, 0);
        assert_eq!(cause, FaultCause::Unknown);
    }

    #[test]
    fn test_empty_record_set_is_unknown() {
        let cause = classify(&FaultRecordSet::default());
        assert_eq!(cause, FaultCause::Unknown);
    }

    #[test]
    fn test_stacking_outranks_data_access_and_drops_address() {
        // MSTKERR + DACCVIOL with a "valid" address: the stack pointer is
        // suspect, so the cause is the stacking fault and the address is
        // withheld.
        let cause = classify_snapshot(
            MMFSR_MSTKERR | MMFSR_DACCVIOL | MMFSR_MMARVALID,
            0,
            0x2000_0200,
            0,
        );
        assert_eq!(
            cause,
            FaultCause::MemoryAccessViolation {
                address: None,
                during: FaultPhase::ExceptionEntry,
            }
        );
    }

    #[test]
    fn test_unstacking_maps_to_exception_exit() {
        let cause = classify_snapshot(MMFSR_MUNSTKERR, 0, 0, 0);
        assert_eq!(
            cause,
            FaultCause::MemoryAccessViolation {
                address: None,
                during: FaultPhase::ExceptionExit,
            }
        );
    }

    #[test]
    fn test_lazy_fp_preservation_sits_with_entry_phase() {
        let cause = classify_snapshot(MMFSR_MLSPERR, 0, 0, 0);
        assert_eq!(
            cause,
            FaultCause::MemoryAccessViolation {
                address: None,
                during: FaultPhase::ExceptionEntry,
            }
        );
    }

    #[test]
    fn test_precise_outranks_imprecise_for_address_reporting() {
        let cause = classify_snapshot(
            BFSR_PRECISERR | BFSR_IMPRECISERR | BFSR_BFARVALID,
            0,
            0,
            0x6000_0044,
        );
        assert_eq!(
            cause,
            FaultCause::BusError {
                address: Some(0x6000_0044),
                precision: BusPrecision::Precise,
                during: FaultPhase::Execution,
            }
        );
    }

    #[test]
    fn test_lone_imprecise_is_flagged_and_addressless() {
        let cause = classify_snapshot(BFSR_IMPRECISERR, 0, 0, 0xFFFF_FFFF);
        assert_eq!(
            cause,
            FaultCause::BusError {
                address: None,
                precision: BusPrecision::Imprecise,
                during: FaultPhase::Execution,
            }
        );
    }

    #[test]
    fn test_instruction_bus_error_has_no_address() {
        let cause = classify_snapshot(BFSR_IBUSERR, 0, 0, 0x1234_5678);
        assert_eq!(
            cause,
            FaultCause::BusError {
                address: None,
                precision: BusPrecision::Precise,
                during: FaultPhase::Execution,
            }
        );
    }

    #[test]
    fn test_cross_class_precedence_memory_first() {
        let cause = classify_snapshot(MMFSR_IACCVIOL | BFSR_IBUSERR | UFSR_DIVBYZERO, 0, 0, 0);
        assert!(matches!(cause, FaultCause::MemoryAccessViolation { .. }));

        let cause = classify_snapshot(BFSR_IBUSERR | UFSR_DIVBYZERO, 0, 0, 0);
        assert!(matches!(cause, FaultCause::BusError { .. }));
    }

    #[test]
    fn test_usage_tie_break_ranks_control_flow_first() {
        let cause = classify_snapshot(UFSR_INVPC | UFSR_NOCP | UFSR_DIVBYZERO, 0, 0, 0);
        assert_eq!(
            cause,
            FaultCause::UndefinedBehavior {
                reason: UbReason::InvalidExceptionReturn
            }
        );

        let cause = classify_snapshot(UFSR_NOCP | UFSR_DIVBYZERO, 0, 0, 0);
        assert_eq!(
            cause,
            FaultCause::UndefinedBehavior {
                reason: UbReason::NoCoprocessor
            }
        );
    }

    #[test]
    fn test_debug_event_alone_is_unknown() {
        let set = FaultRecordSet {
            hard: Some(HardFaultRecord {
                vector_table_read: false,
                forced: false,
                debug_event: true,
            }),
            ..FaultRecordSet::default()
        };
        assert_eq!(classify(&set), FaultCause::Unknown);
    }
}
