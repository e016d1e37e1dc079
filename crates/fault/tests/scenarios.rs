//! End-to-end pipeline scenarios: snapshot → decode → classify → policy.
//!
//! Each scenario feeds a synthetic register snapshot through the whole pure
//! pipeline and checks the resulting disposition, the way the trap entry stub
//! drives it on hardware.

#![allow(clippy::unwrap_used)]

use fault::{
    classify, decode, disposition, BusPrecision, Disposition, FatalReason, FaultCause, FaultPhase,
    FaultingContext, MemoryExtent, PolicyConfig, Privilege, RawFaultRegisters,
};
use fault::registers::{
    BFSR_BFARVALID, BFSR_IMPRECISERR, HFSR_FORCED, HFSR_VECTTBL, MMFSR_DACCVIOL, MMFSR_MMARVALID,
    MMFSR_MSTKERR, UFSR_NOCP,
};

fn thread_ctx() -> FaultingContext {
    FaultingContext {
        pc: 0x0800_2000,
        sp: 0x2000_0F80,
        privilege: Privilege::Thread,
        stack: Some(MemoryExtent::new(0x2000_0000, 0x1000).unwrap()),
        heap: None,
    }
}

fn run(snapshot: &RawFaultRegisters, ctx: &FaultingContext, config: &PolicyConfig) -> Disposition {
    disposition(&classify(&decode(snapshot)), ctx, config)
}

// ── Scenario A ───────────────────────────────────────────────────────────────
// Data access violation at an address inside the thread's own stack: the
// thread is sacrificed, the system continues.
#[test]
fn scenario_a_data_violation_in_own_stack_terminates_thread() {
    let snapshot = RawFaultRegisters {
        cfsr: MMFSR_DACCVIOL | MMFSR_MMARVALID,
        hfsr: 0,
        mmfar: 0x2000_0100,
        bfar: 0,
    };
    assert_eq!(
        run(&snapshot, &thread_ctx(), &PolicyConfig::default()),
        Disposition::TerminateContext
    );
}

// ── Scenario B ───────────────────────────────────────────────────────────────
// Imprecise bus error: fatal regardless of address validity, because the
// reported state cannot be attributed to the interrupted instruction.
#[test]
fn scenario_b_imprecise_bus_error_is_system_fatal() {
    for bfar_state in [0u32, BFSR_BFARVALID] {
        let snapshot = RawFaultRegisters {
            cfsr: BFSR_IMPRECISERR | bfar_state,
            hfsr: 0,
            mmfar: 0,
            bfar: 0x2000_0100,
        };
        assert_eq!(
            run(&snapshot, &thread_ctx(), &PolicyConfig::default()),
            Disposition::SystemFatal {
                reason: FatalReason::ImpreciseBusError
            }
        );
    }
}

// ── Scenario C ───────────────────────────────────────────────────────────────
// Vector table read failure outranks a simultaneously latched memory fault.
#[test]
fn scenario_c_vector_table_corruption_wins_over_memory_fault() {
    let snapshot = RawFaultRegisters {
        cfsr: MMFSR_DACCVIOL | MMFSR_MMARVALID,
        hfsr: HFSR_VECTTBL,
        mmfar: 0x2000_0100,
        bfar: 0,
    };
    let cause = classify(&decode(&snapshot));
    assert_eq!(cause, FaultCause::VectorTableCorruption);
    assert_eq!(
        disposition(&cause, &thread_ctx(), &PolicyConfig::default()),
        Disposition::SystemFatal {
            reason: FatalReason::VectorTableCorruption
        }
    );
}

// ── Scenario D ───────────────────────────────────────────────────────────────
// First FP use under lazy FP context switching: resume after fix-up, and the
// cleared post-fix-up register state must not decode into the same trap.
#[test]
fn scenario_d_lazy_fp_first_use_continues_and_does_not_recur() {
    let snapshot = RawFaultRegisters {
        cfsr: UFSR_NOCP,
        hfsr: 0,
        mmfar: 0,
        bfar: 0,
    };
    let config = PolicyConfig {
        lazy_fp_context: true,
    };
    assert_eq!(run(&snapshot, &thread_ctx(), &config), Disposition::Continue);

    // The entry stub consumes exactly what it observed; afterwards the
    // usage byte is clear and decoding the post-fix-up state finds nothing.
    let cleared = RawFaultRegisters {
        cfsr: snapshot.cfsr & !snapshot.cfsr_consume_mask(),
        ..snapshot
    };
    let records = decode(&cleared);
    assert!(records.usage.is_none(), "fix-up must not leave the trap armed");
    assert!(records.is_empty());
}

// ── Scenario E ───────────────────────────────────────────────────────────────
// Stacking fault and data access violation latched together: the stacking
// fault wins the tie-break because the stack pointer itself is suspect.
#[test]
fn scenario_e_stacking_fault_outranks_data_access() {
    let snapshot = RawFaultRegisters {
        cfsr: MMFSR_MSTKERR | MMFSR_DACCVIOL | MMFSR_MMARVALID,
        hfsr: HFSR_FORCED,
        mmfar: 0x2000_0100,
        bfar: 0,
    };
    assert_eq!(
        classify(&decode(&snapshot)),
        FaultCause::MemoryAccessViolation {
            address: None,
            during: FaultPhase::ExceptionEntry,
        }
    );
}

// ── Escalation ───────────────────────────────────────────────────────────────
// A forced hard fault with a specific byte latched resolves to the specific
// cause, not Unknown; without one it resolves to Unknown and is fatal.
#[test]
fn escalated_fault_uses_the_specific_record() {
    let snapshot = RawFaultRegisters {
        cfsr: MMFSR_DACCVIOL | MMFSR_MMARVALID,
        hfsr: HFSR_FORCED,
        mmfar: 0x2000_0080,
        bfar: 0,
    };
    assert_eq!(
        run(&snapshot, &thread_ctx(), &PolicyConfig::default()),
        Disposition::TerminateContext
    );

    let bare = RawFaultRegisters {
        cfsr: 0,
        hfsr: HFSR_FORCED,
        mmfar: 0,
        bfar: 0,
    };
    assert_eq!(
        run(&bare, &thread_ctx(), &PolicyConfig::default()),
        Disposition::SystemFatal {
            reason: FatalReason::UnknownCause
        }
    );
}

// ── Kernel context ───────────────────────────────────────────────────────────
#[test]
fn kernel_context_is_fatal_for_every_thread_survivable_cause() {
    let kernel = FaultingContext {
        pc: 0x0800_0100,
        sp: 0x2003_FF00,
        privilege: Privilege::Kernel,
        stack: None,
        heap: None,
    };
    let snapshot = RawFaultRegisters {
        cfsr: MMFSR_DACCVIOL | MMFSR_MMARVALID,
        hfsr: 0,
        mmfar: 0x2000_0100,
        bfar: 0,
    };
    assert_eq!(
        run(&snapshot, &kernel, &PolicyConfig::default()),
        Disposition::SystemFatal {
            reason: FatalReason::KernelFault
        }
    );
}

// Imprecise-vs-precise interaction sanity: when both are latched the precise
// report carries the address and the fault remains thread-attributable.
#[test]
fn precise_report_survives_simultaneous_imprecise_latch() {
    let snapshot = RawFaultRegisters {
        cfsr: fault::registers::BFSR_PRECISERR | BFSR_IMPRECISERR | BFSR_BFARVALID,
        hfsr: 0,
        mmfar: 0,
        bfar: 0x2000_0040,
    };
    let cause = classify(&decode(&snapshot));
    assert_eq!(
        cause,
        FaultCause::BusError {
            address: Some(0x2000_0040),
            precision: BusPrecision::Precise,
            during: FaultPhase::Execution,
        }
    );
    assert_eq!(
        disposition(&cause, &thread_ctx(), &PolicyConfig::default()),
        Disposition::TerminateContext
    );
}
