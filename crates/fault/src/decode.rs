//! Fault-status decoder: snapshot in, records out.
//!
//! Pure bit extraction. Every sub-cause flag is decoded independently; no
//! flag implies or excludes another at this layer, and no control-flow
//! decisions are made here. Combination logic (escalation, tie-breaks)
//! belongs to [`crate::classify`].
//!
//! The decoder never reads hardware — it sees only the immutable
//! [`RawFaultRegisters`] snapshot taken by the trap entry stub — so identical
//! snapshots decode to identical record sets, independent of call order or
//! call count.

use crate::record::{
    BusFaultRecord, FaultRecordSet, HardFaultRecord, MemFaultRecord, UsageFaultRecord,
};
use crate::registers::{
    RawFaultRegisters, BFSR_BFARVALID, BFSR_IBUSERR, BFSR_IMPRECISERR, BFSR_LSPERR,
    BFSR_PRECISERR, BFSR_STKERR, BFSR_UNSTKERR, CFSR_CLEAR_BFSR, CFSR_CLEAR_MMFSR,
    CFSR_CLEAR_UFSR, HFSR_DEBUGEVT, HFSR_FORCED, HFSR_VECTTBL, MMFSR_DACCVIOL, MMFSR_IACCVIOL,
    MMFSR_MLSPERR, MMFSR_MMARVALID, MMFSR_MSTKERR, MMFSR_MUNSTKERR, UFSR_DIVBYZERO, UFSR_INVPC,
    UFSR_INVSTATE, UFSR_NOCP, UFSR_UNALIGNED, UFSR_UNDEFINSTR,
};

/// Decode a snapshot into the set of latched fault records.
///
/// A fault class appears in the output only when its status byte has at least
/// one bit set. Addresses are reported only under a set address-valid flag;
/// an absent address must never be substituted with a previous trap's value.
#[must_use]
pub fn decode(snapshot: &RawFaultRegisters) -> FaultRecordSet {
    FaultRecordSet {
        hard: decode_hard(snapshot.hfsr),
        mem: decode_mem(snapshot.cfsr, snapshot.mmfar),
        bus: decode_bus(snapshot.cfsr, snapshot.bfar),
        usage: decode_usage(snapshot.cfsr),
    }
}

fn decode_hard(hfsr: u32) -> Option<HardFaultRecord> {
    if hfsr & (HFSR_VECTTBL | HFSR_FORCED | HFSR_DEBUGEVT) == 0 {
        return None;
    }
    Some(HardFaultRecord {
        vector_table_read: hfsr & HFSR_VECTTBL != 0,
        forced: hfsr & HFSR_FORCED != 0,
        debug_event: hfsr & HFSR_DEBUGEVT != 0,
    })
}

fn decode_mem(cfsr: u32, mmfar: u32) -> Option<MemFaultRecord> {
    if cfsr & CFSR_CLEAR_MMFSR == 0 {
        return None;
    }
    Some(MemFaultRecord {
        instruction_access: cfsr & MMFSR_IACCVIOL != 0,
        data_access: cfsr & MMFSR_DACCVIOL != 0,
        unstacking: cfsr & MMFSR_MUNSTKERR != 0,
        stacking: cfsr & MMFSR_MSTKERR != 0,
        lazy_fp_preservation: cfsr & MMFSR_MLSPERR != 0,
        address: (cfsr & MMFSR_MMARVALID != 0).then_some(mmfar),
    })
}

fn decode_bus(cfsr: u32, bfar: u32) -> Option<BusFaultRecord> {
    if cfsr & CFSR_CLEAR_BFSR == 0 {
        return None;
    }
    Some(BusFaultRecord {
        instruction_bus: cfsr & BFSR_IBUSERR != 0,
        precise: cfsr & BFSR_PRECISERR != 0,
        imprecise: cfsr & BFSR_IMPRECISERR != 0,
        unstacking: cfsr & BFSR_UNSTKERR != 0,
        stacking: cfsr & BFSR_STKERR != 0,
        lazy_fp_preservation: cfsr & BFSR_LSPERR != 0,
        address: (cfsr & BFSR_BFARVALID != 0).then_some(bfar),
    })
}

fn decode_usage(cfsr: u32) -> Option<UsageFaultRecord> {
    if cfsr & CFSR_CLEAR_UFSR == 0 {
        return None;
    }
    Some(UsageFaultRecord {
        undefined_instruction: cfsr & UFSR_UNDEFINSTR != 0,
        invalid_state: cfsr & UFSR_INVSTATE != 0,
        invalid_pc: cfsr & UFSR_INVPC != 0,
        no_coprocessor: cfsr & UFSR_NOCP != 0,
        unaligned: cfsr & UFSR_UNALIGNED != 0,
        divide_by_zero: cfsr & UFSR_DIVBYZERO != 0,
    })
}
