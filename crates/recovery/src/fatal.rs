//! System-fatal sink seam and the reset-surviving post-mortem slot.
//!
//! When thread isolation is impossible the whole system dies through a
//! registered [`FatalSink`]: reset, halt, or log-and-halt, the kernel's
//! choice. The sink never returns.
//!
//! The [`PostmortemSlot`] preserves the final diagnostic record across a
//! reset, for targets whose startup code leaves the slot's RAM section
//! untouched (place the backing static in a `.uninit` section). Validity is
//! in-band — a magic word plus its bitwise complement — because uninitialized
//! RAM after power-on contains arbitrary bits, including, occasionally,
//! arbitrary bits that look meaningful.

use fault::{DiagnosticRecord, FatalReason, FaultCause, Privilege};

/// Terminal sink for unrecoverable faults.
///
/// # Contract
///
/// `fatal` must not return, must not unmask interrupts, and must tolerate
/// being entered with an arbitrarily corrupted kernel state — it may be
/// running on the last trustworthy stack frames the system has.
pub trait FatalSink {
    /// Consume the system. Reset, halt, or hand off to a user-registered
    /// fatal-error hook; in every case, never return.
    fn fatal(&mut self, reason: FatalReason, record: &DiagnosticRecord) -> !;
}

const MAGIC: u32 = 0xFA17_ED05;

// Stable tags for persisted enums. The in-memory enum layout is not ABI;
// these values are, so they are assigned explicitly and never reused.
const TAG_REASON_KERNEL_FAULT: u32 = 1;
const TAG_REASON_VECTOR_TABLE: u32 = 2;
const TAG_REASON_IMPRECISE_BUS: u32 = 3;
const TAG_REASON_UNATTRIBUTABLE: u32 = 4;
const TAG_REASON_UNKNOWN: u32 = 5;

const TAG_CAUSE_MEMORY: u32 = 1;
const TAG_CAUSE_BUS: u32 = 2;
const TAG_CAUSE_UNDEFINED: u32 = 3;
const TAG_CAUSE_VECTOR_TABLE: u32 = 4;
const TAG_CAUSE_UNKNOWN: u32 = 5;

const TAG_PRIVILEGE_KERNEL: u32 = 0;
const TAG_PRIVILEGE_THREAD: u32 = 1;

fn reason_tag(reason: FatalReason) -> u32 {
    match reason {
        FatalReason::KernelFault => TAG_REASON_KERNEL_FAULT,
        FatalReason::VectorTableCorruption => TAG_REASON_VECTOR_TABLE,
        FatalReason::ImpreciseBusError => TAG_REASON_IMPRECISE_BUS,
        FatalReason::UnattributableFault => TAG_REASON_UNATTRIBUTABLE,
        FatalReason::UnknownCause => TAG_REASON_UNKNOWN,
    }
}

fn reason_from_tag(tag: u32) -> Option<FatalReason> {
    match tag {
        TAG_REASON_KERNEL_FAULT => Some(FatalReason::KernelFault),
        TAG_REASON_VECTOR_TABLE => Some(FatalReason::VectorTableCorruption),
        TAG_REASON_IMPRECISE_BUS => Some(FatalReason::ImpreciseBusError),
        TAG_REASON_UNATTRIBUTABLE => Some(FatalReason::UnattributableFault),
        TAG_REASON_UNKNOWN => Some(FatalReason::UnknownCause),
        _ => None,
    }
}

fn cause_tag(cause: &FaultCause) -> u32 {
    match cause {
        FaultCause::MemoryAccessViolation { .. } => TAG_CAUSE_MEMORY,
        FaultCause::BusError { .. } => TAG_CAUSE_BUS,
        FaultCause::UndefinedBehavior { .. } => TAG_CAUSE_UNDEFINED,
        FaultCause::VectorTableCorruption => TAG_CAUSE_VECTOR_TABLE,
        FaultCause::Unknown => TAG_CAUSE_UNKNOWN,
    }
}

fn cause_name_from_tag(tag: u32) -> Option<&'static str> {
    match tag {
        TAG_CAUSE_MEMORY => Some("memory-access-violation"),
        TAG_CAUSE_BUS => Some("bus-error"),
        TAG_CAUSE_UNDEFINED => Some("undefined-behavior"),
        TAG_CAUSE_VECTOR_TABLE => Some("vector-table-corruption"),
        TAG_CAUSE_UNKNOWN => Some("unknown"),
        _ => None,
    }
}

/// A decoded post-mortem record read back after reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoredFatal {
    /// Why the system died.
    pub reason: FatalReason,
    /// Canonical cause name of the final fault.
    pub cause: &'static str,
    /// Raw CFSR bits from the final snapshot.
    pub sub_cause_flags: u32,
    /// Faulting address, when one was trustworthy.
    pub address: Option<u32>,
    /// Privilege of the interrupted context.
    pub privilege: Privilege,
    /// Fault-counter value at the time of death.
    pub occurrence: u32,
    /// Kernel tick count at the time of death.
    pub timestamp_ticks: u64,
}

/// Fixed-layout diagnostic slot intended for a reset-surviving RAM section.
///
/// All fields are plain `u32` with explicitly assigned tag values so the
/// layout survives recompilation; the slot is valid only while `magic` and
/// `seal` hold their expected values.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PostmortemSlot {
    magic: u32,
    seal: u32,
    reason: u32,
    cause: u32,
    cfsr: u32,
    address: u32,
    address_valid: u32,
    privilege: u32,
    occurrence: u32,
    ticks_lo: u32,
    ticks_hi: u32,
}

impl PostmortemSlot {
    /// An invalid (empty) slot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            magic: 0,
            seal: 0,
            reason: 0,
            cause: 0,
            cfsr: 0,
            address: 0,
            address_valid: 0,
            privilege: 0,
            occurrence: 0,
            ticks_lo: 0,
            ticks_hi: 0,
        }
    }

    /// Persist the final diagnostic record.
    ///
    /// The payload fields are written before the magic/seal pair so that an
    /// interrupted store (reset racing the write) is read back as invalid
    /// rather than as a half-written record.
    #[allow(clippy::arithmetic_side_effects)] // constant shifts on u64 cannot overflow
    #[allow(clippy::cast_possible_truncation)] // masked/shifted before narrowing
    pub fn store(&mut self, reason: FatalReason, record: &DiagnosticRecord) {
        self.reason = reason_tag(reason);
        self.cause = cause_tag(&record.cause);
        self.cfsr = record.sub_cause_flags;
        self.address = record.address.unwrap_or(0);
        self.address_valid = u32::from(record.address.is_some());
        self.privilege = match record.privilege {
            Privilege::Kernel => TAG_PRIVILEGE_KERNEL,
            Privilege::Thread => TAG_PRIVILEGE_THREAD,
        };
        self.occurrence = record.occurrence;
        self.ticks_lo = (record.timestamp_ticks & 0xFFFF_FFFF) as u32;
        self.ticks_hi = (record.timestamp_ticks >> 32) as u32;
        self.magic = MAGIC;
        self.seal = !MAGIC;
    }

    /// Read back a stored record, if the slot holds a valid one.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // constant shifts on u64 cannot overflow
    pub fn retrieve(&self) -> Option<StoredFatal> {
        if self.magic != MAGIC || self.seal != !MAGIC {
            return None;
        }
        let reason = reason_from_tag(self.reason)?;
        let cause = cause_name_from_tag(self.cause)?;
        let privilege = match self.privilege {
            TAG_PRIVILEGE_KERNEL => Privilege::Kernel,
            TAG_PRIVILEGE_THREAD => Privilege::Thread,
            _ => return None,
        };
        Some(StoredFatal {
            reason,
            cause,
            sub_cause_flags: self.cfsr,
            address: (self.address_valid != 0).then_some(self.address),
            privilege,
            occurrence: self.occurrence,
            timestamp_ticks: (u64::from(self.ticks_hi) << 32) | u64::from(self.ticks_lo),
        })
    }

    /// Mark the slot invalid, typically after the boot-time readout has
    /// consumed it.
    pub fn invalidate(&mut self) {
        self.magic = 0;
        self.seal = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fault::FaultCause;

    fn record() -> DiagnosticRecord {
        DiagnosticRecord {
            cause: FaultCause::VectorTableCorruption,
            sub_cause_flags: 0x0000_0082,
            address: Some(0x2000_0100),
            privilege: Privilege::Thread,
            occurrence: 3,
            timestamp_ticks: 0x1_2345_6789,
        }
    }

    #[test]
    fn test_empty_slot_is_invalid() {
        assert_eq!(PostmortemSlot::empty().retrieve(), None);
    }

    #[test]
    fn test_store_then_retrieve_round_trips() {
        let mut slot = PostmortemSlot::empty();
        slot.store(FatalReason::VectorTableCorruption, &record());
        let stored = slot.retrieve().unwrap();
        assert_eq!(stored.reason, FatalReason::VectorTableCorruption);
        assert_eq!(stored.cause, "vector-table-corruption");
        assert_eq!(stored.sub_cause_flags, 0x0000_0082);
        assert_eq!(stored.address, Some(0x2000_0100));
        assert_eq!(stored.privilege, Privilege::Thread);
        assert_eq!(stored.occurrence, 3);
        assert_eq!(stored.timestamp_ticks, 0x1_2345_6789);
    }

    #[test]
    fn test_absent_address_round_trips_as_absent() {
        let mut slot = PostmortemSlot::empty();
        let rec = DiagnosticRecord {
            address: None,
            ..record()
        };
        slot.store(FatalReason::UnknownCause, &rec);
        assert_eq!(slot.retrieve().unwrap().address, None);
    }

    #[test]
    fn test_invalidate_consumes_the_slot() {
        let mut slot = PostmortemSlot::empty();
        slot.store(FatalReason::KernelFault, &record());
        assert!(slot.retrieve().is_some());
        slot.invalidate();
        assert_eq!(slot.retrieve(), None);
    }

    #[test]
    fn test_garbage_magic_is_rejected() {
        let mut slot = PostmortemSlot::empty();
        slot.store(FatalReason::KernelFault, &record());
        slot.seal = 0xDEAD_BEEF;
        assert_eq!(slot.retrieve(), None);
    }

    #[test]
    fn test_unknown_tags_are_rejected_not_misread() {
        let mut slot = PostmortemSlot::empty();
        slot.store(FatalReason::KernelFault, &record());
        slot.reason = 0xFF;
        assert_eq!(slot.retrieve(), None);
    }
}
