//! Decoded per-class fault records.
//!
//! One record type per fault class, each holding independent boolean
//! sub-cause flags plus an address that is `Some` only when the hardware's
//! address-valid bit accompanied it. Records carry no interpretation: a set
//! flag neither implies nor excludes another, and resolving combinations is
//! the classifier's job.

/// Decoded HardFault status (HFSR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardFaultRecord {
    /// Bus error while reading the exception vector table.
    pub vector_table_read: bool,
    /// A configurable fault escalated here because its handler could not run.
    pub forced: bool,
    /// Debug event with the debug subsystem disabled. Diagnostic only.
    pub debug_event: bool,
}

/// Decoded MemManage fault status (MMFSR byte of CFSR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemFaultRecord {
    /// Instruction access violation. `address` is always `None` for this.
    pub instruction_access: bool,
    /// Data access violation.
    pub data_access: bool,
    /// MPU violation while unstacking on exception return.
    pub unstacking: bool,
    /// MPU violation while stacking on exception entry.
    pub stacking: bool,
    /// MPU violation during lazy floating-point state preservation.
    pub lazy_fp_preservation: bool,
    /// Faulting address, present only when MMARVALID was set.
    pub address: Option<u32>,
}

/// Decoded BusFault status (BFSR byte of CFSR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusFaultRecord {
    /// Instruction bus error. `address` is always `None` for this.
    pub instruction_bus: bool,
    /// Precise data bus error: the reported state matches the instruction.
    pub precise: bool,
    /// Imprecise (asynchronous) data bus error: reported state may be stale.
    pub imprecise: bool,
    /// Bus error while unstacking on exception return.
    pub unstacking: bool,
    /// Bus error while stacking on exception entry.
    pub stacking: bool,
    /// Bus error during lazy floating-point state preservation.
    pub lazy_fp_preservation: bool,
    /// Faulting address, present only when BFARVALID was set.
    pub address: Option<u32>,
}

/// Decoded UsageFault status (UFSR half-word of CFSR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsageFaultRecord {
    /// Undefined instruction.
    pub undefined_instruction: bool,
    /// Invalid EPSR state.
    pub invalid_state: bool,
    /// Invalid EXC_RETURN on exception return.
    pub invalid_pc: bool,
    /// Coprocessor access with the coprocessor absent or disabled.
    pub no_coprocessor: bool,
    /// Unaligned access with trapping enabled.
    pub unaligned: bool,
    /// Divide by zero with trapping enabled.
    pub divide_by_zero: bool,
}

/// All fault records derived from one snapshot.
///
/// Zero, one, or several classes may be present simultaneously: multiple trap
/// conditions can latch before the first handler runs, and an escalated
/// configurable fault latches both its own status byte and the hard-fault
/// record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRecordSet {
    /// HardFault status, if any HFSR bit was latched.
    pub hard: Option<HardFaultRecord>,
    /// MemManage status, if any MMFSR bit was latched.
    pub mem: Option<MemFaultRecord>,
    /// BusFault status, if any BFSR bit was latched.
    pub bus: Option<BusFaultRecord>,
    /// UsageFault status, if any UFSR bit was latched.
    pub usage: Option<UsageFaultRecord>,
}

impl FaultRecordSet {
    /// `true` when no fault class latched anything.
    pub fn is_empty(&self) -> bool {
        self.hard.is_none() && self.mem.is_none() && self.bus.is_none() && self.usage.is_none()
    }

    /// `true` when a configurable (non-hard) fault class is present.
    pub fn has_specific(&self) -> bool {
        self.mem.is_some() || self.bus.is_some() || self.usage.is_some()
    }
}
