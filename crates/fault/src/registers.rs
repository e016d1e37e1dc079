//! ARMv7-M fault-status register layout and the immutable trap snapshot.
//!
//! # Register map (System Control Block, ARM DDI0403E §B3.2)
//!
//! | Register | Address     | Contents                                       |
//! |----------|-------------|------------------------------------------------|
//! | CFSR     | 0xE000_ED28 | MMFSR (byte 0), BFSR (byte 1), UFSR (bytes 2–3)|
//! | HFSR     | 0xE000_ED2C | Hard-fault status (VECTTBL, FORCED, DEBUGEVT)  |
//! | MMFAR    | 0xE000_ED34 | MemManage faulting address (if MMARVALID)      |
//! | BFAR     | 0xE000_ED38 | Bus faulting address (if BFARVALID)            |
//!
//! # Write-one-to-clear semantics
//!
//! HFSR and all three CFSR status bytes are W1C: writing a 1 to a set bit
//! clears it, and a subsequent read returns zero. The faulting-address
//! registers are qualified by their valid bits (MMARVALID, BFARVALID); once
//! the valid bit is cleared the address value is stale and must not be read.
//!
//! Consequence: the trap entry stub must capture a [`RawFaultRegisters`]
//! snapshot *before* issuing any clear, and must clear exactly once per
//! invocation. Decode/classify/policy only ever see the snapshot.
//!
//! All items in this module are pure data — no volatile access happens here.
//! The `recovery` crate owns the single read and the single clear.

/// Address of the Configurable Fault Status Register.
pub const CFSR_ADDR: u32 = 0xE000_ED28;

/// Address of the HardFault Status Register.
pub const HFSR_ADDR: u32 = 0xE000_ED2C;

/// Address of the MemManage Fault Address Register.
pub const MMFAR_ADDR: u32 = 0xE000_ED34;

/// Address of the BusFault Address Register.
pub const BFAR_ADDR: u32 = 0xE000_ED38;

// ── HFSR bits ────────────────────────────────────────────────────────────────

/// HFSR: bus fault on vector table read during exception dispatch.
pub const HFSR_VECTTBL: u32 = 1 << 1;

/// HFSR: configurable fault escalated to hard fault (handler disabled or
/// priority too low to preempt).
pub const HFSR_FORCED: u32 = 1 << 30;

/// HFSR: debug event while the debug subsystem was not enabled.
pub const HFSR_DEBUGEVT: u32 = 1 << 31;

// ── CFSR byte 0: MMFSR (MemManage Fault Status) ──────────────────────────────

/// MMFSR: instruction access violation. MMFAR is never valid for this fault.
pub const MMFSR_IACCVIOL: u32 = 1 << 0;

/// MMFSR: data access violation. MMFAR holds the address if MMARVALID is set.
pub const MMFSR_DACCVIOL: u32 = 1 << 1;

/// MMFSR: MPU violation while unstacking on exception return.
pub const MMFSR_MUNSTKERR: u32 = 1 << 3;

/// MMFSR: MPU violation while stacking on exception entry.
pub const MMFSR_MSTKERR: u32 = 1 << 4;

/// MMFSR: MPU violation during lazy floating-point state preservation.
pub const MMFSR_MLSPERR: u32 = 1 << 5;

/// MMFSR: MMFAR holds the faulting address.
pub const MMFSR_MMARVALID: u32 = 1 << 7;

// ── CFSR byte 1: BFSR (BusFault Status) ──────────────────────────────────────

/// BFSR: instruction bus error on a prefetched-and-issued instruction.
/// BFAR is never valid for this fault.
pub const BFSR_IBUSERR: u32 = 1 << 8;

/// BFSR: precise data bus error. BFAR holds the address if BFARVALID is set.
pub const BFSR_PRECISERR: u32 = 1 << 9;

/// BFSR: imprecise data bus error, detected asynchronously. The faulting
/// address and the interrupted instruction do not reliably correspond.
pub const BFSR_IMPRECISERR: u32 = 1 << 10;

/// BFSR: bus error while unstacking on exception return.
pub const BFSR_UNSTKERR: u32 = 1 << 11;

/// BFSR: bus error while stacking on exception entry.
pub const BFSR_STKERR: u32 = 1 << 12;

/// BFSR: bus error during lazy floating-point state preservation.
pub const BFSR_LSPERR: u32 = 1 << 13;

/// BFSR: BFAR holds the faulting address.
pub const BFSR_BFARVALID: u32 = 1 << 15;

// ── CFSR bytes 2–3: UFSR (UsageFault Status) ─────────────────────────────────

/// UFSR: undefined instruction.
pub const UFSR_UNDEFINSTR: u32 = 1 << 16;

/// UFSR: invalid EPSR state (e.g. branch to an address with bit 0 clear).
pub const UFSR_INVSTATE: u32 = 1 << 17;

/// UFSR: invalid EXC_RETURN value loaded into the PC on exception return.
pub const UFSR_INVPC: u32 = 1 << 18;

/// UFSR: coprocessor access while the coprocessor is absent or disabled.
/// With lazy FP context switching this is the expected first-use trap.
pub const UFSR_NOCP: u32 = 1 << 19;

/// UFSR: unaligned access while CCR.UNALIGN_TRP is set.
pub const UFSR_UNALIGNED: u32 = 1 << 24;

/// UFSR: divide by zero while CCR.DIV_0_TRP is set.
pub const UFSR_DIVBYZERO: u32 = 1 << 25;

// ── Write-one-to-clear masks ─────────────────────────────────────────────────

/// W1C mask clearing every HFSR status bit.
pub const HFSR_CLEAR_ALL: u32 = HFSR_VECTTBL | HFSR_FORCED | HFSR_DEBUGEVT;

/// W1C mask clearing the MMFSR byte, including MMARVALID.
pub const CFSR_CLEAR_MMFSR: u32 = 0x0000_00FF;

/// W1C mask clearing the BFSR byte, including BFARVALID.
pub const CFSR_CLEAR_BFSR: u32 = 0x0000_FF00;

/// W1C mask clearing the UFSR half-word.
pub const CFSR_CLEAR_UFSR: u32 = 0xFFFF_0000;

/// Immutable snapshot of the four fault-status register groups, captured at
/// trap entry before any write-one-to-clear is issued.
///
/// The address registers are captured unconditionally; whether they are
/// meaningful is decided by the MMARVALID/BFARVALID bits inside `cfsr`, and
/// only the decoder applies that qualification. Callers must not interpret
/// `mmfar`/`bfar` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFaultRegisters {
    /// Configurable Fault Status Register (MMFSR | BFSR | UFSR).
    pub cfsr: u32,
    /// HardFault Status Register.
    pub hfsr: u32,
    /// MemManage Fault Address Register, qualified by MMARVALID.
    pub mmfar: u32,
    /// BusFault Address Register, qualified by BFARVALID.
    pub bfar: u32,
}

impl RawFaultRegisters {
    /// A snapshot with no fault state latched.
    pub const CLEAR: Self = Self {
        cfsr: 0,
        hfsr: 0,
        mmfar: 0,
        bfar: 0,
    };

    /// The CFSR value to write back to consume exactly the latched state this
    /// snapshot observed.
    ///
    /// Writing back the read value (rather than an all-ones mask) guarantees
    /// that a sub-cause latched *after* the snapshot was taken — possible when
    /// a higher-priority fault nests into the handler — is not silently
    /// discarded; it stays pending for its own invocation.
    #[must_use]
    pub const fn cfsr_consume_mask(&self) -> u32 {
        self.cfsr
    }

    /// The HFSR value to write back to consume the latched hard-fault state.
    #[must_use]
    pub const fn hfsr_consume_mask(&self) -> u32 {
        self.hfsr
    }
}
