//! Cortex-M trap entry: register capture, the single clear, and the
//! `cortex-m-rt` exception handlers.
//!
//! This module is the hardware edge of the fault path. Its obligations, in
//! order, for every fault exception:
//!
//! 1. Capture the [`RawFaultRegisters`] snapshot — *before* anything writes
//!    the status registers, because they are write-one-to-clear and a second
//!    read after clearing yields zero.
//! 2. Hand the snapshot to the installed [`TrapHandler`], which assembles
//!    the [`TrapRequest`](crate::TrapRequest) for the interrupted context
//!    (only the kernel knows the current thread) and runs the monitor.
//! 3. Consume the latched state with exactly one write-one-to-clear,
//!    writing back the observed values so that sub-causes latched after the
//!    snapshot stay pending for their own invocation.
//! 4. Carry out the resolution: apply the fix-up and return (resume), or
//!    just return (the handler has already pended the context switch), or —
//!    for the fatal path — never come back from the handler at all.
//!
//! # HardFault limitation
//!
//! `cortex-m-rt` hard-fault handlers cannot perform an exception return, so
//! a HardFault whose resolution would be "resume" or "switch" is escalated
//! to `defmt::panic!` here. With the configurable handlers enabled via
//! [`enable_configurable_fault_handlers`] this only affects faults taken
//! while fault dispatch itself was degraded, which are kernel-fatal by
//! policy anyway. Kernels that need full fidelity on escalated faults
//! install their own HardFault vector in assembly and drive the monitor
//! directly.

use core::cell::RefCell;
use core::mem::MaybeUninit;

use critical_section::Mutex;
use fault::registers::{BFAR_ADDR, CFSR_ADDR, HFSR_ADDR, MMFAR_ADDR};
use fault::{DiagnosticRecord, FatalReason, RawFaultRegisters};

use crate::fatal::{FatalSink, PostmortemSlot, StoredFatal};
use crate::monitor::{Fixup, TrapResolution};

#[cfg(feature = "rtt-logging")]
use defmt_rtt as _;
#[cfg(feature = "rtt-logging")]
use panic_probe as _;

/// System Handler Control and State Register.
const SHCSR_ADDR: u32 = 0xE000_ED24;
const SHCSR_MEMFAULTENA: u32 = 1 << 16;
const SHCSR_BUSFAULTENA: u32 = 1 << 17;
const SHCSR_USGFAULTENA: u32 = 1 << 18;

/// Coprocessor Access Control Register.
const CPACR_ADDR: u32 = 0xE000_ED88;
/// CP10 + CP11 full access (FPU).
const CPACR_FP_FULL_ACCESS: u32 = 0b1111 << 20;

/// Kernel-side fault resolution hook.
///
/// The kernel implements this over its thread table and a
/// [`FaultMonitor`](crate::FaultMonitor): build the `TrapRequest` for the
/// interrupted context, call `handle_trap`, and — for a `SwitchTo`
/// resolution — pend the kernel's context-switch mechanism before returning.
pub trait TrapHandler: Send {
    /// Resolve one fault. Must not return for fatal dispositions.
    fn on_fault(&mut self, snapshot: &RawFaultRegisters) -> TrapResolution;
}

static HANDLER: Mutex<RefCell<Option<&'static mut dyn TrapHandler>>> =
    Mutex::new(RefCell::new(None));

/// Error installing the trap handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstallError {
    /// A handler is already installed; there is exactly one fault path.
    #[error("a trap handler is already installed")]
    AlreadyInstalled,
}

/// Install the kernel's trap handler. Call once during kernel startup,
/// before [`enable_configurable_fault_handlers`].
pub fn install(handler: &'static mut dyn TrapHandler) -> Result<(), InstallError> {
    critical_section::with(|cs| {
        let mut slot = HANDLER.borrow_ref_mut(cs);
        if slot.is_some() {
            return Err(InstallError::AlreadyInstalled);
        }
        *slot = Some(handler);
        Ok(())
    })
}

/// Enable the MemManage, BusFault, and UsageFault handlers so configurable
/// faults dispatch directly instead of escalating to HardFault.
pub fn enable_configurable_fault_handlers() {
    // SAFETY: read-modify-write of the architecturally defined SHCSR; the
    // three ENA bits only route configurable faults to their own handlers.
    unsafe {
        let shcsr = SHCSR_ADDR as *mut u32;
        shcsr.write_volatile(
            shcsr.read_volatile() | SHCSR_MEMFAULTENA | SHCSR_BUSFAULTENA | SHCSR_USGFAULTENA,
        );
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Capture the fault-status snapshot. Must precede any clear.
#[must_use]
pub fn read_fault_registers() -> RawFaultRegisters {
    // SAFETY: volatile reads of always-present SCB registers; reading has no
    // side effects on the latched state.
    unsafe {
        RawFaultRegisters {
            cfsr: (CFSR_ADDR as *const u32).read_volatile(),
            hfsr: (HFSR_ADDR as *const u32).read_volatile(),
            mmfar: (MMFAR_ADDR as *const u32).read_volatile(),
            bfar: (BFAR_ADDR as *const u32).read_volatile(),
        }
    }
}

/// The single designated write-one-to-clear for one fault invocation.
///
/// Writes back exactly what the snapshot observed, so state latched after
/// the capture survives for the next invocation.
pub fn consume_fault_registers(snapshot: &RawFaultRegisters) {
    // SAFETY: W1C writes to the SCB status registers; only bits observed in
    // the snapshot are cleared.
    unsafe {
        (CFSR_ADDR as *mut u32).write_volatile(snapshot.cfsr_consume_mask());
        (HFSR_ADDR as *mut u32).write_volatile(snapshot.hfsr_consume_mask());
    }
}

/// Apply a `Continue` fix-up before the exception return.
///
/// Guarantees the resumption cannot re-trigger the identical trap: the
/// barriers order the coprocessor enable before the return into the
/// interrupted context.
pub fn apply_fixup(fixup: Fixup) {
    match fixup {
        Fixup::EnableFpContext => {
            // SAFETY: granting CP10/CP11 full access enables the FPU, which
            // is exactly the state the trapped first-use instruction needs.
            unsafe {
                let cpacr = CPACR_ADDR as *mut u32;
                cpacr.write_volatile(cpacr.read_volatile() | CPACR_FP_FULL_ACCESS);
            }
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
        }
    }
}

// ── Post-mortem slot ─────────────────────────────────────────────────────────

/// Reset-surviving post-mortem storage.
///
/// Place in a section the startup code does not zero (`.uninit`); the
/// magic/seal stamp inside [`PostmortemSlot`] distinguishes a stored record
/// from power-on garbage.
#[link_section = ".uninit.FAULT_POSTMORTEM"]
static mut POSTMORTEM: MaybeUninit<PostmortemSlot> = MaybeUninit::uninit();

/// Persist the final diagnostic record for post-mortem retrieval.
///
/// Called on the fatal path with interrupts disabled.
pub fn postmortem_store(reason: FatalReason, record: &DiagnosticRecord) {
    let mut slot = PostmortemSlot::empty();
    slot.store(reason, record);
    // SAFETY: single core with interrupts disabled on the fatal path, so
    // this is the only writer; the slot is plain data.
    unsafe {
        core::ptr::addr_of_mut!(POSTMORTEM)
            .cast::<PostmortemSlot>()
            .write_volatile(slot);
    }
}

/// Read and consume the previous boot's fatal record, if one survived reset.
///
/// Call once during kernel startup, before faults are enabled.
pub fn postmortem_take() -> Option<StoredFatal> {
    // SAFETY: the slot is composed entirely of u32 fields, for which every
    // bit pattern is a valid value; validity of the *content* is decided by
    // the magic/seal check inside retrieve().
    let slot = unsafe {
        core::ptr::addr_of!(POSTMORTEM)
            .cast::<PostmortemSlot>()
            .read_volatile()
    };
    let stored = slot.retrieve();
    if stored.is_some() {
        // SAFETY: same single-writer argument as postmortem_store; startup
        // runs before any fault can race this.
        unsafe {
            core::ptr::addr_of_mut!(POSTMORTEM)
                .cast::<PostmortemSlot>()
                .write_volatile(PostmortemSlot::empty());
        }
    }
    stored
}

// ── Built-in fatal sinks ─────────────────────────────────────────────────────

/// Fatal sink that persists the post-mortem record and parks the core.
pub struct HaltSink;

impl FatalSink for HaltSink {
    fn fatal(&mut self, reason: FatalReason, record: &DiagnosticRecord) -> ! {
        postmortem_store(reason, record);
        defmt::error!("system halted: {=str}", reason.name());
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Fatal sink that persists the post-mortem record and requests a system
/// reset.
pub struct ResetSink;

impl FatalSink for ResetSink {
    fn fatal(&mut self, reason: FatalReason, record: &DiagnosticRecord) -> ! {
        postmortem_store(reason, record);
        defmt::error!("system reset: {=str}", reason.name());
        cortex_m::peripheral::SCB::sys_reset()
    }
}

// ── Exception handlers ───────────────────────────────────────────────────────

/// Run the installed handler over one snapshot.
///
/// A fault that nests inside an active resolution means the fault path
/// itself faulted — kernel-fatal by definition, reported here rather than
/// as a reborrow corruption.
fn resolve_with_handler(snapshot: &RawFaultRegisters) -> Option<TrapResolution> {
    critical_section::with(|cs| {
        let Ok(mut slot) = HANDLER.borrow(cs).try_borrow_mut() else {
            defmt::panic!("nested fault while a fault was being resolved");
        };
        slot.as_mut().map(|handler| handler.on_fault(snapshot))
    })
}

/// Shared body for the three configurable fault handlers, which can resume
/// the interrupted context by plain return.
fn handle_configurable_fault() {
    let snapshot = read_fault_registers();
    let resolution = resolve_with_handler(&snapshot);
    consume_fault_registers(&snapshot);
    match resolution {
        Some(TrapResolution::Resume { fixup }) => {
            if let Some(fixup) = fixup {
                apply_fixup(fixup);
            }
        }
        // The handler already pended the context switch; returning through
        // the exception lets it take effect.
        Some(TrapResolution::SwitchTo(_)) => {}
        None => {
            defmt::panic!("fault taken before a trap handler was installed");
        }
    }
}

#[cortex_m_rt::exception]
fn MemoryManagement() {
    handle_configurable_fault();
}

#[cortex_m_rt::exception]
fn BusFault() {
    handle_configurable_fault();
}

#[cortex_m_rt::exception]
fn UsageFault() {
    handle_configurable_fault();
}

#[cortex_m_rt::exception]
unsafe fn HardFault(frame: &cortex_m_rt::ExceptionFrame) -> ! {
    let snapshot = read_fault_registers();
    let _ = resolve_with_handler(&snapshot);
    // A fatal resolution never comes back from on_fault. Anything else
    // cannot be honored from a cortex-m-rt hard-fault handler (no exception
    // return), so it escalates here. See the module docs.
    consume_fault_registers(&snapshot);
    defmt::panic!(
        "HardFault not resolved by policy; stacked frame at 0x{:08X}",
        frame as *const _ as u32
    );
}
