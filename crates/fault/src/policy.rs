//! Fault disposition policy.
//!
//! A total, deterministic mapping from `(FaultCause, FaultingContext,
//! PolicyConfig)` to a [`Disposition`]. The function is referentially
//! transparent — no global state, no hardware access — so every rule is
//! unit-testable without a running scheduler.
//!
//! # Rules
//!
//! | Condition                                                   | Disposition |
//! |-------------------------------------------------------------|-------------|
//! | Vector table corruption (any context)                       | SystemFatal |
//! | Unknown cause (any context)                                 | SystemFatal |
//! | Faulting context is kernel code                             | SystemFatal |
//! | Imprecise bus error (thread)                                | SystemFatal |
//! | Access fault while stacking/unstacking (thread)             | TerminateContext |
//! | Precise access fault at an address the thread owns (thread) | TerminateContext |
//! | Precise access fault, address absent or not thread-owned    | SystemFatal |
//! | NOCP with lazy FP context switching configured (thread)     | Continue    |
//! | Any other undefined behavior (thread)                       | TerminateContext |
//!
//! Kernel code faulting is a kernel invariant violation by definition and is
//! never thread-isolated. An imprecise bus fault cannot be attributed to the
//! interrupted instruction, so thread-local isolation cannot be guaranteed
//! safe. `Continue` is reachable only for the whitelisted lazy-FP first-use
//! trap; every other cause terminates either the thread or the system.

use crate::classify::{BusPrecision, FaultCause, FaultPhase, UbReason};

/// Privilege level of the interrupted execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Privilege {
    /// Kernel code: exception handlers, the scheduler, kernel services.
    Kernel,
    /// An application thread.
    Thread,
}

/// Error constructing a [`MemoryExtent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExtentError {
    /// The extent has zero size.
    #[error("memory extent is empty")]
    Empty,
    /// `base + size` overflows the 32-bit address space.
    #[error("memory extent wraps the address space")]
    Wraps,
}

/// A validated half-open address range `[base, base + size)`.
///
/// Construction via [`MemoryExtent::new`] enforces non-emptiness and
/// no-wraparound so that containment checks cannot be fooled by a degenerate
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryExtent {
    base: u32,
    size: u32,
}

impl MemoryExtent {
    /// Create a new extent, validating size and bounds.
    ///
    /// # Errors
    ///
    /// - [`ExtentError::Empty`] if `size == 0`
    /// - [`ExtentError::Wraps`] if `base + size` overflows `u32`
    pub const fn new(base: u32, size: u32) -> Result<Self, ExtentError> {
        if size == 0 {
            return Err(ExtentError::Empty);
        }
        if base.checked_add(size).is_none() {
            return Err(ExtentError::Wraps);
        }
        Ok(Self { base, size })
    }

    /// Base address of this extent.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Size of this extent in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end address (`base + size`).
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)] // base + size verified by new()
    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    /// `true` if `addr` lies within this extent.
    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

/// The interrupted execution context, as captured by the trap entry stub.
///
/// This borrows facts from the scheduler's thread record for the duration of
/// one fault-handling invocation; ownership of the underlying stack memory
/// stays with the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultingContext {
    /// Saved program counter of the interrupted context.
    pub pc: u32,
    /// Saved stack pointer of the interrupted context.
    pub sp: u32,
    /// Whether the fault interrupted kernel or thread code.
    pub privilege: Privilege,
    /// The thread's own stack allocation. `None` for kernel context.
    pub stack: Option<MemoryExtent>,
    /// The thread's heap allocation, if it has one. `None` for kernel context.
    pub heap: Option<MemoryExtent>,
}

impl FaultingContext {
    /// `true` if `addr` falls within this context's own stack or heap
    /// allocation.
    #[must_use]
    pub fn owns(&self, addr: u32) -> bool {
        self.stack.is_some_and(|s| s.contains(addr))
            || self.heap.is_some_and(|h| h.contains(addr))
    }
}

/// Immutable policy configuration, fixed at kernel build/boot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PolicyConfig {
    /// The kernel defers FP context allocation until first use, so a NOCP
    /// usage fault from a thread is the expected activation trap rather than
    /// an error.
    pub lazy_fp_context: bool,
}

/// Why the system, rather than a single thread, must die.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalReason {
    /// The fault interrupted kernel code.
    KernelFault,
    /// Exception dispatch itself is broken.
    VectorTableCorruption,
    /// An asynchronous bus error that cannot be attributed to a thread.
    ImpreciseBusError,
    /// A precise fault whose address cannot be attributed to the faulting
    /// thread's own allocations.
    UnattributableFault,
    /// A hard fault with no specific cause latched.
    UnknownCause,
}

impl FatalReason {
    /// Short static name for logs and post-mortem dumps.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::KernelFault => "kernel-fault",
            Self::VectorTableCorruption => "vector-table-corruption",
            Self::ImpreciseBusError => "imprecise-bus-error",
            Self::UnattributableFault => "unattributable-fault",
            Self::UnknownCause => "unknown-cause",
        }
    }
}

/// What the kernel must do with the faulting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposition {
    /// Remove the faulting thread from the ready set; the system continues.
    TerminateContext,
    /// Halt or reset the whole system via the fatal sink.
    SystemFatal {
        /// Why thread isolation was not possible.
        reason: FatalReason,
    },
    /// Resume the interrupted context at the faulting instruction after a
    /// fix-up. Reachable only for whitelisted recoverable causes.
    Continue,
}

/// Map one classified fault to its disposition.
///
/// Total over all inputs and free of side effects; calling it twice with the
/// same arguments yields the same disposition.
#[must_use]
pub fn disposition(
    cause: &FaultCause,
    ctx: &FaultingContext,
    config: &PolicyConfig,
) -> Disposition {
    // Causes that are fatal regardless of who was running.
    match cause {
        FaultCause::VectorTableCorruption => {
            return Disposition::SystemFatal {
                reason: FatalReason::VectorTableCorruption,
            };
        }
        FaultCause::Unknown => {
            return Disposition::SystemFatal {
                reason: FatalReason::UnknownCause,
            };
        }
        _ => {}
    }

    if ctx.privilege == Privilege::Kernel {
        return Disposition::SystemFatal {
            reason: FatalReason::KernelFault,
        };
    }

    match *cause {
        FaultCause::BusError {
            precision: BusPrecision::Imprecise,
            ..
        } => Disposition::SystemFatal {
            reason: FatalReason::ImpreciseBusError,
        },

        // Stacking/unstacking faults: the thread's stack pointer is suspect,
        // the latched address untrustworthy. The thread is sacrificed and its
        // stack is a quarantine candidate; the in-extent test does not apply.
        FaultCause::MemoryAccessViolation {
            during: FaultPhase::ExceptionEntry | FaultPhase::ExceptionExit,
            ..
        }
        | FaultCause::BusError {
            during: FaultPhase::ExceptionEntry | FaultPhase::ExceptionExit,
            ..
        } => Disposition::TerminateContext,

        // Precise execution-phase access faults: terminate only when the
        // reported address is attributable to the thread's own allocations.
        FaultCause::MemoryAccessViolation {
            address,
            during: FaultPhase::Execution,
        }
        | FaultCause::BusError {
            address,
            precision: BusPrecision::Precise,
            during: FaultPhase::Execution,
        } => match address {
            Some(addr) if ctx.owns(addr) => Disposition::TerminateContext,
            _ => Disposition::SystemFatal {
                reason: FatalReason::UnattributableFault,
            },
        },

        FaultCause::UndefinedBehavior {
            reason: UbReason::NoCoprocessor,
        } if config.lazy_fp_context => Disposition::Continue,

        FaultCause::UndefinedBehavior { .. } => Disposition::TerminateContext,

        // Handled by the early returns above; repeated here to keep the
        // match exhaustive without a wildcard.
        FaultCause::VectorTableCorruption => Disposition::SystemFatal {
            reason: FatalReason::VectorTableCorruption,
        },
        FaultCause::Unknown => Disposition::SystemFatal {
            reason: FatalReason::UnknownCause,
        },
    }
}
