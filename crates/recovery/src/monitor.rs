//! The disposition executor.
//!
//! [`FaultMonitor`] drives one trap from snapshot to resolution: decode,
//! classify, policy, then execution of the resulting disposition against the
//! scheduler and fatal-sink collaborators. Exactly one disposition is
//! executed per fault, and the decode/classify/policy path is never
//! re-entered for the context currently being resolved — all intermediate
//! state is stack-local to `handle_trap`.
//!
//! Cross-invocation state is limited to the fault counter (relaxed atomic)
//! and the bounded diagnostic history. Both are tolerant of nested fault
//! entry: the counter by construction, the history because a fault taken
//! *inside* `handle_trap` is a fault in kernel code and dies through the
//! fatal sink without returning here.

use fault::{
    classify, decode, disposition, DiagnosticRecord, Disposition, FatalReason, FaultCause,
    FaultCounter, FaultPhase, FaultingContext, MemoryExtent, PolicyConfig, Privilege,
    RawFaultRegisters,
};
use heapless::Deque;

use crate::fatal::FatalSink;
use crate::scheduler::{Scheduler, ThreadId};

/// Capacity of the in-memory diagnostic history ring.
pub const HISTORY_DEPTH: usize = 8;

/// What the trap interrupted, as reported by the trap entry stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Origin {
    /// Kernel code: exception handlers, the scheduler, kernel services.
    Kernel,
    /// An application thread, with the allocations it owns.
    Thread {
        /// The faulting thread.
        id: ThreadId,
        /// The thread's stack allocation.
        stack: MemoryExtent,
        /// The thread's heap allocation, if it has one.
        heap: Option<MemoryExtent>,
    },
}

/// One fault-handling invocation's input, assembled by the trap entry stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrapRequest {
    /// Saved program counter of the interrupted context.
    pub pc: u32,
    /// Saved stack pointer of the interrupted context.
    pub sp: u32,
    /// What was interrupted.
    pub origin: Origin,
    /// Kernel tick count at trap entry, for the diagnostic record.
    pub now_ticks: u64,
}

impl TrapRequest {
    /// The policy-facing view of the interrupted context.
    #[must_use]
    pub fn context(&self) -> FaultingContext {
        match self.origin {
            Origin::Kernel => FaultingContext {
                pc: self.pc,
                sp: self.sp,
                privilege: Privilege::Kernel,
                stack: None,
                heap: None,
            },
            Origin::Thread { stack, heap, .. } => FaultingContext {
                pc: self.pc,
                sp: self.sp,
                privilege: Privilege::Thread,
                stack: Some(stack),
                heap,
            },
        }
    }
}

/// State restoration required before a `Continue` resumption.
///
/// The entry stub must apply the fix-up *before* returning into the
/// interrupted context; resuming without it would re-trigger the identical
/// trap immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fixup {
    /// Grant FP coprocessor access so the lazy FP context becomes live and
    /// the first-use trap cannot fire again for this context.
    EnableFpContext,
}

/// The effect the trap entry stub must carry out after `handle_trap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrapResolution {
    /// Return into the interrupted context, applying the fix-up first if one
    /// is given.
    Resume {
        /// State restoration to apply before the exception return.
        fixup: Option<Fixup>,
    },
    /// The faulting thread is gone; exchange context to this thread. The
    /// entry stub pends the kernel's normal context-switch mechanism.
    SwitchTo(ThreadId),
}

/// Whether a terminated thread's suspect stack is inspected before reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QuarantinePolicy {
    /// Return the stack to the free pool immediately (the default).
    #[default]
    ReleaseImmediately,
    /// Withhold the stack from reuse when corruption is suspected; the
    /// scheduler's inspection step owns the eventual release.
    QuarantineFirst,
}

/// Executes fault dispositions against the kernel's scheduler and fatal sink.
pub struct FaultMonitor<S: Scheduler, F: FatalSink> {
    scheduler: S,
    sink: F,
    policy: PolicyConfig,
    quarantine: QuarantinePolicy,
    counter: FaultCounter,
    history: Deque<DiagnosticRecord, HISTORY_DEPTH>,
}

impl<S: Scheduler, F: FatalSink> FaultMonitor<S, F> {
    /// Create a monitor over the kernel's collaborators.
    #[must_use]
    pub fn new(
        scheduler: S,
        sink: F,
        policy: PolicyConfig,
        quarantine: QuarantinePolicy,
    ) -> Self {
        Self {
            scheduler,
            sink,
            policy,
            quarantine,
            counter: FaultCounter::new(),
            history: Deque::new(),
        }
    }

    /// Resolve one trap.
    ///
    /// Runs the pure pipeline over the snapshot, then executes the
    /// disposition. Never returns for `SystemFatal`. The caller (the trap
    /// entry stub) owns register clearing and must have captured `snapshot`
    /// before any write-one-to-clear.
    pub fn handle_trap(
        &mut self,
        snapshot: &RawFaultRegisters,
        request: &TrapRequest,
    ) -> TrapResolution {
        let records = decode(snapshot);
        let cause = classify(&records);
        let ctx = request.context();
        let decision = disposition(&cause, &ctx, &self.policy);

        let occurrence = self.counter.record();
        let record = DiagnosticRecord {
            cause,
            sub_cause_flags: snapshot.cfsr,
            address: cause_address(&cause),
            privilege: ctx.privilege,
            occurrence,
            timestamp_ticks: request.now_ticks,
        };

        match decision {
            Disposition::Continue => {
                // The whitelisted lazy-FP first-use trap: counted, but not an
                // error, so it does not consume a history slot.
                TrapResolution::Resume {
                    fixup: Some(Fixup::EnableFpContext),
                }
            }
            Disposition::TerminateContext => {
                self.push_history(record);
                match request.origin {
                    Origin::Thread { id, stack, .. } => self.terminate(id, stack, &cause),
                    // Policy terminates thread contexts only; a kernel origin
                    // cannot reach this arm unless the entry stub handed us an
                    // inconsistent request, which is itself a kernel bug.
                    Origin::Kernel => self.die(FatalReason::KernelFault, &record),
                }
            }
            Disposition::SystemFatal { reason } => {
                self.push_history(record);
                self.die(reason, &record)
            }
        }
    }

    fn terminate(&mut self, id: ThreadId, stack: MemoryExtent, cause: &FaultCause) -> TrapResolution {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "fault: terminating thread {=u16} ({=str})",
            id.index(),
            cause.name()
        );

        self.scheduler.remove_thread(id);
        if self.quarantine == QuarantinePolicy::QuarantineFirst && stack_suspect(cause, stack) {
            self.scheduler.quarantine_stack(stack);
        } else {
            self.scheduler.release_stack(stack);
        }
        TrapResolution::SwitchTo(self.scheduler.select_next())
    }

    fn die(&mut self, reason: FatalReason, record: &DiagnosticRecord) -> ! {
        // No further interrupts: nothing may preempt the path to the sink.
        #[cfg(feature = "hardware")]
        cortex_m::interrupt::disable();

        #[cfg(feature = "defmt")]
        defmt::error!(
            "fault: system fatal, {=str} ({=str}, occurrence {=u32})",
            reason.name(),
            record.cause.name(),
            record.occurrence
        );

        self.sink.fatal(reason, record)
    }

    fn push_history(&mut self, record: DiagnosticRecord) {
        if self.history.is_full() {
            let _ = self.history.pop_front();
        }
        // Cannot fail: a slot was just freed if none was available.
        let _ = self.history.push_back(record);
    }

    /// Number of traps handled since boot (monotonic approximation).
    pub fn fault_count(&self) -> u32 {
        self.counter.count()
    }

    /// Recent terminal fault records, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DiagnosticRecord> {
        self.history.iter()
    }

    /// The scheduler collaborator.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// The fatal-sink collaborator.
    pub fn sink(&self) -> &F {
        &self.sink
    }
}

fn cause_address(cause: &FaultCause) -> Option<u32> {
    match cause {
        FaultCause::MemoryAccessViolation { address, .. }
        | FaultCause::BusError { address, .. } => *address,
        FaultCause::UndefinedBehavior { .. }
        | FaultCause::VectorTableCorruption
        | FaultCause::Unknown => None,
    }
}

/// A terminated thread's stack is suspect when the fault fired on the
/// stacking/unstacking path (the stack pointer itself is untrustworthy) or
/// when the faulting address lies inside the stack allocation.
fn stack_suspect(cause: &FaultCause, stack: MemoryExtent) -> bool {
    match cause {
        FaultCause::MemoryAccessViolation { address, during }
        | FaultCause::BusError {
            address, during, ..
        } => {
            matches!(
                during,
                FaultPhase::ExceptionEntry | FaultPhase::ExceptionExit
            ) || address.is_some_and(|a| stack.contains(a))
        }
        FaultCause::UndefinedBehavior { .. }
        | FaultCause::VectorTableCorruption
        | FaultCause::Unknown => false,
    }
}
