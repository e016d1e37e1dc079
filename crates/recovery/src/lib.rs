//! Fault recovery and scheduler coupling for the Tern RTOS kernel (ARMv7-M)
//!
//! The `fault` crate decides *what happened* and *what must be done*; this
//! crate carries the decision out. It owns the mutable side of the fault
//! path: removing a faulting thread from the ready set, quarantining or
//! releasing its stack, recording diagnostics, driving the system-fatal
//! sink, and — on hardware — the exception handlers that capture the
//! register snapshot and perform the single write-one-to-clear.
//!
//! # Architecture
//!
//! ```text
//! cortex-m-rt exception handlers (entry, hardware feature)
//!         ↓  RawFaultRegisters + TrapRequest
//! FaultMonitor (monitor) — decode/classify/policy, then execute
//!         ↓                         ↓
//! Scheduler trait (scheduler)   FatalSink trait (fatal)
//!   kernel ready-queue ops        halt/reset/post-mortem
//! ```
//!
//! The `Scheduler` and `FatalSink` collaborators are traits so the whole
//! execution path is testable on the host against recording mocks; the real
//! kernel supplies its ready queue and reset behavior.
//!
//! # Execution context
//!
//! Everything here runs in exception context: no blocking, no allocation,
//! no waiting on other threads. All buffers are fixed-size and preallocated.
//! The only state shared across nested fault invocations is the fault
//! counter (a relaxed atomic) and the bounded diagnostic history, which is
//! mutated only while the current exception priority excludes same-or-lower
//! priority preemption.
//!
//! # Features
//!
//! - `defmt`: derive `defmt::Format` + log terminations and fatal events
//! - `hardware`: Cortex-M exception handlers, register capture, post-mortem
//! - `rtt-logging`: RTT transport + panic handler for the final kernel image

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in the exception path
#![deny(clippy::expect_used)] // no .expect() in the exception path
#![deny(clippy::panic)] // a panic while fault handling is a derived fault
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
// Pedantic lints suppressed for this kernel-coupling crate:
#![allow(clippy::doc_markdown)] // register names and hex addresses in doc comments
#![allow(clippy::must_use_candidate)] // accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod fatal;
pub mod monitor;
pub mod scheduler;

#[cfg(feature = "hardware")]
pub mod entry;

pub use fatal::{FatalSink, PostmortemSlot, StoredFatal};
pub use monitor::{
    FaultMonitor, Fixup, Origin, QuarantinePolicy, TrapRequest, TrapResolution, HISTORY_DEPTH,
};
pub use scheduler::{Scheduler, ThreadId};
