//! Fault classification core for the Tern RTOS kernel (ARMv7-M)
//!
//! This crate turns raw Cortex-M fault-status register state into a single
//! recovery decision. It is the pure half of the kernel's fault path: every
//! function here is side-effect free, reads no hardware, and is fully
//! host-testable. The hardware half (trap entry, scheduler coupling, fatal
//! sink) lives in the `recovery` crate.
//!
//! # Pipeline
//!
//! ```text
//! Trap entry stub (recovery crate, hardware)
//!         ↓  RawFaultRegisters snapshot + FaultingContext
//! Decoder (decode) — bit extraction, no interpretation
//!         ↓  FaultRecordSet
//! Classifier (classify) — escalation resolution, tie-breaks
//!         ↓  FaultCause
//! Disposition policy (policy) — total, deterministic mapping
//!         ↓  Disposition
//! Executor (recovery crate) — thread removal / fatal sink / resume
//! ```
//!
//! # Register access discipline
//!
//! The fault-status registers (HFSR, CFSR, MMFAR, BFAR) are write-one-to-clear
//! hardware state: a second read after clearing yields zero. All logic in this
//! crate therefore operates on an immutable [`RawFaultRegisters`] snapshot
//! captured by the trap entry stub *before* any clear is issued. Nothing in
//! this crate reads or writes the registers themselves.
//!
//! # Features
//!
//! - `defmt`: derive `defmt::Format` on public types for RTT logging

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
// Pedantic lints suppressed for this register-decode crate:
#![allow(clippy::doc_markdown)] // register names and hex addresses in doc comments
#![allow(clippy::must_use_candidate)] // decoded-state accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod classify;
pub mod decode;
pub mod diagnostic;
pub mod policy;
pub mod record;
pub mod registers;

// Re-export the pipeline surface
pub use classify::{classify, BusPrecision, FaultCause, FaultPhase, UbReason};
pub use decode::decode;
pub use diagnostic::{DiagnosticRecord, FaultCounter};
pub use policy::{
    disposition, Disposition, ExtentError, FatalReason, FaultingContext, MemoryExtent,
    PolicyConfig, Privilege,
};
pub use record::{
    BusFaultRecord, FaultRecordSet, HardFaultRecord, MemFaultRecord, UsageFaultRecord,
};
pub use registers::RawFaultRegisters;
