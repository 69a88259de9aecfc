//! Domain model shared by the scheduler and the synchronizers.
//!
//! # Responsibility
//! - Define the poll snapshot handed in by mutation handlers.
//! - Define persisted reference and update-ledger records.
//!
//! # Invariants
//! - A reference has exactly one addressing mode.
//! - At most one update record exists per `(poll, window)` pair.

pub mod poll;
pub mod reference;
pub mod update;
