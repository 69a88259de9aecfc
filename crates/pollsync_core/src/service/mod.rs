//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate clock, ledger and governor into update scheduling.
//! - Fan renders out to references through the transport contracts.

pub mod fanout;
pub mod governor;
pub mod update_service;
