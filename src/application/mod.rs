//! Application layer containing the reconciliation workflow.
//!
//! This module defines the `ReconciliationEngine`, which scans installments,
//! settles the ones the gateway reports as paid and reminds debtors at most
//! once per day; the `RecheckRegistry` that owns delayed status checks; and the
//! periodic trigger that drives scans.

pub mod engine;
pub mod recheck;
pub mod scheduler;
