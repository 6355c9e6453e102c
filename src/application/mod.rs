//! Application layer: the orchestration state machine and the two provider
//! path controllers it routes between, plus the rate adapter.
//!
//! The orchestrator owns the `PaymentSession` and the commit-or-rollback
//! decision; controllers own their provider protocol and translate every raw
//! gateway error into a classified [`crate::error::PaymentError`] before it
//! reaches the orchestrator.

pub mod card;
pub mod orchestrator;
pub mod rates;
pub mod redirect;
