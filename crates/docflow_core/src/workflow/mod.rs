//! Carrier workflow state machine.
//!
//! # Responsibility
//! - Derive a carrier's workflow position from its movement history.
//! - Decide whether a requested transition is legal for that history.
//!
//! # Invariants
//! - Everything here is a pure function of the movement slice; no I/O, no
//!   stored state field.
//! - Cancelled movements never count as existing.

mod rules;
mod state;

pub use rules::{check_transition, FinalizedReason, Rejection, Transition};
pub use state::{derive_state, WorkflowSnapshot, WorkflowState};
