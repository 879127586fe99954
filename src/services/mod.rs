//! Services - control loops and decision policies
//!
//! This module contains the gate-side business logic:
//! - `vote` - Candidate vote buffer and cooldown dedup policy
//! - `trigger` - Proximity-gated capture trigger
//! - `entry` - Admission controller (log session, open gate)
//! - `exit` - Egress controller (paid-only exit state machine)
//! - `payment` - RFID terminal fee reconciliation

pub mod entry;
pub mod exit;
pub mod payment;
pub mod trigger;
pub mod vote;

// Re-export commonly used types
pub use entry::EntryController;
pub use exit::ExitController;
pub use payment::PaymentController;
pub use trigger::CaptureTrigger;
pub use vote::{CooldownGate, VoteBuffer};
