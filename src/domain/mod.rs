//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Plate` - validated canonical plate identifier and OCR candidate extraction
//! - `ParkingSession` - the unit of record, one per physical visit
//! - `PaymentStatus` / `GateTag` - session lifecycle and provenance

pub mod plate;
pub mod session;

pub use plate::Plate;
pub use session::{GateTag, ParkingSession, PaymentStatus};
