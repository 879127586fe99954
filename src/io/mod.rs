//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sensor` - serial link to the proximity/distance sensor
//! - `actuator` - single-byte serial command protocol for the gate hardware
//! - `terminal` - line-based serial protocol for the RFID payment terminal
//! - `detections` - TCP listener for the vision/OCR collaborator
//! - `store` - persistent session store (JSONL backing)

pub mod actuator;
pub mod detections;
pub mod sensor;
pub mod store;
pub mod terminal;

// Re-export commonly used types
pub use actuator::{GateActuator, GateCommand};
pub use detections::{start_detection_listener, Detection};
pub use sensor::DistanceSensor;
pub use store::{DailyStats, JsonlStore, SessionStore};
pub use terminal::{TerminalLink, TerminalMessage, TerminalReply};
