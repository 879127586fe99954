//! Parking session data model
//!
//! A session is one entry-to-exit visit for a plate. Payment status is
//! monotonic per visit: Unpaid -> Paid -> Exited, no skips, no reversals.
//! The store never deletes a session, so a plate accumulates one row per
//! physical visit and "latest" lookups resolve by timestamp (ties broken by
//! highest id, i.e. the most recently written row).

use crate::domain::plate::Plate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment status of a session. Wire values match the persisted codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Exited,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Exited => "exited",
        }
    }
}

impl From<PaymentStatus> for u8 {
    fn from(s: PaymentStatus) -> u8 {
        match s {
            PaymentStatus::Unpaid => 0,
            PaymentStatus::Paid => 1,
            PaymentStatus::Exited => 2,
        }
    }
}

impl TryFrom<u8> for PaymentStatus {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(PaymentStatus::Unpaid),
            1 => Ok(PaymentStatus::Paid),
            2 => Ok(PaymentStatus::Exited),
            other => Err(format!("invalid payment status code: {other}")),
        }
    }
}

/// Provenance tag recording which gate produced or last touched a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateTag {
    Entry,
    Exit,
    /// Exit attempt denied for missing/insufficient payment.
    Unauthorized,
}

impl GateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateTag::Entry => "entry",
            GateTag::Exit => "exit",
            GateTag::Unauthorized => "unauthorized",
        }
    }
}

/// One parking session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: u64,
    pub plate: Plate,
    pub status: PaymentStatus,
    /// Amount paid; zero until the session transitions to Paid.
    pub amount: f64,
    /// Creation / last-transition time.
    pub timestamp: DateTime<Utc>,
    pub gate: GateTag,
}

impl ParkingSession {
    /// Create a fresh unpaid session for an admitted vehicle.
    pub fn new_entry(id: u64, plate: Plate, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            plate,
            status: PaymentStatus::Unpaid,
            amount: 0.0,
            timestamp,
            gate: GateTag::Entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate() -> Plate {
        Plate::parse("RAB123C").unwrap()
    }

    #[test]
    fn test_new_entry_defaults() {
        let session = ParkingSession::new_entry(1, plate(), Utc::now());
        assert_eq!(session.status, PaymentStatus::Unpaid);
        assert_eq!(session.amount, 0.0);
        assert_eq!(session.gate, GateTag::Entry);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(u8::from(PaymentStatus::Unpaid), 0);
        assert_eq!(u8::from(PaymentStatus::Paid), 1);
        assert_eq!(u8::from(PaymentStatus::Exited), 2);
        assert_eq!(PaymentStatus::try_from(1).unwrap(), PaymentStatus::Paid);
        assert!(PaymentStatus::try_from(3).is_err());
    }

    #[test]
    fn test_session_json_round_trip() {
        let session = ParkingSession::new_entry(42, plate(), Utc::now());
        let json = serde_json::to_string(&session).unwrap();
        // Status serializes as the persisted numeric code
        assert!(json.contains("\"status\":0"));
        assert!(json.contains("\"gate\":\"entry\""));
        let back: ParkingSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
