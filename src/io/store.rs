//! Session store - append/update-only persistence for parking sessions
//!
//! Sessions are written in JSONL format (one JSON object per line). Rows are
//! never deleted: transitions rewrite the single most recent matching row in
//! place, which keeps the full visit history auditable and bounds the blast
//! radius of a concurrent writer to one stale decision.
//!
//! Corrupt rows are skipped with a warning rather than failing the query -
//! one bad line must not take down a control loop.

use crate::domain::plate::Plate;
use crate::domain::session::{GateTag, ParkingSession, PaymentStatus};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Narrow interface to the persistent session store.
///
/// All "latest" lookups order by timestamp descending, breaking ties by
/// highest id (the most recently written row). Mutations touch only the
/// single most recent row matching the required status.
pub trait SessionStore {
    /// Append a fresh Unpaid session (gate=entry). Returns the stored row.
    fn append_entry(&self, plate: &Plate, timestamp: DateTime<Utc>)
        -> anyhow::Result<ParkingSession>;

    /// Most recent session for a plate, regardless of status.
    fn find_latest(&self, plate: &Plate) -> anyhow::Result<Option<ParkingSession>>;

    /// Most recent Unpaid session for a plate.
    fn find_latest_unpaid(&self, plate: &Plate) -> anyhow::Result<Option<ParkingSession>>;

    /// Transition the latest Unpaid session to Paid, stamping the amount.
    /// Returns false when no Unpaid row exists (makes replayed payment
    /// confirmations a no-op).
    fn mark_paid(&self, plate: &Plate, amount: f64) -> anyhow::Result<bool>;

    /// Transition the latest Paid session to Exited (gate=exit).
    fn mark_exited(&self, plate: &Plate) -> anyhow::Result<bool>;

    /// Tag the latest Unpaid session gate=unauthorized so denied exits
    /// surface in audits. No status change.
    fn mark_unauthorized(&self, plate: &Plate) -> anyhow::Result<bool>;

    /// Sum of amounts over Paid and Exited sessions.
    fn total_revenue(&self) -> anyhow::Result<f64>;

    /// Per-day aggregates, newest day first, capped at 7 days.
    fn daily_stats(&self) -> anyhow::Result<Vec<DailyStats>>;

    /// Vehicles currently inside (Unpaid or Paid sessions).
    fn occupied_count(&self) -> anyhow::Result<u64>;
}

/// One day of dashboard aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_vehicles: u64,
    pub revenue: f64,
    pub unpaid_count: u64,
    pub alerts: u64,
}

/// JSONL-backed session store.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Load every parseable row. A missing file is an empty store.
    fn load_all(&self) -> anyhow::Result<Vec<ParkingSession>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session store {}", self.path.display()))?;

        let mut sessions = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ParkingSession>(line) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "store_corrupt_row_skipped");
                }
            }
        }
        Ok(sessions)
    }

    /// Rewrite the whole file. Rows keep their original order.
    fn rewrite_all(&self, sessions: &[ParkingSession]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut out = String::new();
        for session in sessions {
            out.push_str(&serde_json::to_string(session)?);
            out.push('\n');
        }
        fs::write(&self.path, out)
            .with_context(|| format!("Failed to write session store {}", self.path.display()))?;
        Ok(())
    }

    fn append_line(&self, session: &ParkingSession) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(session)?)?;
        debug!(file = %self.path.display(), id = session.id, "store_row_appended");
        Ok(())
    }

    /// Index of the most recent row matching the predicate.
    /// Timestamp descending, ties broken by highest id.
    fn latest_index<F>(sessions: &[ParkingSession], pred: F) -> Option<usize>
    where
        F: Fn(&ParkingSession) -> bool,
    {
        sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| pred(s))
            .max_by_key(|(_, s)| (s.timestamp, s.id))
            .map(|(i, _)| i)
    }
}

impl SessionStore for JsonlStore {
    fn append_entry(
        &self,
        plate: &Plate,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<ParkingSession> {
        let sessions = self.load_all()?;
        let next_id = sessions.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let session = ParkingSession::new_entry(next_id, plate.clone(), timestamp);
        self.append_line(&session)?;
        Ok(session)
    }

    fn find_latest(&self, plate: &Plate) -> anyhow::Result<Option<ParkingSession>> {
        let sessions = self.load_all()?;
        Ok(Self::latest_index(&sessions, |s| &s.plate == plate).map(|i| sessions[i].clone()))
    }

    fn find_latest_unpaid(&self, plate: &Plate) -> anyhow::Result<Option<ParkingSession>> {
        let sessions = self.load_all()?;
        Ok(Self::latest_index(&sessions, |s| {
            &s.plate == plate && s.status == PaymentStatus::Unpaid
        })
        .map(|i| sessions[i].clone()))
    }

    fn mark_paid(&self, plate: &Plate, amount: f64) -> anyhow::Result<bool> {
        let mut sessions = self.load_all()?;
        let Some(idx) = Self::latest_index(&sessions, |s| {
            &s.plate == plate && s.status == PaymentStatus::Unpaid
        }) else {
            return Ok(false);
        };

        sessions[idx].status = PaymentStatus::Paid;
        sessions[idx].amount = amount;
        sessions[idx].timestamp = Utc::now();
        self.rewrite_all(&sessions)?;
        Ok(true)
    }

    fn mark_exited(&self, plate: &Plate) -> anyhow::Result<bool> {
        let mut sessions = self.load_all()?;
        let Some(idx) = Self::latest_index(&sessions, |s| {
            &s.plate == plate && s.status == PaymentStatus::Paid
        }) else {
            return Ok(false);
        };

        sessions[idx].status = PaymentStatus::Exited;
        sessions[idx].gate = GateTag::Exit;
        sessions[idx].timestamp = Utc::now();
        self.rewrite_all(&sessions)?;
        Ok(true)
    }

    fn mark_unauthorized(&self, plate: &Plate) -> anyhow::Result<bool> {
        let mut sessions = self.load_all()?;
        let Some(idx) = Self::latest_index(&sessions, |s| {
            &s.plate == plate && s.status == PaymentStatus::Unpaid
        }) else {
            return Ok(false);
        };

        sessions[idx].gate = GateTag::Unauthorized;
        self.rewrite_all(&sessions)?;
        Ok(true)
    }

    fn total_revenue(&self) -> anyhow::Result<f64> {
        let sessions = self.load_all()?;
        Ok(sessions
            .iter()
            .filter(|s| s.status != PaymentStatus::Unpaid)
            .map(|s| s.amount)
            .sum())
    }

    fn daily_stats(&self) -> anyhow::Result<Vec<DailyStats>> {
        let sessions = self.load_all()?;

        let mut by_day: BTreeMap<NaiveDate, DailyStats> = BTreeMap::new();
        for session in &sessions {
            let date = session.timestamp.date_naive();
            let entry = by_day.entry(date).or_insert_with(|| DailyStats {
                date,
                total_vehicles: 0,
                revenue: 0.0,
                unpaid_count: 0,
                alerts: 0,
            });
            entry.total_vehicles += 1;
            if session.status != PaymentStatus::Unpaid {
                entry.revenue += session.amount;
            } else {
                entry.unpaid_count += 1;
            }
            if session.gate == GateTag::Unauthorized {
                entry.alerts += 1;
            }
        }

        // Newest first, last 7 days
        Ok(by_day.into_values().rev().take(7).collect())
    }

    fn occupied_count(&self) -> anyhow::Result<u64> {
        let sessions = self.load_all()?;
        Ok(sessions.iter().filter(|s| s.status != PaymentStatus::Exited).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    fn store(dir: &tempfile::TempDir) -> JsonlStore {
        JsonlStore::new(dir.path().join("sessions.jsonl"))
    }

    #[test]
    fn test_append_and_find_latest() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        let session = store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        assert_eq!(session.id, 1);

        let found = store.find_latest(&plate("RAB123C")).unwrap().unwrap();
        assert_eq!(found, session);
        assert!(store.find_latest(&plate("RAA999Z")).unwrap().is_none());
    }

    #[test]
    fn test_latest_unpaid_respects_timestamp_order() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        let now = Utc::now();
        store.append_entry(&p, now - Duration::hours(3)).unwrap();
        store.append_entry(&p, now - Duration::hours(2)).unwrap();
        let t3 = store.append_entry(&p, now - Duration::hours(1)).unwrap();

        let latest = store.find_latest_unpaid(&p).unwrap().unwrap();
        assert_eq!(latest.id, t3.id);
    }

    #[test]
    fn test_latest_tie_breaks_by_id() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        let ts = Utc::now();
        store.append_entry(&p, ts).unwrap();
        let second = store.append_entry(&p, ts).unwrap();

        // Same timestamp: the most recently written row wins
        let latest = store.find_latest(&p).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[test]
    fn test_mark_paid_only_latest_unpaid() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        let now = Utc::now();
        let old = store.append_entry(&p, now - Duration::hours(5)).unwrap();
        let newer = store.append_entry(&p, now - Duration::hours(1)).unwrap();

        assert!(store.mark_paid(&p, 400.0).unwrap());

        let rows = store.load_all().unwrap();
        let old_row = rows.iter().find(|s| s.id == old.id).unwrap();
        let new_row = rows.iter().find(|s| s.id == newer.id).unwrap();
        assert_eq!(old_row.status, PaymentStatus::Unpaid);
        assert_eq!(new_row.status, PaymentStatus::Paid);
        assert_eq!(new_row.amount, 400.0);
    }

    #[test]
    fn test_mark_paid_idempotent() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        store.append_entry(&p, Utc::now()).unwrap();
        assert!(store.mark_paid(&p, 200.0).unwrap());
        // Replay: no Unpaid row remains, so nothing changes
        assert!(!store.mark_paid(&p, 200.0).unwrap());

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 200.0);
    }

    #[test]
    fn test_mark_exited_requires_paid() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        store.append_entry(&p, Utc::now()).unwrap();
        assert!(!store.mark_exited(&p).unwrap()); // still unpaid

        store.mark_paid(&p, 200.0).unwrap();
        assert!(store.mark_exited(&p).unwrap());

        let latest = store.find_latest(&p).unwrap().unwrap();
        assert_eq!(latest.status, PaymentStatus::Exited);
        assert_eq!(latest.gate, GateTag::Exit);

        // No Paid row left to exit again
        assert!(!store.mark_exited(&p).unwrap());
    }

    #[test]
    fn test_mark_unauthorized_tags_latest_unpaid() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        store.append_entry(&p, Utc::now()).unwrap();
        assert!(store.mark_unauthorized(&p).unwrap());

        let latest = store.find_latest(&p).unwrap().unwrap();
        assert_eq!(latest.gate, GateTag::Unauthorized);
        assert_eq!(latest.status, PaymentStatus::Unpaid); // status untouched
    }

    #[test]
    fn test_mark_unauthorized_no_unpaid_row() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        assert!(!store.mark_unauthorized(&plate("RAB123C")).unwrap());
    }

    #[test]
    fn test_corrupt_row_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.jsonl");
        let store = JsonlStore::new(&path);

        store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        // Inject a corrupt line between valid rows
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "not json at all").unwrap();
        }
        store.append_entry(&plate("RAA999Z"), Utc::now()).unwrap();

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_history_preserved_across_visits() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let p = plate("RAB123C");

        // First visit: full lifecycle
        store.append_entry(&p, Utc::now() - Duration::days(1)).unwrap();
        store.mark_paid(&p, 200.0).unwrap();
        store.mark_exited(&p).unwrap();

        // Second visit
        let second = store.append_entry(&p, Utc::now()).unwrap();

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 2);
        let latest_unpaid = store.find_latest_unpaid(&p).unwrap().unwrap();
        assert_eq!(latest_unpaid.id, second.id);
    }

    #[test]
    fn test_total_revenue() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        store.mark_paid(&plate("RAB123C"), 200.0).unwrap();
        store.mark_exited(&plate("RAB123C")).unwrap();

        store.append_entry(&plate("RAA999Z"), Utc::now()).unwrap();
        store.mark_paid(&plate("RAA999Z"), 400.0).unwrap();

        // Unpaid session contributes nothing
        store.append_entry(&plate("RAC777D"), Utc::now()).unwrap();

        assert_eq!(store.total_revenue().unwrap(), 600.0);
    }

    #[test]
    fn test_daily_stats_and_occupancy() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        store.mark_paid(&plate("RAB123C"), 200.0).unwrap();

        store.append_entry(&plate("RAA999Z"), Utc::now()).unwrap();
        store.mark_unauthorized(&plate("RAA999Z")).unwrap();

        let stats = store.daily_stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_vehicles, 2);
        assert_eq!(stats[0].revenue, 200.0);
        assert_eq!(stats[0].unpaid_count, 1);
        assert_eq!(stats[0].alerts, 1);

        assert_eq!(store.occupied_count().unwrap(), 2);
        store.mark_exited(&plate("RAB123C")).unwrap();
        assert_eq!(store.occupied_count().unwrap(), 1);
    }
}
