//! Vote buffer and cooldown policy
//!
//! OCR is a noisy oracle, so no single reading is allowed to trigger a
//! state-changing action. Candidates accumulate in a small buffer; once the
//! decision threshold is reached the plurality value wins and the buffer is
//! cleared regardless of what happens downstream. The cooldown gate then
//! suppresses repeat decisions for the same plate inside a fixed window,
//! which keeps a vehicle idling at the sensor from re-triggering the gate.

use crate::domain::plate::Plate;
use std::time::{Duration, Instant};
use tracing::debug;

/// Number of accepted candidates required before a decision is made.
pub const VOTE_THRESHOLD: usize = 3;

/// Accumulates validated plate candidates and resolves the plurality.
#[derive(Debug, Default)]
pub struct VoteBuffer {
    candidates: Vec<Plate>,
}

impl VoteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate. When the threshold is reached, returns the
    /// plurality value (ties broken by first-seen order) and clears the
    /// buffer unconditionally.
    pub fn push(&mut self, candidate: Plate) -> Option<Plate> {
        self.candidates.push(candidate);

        if self.candidates.len() < VOTE_THRESHOLD {
            return None;
        }

        let winner = self.plurality();
        self.candidates.clear();
        winner
    }

    /// Most frequent candidate; first-seen order wins ties.
    fn plurality(&self) -> Option<Plate> {
        let mut winner: Option<(&Plate, usize)> = None;

        for candidate in &self.candidates {
            let count = self.candidates.iter().filter(|c| *c == candidate).count();
            match winner {
                Some((_, best)) if count <= best => {}
                _ => winner = Some((candidate, count)),
            }
        }

        winner.map(|(plate, _)| plate.clone())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Suppresses repeat decisions on the same plate within a fixed window.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last_plate: Option<Plate>,
    last_decided_at: Option<Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self { window, last_plate: None, last_decided_at: None }
    }

    /// Whether acting on this plate is allowed right now. A different plate
    /// is always allowed; the same plate only after the window has elapsed.
    pub fn permits(&self, plate: &Plate) -> bool {
        let (Some(last_plate), Some(last_at)) = (&self.last_plate, self.last_decided_at) else {
            return true;
        };

        if last_plate != plate {
            return true;
        }

        let elapsed = last_at.elapsed();
        if elapsed < self.window {
            debug!(
                plate = %plate,
                elapsed_secs = %elapsed.as_secs(),
                window_secs = %self.window.as_secs(),
                "cooldown_active"
            );
            false
        } else {
            true
        }
    }

    /// Record a decision. Called unconditionally when an action is taken,
    /// whether or not the downstream action succeeds, to bound retry storms.
    pub fn mark(&mut self, plate: &Plate) {
        self.last_plate = Some(plate.clone());
        self.last_decided_at = Some(Instant::now());
    }

    /// Shift the last decision into the past (test hook for window expiry).
    #[cfg(test)]
    pub fn backdate(&mut self, by: Duration) {
        if let Some(at) = self.last_decided_at {
            self.last_decided_at = Some(at - by);
        }
    }
}
