//! Entry controller - admission side of the gate
//!
//! Consumes detection boxes from the recognizer, gates them on vehicle
//! proximity, extracts plate candidates, and lets the vote buffer and
//! cooldown decide when a vehicle is really there. A cleared decision logs
//! a new unpaid session and runs the gate open/hold/close sequence. No
//! existing-session check is made on admission; a plate that enters twice
//! simply gets a second unpaid row.

use crate::domain::Plate;
use crate::infra::{Config, Metrics};
use crate::io::{Detection, GateActuator, SessionStore};
use crate::services::trigger::CaptureTrigger;
use crate::services::vote::{CooldownGate, VoteBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub struct EntryController<S: SessionStore> {
    store: S,
    actuator: GateActuator,
    trigger: CaptureTrigger,
    votes: VoteBuffer,
    cooldown: CooldownGate,
    min_box_height: u32,
    min_box_width: u32,
    metrics: Arc<Metrics>,
}

impl<S: SessionStore> EntryController<S> {
    pub fn new(
        config: &Config,
        store: S,
        actuator: GateActuator,
        trigger: CaptureTrigger,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            actuator,
            trigger,
            votes: VoteBuffer::new(),
            cooldown: CooldownGate::new(Duration::from_secs(config.entry_cooldown_secs())),
            min_box_height: config.min_box_height(),
            min_box_width: config.min_box_width(),
            metrics,
        }
    }

    /// Main admission loop. Runs until the detection channel closes or
    /// shutdown is signalled. One bad detection never terminates the loop.
    pub async fn run(
        &mut self,
        mut detections: mpsc::Receiver<Detection>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("entry_controller_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("entry_controller_shutdown");
                        return;
                    }
                }
                detection = detections.recv() => {
                    match detection {
                        Some(d) => self.handle_detection(d, &mut shutdown).await,
                        None => {
                            warn!("detection_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_detection(&mut self, detection: Detection, shutdown: &mut watch::Receiver<bool>) {
        if !self.trigger.vehicle_present().await {
            debug!("no_vehicle_in_range");
            return;
        }

        let Some(plate) = self.candidate_from(&detection) else {
            return;
        };

        if let Some(decided) = self.votes.push(plate) {
            self.metrics.record_vote_decided();
            self.handle_decision(decided, shutdown).await;
        }
    }

    /// Size-filter the box, then run candidate extraction on its raw text.
    fn candidate_from(&self, detection: &Detection) -> Option<Plate> {
        if detection.height_px < self.min_box_height || detection.width_px < self.min_box_width {
            self.metrics.record_box_filtered();
            debug!(
                height_px = %detection.height_px,
                width_px = %detection.width_px,
                "detection_box_too_small"
            );
            return None;
        }

        match Plate::extract(&detection.text) {
            Some(plate) => {
                self.metrics.record_candidate_accepted();
                debug!(plate = %plate, "candidate_accepted");
                Some(plate)
            }
            None => {
                self.metrics.record_candidate_rejected();
                None
            }
        }
    }

    /// Act on a vote-cleared plate: cooldown check, persist, run the gate.
    pub async fn handle_decision(&mut self, plate: Plate, shutdown: &mut watch::Receiver<bool>) {
        if !self.cooldown.permits(&plate) {
            self.metrics.record_cooldown_skip();
            info!(plate = %plate, "entry_skipped_cooldown");
            return;
        }
        self.cooldown.mark(&plate);

        match self.store.append_entry(&plate, chrono::Utc::now()) {
            Ok(session) => {
                self.metrics.record_entry_logged();
                info!(plate = %plate, session_id = %session.id, "entry_logged");
            }
            Err(e) => {
                // The vehicle is physically at the gate; let it in anyway
                // and surface the lost record to the operator.
                self.metrics.record_store_error();
                error!(plate = %plate, error = %e, "entry_store_write_failed");
            }
        }

        if !self.actuator.open_hold_close(shutdown).await {
            self.metrics.record_actuator_error();
        }
    }
}
