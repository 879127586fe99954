//! Exit controller - egress side of the gate
//!
//! Same capture pipeline as admission, but the decision runs a small state
//! machine against the session store: only a plate whose most recent session
//! is Paid gets out. Unpaid and unknown plates get the alert buzzer and the
//! offending unpaid row tagged unauthorized; a plate that already exited is
//! denied again without touching history.

use crate::domain::{PaymentStatus, Plate};
use crate::infra::{Config, Metrics};
use crate::io::{Detection, GateActuator, SessionStore};
use crate::services::trigger::CaptureTrigger;
use crate::services::vote::{CooldownGate, VoteBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub struct ExitController<S: SessionStore> {
    store: S,
    actuator: GateActuator,
    trigger: CaptureTrigger,
    votes: VoteBuffer,
    cooldown: CooldownGate,
    min_box_height: u32,
    min_box_width: u32,
    metrics: Arc<Metrics>,
}

impl<S: SessionStore> ExitController<S> {
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
            cooldown: CooldownGate::new(Duration::from_secs(config.exit_cooldown_secs())),
            min_box_height: config.min_box_height(),
            min_box_width: config.min_box_width(),
            metrics,
        }
    }

    /// Main egress loop, mirrors the admission loop shape.
    pub async fn run(
        &mut self,
        mut detections: mpsc::Receiver<Detection>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("exit_controller_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("exit_controller_shutdown");
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

    /// Exit state machine for a vote-cleared plate.
    pub async fn handle_decision(&mut self, plate: Plate, shutdown: &mut watch::Receiver<bool>) {
        if !self.cooldown.permits(&plate) {
            self.metrics.record_cooldown_skip();
            info!(plate = %plate, "exit_skipped_cooldown");
            return;
        }
        self.cooldown.mark(&plate);

        let latest = match self.store.find_latest(&plate) {
            Ok(latest) => latest,
            Err(e) => {
                self.metrics.record_store_error();
                error!(plate = %plate, error = %e, "exit_store_lookup_failed");
                return;
            }
        };

        match latest.map(|s| s.status) {
            Some(PaymentStatus::Paid) => self.grant(&plate, shutdown).await,
            Some(PaymentStatus::Exited) => {
                // Already out - deny again but leave history alone.
                self.metrics.record_exit_denied();
                warn!(plate = %plate, "exit_denied_already_exited");
                if !self.actuator.alert().await {
                    self.metrics.record_actuator_error();
                }
            }
            Some(PaymentStatus::Unpaid) | None => self.deny_unpaid(&plate).await,
        }
    }

    /// The Exited transition is the authority for opening the gate: the
    /// earlier status lookup is only a hint, and the row can change between
    /// the two reads (another process settling the same plate). Grant only
    /// when the transition actually applied.
    async fn grant(&mut self, plate: &Plate, shutdown: &mut watch::Receiver<bool>) {
        match self.store.mark_exited(plate) {
            Ok(true) => {
                self.metrics.record_exit_granted();
                info!(plate = %plate, "exit_granted");
                if !self.actuator.open_hold_close(shutdown).await {
                    self.metrics.record_actuator_error();
                }
            }
            Ok(false) => {
                // No Paid row anymore - the session moved under us
                self.metrics.record_exit_denied();
                warn!(plate = %plate, "exit_denied_session_changed");
                if !self.actuator.alert().await {
                    self.metrics.record_actuator_error();
                }
            }
            Err(e) => {
                self.metrics.record_store_error();
                error!(plate = %plate, error = %e, "exit_mark_failed");
            }
        }
    }

    async fn deny_unpaid(&mut self, plate: &Plate) {
        self.metrics.record_exit_denied();
        warn!(plate = %plate, "exit_denied_unpaid");

        if !self.actuator.alert().await {
            self.metrics.record_actuator_error();
        }

        match self.store.mark_unauthorized(plate) {
            Ok(true) => info!(plate = %plate, "session_tagged_unauthorized"),
            Ok(false) => {} // unknown plate, nothing to tag
            Err(e) => {
                self.metrics.record_store_error();
                error!(plate = %plate, error = %e, "unauthorized_tag_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GateTag;
    use crate::io::{DistanceSensor, JsonlStore};
    use chrono::Utc;

    fn plate(s: &str) -> Plate {
        Plate::parse(s).unwrap()
    }

    fn controller(dir: &tempfile::TempDir) -> ExitController<JsonlStore> {
        let config = Config::default()
            .with_cooldowns(300, 60)
            .with_gate_hold_secs(0);
        let store = JsonlStore::new(dir.path().join("sessions.jsonl"));
        let actuator = GateActuator::new(&config);
        let sensor = DistanceSensor::new(&config);
        let trigger = CaptureTrigger::new(&config, sensor);
        ExitController::new(&config, store, actuator, trigger, Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn test_paid_plate_granted_and_marked_exited() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        ctrl.store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        ctrl.store.mark_paid(&plate("RAB123C"), 200.0).unwrap();

        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;

        let session = ctrl.store.find_latest(&plate("RAB123C")).unwrap().unwrap();
        assert_eq!(session.status, PaymentStatus::Exited);
        assert_eq!(session.gate, GateTag::Exit);
        assert_eq!(ctrl.metrics.report().exits_granted, 1);
    }

    #[tokio::test]
    async fn test_unpaid_plate_denied_and_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        ctrl.store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();

        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;

        let session = ctrl.store.find_latest(&plate("RAB123C")).unwrap().unwrap();
        assert_eq!(session.status, PaymentStatus::Unpaid);
        assert_eq!(session.gate, GateTag::Unauthorized);
        assert_eq!(ctrl.metrics.report().exits_denied, 1);
        assert_eq!(ctrl.metrics.report().exits_granted, 0);
    }

    #[tokio::test]
    async fn test_unknown_plate_denied() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        ctrl.handle_decision(plate("RAZ000X"), &mut rx).await;

        assert_eq!(ctrl.metrics.report().exits_denied, 1);
        assert!(ctrl.store.find_latest(&plate("RAZ000X")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_exit_denied_without_overwriting_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        ctrl.store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        ctrl.store.mark_paid(&plate("RAB123C"), 200.0).unwrap();

        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;
        ctrl.cooldown.backdate(Duration::from_secs(61));
        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;

        let session = ctrl.store.find_latest(&plate("RAB123C")).unwrap().unwrap();
        assert_eq!(session.status, PaymentStatus::Exited);
        assert_eq!(session.amount, 200.0);
        assert_eq!(ctrl.metrics.report().exits_granted, 1);
        assert_eq!(ctrl.metrics.report().exits_denied, 1);
    }

    #[tokio::test]
    async fn test_grant_denied_when_session_no_longer_paid() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        // The session settles elsewhere between the status lookup and the
        // Exited transition: no Paid row remains, so the gate must not open
        ctrl.store.append_entry(&plate("RAB123C"), Utc::now()).unwrap();
        ctrl.grant(&plate("RAB123C"), &mut rx).await;

        let session = ctrl.store.find_latest(&plate("RAB123C")).unwrap().unwrap();
        assert_eq!(session.status, PaymentStatus::Unpaid);
        assert_eq!(ctrl.metrics.report().exits_granted, 0);
        assert_eq!(ctrl.metrics.report().exits_denied, 1);
    }

    #[tokio::test]
    async fn test_exit_cooldown_skips_repeat_decision() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctrl = controller(&dir);
        let (_tx, mut rx) = watch::channel(false);

        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;
        ctrl.handle_decision(plate("RAB123C"), &mut rx).await;

        assert_eq!(ctrl.metrics.report().exits_denied, 1);
        assert_eq!(ctrl.metrics.report().cooldown_skips, 1);
    }
}
