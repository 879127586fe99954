//! Sensor-based capture gating
//!
//! Detections only lead to work when a vehicle is actually at the gate. The
//! capture trigger reads one distance sample per candidate and compares it
//! against the proximity threshold; everything farther away is recognizer
//! noise from traffic in the background and gets dropped before OCR
//! validation even runs.

use crate::infra::Config;
use crate::io::DistanceSensor;
use tracing::trace;

/// Gates the capture pipeline on measured vehicle proximity.
pub struct CaptureTrigger {
    sensor: DistanceSensor,
    trigger_cm: f64,
}

impl CaptureTrigger {
    pub fn new(config: &Config, sensor: DistanceSensor) -> Self {
        Self { sensor, trigger_cm: config.sensor_trigger_cm() }
    }

    /// Take one distance sample and decide whether a vehicle is close enough
    /// to process detections. With no sensor link at all this fails open and
    /// reports the vehicle as present, so a missing sensor degrades to
    /// "always trigger" instead of blocking admission.
    pub async fn vehicle_present(&mut self) -> bool {
        if !self.sensor.is_connected() {
            trace!("no_sensor_link_fail_open");
            return true;
        }
        let distance_cm = self.sensor.sample().await;
        let present = is_triggered(distance_cm, self.trigger_cm);
        trace!(distance_cm = %distance_cm, present = %present, "proximity_sample");
        present
    }
}

/// Proximity threshold check, inclusive at the boundary.
pub fn is_triggered(distance_cm: f64, trigger_cm: f64) -> bool {
    distance_cm <= trigger_cm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggered_below_threshold() {
        assert!(is_triggered(12.0, 50.0));
    }

    #[test]
    fn test_triggered_at_exact_threshold() {
        assert!(is_triggered(50.0, 50.0));
    }

    #[test]
    fn test_not_triggered_above_threshold() {
        assert!(!is_triggered(50.1, 50.0));
        assert!(!is_triggered(320.0, 50.0));
    }
}
