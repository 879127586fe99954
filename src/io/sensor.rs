//! Distance sensor link - proximity readings that gate the capture pipeline
//!
//! Protocol: line-based ASCII, one numeric distance sample (cm) per line.
//! The sensor is deliberately fail-open: a missing link, a silent port, or a
//! malformed/out-of-range sample all degrade to the configured fallback value
//! instead of an error, so a dead sensor keeps the gate available rather
//! than stuck. Reads are timeout-bounded and never block the control loop.

use crate::infra::config::Config;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Bounded wait for one sample before falling back.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct DistanceSensor {
    device: String,
    baud: u32,
    fallback_cm: f64,
    max_range_cm: f64,
    reader: Option<BufReader<SerialStream>>,
}

impl DistanceSensor {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.sensor_device().to_string(),
            baud: config.sensor_baud(),
            fallback_cm: config.sensor_fallback_cm(),
            max_range_cm: config.sensor_max_range_cm(),
            reader: None,
        }
    }

    /// Try to open the serial port. Failure is logged and tolerated - the
    /// sensor then reports the fallback value on every sample.
    pub fn connect(&mut self) {
        match tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
        {
            Ok(port) => {
                info!(device = %self.device, baud = %self.baud, "sensor_port_opened");
                self.reader = Some(BufReader::new(port));
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "sensor_port_open_failed");
                self.reader = None;
            }
        }
    }

    /// Whether a serial link is currently held.
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    /// Read one distance sample, substituting the fallback on any failure.
    pub async fn sample(&mut self) -> f64 {
        let Some(ref mut reader) = self.reader else {
            return self.fallback_cm;
        };

        let mut line = String::new();
        let raw = match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => None, // EOF
            Ok(Ok(_)) => parse_sample(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "sensor_read_error");
                None
            }
            Err(_) => None, // no data within the window
        };

        let distance = validate_sample(raw, self.max_range_cm, self.fallback_cm);
        debug!(distance_cm = %distance, "sensor_sample");
        distance
    }
}

/// Parse one ASCII line into a distance value.
fn parse_sample(line: &str) -> Option<f64> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Clamp a raw sample to the sane physical range, substituting the fallback
/// for missing or out-of-range readings.
fn validate_sample(raw: Option<f64>, max_range_cm: f64, fallback_cm: f64) -> f64 {
    match raw {
        Some(d) if (0.0..=max_range_cm).contains(&d) => d,
        Some(d) => {
            warn!(distance_cm = %d, "sensor_sample_out_of_range");
            fallback_cm
        }
        None => fallback_cm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample("42.5\n"), Some(42.5));
        assert_eq!(parse_sample("  120 \r\n"), Some(120.0));
        assert_eq!(parse_sample(""), None);
        assert_eq!(parse_sample("garbage"), None);
    }

    #[test]
    fn test_validate_in_range() {
        assert_eq!(validate_sample(Some(42.0), 400.0, 150.0), 42.0);
        assert_eq!(validate_sample(Some(0.0), 400.0, 150.0), 0.0);
        assert_eq!(validate_sample(Some(400.0), 400.0, 150.0), 400.0);
    }

    #[test]
    fn test_validate_out_of_range_falls_back() {
        assert_eq!(validate_sample(Some(750.0), 400.0, 150.0), 150.0);
        assert_eq!(validate_sample(Some(-3.0), 400.0, 150.0), 150.0);
    }

    #[test]
    fn test_validate_missing_falls_back() {
        assert_eq!(validate_sample(None, 400.0, 150.0), 150.0);
    }

    #[tokio::test]
    async fn test_sample_without_link_is_fallback() {
        let mut sensor = DistanceSensor::new(&Config::default());
        // No connect() - sensor degrades to the fallback reading
        assert_eq!(sensor.sample().await, 150.0);
    }
}
