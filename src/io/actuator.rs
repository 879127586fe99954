//! Gate actuator link - single-byte command protocol
//!
//! Commands: b'1' = open, b'0' = close, b'2' = alert/buzzer. The physical
//! controller sends no acknowledgment; delivery is best effort and a write
//! failure is logged, never propagated - one dead actuator write must not
//! stop the control loop.
//!
//! The open/hold/close sequence is deliberately synchronous: the calling
//! controller handles one vehicle at a time and waits out the hold. The hold
//! is bounded by the shutdown signal so teardown is not delayed by a vehicle
//! mid-passage; close is still sent on the cancel path.

use crate::infra::config::Config;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

/// Gate controller command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCommand {
    Open,
    Close,
    Alert,
}

impl GateCommand {
    pub fn as_byte(&self) -> u8 {
        match self {
            GateCommand::Open => b'1',
            GateCommand::Close => b'0',
            GateCommand::Alert => b'2',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateCommand::Open => "open",
            GateCommand::Close => "close",
            GateCommand::Alert => "alert",
        }
    }
}

pub struct GateActuator {
    device: String,
    baud: u32,
    hold: Duration,
    port: Option<SerialStream>,
}

impl GateActuator {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.actuator_device().to_string(),
            baud: config.actuator_baud(),
            hold: Duration::from_secs(config.gate_hold_secs()),
            port: None,
        }
    }

    /// Try to open the serial port. Failure is tolerated - commands then
    /// become logged no-ops until the next connect attempt.
    pub fn connect(&mut self) {
        match tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
        {
            Ok(port) => {
                info!(device = %self.device, baud = %self.baud, "actuator_port_opened");
                self.port = Some(port);
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "actuator_port_open_failed");
                self.port = None;
            }
        }
    }

    /// Send a single command byte. Returns whether the write succeeded.
    pub async fn send(&mut self, cmd: GateCommand) -> bool {
        let Some(ref mut port) = self.port else {
            warn!(cmd = %cmd.as_str(), "actuator_not_connected");
            return false;
        };

        match port.write_all(&[cmd.as_byte()]).await {
            Ok(()) => {
                info!(cmd = %cmd.as_str(), "gate_command_sent");
                true
            }
            Err(e) => {
                warn!(cmd = %cmd.as_str(), error = %e, "gate_command_failed");
                false
            }
        }
    }

    /// Open the gate, hold for the vehicle to pass, then close.
    ///
    /// The hold is cancellable by the shutdown signal; close is sent either
    /// way so the gate is never left open across a teardown.
    /// Returns whether both open and close were delivered.
    pub async fn open_hold_close(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let opened = self.send(GateCommand::Open).await;

        tokio::select! {
            _ = tokio::time::sleep(self.hold) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("gate_hold_cancelled");
                }
            }
        }

        let closed = self.send(GateCommand::Close).await;
        opened && closed
    }

    /// Raise the alert/buzzer for a denied vehicle.
    pub async fn alert(&mut self) -> bool {
        self.send(GateCommand::Alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(GateCommand::Open.as_byte(), b'1');
        assert_eq!(GateCommand::Close.as_byte(), b'0');
        assert_eq!(GateCommand::Alert.as_byte(), b'2');
    }

    #[test]
    fn test_command_names() {
        assert_eq!(GateCommand::Open.as_str(), "open");
        assert_eq!(GateCommand::Close.as_str(), "close");
        assert_eq!(GateCommand::Alert.as_str(), "alert");
    }

    #[tokio::test]
    async fn test_send_without_port_is_noop() {
        let mut actuator = GateActuator::new(&Config::default());
        // No connect() - send reports failure but never panics
        assert!(!actuator.send(GateCommand::Open).await);
        assert!(!actuator.alert().await);
    }
}
