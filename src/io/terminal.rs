//! RFID payment terminal link - line-based ASCII protocol
//!
//! Terminal -> host messages:
//! - `PLATE:<id>;BALANCE:<amount>` - card presented
//! - `DONE:<amount_paid>:<new_balance>` - charge confirmed
//! - `INSUFFICIENT` - terminal-side balance check failed
//! - `ERROR:<detail>` / `ABORT` - definitive failures
//! - `READY` - availability handshake at connection time
//! - anything else is informational and ignored
//!
//! Host -> terminal replies: `NO_ENTRY`, `INSUFFICIENT_FUNDS`, or the fee
//! amount as a bare decimal line.
//!
//! All reads are timeout-bounded; the link never blocks the payment loop
//! indefinitely.

use crate::domain::plate::Plate;
use crate::infra::config::Config;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Card data from a valid PLATE message.
#[derive(Debug, Clone, PartialEq)]
pub struct CardData {
    pub plate: Plate,
    pub balance: f64,
}

/// One parsed terminal -> host message.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalMessage {
    Card(CardData),
    /// A PLATE or DONE line that failed validation - definitive rejection.
    Malformed(String),
    Done { amount_paid: f64, new_balance: f64 },
    Insufficient,
    Error(String),
    Abort,
    Ready,
    /// Informational chatter; callers ignore it and keep waiting.
    Info(String),
}

/// Host -> terminal reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminalReply {
    NoEntry,
    InsufficientFunds,
    Charge(f64),
}

impl TerminalReply {
    fn as_line(&self) -> String {
        match self {
            TerminalReply::NoEntry => "NO_ENTRY".to_string(),
            TerminalReply::InsufficientFunds => "INSUFFICIENT_FUNDS".to_string(),
            TerminalReply::Charge(amount) => format!("{:.2}", amount),
        }
    }
}

/// Parse one line from the terminal.
pub fn parse_line(line: &str) -> TerminalMessage {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("PLATE:") {
        return parse_card(line, rest);
    }
    if let Some(rest) = line.strip_prefix("DONE:") {
        return parse_done(line, rest);
    }
    if let Some(detail) = line.strip_prefix("ERROR:") {
        return TerminalMessage::Error(detail.trim().to_string());
    }
    match line {
        "INSUFFICIENT" => TerminalMessage::Insufficient,
        "ABORT" => TerminalMessage::Abort,
        "READY" => TerminalMessage::Ready,
        other => TerminalMessage::Info(other.to_string()),
    }
}

fn parse_card(line: &str, rest: &str) -> TerminalMessage {
    let Some((plate_part, balance_part)) = rest.split_once(";BALANCE:") else {
        return TerminalMessage::Malformed(line.to_string());
    };

    let Some(plate) = Plate::parse(plate_part.trim()) else {
        return TerminalMessage::Malformed(line.to_string());
    };

    let Ok(balance) = balance_part.trim().parse::<f64>() else {
        return TerminalMessage::Malformed(line.to_string());
    };
    if balance < 0.0 || !balance.is_finite() {
        return TerminalMessage::Malformed(line.to_string());
    }

    TerminalMessage::Card(CardData { plate, balance })
}

fn parse_done(line: &str, rest: &str) -> TerminalMessage {
    let Some((paid_part, balance_part)) = rest.split_once(':') else {
        return TerminalMessage::Malformed(line.to_string());
    };

    match (paid_part.trim().parse::<f64>(), balance_part.trim().parse::<f64>()) {
        (Ok(amount_paid), Ok(new_balance)) => TerminalMessage::Done { amount_paid, new_balance },
        _ => TerminalMessage::Malformed(line.to_string()),
    }
}

pub struct TerminalLink<S> {
    stream: BufReader<S>,
    /// Partial-line accumulator. Bytes consumed before a read timeout stay
    /// here so the next read resumes the same line instead of dropping it.
    line_buf: Vec<u8>,
}

impl TerminalLink<SerialStream> {
    /// Open the configured serial port to the terminal.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let port = tokio_serial::new(config.terminal_device(), config.terminal_baud())
            .timeout(Duration::from_millis(100))
            .open_native_async()?;
        info!(
            device = %config.terminal_device(),
            baud = %config.terminal_baud(),
            "terminal_port_opened"
        );
        Ok(Self::new(port))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> TerminalLink<S> {
    pub fn new(stream: S) -> Self {
        Self { stream: BufReader::new(stream), line_buf: Vec::new() }
    }

    /// Read one message within the timeout. Returns None on timeout or a
    /// closed link; empty lines are skipped without consuming the window.
    ///
    /// A serial terminal can stall mid-line, so the read accumulates into a
    /// buffer held across calls: a timeout leaves the partial line in place
    /// and the next call picks it up where it stopped.
    pub async fn read_message(&mut self, timeout: Duration) -> Option<TerminalMessage> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;

            match tokio::time::timeout(
                remaining,
                self.stream.read_until(b'\n', &mut self.line_buf),
            )
            .await
            {
                Ok(Ok(0)) => {
                    warn!("terminal_link_closed");
                    return None;
                }
                Ok(Ok(_)) => {
                    let line = String::from_utf8_lossy(&self.line_buf).into_owned();
                    self.line_buf.clear();
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!(line = %line.trim(), "terminal_line_received");
                    return Some(parse_line(&line));
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "terminal_read_error");
                    return None;
                }
                // Timeout: consumed bytes remain in line_buf for the next call
                Err(_) => return None,
            }
        }
    }

    /// Send one reply line. Failures are reported to the caller; payment
    /// negotiation treats them as definitive.
    pub async fn send(&mut self, reply: TerminalReply) -> std::io::Result<()> {
        let line = reply.as_line();
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        debug!(reply = %line, "terminal_reply_sent");
        Ok(())
    }

    /// Wait for the READY handshake at connection time. Bounded: logs a
    /// warning and proceeds when the terminal stays silent.
    pub async fn wait_ready(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                warn!("terminal_ready_not_received");
                return false;
            };
            match self.read_message(remaining).await {
                Some(TerminalMessage::Ready) => {
                    info!("terminal_ready");
                    return true;
                }
                Some(other) => {
                    debug!(message = ?other, "terminal_preready_message_ignored");
                }
                None => {
                    warn!("terminal_ready_not_received");
                    return false;
                }
            }
        }
    }
}
