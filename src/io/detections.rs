//! Detection TCP listener for the vision/OCR collaborator
//!
//! The external recognizer localizes plate regions in the video feed, runs
//! OCR, and pushes one line per detected box:
//!
//!   `BOX <height_px> <width_px> <raw_ocr_text>`
//!
//! The raw text carries no contract - it may be empty or garbage; all
//! filtering happens downstream. Events are forwarded with try_send so a
//! slow controller never blocks the socket task; drops are counted.

use crate::infra::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// One reported detection box with its raw OCR reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub height_px: u32,
    pub width_px: u32,
    pub text: String,
}

/// Parse a `BOX <h> <w> <text>` line. Anything else yields None.
pub fn parse_detection(line: &str) -> Option<Detection> {
    let rest = line.trim().strip_prefix("BOX ")?;
    let mut parts = rest.splitn(3, ' ');

    let height_px = parts.next()?.parse().ok()?;
    let width_px = parts.next()?.parse().ok()?;
    let text = parts.next().unwrap_or("").to_string();

    Some(Detection { height_px, width_px, text })
}

/// Start the detection TCP listener.
///
/// Accepts connections from the recognizer and forwards parsed detections
/// to the controller loop.
pub async fn start_detection_listener(
    port: u16,
    detection_tx: mpsc::Sender<Detection>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %port, "detection_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("detection_listener_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = detection_tx.clone();
                        let m = metrics.clone();
                        tokio::spawn(async move {
                            handle_connection(socket, addr, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "detection_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    detection_tx: mpsc::Sender<Detection>,
    metrics: Arc<Metrics>,
) {
    let peer_ip = addr.ip().to_string();
    debug!(ip = %peer_ip, "detection_connection_accepted");

    let reader = BufReader::new(socket);
    let mut lines = reader.lines();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(detection) = parse_detection(&line) else {
            if !line.trim().is_empty() {
                debug!(peer_ip = %peer_ip, line = %line, "detection_unknown_message");
            }
            continue;
        };

        match detection_tx.try_send(detection) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_detection_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(peer_ip = %peer_ip, "detection_dropped: channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(peer_ip = %peer_ip, "detection_channel_closed");
                break;
            }
        }
    }

    debug!(peer_ip = %peer_ip, "detection_connection_closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detection_valid() {
        let detection = parse_detection("BOX 32 110 RAB123C").unwrap();
        assert_eq!(detection.height_px, 32);
        assert_eq!(detection.width_px, 110);
        assert_eq!(detection.text, "RAB123C");
    }

    #[test]
    fn test_parse_detection_text_with_spaces() {
        let detection = parse_detection("BOX 32 110 XX RAB 123C").unwrap();
        assert_eq!(detection.text, "XX RAB 123C");
    }

    #[test]
    fn test_parse_detection_empty_text() {
        let detection = parse_detection("BOX 32 110 ").unwrap();
        assert_eq!(detection.text, "");
    }

    #[test]
    fn test_parse_detection_rejects_garbage() {
        assert!(parse_detection("").is_none());
        assert!(parse_detection("ACC 12345").is_none());
        assert!(parse_detection("BOX notanum 110 RAB123C").is_none());
        assert!(parse_detection("BOX 32").is_none());
    }
}
