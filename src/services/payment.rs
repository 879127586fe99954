//! Payment controller - RFID terminal reconciliation
//!
//! Owns the only money-moving decision in the system. For each presented
//! card it resolves the open session, computes the fee, and negotiates the
//! charge with the terminal. A session is marked Paid only on an explicit
//! DONE confirmation, and at most once: a replayed DONE finds no unpaid row
//! and lands as a no-op.

use crate::infra::{Config, Metrics};
use crate::io::terminal::CardData;
use crate::io::{SessionStore, TerminalLink, TerminalMessage, TerminalReply};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Poll granularity for the idle read loop; keeps shutdown latency bounded.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Hours billed for a stay, rounded up with a one-hour minimum.
pub fn billed_hours(entered_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (now - entered_at).num_seconds().max(0);
    ((secs + 3599) / 3600).max(1)
}

/// Fee for a stay at the configured hourly rate.
pub fn compute_fee(entered_at: DateTime<Utc>, now: DateTime<Utc>, rate_per_hour: f64) -> f64 {
    billed_hours(entered_at, now) as f64 * rate_per_hour
}

pub struct PaymentController<St, S> {
    store: St,
    link: TerminalLink<S>,
    rate_per_hour: f64,
    response_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl<St, S> PaymentController<St, S>
where
    St: SessionStore,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(config: &Config, store: St, link: TerminalLink<S>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            link,
            rate_per_hour: config.rate_per_hour(),
            response_timeout: Duration::from_secs(config.terminal_response_timeout_secs()),
            metrics,
        }
    }

    /// Main payment loop: READY handshake, then poll for card presentations
    /// until shutdown. One bad exchange never terminates the loop.
    pub async fn run(&mut self, ready_timeout: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("payment_controller_started");
        self.link.wait_ready(ready_timeout).await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("payment_controller_shutdown");
                        return;
                    }
                }
                message = self.link.read_message(IDLE_POLL) => {
                    match message {
                        Some(TerminalMessage::Card(card)) => self.handle_card(card).await,
                        Some(TerminalMessage::Malformed(line)) => {
                            warn!(line = %line, "terminal_message_malformed");
                            self.reply(TerminalReply::NoEntry).await;
                        }
                        Some(TerminalMessage::Error(detail)) => {
                            warn!(detail = %detail, "terminal_reported_error");
                        }
                        Some(other) => debug!(message = ?other, "terminal_message_ignored"),
                        None => {} // idle poll expired
                    }
                }
            }
        }
    }

    /// One card presentation: resolve session, quote the fee, settle.
    pub async fn handle_card(&mut self, card: CardData) {
        let session = match self.store.find_latest_unpaid(&card.plate) {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!(plate = %card.plate, "no_open_session");
                self.reply(TerminalReply::NoEntry).await;
                return;
            }
            Err(e) => {
                self.metrics.record_store_error();
                error!(plate = %card.plate, error = %e, "payment_store_lookup_failed");
                self.reply(TerminalReply::NoEntry).await;
                return;
            }
        };

        let fee = compute_fee(session.timestamp, Utc::now(), self.rate_per_hour);
        info!(plate = %card.plate, fee = %fee, balance = %card.balance, "fee_quoted");

        if card.balance < fee {
            self.metrics.record_payment_failed();
            warn!(plate = %card.plate, fee = %fee, balance = %card.balance, "balance_below_fee");
            self.reply(TerminalReply::InsufficientFunds).await;
            return;
        }

        if let Err(e) = self.link.send(TerminalReply::Charge(fee)).await {
            self.metrics.record_payment_failed();
            error!(plate = %card.plate, error = %e, "charge_send_failed");
            return;
        }

        self.await_confirmation(&card, fee).await;
    }

    /// Wait for the terminal's verdict on a quoted charge. Informational
    /// lines are skipped; anything else settles the exchange.
    async fn await_confirmation(&mut self, card: &CardData, fee: f64) {
        let deadline = tokio::time::Instant::now() + self.response_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                self.metrics.record_payment_failed();
                warn!(plate = %card.plate, "terminal_confirmation_timeout");
                return;
            }

            match self.link.read_message(remaining).await {
                Some(TerminalMessage::Done { amount_paid, new_balance }) => {
                    self.settle(card, fee, amount_paid, new_balance);
                    return;
                }
                Some(TerminalMessage::Insufficient) => {
                    self.metrics.record_payment_failed();
                    warn!(plate = %card.plate, "terminal_reported_insufficient");
                    return;
                }
                Some(TerminalMessage::Error(detail)) => {
                    self.metrics.record_payment_failed();
                    warn!(plate = %card.plate, detail = %detail, "terminal_reported_error");
                    return;
                }
                Some(TerminalMessage::Abort) => {
                    self.metrics.record_payment_failed();
                    warn!(plate = %card.plate, "terminal_aborted");
                    return;
                }
                Some(TerminalMessage::Malformed(line)) => {
                    self.metrics.record_payment_failed();
                    warn!(plate = %card.plate, line = %line, "terminal_confirmation_malformed");
                    return;
                }
                Some(other) => {
                    debug!(message = ?other, "terminal_chatter_during_confirmation");
                }
                None => {
                    self.metrics.record_payment_failed();
                    warn!(plate = %card.plate, "terminal_confirmation_timeout");
                    return;
                }
            }
        }
    }

    /// Apply a confirmed charge to the store.
    fn settle(&self, card: &CardData, fee: f64, amount_paid: f64, new_balance: f64) {
        if (amount_paid - fee).abs() > 0.005 {
            warn!(plate = %card.plate, fee = %fee, amount_paid = %amount_paid, "paid_amount_differs_from_quote");
        }

        match self.store.mark_paid(&card.plate, amount_paid) {
            Ok(true) => {
                self.metrics.record_payment_completed();
                info!(
                    plate = %card.plate,
                    amount_paid = %amount_paid,
                    new_balance = %new_balance,
                    "payment_completed"
                );
            }
            Ok(false) => {
                // Duplicate DONE - the row is already paid, nothing to apply.
                warn!(plate = %card.plate, "duplicate_confirmation_ignored");
            }
            Err(e) => {
                // Money moved on the terminal but the record didn't - this
                // needs operator attention, not an automatic retry.
                self.metrics.record_store_error();
                error!(plate = %card.plate, amount_paid = %amount_paid, error = %e, "paid_but_store_update_failed");
            }
        }
    }

    async fn reply(&mut self, reply: TerminalReply) {
        if let Err(e) = self.link.send(reply).await {
            warn!(error = %e, "terminal_reply_send_failed");
        }
    }
}
