//! Parkgate - automated parking gate control system
//!
//! One binary, three roles: the entry and exit controllers watch a lane
//! (proximity sensor + plate recognizer + gate actuator), the payment
//! controller reconciles fees with an RFID terminal. Each role runs as an
//! independent process against the shared session store.
//!
//! Module structure:
//! - `domain/` - Core business types (Plate, ParkingSession)
//! - `io/` - External interfaces (sensor, actuator, terminal, store, detections)
//! - `services/` - Control loops (entry, exit, payment) and decision policies
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::{Parser, ValueEnum};
use parkgate::infra::{Config, Metrics};
use parkgate::io::{
    start_detection_listener, DistanceSensor, GateActuator, JsonlStore, TerminalLink,
};
use parkgate::services::{CaptureTrigger, EntryController, ExitController, PaymentController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parkgate - automated parking gate control system
#[derive(Parser, Debug)]
#[command(name = "parkgate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Which control loop this process runs
    #[arg(short, long, value_enum)]
    role: Role,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Role {
    Entry,
    Exit,
    Payment,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(role = ?args.role, "parkgate starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        store_file = %config.store_file(),
        sensor_device = %config.sensor_device(),
        actuator_device = %config.actuator_device(),
        terminal_device = %config.terminal_device(),
        detections_port = %config.detections_port(),
        rate_per_hour = %config.rate_per_hour(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let store = JsonlStore::new(config.store_file());

    // Periodic metrics summary (lock-free reads)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    match args.role {
        Role::Entry => {
            let detections = start_lane_inputs(&config, metrics.clone(), shutdown_rx.clone());
            let mut controller = EntryController::new(
                &config,
                store,
                lane_actuator(&config),
                lane_trigger(&config),
                metrics,
            );
            controller.run(detections, shutdown_rx).await;
        }
        Role::Exit => {
            let detections = start_lane_inputs(&config, metrics.clone(), shutdown_rx.clone());
            let mut controller = ExitController::new(
                &config,
                store,
                lane_actuator(&config),
                lane_trigger(&config),
                metrics,
            );
            controller.run(detections, shutdown_rx).await;
        }
        Role::Payment => {
            let link = TerminalLink::open(&config)?;
            let ready_timeout = Duration::from_secs(config.terminal_ready_timeout_secs());
            let mut controller = PaymentController::new(&config, store, link, metrics);
            controller.run(ready_timeout, shutdown_rx).await;
        }
    }

    info!("parkgate shutdown complete");
    Ok(())
}

/// Spawn the recognizer TCP listener for a lane role and hand back the
/// detection channel (bounded for backpressure).
fn start_lane_inputs(
    config: &Config,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<parkgate::io::Detection> {
    let (detection_tx, detection_rx) = mpsc::channel(1000);

    if config.detections_enabled() {
        let port = config.detections_port();
        tokio::spawn(async move {
            if let Err(e) = start_detection_listener(port, detection_tx, metrics, shutdown).await {
                tracing::error!(error = %e, "detection listener error");
            }
        });
    }

    detection_rx
}

fn lane_actuator(config: &Config) -> GateActuator {
    let mut actuator = GateActuator::new(config);
    actuator.connect();
    actuator
}

fn lane_trigger(config: &Config) -> CaptureTrigger {
    let mut sensor = DistanceSensor::new(config);
    sensor.connect();
    CaptureTrigger::new(config, sensor)
}
