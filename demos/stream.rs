//! Streams status, readings and log lines from a meter reader until Ctrl-C.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,emr_websocket_client=debug cargo run --example stream --features tungstenite,tracing -- ws://meter.local:81
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=stream.log RUST_LOG=debug cargo run --example stream --features tungstenite,tracing -- ws://meter.local:81
//! ```

use std::fs::File;
use std::time::Duration;

use emr_websocket_client::ws::{BackoffConfig, Config, ConnectionManager, TungsteniteTransport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://meter.local:81".to_owned());

    let mut backoff = BackoffConfig::default();
    backoff.max = Duration::from_secs(30);
    let mut config = Config::default();
    config.reconnect.backoff = Some(backoff);

    let manager = ConnectionManager::new(
        &address,
        config,
        TungsteniteTransport::default(),
        || info!("connected"),
        || warn!("disconnected"),
    )?;

    manager.add_status_handler(|status| {
        info!(
            update = "status",
            uptime = ?status.uptime,
            free_heap = ?status.free_heap,
            wifi = status.wifi_ssid.as_deref().unwrap_or("-"),
            ip = status.wifi_ip.as_deref().unwrap_or("-")
        );
    });
    manager.add_data_handler(|reading| {
        info!(
            update = "data",
            fields = reading.len(),
            power_delivered = ?reading.get_f64("powerDelivered"),
            power_returned = ?reading.get_f64("powerReturned")
        );
    });
    manager.add_log_handler(|line| info!(update = "log", %line));

    tokio::signal::ctrl_c().await?;
    info!(config = ?manager.connection_config(), "shutting down");
    manager.stop();

    Ok(())
}
