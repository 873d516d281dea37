//! Connection management for the meter reader's WebSocket feed.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: the client handle; owns one logical connection and keeps it
//!   alive with a heartbeat and automatic reconnection
//! - [`Transport`]: seam to the concrete socket, reporting through an [`EventSink`]
//! - [`TungsteniteTransport`]: production transport (`tungstenite` feature)
//! - [`SubscriptionRegistry`]: routes update frames to handlers by top-level key
//! - [`HeartbeatMonitor`] and [`ReconnectScheduler`]: the timer bookkeeping the manager
//!   drives
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new(
//!     "ws://meter.local:81",
//!     Config::default(),
//!     TungsteniteTransport::default(),
//!     || {},
//!     || {},
//! )?;
//!
//! manager.add_status_handler(|status| println!("uptime {:?}", status.uptime));
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod reconnect;
pub mod subscription;
pub mod traits;
#[cfg(feature = "tungstenite")]
pub mod transport;

pub use config::{BackoffConfig, Config, ReconnectConfig};
pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use heartbeat::{HeartbeatMonitor, HeartbeatPhase};
pub use reconnect::ReconnectScheduler;
pub use subscription::{Handler, SubscriptionRegistry, UpdateClasses};
pub use traits::*;
#[cfg(feature = "tungstenite")]
pub use transport::TungsteniteTransport;
