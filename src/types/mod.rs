//! Wire types exchanged with the energy meter reader.
//!
//! - [`request`]: frames the client sends (the connection config snapshot)
//! - [`response`]: update classes and the payloads the device streams back

pub mod request;
pub mod response;

pub use request::{ConfigSync, ConnectionConfig};
pub use response::{DataPoint, Status, UpdateClass};
