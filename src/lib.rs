#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub(crate) mod serde_helpers;
pub mod types;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub use ws::{Config, ConnectionManager, ConnectionState};
#[cfg(feature = "tungstenite")]
pub use ws::TungsteniteTransport;
