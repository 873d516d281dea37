#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Kind};

/// Failures on the socket or in the frames it carries.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// The WebSocket handshake with the meter reader failed
    #[cfg(feature = "tungstenite")]
    Handshake(tokio_tungstenite::tungstenite::Error),
    /// The handshake did not complete in time
    HandshakeTimeout(Duration),
    /// An inbound frame is not valid JSON
    MalformedFrame(serde_json::Error),
    /// An inbound frame is valid JSON but not an update record
    UnexpectedFrame(String),
    /// A frame was handed to a transport without an open socket
    NotOpen,
    /// The socket went away while a frame was being handed to it
    SocketGone,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "tungstenite")]
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
            Self::HandshakeTimeout(after) => write!(f, "handshake timed out after {after:?}"),
            Self::MalformedFrame(e) => write!(f, "malformed frame: {e}"),
            Self::UnexpectedFrame(what) => write!(f, "unexpected frame: {what}"),
            Self::NotOpen => f.write_str("no open socket"),
            Self::SocketGone => f.write_str("socket closed while sending"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "tungstenite")]
            Self::Handshake(e) => Some(e),
            Self::MalformedFrame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(Kind::Connection, e)
    }
}
