//! [`Transport`] backed by `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::traits::{EventSink, Transport};
use crate::Result;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// WebSocket transport running each socket on its own tokio task.
///
/// Every [`open`](Transport::open) spawns a task that performs the handshake and then
/// pumps frames in both directions until the socket ends or
/// [`close`](Transport::close) cancels it. Must be used within a tokio runtime.
#[derive(Debug)]
pub struct TungsteniteTransport {
    connect_timeout: Duration,
    socket: Option<Socket>,
}

#[derive(Debug)]
struct Socket {
    outgoing: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    phase: Arc<AtomicU8>,
}

impl Default for TungsteniteTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket: None,
        }
    }

    /// Give up on a handshake that has not completed within `connect_timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn phase(&self) -> Option<u8> {
        self.socket
            .as_ref()
            .map(|socket| socket.phase.load(Ordering::Acquire))
    }
}

impl Transport for TungsteniteTransport {
    fn open(&mut self, address: &str, events: EventSink) {
        self.close();

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let phase = Arc::new(AtomicU8::new(CONNECTING));

        tokio::spawn(run_socket(
            address.to_owned(),
            self.connect_timeout,
            events,
            outgoing_rx,
            cancel.clone(),
            Arc::clone(&phase),
        ));

        self.socket = Some(Socket {
            outgoing,
            cancel,
            phase,
        });
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.cancel.cancel();
        }
    }

    fn send(&mut self, text: String) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .filter(|socket| socket.phase.load(Ordering::Acquire) == OPEN)
            .ok_or(WsError::NotOpen)?;

        socket
            .outgoing
            .send(text)
            .map_err(|_e| WsError::SocketGone)?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.phase() == Some(OPEN)
    }

    fn is_closed(&self) -> bool {
        matches!(self.phase(), None | Some(CLOSED))
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    address: String,
    connect_timeout: Duration,
    events: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    phase: Arc<AtomicU8>,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => None,
        result = timeout(connect_timeout, connect_async(&address)) => Some(result),
    };

    let ws_stream = match connected {
        Some(Ok(Ok((ws_stream, _)))) => ws_stream,
        Some(Ok(Err(e))) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%address, error = %WsError::Handshake(e), "Unable to connect");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
            phase.store(CLOSED, Ordering::Release);
            events.closed();
            return;
        }
        Some(Err(_elapsed)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%address, error = %WsError::HandshakeTimeout(connect_timeout), "Unable to connect");
            phase.store(CLOSED, Ordering::Release);
            events.closed();
            return;
        }
        None => {
            phase.store(CLOSED, Ordering::Release);
            events.closed();
            return;
        }
    };

    phase.store(OPEN, Ordering::Release);
    events.opened();

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                _ = write.close().await;
                break;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "WebSocket read failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    break;
                }
                // Binary frames carry nothing for us; control frames are answered by tungstenite
                Some(Ok(_)) => {}
            },

            Some(text) = outgoing.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "WebSocket write failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    break;
                }
            }
        }
    }

    phase.store(CLOSED, Ordering::Release);
    events.closed();
}
