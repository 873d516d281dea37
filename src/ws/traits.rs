//! Transport seam between the connection manager and a concrete socket implementation.

use tokio::sync::mpsc;

/// Identifier of a single socket instance, assigned by the manager on every open.
pub type ConnectionId = u64;

/// Event reported by a transport for one socket instance.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket finished its handshake and can carry frames
    Opened,
    /// A text frame arrived
    Message(String),
    /// The socket is gone, cleanly or not, including failed open attempts
    Closed,
}

/// Handle a transport uses to report events for one socket back to the manager.
///
/// Every sink is bound to the [`ConnectionId`] of the open call that produced it, so
/// events from a socket the manager has already abandoned are recognised and dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
}

impl EventSink {
    pub(crate) fn new(
        id: ConnectionId,
        tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    ) -> Self {
        Self { id, tx }
    }

    /// The socket instance this sink reports for.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message<S: Into<String>>(&self, text: S) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn closed(&self) {
        self.emit(TransportEvent::Closed);
    }

    /// Report an event. Silently ignored once the manager has shut down.
    pub fn emit(&self, event: TransportEvent) {
        _ = self.tx.send((self.id, event));
    }

    /// Whether the manager still listens to this sink.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A socket implementation for one runtime.
///
/// The connection manager owns exactly one transport and drives it from a single task,
/// so implementations never see concurrent calls. None of the methods may block: an
/// open only *begins* connecting and reports its outcome through the [`EventSink`].
///
/// # Contract
///
/// - [`open`](Transport::open) must eventually report [`TransportEvent::Opened`] followed
///   by any number of messages and a [`TransportEvent::Closed`], or just `Closed` when
///   the attempt fails.
/// - [`close`](Transport::close) drops the current socket. A `Closed` event for it may
///   still be reported afterwards; the manager ignores it.
/// - [`send`](Transport::send) writes one text frame and fails with
///   [`WsError::NotOpen`](crate::ws::WsError::NotOpen) when no socket is open.
/// - [`is_open`](Transport::is_open) and [`is_closed`](Transport::is_closed) are
///   point-in-time answers; `is_closed` is `false` while an open attempt is in flight.
pub trait Transport: Send + 'static {
    /// Begin connecting to `address`, reporting through `events`.
    fn open(&mut self, address: &str, events: EventSink);

    /// Force-close the current socket, if any.
    fn close(&mut self);

    /// Write a text frame on the current socket.
    fn send(&mut self, text: String) -> crate::Result<()>;

    /// Whether a socket is currently open.
    fn is_open(&self) -> bool;

    /// Whether there is neither an open socket nor an open attempt in flight.
    fn is_closed(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, address: &str, events: EventSink) {
        (**self).open(address, events);
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn send(&mut self, text: String) -> crate::Result<()> {
        (**self).send(text)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
