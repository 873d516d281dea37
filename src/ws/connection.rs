#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::{Config, non_zero};
use super::heartbeat::HeartbeatMonitor;
use super::reconnect::ReconnectScheduler;
use super::subscription::{Handler, SubscriptionRegistry, typed_handler};
use super::traits::{ConnectionId, EventSink, Transport, TransportEvent};
use crate::Result;
use crate::error::Error;
use crate::types::request::{ConfigSync, ConnectionConfig};
use crate::types::response::{DataPoint, Status, UpdateClass};

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, no attempt in flight
    Closed,
    /// An open attempt is in flight
    Opening,
    /// Socket open and monitored by the heartbeat
    Open,
    /// Shutting down after [`ConnectionManager::stop`]
    Closing,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Lifecycle notification passed to [`ConnectionManager::new`].
pub type Callback = Box<dyn FnMut() + Send + 'static>;

enum Command {
    Send(String),
    Subscribe {
        key: String,
        class: Option<UpdateClass>,
        handler: Handler,
    },
    SetHeartbeatInterval(Duration),
    SetGracePeriod(Duration),
    SetReconnectInterval(Duration),
}

/// Keeps one logical connection to an energy meter reader alive indefinitely.
///
/// The manager handles every connection concern:
/// - Opening the connection on construction and reopening it whenever it is lost
/// - Heartbeat monitoring via a probe/reply pair, force-closing an unresponsive socket
/// - Re-sending the streaming configuration whenever it changes and on every open
/// - Routing update frames to subscribers by top-level key
///
/// All state lives in a single background task that exclusively owns the
/// [`Transport`]; this handle only enqueues work, so no method blocks. Clones share the
/// same connection. Dropping the last clone stops the manager like [`stop`](Self::stop).
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(
///     "ws://meter.local:81",
///     Config::default(),
///     TungsteniteTransport::default(),
///     || println!("connected"),
///     || println!("disconnected"),
/// )?;
///
/// manager.add_data_handler(|reading| println!("{:?}", reading.get_f64("powerDelivered")));
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    /// Sender channel for commands to the connection task
    commands: mpsc::UnboundedSender<Command>,
    /// Watch channel receiver for state changes
    state_rx: watch::Receiver<ConnectionState>,
    /// Watch channel receiver for the streaming configuration
    config_rx: watch::Receiver<ConnectionConfig>,
    /// Terminal stop flag shared with the connection task
    stopped: CancellationToken,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("config", &self.connection_config())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager and immediately start connecting to `address`.
    ///
    /// `on_open` and `on_close` are plain notifications run on the connection task; they
    /// must not block. `on_close` fires only for connections that were open, not for
    /// failed attempts.
    ///
    /// The manager keeps running until [`stop`](Self::stop) is called or every clone of
    /// the returned handle is dropped; the latter stops it exactly like `stop()`. Keep a
    /// handle alive for as long as handlers should keep receiving updates.
    ///
    /// Must be called within a tokio runtime. Fails only for an address that is not a
    /// `ws://` or `wss://` URL or for an invalid [`Config`].
    pub fn new<T, O, C>(
        address: &str,
        config: Config,
        transport: T,
        on_open: O,
        on_close: C,
    ) -> Result<Self>
    where
        T: Transport,
        O: FnMut() + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        let url = Url::parse(address)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported scheme `{}`, expected ws or wss",
                url.scheme()
            )));
        }
        config.validate()?;

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let (config_tx, config_rx) = watch::channel(ConnectionConfig::default());
        let stopped = CancellationToken::new();

        let actor = Actor {
            address: address.to_owned(),
            transport,
            state: ConnectionState::Closed,
            state_tx,
            config_tx,
            registry: SubscriptionRegistry::new(),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval, config.grace_period),
            reconnect: ReconnectScheduler::new(&config.reconnect),
            probe_frame: config.probe_frame,
            reply_frame: config.reply_frame,
            current: 0,
            events_tx,
            on_open: Box::new(on_open),
            on_close: Box::new(on_close),
            stopped: stopped.clone(),
        };

        tokio::spawn(actor.run(commands_rx, events_rx));

        Ok(Self {
            commands,
            state_rx,
            config_rx,
            stopped,
        })
    }

    /// Stop for good: cancel all timers, close the socket without reconnecting, drop
    /// every subscriber and silence the lifecycle callbacks.
    ///
    /// Takes effect immediately: frames received after this returns never reach a handler
    /// and the callbacks never fire again. Calling it again is a no-op.
    pub fn stop(&self) {
        self.stopped.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Serialize `payload` and send it if the connection is open at the time the
    /// connection task handles it. Otherwise the message is dropped; nothing is queued.
    ///
    /// Fails only if `payload` cannot be serialized.
    pub fn send<R: Serialize>(&self, payload: &R) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        self.enqueue(Command::Send(json));
        Ok(())
    }

    /// Invoke `handler` with the value under `key` for every update frame carrying it.
    ///
    /// Does not change what the device streams; prefer the typed helpers.
    pub fn subscribe<K, F>(&self, key: K, handler: F)
    where
        K: Into<String>,
        F: FnMut(&serde_json::Value) + Send + 'static,
    {
        self.enqueue(Command::Subscribe {
            key: key.into(),
            class: None,
            handler: Box::new(handler),
        });
    }

    /// Subscribe to device status snapshots and ask the device to stream them.
    pub fn add_status_handler<F>(&self, handler: F)
    where
        F: FnMut(Status) + Send + 'static,
    {
        self.subscribe_class(UpdateClass::Status, typed_handler(handler));
    }

    /// Subscribe to meter readings and ask the device to stream them.
    pub fn add_data_handler<F>(&self, handler: F)
    where
        F: FnMut(DataPoint) + Send + 'static,
    {
        self.subscribe_class(UpdateClass::Data, typed_handler(handler));
    }

    /// Subscribe to device log lines and ask the device to stream them.
    pub fn add_log_handler<F>(&self, handler: F)
    where
        F: FnMut(String) + Send + 'static,
    {
        self.subscribe_class(UpdateClass::Log, typed_handler(handler));
    }

    fn subscribe_class(&self, class: UpdateClass, handler: Handler) {
        self.enqueue(Command::Subscribe {
            key: class.key().to_owned(),
            class: Some(class),
            handler,
        });
    }

    /// Replace the probe period. The probe timer is re-armed at the new period.
    pub fn set_heartbeat_interval(&self, interval: Duration) -> Result<()> {
        non_zero("heartbeat interval", interval)?;
        self.enqueue(Command::SetHeartbeatInterval(interval));
        Ok(())
    }

    /// Replace the time allowed between a probe and its reply.
    pub fn set_grace_period(&self, grace_period: Duration) -> Result<()> {
        non_zero("grace period", grace_period)?;
        self.enqueue(Command::SetGracePeriod(grace_period));
        Ok(())
    }

    /// Replace the delay between reconnect attempts with a fixed period, disabling any
    /// configured backoff. A pending attempt is re-armed at the new period.
    pub fn set_reconnect_interval(&self, interval: Duration) -> Result<()> {
        non_zero("reconnect interval", interval)?;
        self.enqueue(Command::SetReconnectInterval(interval));
        Ok(())
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The streaming configuration the device is (or will be, on open) synced to.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        *self.config_rx.borrow()
    }

    fn enqueue(&self, command: Command) {
        if self.is_stopped() {
            return;
        }
        // The task only goes away after a stop
        _ = self.commands.send(command);
    }
}

/// Connection task state. Every mutation happens on this task.
struct Actor<T> {
    address: String,
    transport: T,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    config_tx: watch::Sender<ConnectionConfig>,
    registry: SubscriptionRegistry,
    heartbeat: HeartbeatMonitor,
    reconnect: ReconnectScheduler,
    probe_frame: String,
    reply_frame: String,
    /// Socket instance whose events are honoured
    current: ConnectionId,
    events_tx: mpsc::UnboundedSender<(ConnectionId, TransportEvent)>,
    on_open: Callback,
    on_close: Callback,
    stopped: CancellationToken,
}

impl<T: Transport> Actor<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>,
    ) {
        self.reconnect.schedule(Instant::now());
        self.open();

        loop {
            let deadline = self.heartbeat.deadline();
            let probe_at = self.heartbeat.next_probe();
            let retry_at = self.reconnect.next_attempt();

            tokio::select! {
                biased;

                () = self.stopped.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle is gone, nobody can stop us later
                    None => break,
                },

                Some((id, event)) = events.recv() => self.handle_event(id, event),

                () = sleep_until_some(deadline) => self.on_heartbeat_timeout(),

                () = sleep_until_some(probe_at) => self.on_probe_due(),

                () = sleep_until_some(retry_at) => self.on_reconnect_due(),
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => self.send(text),
            Command::Subscribe {
                key,
                class,
                handler,
            } => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%key, ?class, "Registering subscriber");
                self.registry.subscribe(key, handler);
                if let Some(class) = class
                    && self.registry.enable(class).is_some()
                {
                    self.resync();
                }
            }
            Command::SetHeartbeatInterval(interval) => {
                self.heartbeat.set_interval(interval, Instant::now());
            }
            Command::SetGracePeriod(grace_period) => {
                self.heartbeat.set_grace_period(grace_period);
            }
            Command::SetReconnectInterval(interval) => {
                self.reconnect.set_interval(interval, Instant::now());
            }
        }
    }

    fn handle_event(&mut self, id: ConnectionId, event: TransportEvent) {
        if id != self.current {
            #[cfg(feature = "tracing")]
            tracing::trace!(id, current = self.current, ?event, "Ignoring event from abandoned socket");
            return;
        }

        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed => self.on_closed(),
        }
    }

    fn open(&mut self) {
        if self.state != ConnectionState::Closed || !self.transport.is_closed() {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = ?self.state, "Connection busy, skipping open attempt");
            return;
        }

        self.current = self.current.wrapping_add(1);
        self.set_state(ConnectionState::Opening);

        #[cfg(feature = "tracing")]
        tracing::debug!(address = %self.address, id = self.current, "Opening connection");

        let sink = EventSink::new(self.current, self.events_tx.clone());
        self.transport.open(&self.address, sink);
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Opening {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            id = self.current,
            attempts = self.reconnect.attempts(),
            "Connection open"
        );

        self.set_state(ConnectionState::Open);
        self.reconnect.cancel();
        self.heartbeat.start(Instant::now());
        // The device forgets the streaming configuration on every reconnect
        self.resync();
        if !self.stopped.is_cancelled() {
            (self.on_open)();
        }
    }

    fn on_message(&mut self, text: &str) {
        if self.state != ConnectionState::Open {
            return;
        }

        let now = Instant::now();
        self.heartbeat.on_activity(now);

        if text == self.reply_frame {
            self.heartbeat.on_reply(now);
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received update frame");

        if let Err(e) = self.registry.dispatch(text, &self.stopped) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%text, error = %e, "Dropping malformed frame");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn on_closed(&mut self) {
        match self.state {
            ConnectionState::Open => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = self.current, "Connection closed");
                self.connection_lost();
            }
            ConnectionState::Opening => {
                #[cfg(feature = "tracing")]
                tracing::debug!(id = self.current, "Open attempt failed");
                self.set_state(ConnectionState::Closed);
                self.reconnect.schedule(Instant::now());
            }
            // Already handled by a forced close
            ConnectionState::Closed | ConnectionState::Closing => {}
        }
    }

    fn on_probe_due(&mut self) {
        if self.heartbeat.on_probe_due(Instant::now()) && self.state.is_open() {
            let probe = self.probe_frame.clone();
            self.send(probe);
        }
    }

    fn on_heartbeat_timeout(&mut self) {
        let now = Instant::now();
        if !self.heartbeat.is_expired(now) || !self.state.is_open() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            interval = ?self.heartbeat.interval(),
            grace_period = ?self.heartbeat.grace_period(),
            since_reply = ?self.heartbeat.last_reply().map(|at| now - at),
            since_activity = ?self.heartbeat.last_activity().map(|at| now - at),
            "Heartbeat timeout: no reply received, forcing reconnect"
        );

        self.transport.close();
        self.connection_lost();
    }

    fn on_reconnect_due(&mut self) {
        let attempt = self.reconnect.on_tick(Instant::now());
        match self.state {
            ConnectionState::Closed => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "Attempting reconnect");
                #[cfg(not(feature = "tracing"))]
                let _ = attempt;
                self.open();
            }
            ConnectionState::Open => self.reconnect.cancel(),
            ConnectionState::Opening | ConnectionState::Closing => {}
        }
    }

    /// Common path for a clean close and a forced close of an open connection.
    fn connection_lost(&mut self) {
        self.heartbeat.stop();
        self.set_state(ConnectionState::Closed);
        if !self.stopped.is_cancelled() {
            (self.on_close)();
        }
        self.reconnect.schedule(Instant::now());
    }

    fn resync(&mut self) {
        let snapshot = self.registry.config();
        self.config_tx.send_replace(snapshot);

        if !self.state.is_open() {
            // Sent on the next open
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?snapshot, "Syncing connection config");

        match serde_json::to_string(&ConfigSync::from(snapshot)) {
            Ok(json) => self.send(json),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "Unable to serialize connection config");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
        }
    }

    fn send(&mut self, text: String) {
        if !self.state.is_open() {
            #[cfg(feature = "tracing")]
            tracing::trace!(%text, "Connection not open, dropping outbound frame");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Sending frame");

        if let Err(e) = self.transport.send(text) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to send frame");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn shutdown(&mut self) {
        self.on_open = Box::new(|| {});
        self.on_close = Box::new(|| {});
        self.set_state(ConnectionState::Closing);

        self.heartbeat.stop();
        self.reconnect.cancel();
        self.transport.close();
        self.registry.clear();
        // Any later event belongs to no socket
        self.current = self.current.wrapping_add(1);

        self.set_state(ConnectionState::Closed);

        #[cfg(feature = "tracing")]
        tracing::info!(address = %self.address, "Connection manager stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Sleep until `instant`, or forever when there is nothing scheduled.
async fn sleep_until_some(instant: Option<Instant>) {
    match instant {
        Some(instant) => sleep_until(instant).await,
        None => std::future::pending().await,
    }
}
