#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Deeply nested uses in sub-modules are falsely flagged as being unused"
)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use emr_websocket_client::Result;
use emr_websocket_client::ws::{ConnectionId, EventSink, Transport, WsError};
use serde_json::Value;

pub const ADDRESS: &str = "ws://meter.local:81";

pub const CONFIG_FRAME_KEY: &str = "connection";

/// Socket phase as seen by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    current: Option<EventSink>,
    sinks: Vec<EventSink>,
    sent: Vec<String>,
    send_calls: usize,
    closes: usize,
    /// Complete handshakes as soon as they start
    auto_accept: bool,
}

/// Scriptable in-memory [`Transport`].
///
/// Clones share state: hand one to the manager and drive the socket from the test
/// through the other. Opening a socket while one is still live panics.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                current: None,
                sinks: Vec::new(),
                sent: Vec::new(),
                send_calls: 0,
                closes: 0,
                auto_accept: false,
            })),
        }
    }
}

impl MockTransport {
    /// Transport whose handshakes succeed immediately.
    #[must_use]
    pub fn accepting() -> Self {
        let transport = Self::default();
        transport.lock().auto_accept = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_auto_accept(&self, auto_accept: bool) {
        self.lock().auto_accept = auto_accept;
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of open attempts so far.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.lock().sinks.len()
    }

    /// Number of forced closes requested by the manager.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Connection id assigned to the `n`th open attempt.
    #[must_use]
    pub fn connection_id(&self, n: usize) -> ConnectionId {
        self.lock().sinks[n].id()
    }

    /// Sink of the `n`th open attempt, live or not.
    #[must_use]
    pub fn sink(&self, n: usize) -> EventSink {
        self.lock().sinks[n].clone()
    }

    /// Complete the pending handshake.
    pub fn accept(&self) {
        let mut inner = self.lock();
        assert_eq!(inner.phase, Phase::Connecting, "no handshake in flight");
        inner.phase = Phase::Open;
        inner.current.as_ref().unwrap().opened();
    }

    /// Fail the pending handshake.
    pub fn reject(&self) {
        let mut inner = self.lock();
        assert_eq!(inner.phase, Phase::Connecting, "no handshake in flight");
        inner.phase = Phase::Idle;
        inner.current.take().unwrap().closed();
    }

    /// Peer closes the socket.
    pub fn drop_connection(&self) {
        let mut inner = self.lock();
        assert_eq!(inner.phase, Phase::Open, "no open socket to drop");
        inner.phase = Phase::Idle;
        inner.current.take().unwrap().closed();
    }

    /// Peer sends a text frame.
    pub fn deliver(&self, text: &str) {
        let inner = self.lock();
        assert_eq!(inner.phase, Phase::Open, "no open socket to deliver on");
        inner.current.as_ref().unwrap().message(text);
    }

    /// Every frame written so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Number of times the manager asked to write a frame, including refused writes.
    #[must_use]
    pub fn send_calls(&self) -> usize {
        self.lock().send_calls
    }

    /// Drain the frames written so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Config sync frames written so far, decoded.
    #[must_use]
    pub fn config_frames(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|value| value.get(CONFIG_FRAME_KEY).is_some())
            .collect()
    }

    /// Liveness probes written so far.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.sent().iter().filter(|text| *text == "ping").count()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, _address: &str, events: EventSink) {
        let mut inner = self.lock();
        assert_eq!(
            inner.phase,
            Phase::Idle,
            "opened a socket while another one is live"
        );

        inner.sinks.push(events.clone());
        if inner.auto_accept {
            inner.phase = Phase::Open;
            events.opened();
        } else {
            inner.phase = Phase::Connecting;
        }
        inner.current = Some(events);
    }

    fn close(&mut self) {
        let mut inner = self.lock();
        inner.closes += 1;
        inner.phase = Phase::Idle;
        inner.current = None;
    }

    fn send(&mut self, text: String) -> Result<()> {
        let mut inner = self.lock();
        inner.send_calls += 1;
        if inner.phase != Phase::Open {
            return Err(WsError::NotOpen.into());
        }
        inner.sent.push(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().phase == Phase::Open
    }

    fn is_closed(&self) -> bool {
        self.lock().phase == Phase::Idle
    }
}

/// Let the connection task drain everything already queued for it.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Let `duration` of paused time pass, waking every timer due on the way in order.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// Example payloads as streamed by the meter reader firmware.
pub mod payloads {
    use serde_json::{Value, json};

    #[must_use]
    pub fn status() -> Value {
        json!({
            "freeHeap": 151_228,
            "heap": 327_680,
            "freeFSSize": 1_261_568,
            "fsSize": 1_507_328,
            "uptime": 86_400,
            "wifiSSID": "meter-net",
            "wifiStatus": 3,
            "wifiIP": "192.168.1.40",
            "ethStatus": 0,
            "ethIP": "0.0.0.0",
            "otaInProgress": false,
            "otaProgress": 0,
            "validProductKey": true
        })
    }

    #[must_use]
    pub fn reading() -> Value {
        json!({
            "timestamp": "241019120000S",
            "powerDelivered": 0.412,
            "powerReturned": 0.0,
            "energyDeliveredTariff1": 4_211.337,
            "energyDeliveredTariff2": 3_980.121
        })
    }
}
