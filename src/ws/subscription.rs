#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::serde_helpers::deserialize_with_warnings;
use crate::types::request::ConnectionConfig;
use crate::types::response::{UpdateClass, parse_update};

bitflags! {
    /// Update classes this connection asks the device to stream.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct UpdateClasses: u8 {
        /// Device status snapshots.
        const STATUS = 1;

        /// Meter readings.
        const DATA = 1 << 1;

        /// Device log lines.
        const LOG = 1 << 2;

        /// Every update class.
        const ALL = Self::STATUS.bits() | Self::DATA.bits() | Self::LOG.bits();
    }
}

impl From<UpdateClass> for UpdateClasses {
    fn from(class: UpdateClass) -> Self {
        match class {
            UpdateClass::Status => Self::STATUS,
            UpdateClass::Data => Self::DATA,
            UpdateClass::Log => Self::LOG,
        }
    }
}

impl From<UpdateClasses> for ConnectionConfig {
    fn from(classes: UpdateClasses) -> Self {
        ConnectionConfig::builder()
            .status_update(classes.contains(UpdateClasses::STATUS))
            .data_update(classes.contains(UpdateClasses::DATA))
            .log(classes.contains(UpdateClasses::LOG))
            .build()
    }
}

/// Callback receiving the raw value found under a subscriber's key.
pub type Handler = Box<dyn FnMut(&Value) + Send + 'static>;

/// Wrap a typed callback into a [`Handler`] that decodes the value first.
///
/// Values that do not decode into `T` are skipped; the callback only ever sees
/// well-formed payloads. With `tracing` enabled the decoder logs the failing path.
pub fn typed_handler<T, F>(mut handler: F) -> Handler
where
    T: DeserializeOwned,
    F: FnMut(T) + Send + 'static,
{
    Box::new(move |value: &Value| {
        if let Ok(payload) = deserialize_with_warnings::<T>(value) {
            handler(payload);
        }
    })
}

struct Subscriber {
    key: String,
    handler: Handler,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Append-only set of subscribers plus the streaming configuration they imply.
///
/// Subscribers for the same key are invoked in registration order. The registry is
/// owned by the connection actor, so handlers never run concurrently.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribers: Vec<Subscriber>,
    enabled: UpdateClasses,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a top-level frame key.
    pub fn subscribe<K: Into<String>>(&mut self, key: K, handler: Handler) {
        self.subscribers.push(Subscriber {
            key: key.into(),
            handler,
        });
    }

    /// Enable streaming of an update class.
    ///
    /// Returns the new configuration snapshot the first time the class is enabled, and
    /// `None` when it already was, so callers resync exactly once per class.
    pub fn enable(&mut self, class: UpdateClass) -> Option<ConnectionConfig> {
        let flag = UpdateClasses::from(class);
        if self.enabled.contains(flag) {
            return None;
        }
        self.enabled.insert(flag);
        Some(self.config())
    }

    /// Current streaming configuration snapshot.
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        self.enabled.into()
    }

    #[must_use]
    pub fn enabled(&self) -> UpdateClasses {
        self.enabled
    }

    /// Route one inbound frame to every subscriber whose key it carries.
    ///
    /// Returns the number of handlers invoked. Frames that are not a JSON object are
    /// rejected without invoking anything. A panicking handler is contained so later
    /// handlers still run. Once `stopped` is cancelled, including by a handler of this
    /// very frame, no further handler runs.
    pub fn dispatch(&mut self, text: &str, stopped: &CancellationToken) -> Result<usize> {
        let record = parse_update(text)?;

        let mut invoked = 0_usize;
        for subscriber in &mut self.subscribers {
            if stopped.is_cancelled() {
                break;
            }
            let Some(value) = record.get(&subscriber.key) else {
                continue;
            };
            invoked += 1;

            let handler = &mut subscriber.handler;
            if catch_unwind(AssertUnwindSafe(|| handler(value))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!(key = %subscriber.key, "Subscriber handler panicked");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(invoked, keys = record.len(), "Dispatched update frame");

        Ok(invoked)
    }

    /// Drop every subscriber. Streaming configuration is kept.
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::types::response::DataPoint;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recorder(seen: &Seen, label: &'static str) -> Handler {
        let seen = Arc::clone(seen);
        Box::new(move |value: &Value| {
            seen.lock().unwrap().push(format!("{label}:{value}"));
        })
    }

    fn dispatch(registry: &mut SubscriptionRegistry, text: &str) -> Result<usize> {
        registry.dispatch(text, &CancellationToken::new())
    }

    #[test]
    fn update_classes_map_to_config() {
        let config: ConnectionConfig = (UpdateClasses::DATA | UpdateClasses::LOG).into();

        assert!(!config.status_update);
        assert!(config.data_update);
        assert!(config.log);
        assert_eq!(
            ConnectionConfig::from(UpdateClasses::ALL),
            ConnectionConfig::builder()
                .status_update(true)
                .data_update(true)
                .log(true)
                .build()
        );
    }

    #[test]
    fn enable_returns_snapshot_once_per_class() {
        let mut registry = SubscriptionRegistry::new();

        let first = registry.enable(UpdateClass::Data).expect("first enable");
        assert!(first.data_update);
        assert!(registry.enable(UpdateClass::Data).is_none(), "already enabled");

        let second = registry.enable(UpdateClass::Status).expect("status enable");
        assert!(second.data_update && second.status_update && !second.log);
    }

    #[test]
    fn dispatch_routes_every_present_key() {
        let seen = Seen::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("status", recorder(&seen, "status"));
        registry.subscribe("data", recorder(&seen, "data"));
        registry.subscribe("log", recorder(&seen, "log"));

        let invoked = dispatch(
            &mut registry,
            r#"{"data": {"powerDelivered": 1.5}, "log": "x"}"#,
        )
        .unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                r#"data:{"powerDelivered":1.5}"#.to_owned(),
                r#"log:"x""#.to_owned()
            ]
        );
    }

    #[test]
    fn dispatch_invokes_shared_key_in_registration_order() {
        let seen = Seen::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("log", recorder(&seen, "first"));
        registry.subscribe("log", recorder(&seen, "second"));

        dispatch(&mut registry, r#"{"log": "boot"}"#).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![r#"first:"boot""#.to_owned(), r#"second:"boot""#.to_owned()]
        );
    }

    #[test]
    fn malformed_frame_invokes_nothing() {
        let seen = Seen::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("log", recorder(&seen, "log"));

        assert!(dispatch(&mut registry, "{\"log\": ").is_err(), "truncated frame");
        assert!(dispatch(&mut registry, "\"log\"").is_err(), "not a record");
        assert!(seen.lock().unwrap().is_empty(), "no handler may run");
    }

    #[test]
    fn panicking_handler_does_not_starve_others() {
        let seen = Seen::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("log", Box::new(|_: &Value| panic!("handler bug")));
        registry.subscribe("log", recorder(&seen, "after"));

        let invoked = dispatch(&mut registry, r#"{"log": "x"}"#).unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancellation_inside_handler_skips_the_rest() {
        let seen = Seen::default();
        let stopped = CancellationToken::new();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("log", recorder(&seen, "first"));
        let token = stopped.clone();
        registry.subscribe("log", Box::new(move |_: &Value| token.cancel()));
        registry.subscribe("log", recorder(&seen, "after-stop"));
        registry.subscribe("data", recorder(&seen, "data"));

        let invoked = registry
            .dispatch(r#"{"log": "x", "data": {}}"#, &stopped)
            .unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(*seen.lock().unwrap(), vec![r#"first:"x""#.to_owned()]);

        let invoked = registry.dispatch(r#"{"log": "y"}"#, &stopped).unwrap();
        assert_eq!(invoked, 0, "nothing runs once stopped");
    }

    #[test]
    fn typed_handler_skips_undecodable_payloads() {
        let points: Arc<Mutex<Vec<DataPoint>>> = Arc::default();
        let sink = Arc::clone(&points);
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(
            "data",
            typed_handler(move |point: DataPoint| {
                sink.lock().unwrap().push(point);
            }),
        );

        dispatch(&mut registry, r#"{"data": "not a reading"}"#).unwrap();
        dispatch(
            &mut registry,
            &json!({"data": {"powerDelivered": 0.25}}).to_string(),
        )
        .unwrap();

        let points = points.lock().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].get_f64("powerDelivered"), Some(0.25));
    }

    #[test]
    fn clear_keeps_streaming_config() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("log", Box::new(|_: &Value| {}));
        registry.enable(UpdateClass::Log);

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.config().log);
    }
}
