//! Event plumbing shared by the player and its renderers.
//!
//! Every renderer, whatever drives it natively, speaks the VPAID event
//! vocabulary in [`AdEvent`]. Listeners run synchronously, in registration
//! order, on the thread that emits.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Player-level event emitted once a load completes
pub const READY: &str = "ready";

/// Player-level event emitted when a load fails for good
pub const ERROR: &str = "error";

/// Canonical ad lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AdEvent {
    AdLoaded,
    AdStarted,
    AdStopped,
    AdSkipped,
    AdPaused,
    AdPlaying,
    AdImpression,
    AdClickThru,
    AdInteraction,
    AdError,
    AdLog,
    AdDurationChange,
    AdVolumeChange,
    AdTimeUpdate,
    AdRemainingTimeChange,
    AdVideoStart,
    AdVideoFirstQuartile,
    AdVideoMidpoint,
    AdVideoThirdQuartile,
    AdVideoComplete,
    AdUserAcceptInvitation,
    AdUserMinimize,
    AdUserClose,
    AdLinearChange,
    AdExpandedChange,
    AdSkippableStateChange,
    AdSizeChange,
}

impl AdEvent {
    pub const ALL: [AdEvent; 27] = [
        AdEvent::AdLoaded,
        AdEvent::AdStarted,
        AdEvent::AdStopped,
        AdEvent::AdSkipped,
        AdEvent::AdPaused,
        AdEvent::AdPlaying,
        AdEvent::AdImpression,
        AdEvent::AdClickThru,
        AdEvent::AdInteraction,
        AdEvent::AdError,
        AdEvent::AdLog,
        AdEvent::AdDurationChange,
        AdEvent::AdVolumeChange,
        AdEvent::AdTimeUpdate,
        AdEvent::AdRemainingTimeChange,
        AdEvent::AdVideoStart,
        AdEvent::AdVideoFirstQuartile,
        AdEvent::AdVideoMidpoint,
        AdEvent::AdVideoThirdQuartile,
        AdEvent::AdVideoComplete,
        AdEvent::AdUserAcceptInvitation,
        AdEvent::AdUserMinimize,
        AdEvent::AdUserClose,
        AdEvent::AdLinearChange,
        AdEvent::AdExpandedChange,
        AdEvent::AdSkippableStateChange,
        AdEvent::AdSizeChange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AdEvent::AdLoaded => "AdLoaded",
            AdEvent::AdStarted => "AdStarted",
            AdEvent::AdStopped => "AdStopped",
            AdEvent::AdSkipped => "AdSkipped",
            AdEvent::AdPaused => "AdPaused",
            AdEvent::AdPlaying => "AdPlaying",
            AdEvent::AdImpression => "AdImpression",
            AdEvent::AdClickThru => "AdClickThru",
            AdEvent::AdInteraction => "AdInteraction",
            AdEvent::AdError => "AdError",
            AdEvent::AdLog => "AdLog",
            AdEvent::AdDurationChange => "AdDurationChange",
            AdEvent::AdVolumeChange => "AdVolumeChange",
            AdEvent::AdTimeUpdate => "AdTimeUpdate",
            AdEvent::AdRemainingTimeChange => "AdRemainingTimeChange",
            AdEvent::AdVideoStart => "AdVideoStart",
            AdEvent::AdVideoFirstQuartile => "AdVideoFirstQuartile",
            AdEvent::AdVideoMidpoint => "AdVideoMidpoint",
            AdEvent::AdVideoThirdQuartile => "AdVideoThirdQuartile",
            AdEvent::AdVideoComplete => "AdVideoComplete",
            AdEvent::AdUserAcceptInvitation => "AdUserAcceptInvitation",
            AdEvent::AdUserMinimize => "AdUserMinimize",
            AdEvent::AdUserClose => "AdUserClose",
            AdEvent::AdLinearChange => "AdLinearChange",
            AdEvent::AdExpandedChange => "AdExpandedChange",
            AdEvent::AdSkippableStateChange => "AdSkippableStateChange",
            AdEvent::AdSizeChange => "AdSizeChange",
        }
    }

    pub fn from_name(name: &str) -> Option<AdEvent> {
        AdEvent::ALL.into_iter().find(|event| event.as_str() == name)
    }

    /// Names of every canonical event, for proxying
    pub fn names() -> Vec<&'static str> {
        AdEvent::ALL.iter().map(|event| event.as_str()).collect()
    }
}

impl fmt::Display for AdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for AdEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One event argument
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle returned by [`EventEmitter::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
struct Registry {
    listeners: HashMap<String, Vec<(Subscription, Listener)>>,
}

/// A cloneable handle to a set of named listeners. Clones share listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    registry: Arc<Mutex<Registry>>,
}

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A listener that panicked must not take every later emit down with it
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on<F>(&self, event: impl AsRef<str>, listener: F) -> Subscription
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let subscription = Subscription(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.registry()
            .listeners
            .entry(event.as_ref().to_string())
            .or_default()
            .push((subscription, Arc::new(listener)));
        subscription
    }

    /// Subscribe for a single occurrence
    pub fn once<F>(&self, event: impl AsRef<str>, listener: F) -> Subscription
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let emitter = self.clone();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let own = slot.clone();

        let subscription = self.on(event, move |args| {
            let Some(subscription) = own.lock().ok().and_then(|mut s| s.take()) else {
                return;
            };
            emitter.off(subscription);
            listener(args);
        });
        if let Ok(mut slot) = slot.lock() {
            *slot = Some(subscription);
        }
        subscription
    }

    pub fn off(&self, subscription: Subscription) {
        let mut registry = self.registry();
        for listeners in registry.listeners.values_mut() {
            listeners.retain(|(id, _)| *id != subscription);
        }
    }

    /// Call every listener of `event` with `args`. Listeners may subscribe,
    /// unsubscribe or emit again while running.
    pub fn emit(&self, event: impl AsRef<str>, args: &[Value]) {
        let listeners: Vec<Listener> = match self.registry().listeners.get(event.as_ref()) {
            Some(listeners) => listeners.iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };
        for listener in listeners {
            listener(args);
        }
    }

    pub fn listener_count(&self, event: impl AsRef<str>) -> usize {
        self.registry()
            .listeners
            .get(event.as_ref())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventEmitter")
            .field("events", &registry.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Anything that exposes an event surface
pub trait Emitter {
    fn events(&self) -> &EventEmitter;

    fn on<F>(&self, event: impl AsRef<str>, listener: F) -> Subscription
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
        Self: Sized,
    {
        self.events().on(event, listener)
    }

    fn off(&self, subscription: Subscription) {
        self.events().off(subscription)
    }

    fn emit(&self, event: impl AsRef<str>, args: &[Value])
    where
        Self: Sized,
    {
        self.events().emit(event, args)
    }
}

impl Emitter for EventEmitter {
    fn events(&self) -> &EventEmitter {
        self
    }
}

/// Relays a fixed set of events from sources onto destinations, arguments
/// untouched and in emission order.
pub struct EventProxy {
    names: Vec<String>,
    sources: Vec<EventEmitter>,
}

impl EventProxy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_string()).collect(),
            sources: Vec::new(),
        }
    }

    pub fn from(mut self, source: &(impl Emitter + ?Sized)) -> Self {
        self.sources.push(source.events().clone());
        self
    }

    /// Start relaying. Returns the subscriptions made on each source.
    pub fn to(self, destination: &(impl Emitter + ?Sized)) -> Vec<(EventEmitter, Subscription)> {
        let mut subscriptions = Vec::new();
        for source in &self.sources {
            for name in &self.names {
                let destination = destination.events().clone();
                let event = name.clone();
                let subscription = source.on(name, move |args| destination.emit(&event, args));
                subscriptions.push((source.clone(), subscription));
            }
        }
        subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(emitter: &EventEmitter, event: &str) -> Arc<Mutex<Vec<Vec<Value>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        emitter.on(event, move |args| sink.lock().unwrap().push(args.to_vec()));
        seen
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            emitter.on("tick", move |_| order.lock().unwrap().push(i));
        }
        emitter.emit("tick", &[]);
        assert_eq!(*order.lock().unwrap(), [0, 1, 2]);
    }

    #[test]
    fn once_fires_a_single_time() {
        let emitter = EventEmitter::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        emitter.once("tick", move |_| *counter.lock().unwrap() += 1);
        emitter.emit("tick", &[]);
        emitter.emit("tick", &[]);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn off_removes_listener() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let subscription = emitter.on("tick", move |_| *sink.lock().unwrap() += 1);
        emitter.off(subscription);
        emitter.emit("tick", &[]);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn listeners_may_emit_reentrantly() {
        let emitter = EventEmitter::new();
        let inner = emitter.clone();
        emitter.on("outer", move |_| inner.emit("inner", &[Value::from(true)]));
        let seen = recorder(&emitter, "inner");
        emitter.emit("outer", &[]);
        assert_eq!(*seen.lock().unwrap(), vec![vec![Value::Bool(true)]]);
    }

    #[test]
    fn proxy_relays_named_events_with_arguments() {
        let source = EventEmitter::new();
        let destination = EventEmitter::new();
        EventProxy::new(["AdClickThru"]).from(&source).to(&destination);

        let clicks = recorder(&destination, "AdClickThru");
        let other = recorder(&destination, "AdLog");

        let args = [Value::from("https://x"), Value::Null, Value::from(true)];
        source.emit("AdClickThru", &args);
        source.emit("AdLog", &[Value::from("ignored")]);

        assert_eq!(*clicks.lock().unwrap(), vec![args.to_vec()]);
        assert!(other.lock().unwrap().is_empty());
    }

    #[test]
    fn proxy_merges_several_sources_in_order() {
        let first = EventEmitter::new();
        let second = EventEmitter::new();
        let destination = EventEmitter::new();
        EventProxy::new(AdEvent::names())
            .from(&first)
            .from(&second)
            .to(&destination);

        let seen = recorder(&destination, "AdLog");
        first.emit("AdLog", &[Value::from("a")]);
        second.emit("AdLog", &[Value::from("b")]);
        first.emit("AdLog", &[Value::from("c")]);

        let messages: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|args| args[0].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, ["a", "b", "c"]);
    }

    #[test]
    fn event_names_round_trip() {
        for event in AdEvent::ALL {
            assert_eq!(AdEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(AdEvent::from_name("impression"), None);
    }
}
