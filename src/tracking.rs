use crate::events::{AdEvent, EventEmitter, Value};
use crate::models::TrackingDescriptor;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// VPAID error code reported for "general VPAID error"
const VPAID_ERROR_CODE: &str = "901";

/// Rewrites pixel URIs before they are fired
#[derive(Clone)]
pub struct TrackingMapper(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl TrackingMapper {
    pub fn new<F>(mapper: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(mapper))
    }

    pub fn identity() -> Self {
        Self::new(str::to_string)
    }

    /// Expands the `[CACHEBUSTING]` and `[TIMESTAMP]` macros
    pub fn cachebusting() -> Self {
        Self::new(|uri| {
            let mut uri = uri.to_string();
            if uri.contains("[CACHEBUSTING]") {
                let buster: u32 = rand::thread_rng().gen_range(10_000_000..100_000_000);
                uri = uri.replace("[CACHEBUSTING]", &buster.to_string());
            }
            if uri.contains("[TIMESTAMP]") {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default();
                uri = uri.replace("[TIMESTAMP]", &millis.to_string());
            }
            uri
        })
    }

    pub fn map(&self, uri: &str) -> String {
        (self.0)(uri)
    }
}

impl Default for TrackingMapper {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for TrackingMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrackingMapper")
    }
}

/// Delivers pixels. Delivery is best effort: implementations must never
/// fail back into the caller.
pub trait PixelTransport: Send + Sync {
    fn fire(&self, uri: &str);
}

/// Fires pixels as HTTP GETs on the current tokio runtime
#[derive(Debug, Clone, Default)]
pub struct HttpPixelTransport {
    client: reqwest::Client,
}

impl HttpPixelTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelTransport for HttpPixelTransport {
    fn fire(&self, uri: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime, dropping pixel {}", uri);
            return;
        };
        let client = self.client.clone();
        let uri = uri.to_string();
        runtime.spawn(async move {
            match client.get(&uri).send().await {
                Ok(response) if !response.status().is_success() => {
                    log::debug!("Pixel {} answered {}", uri, response.status());
                }
                Ok(_) => log::trace!("Pixel {} delivered", uri),
                Err(e) => log::debug!("Pixel {} failed: {}", uri, e),
            }
        });
    }
}

/// What makes a tracking name fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Event(AdEvent),
    Mute,
    Unmute,
}

fn trigger_for(name: &str) -> Option<Trigger> {
    let event = match name {
        "impression" => AdEvent::AdImpression,
        "creativeView" => AdEvent::AdStarted,
        "start" => AdEvent::AdVideoStart,
        "firstQuartile" => AdEvent::AdVideoFirstQuartile,
        "midpoint" => AdEvent::AdVideoMidpoint,
        "thirdQuartile" => AdEvent::AdVideoThirdQuartile,
        "complete" => AdEvent::AdVideoComplete,
        "clickThrough" => AdEvent::AdClickThru,
        "pause" => AdEvent::AdPaused,
        "resume" => AdEvent::AdPlaying,
        "skip" => AdEvent::AdSkipped,
        "error" => AdEvent::AdError,
        "acceptInvitation" | "acceptInvitationLinear" => AdEvent::AdUserAcceptInvitation,
        "collapse" => AdEvent::AdUserMinimize,
        "close" | "closeLinear" => AdEvent::AdUserClose,
        "mute" => return Some(Trigger::Mute),
        "unmute" => return Some(Trigger::Unmute),
        other => return AdEvent::from_name(other).map(Trigger::Event),
    };
    Some(Trigger::Event(event))
}

struct Pixels {
    descriptors: Vec<TrackingDescriptor>,
    mapper: TrackingMapper,
    transport: Arc<dyn PixelTransport>,
    fired: Mutex<HashSet<String>>,
}

impl Pixels {
    /// Fire every descriptor named `name`, unless `name` already fired
    fn fire(&self, name: &str) {
        let first = self
            .fired
            .lock()
            .map(|mut fired| fired.insert(name.to_string()))
            .unwrap_or(false);
        if !first {
            return;
        }

        for descriptor in self.descriptors.iter().filter(|d| d.event == name) {
            let uri = if name == "error" {
                descriptor.uri.replace("[ERRORCODE]", VPAID_ERROR_CODE)
            } else {
                descriptor.uri.clone()
            };
            let uri = self.mapper.map(&uri);
            log::debug!("Firing {} pixel {}", name, uri);
            self.transport.fire(&uri);
        }
    }
}

/// Fires tracking pixels the first time their lifecycle event happens
pub struct PixelReporter {
    pixels: Arc<Pixels>,
}

impl PixelReporter {
    pub fn new(
        descriptors: Vec<TrackingDescriptor>,
        mapper: TrackingMapper,
        transport: Arc<dyn PixelTransport>,
    ) -> Self {
        Self {
            pixels: Arc::new(Pixels {
                descriptors,
                mapper,
                transport,
                fired: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Distinct tracking names, in first-seen order
    pub fn event_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.pixels
            .descriptors
            .iter()
            .map(|d| d.event.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Subscribe to `source` for every tracking name this reporter carries
    pub fn track(&self, source: &EventEmitter) {
        let mut volume_names = Vec::new();

        for name in self.event_names() {
            match trigger_for(name) {
                Some(Trigger::Event(event)) => {
                    let pixels = self.pixels.clone();
                    let name = name.to_string();
                    source.on(event, move |_| pixels.fire(&name));
                }
                Some(trigger) => volume_names.push((trigger, name.to_string())),
                None => log::debug!("No lifecycle event fires {:?} pixels", name),
            }
        }

        if !volume_names.is_empty() {
            self.track_volume(source, volume_names);
        }
    }

    /// mute/unmute fire on transitions to and from zero volume. The new
    /// volume travels as the first AdVolumeChange argument.
    fn track_volume(&self, source: &EventEmitter, names: Vec<(Trigger, String)>) {
        let pixels = self.pixels.clone();
        let last_volume: Mutex<Option<f64>> = Mutex::new(None);

        source.on(AdEvent::AdVolumeChange, move |args| {
            let Some(volume) = args.first().and_then(Value::as_f64) else {
                return;
            };
            let Ok(mut last) = last_volume.lock() else {
                return;
            };
            let was_muted = last.map(|v| v == 0.0);
            *last = Some(volume);

            let transition = match (was_muted, volume == 0.0) {
                (Some(false) | None, true) => Trigger::Mute,
                (Some(true), false) => Trigger::Unmute,
                _ => return,
            };
            for (trigger, name) in &names {
                if *trigger == transition {
                    pixels.fire(name);
                }
            }
        });
    }
}
