//! In-memory surfaces. Nothing plays in real time: playback moves when
//! [`HeadlessMedia::advance`] or [`HeadlessVpaid::advance`] is called, and
//! every native event is emitted synchronously.

use crate::error::{PlayerError, PlayerResult};
use crate::events::{AdEvent, EventEmitter, Value};
use crate::renderer::quartiles_reached;
use crate::surface::{
    Container, ElementId, ImageElement, MediaElement, MediaKind, Playability, VpaidAd, VpaidKind, native,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Elements {
    attached: Vec<ElementId>,
    media: Vec<Arc<HeadlessMedia>>,
    images: Vec<Arc<HeadlessImage>>,
    units: Vec<Arc<HeadlessVpaid>>,
    opened: Vec<String>,
}

/// A container with a fixed size and codec table
pub struct HeadlessContainer {
    width: f64,
    height: f64,
    codecs: HashMap<String, Playability>,
    broken: HashSet<String>,
    duration: f64,
    autoplay_blocked: bool,
    next_id: AtomicU64,
    elements: Mutex<Elements>,
}

impl HeadlessContainer {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            codecs: HashMap::new(),
            broken: HashSet::new(),
            duration: 30.0,
            autoplay_blocked: false,
            next_id: AtomicU64::new(1),
            elements: Mutex::new(Elements::default()),
        }
    }

    /// Declare how well `mime_type` plays
    pub fn support(mut self, mime_type: &str, playability: Playability) -> Self {
        self.codecs.insert(mime_type.to_string(), playability);
        self
    }

    /// The usual browser answers for MP4, WebM and MP3
    pub fn with_common_codecs(self) -> Self {
        self.support("video/mp4", Playability::Probably)
            .support("video/webm", Playability::Maybe)
            .support("audio/mpeg", Playability::Probably)
            .support("audio/mp4", Playability::Probably)
    }

    /// Duration every loaded media file or unit reports
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Loading `uri` fails, as a decode error or a unit that will not load
    pub fn break_uri(mut self, uri: &str) -> Self {
        self.broken.insert(uri.to_string());
        self
    }

    /// Media refuses to play until unlocked, as browsers do before a user gesture
    pub fn block_autoplay(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }

    fn next_id(&self) -> ElementId {
        ElementId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn attached(&self) -> Vec<ElementId> {
        lock(&self.elements).attached.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.elements).opened.clone()
    }

    pub fn media(&self) -> Vec<Arc<HeadlessMedia>> {
        lock(&self.elements).media.clone()
    }

    pub fn images(&self) -> Vec<Arc<HeadlessImage>> {
        lock(&self.elements).images.clone()
    }

    pub fn units(&self) -> Vec<Arc<HeadlessVpaid>> {
        lock(&self.elements).units.clone()
    }
}

#[async_trait]
impl Container for HeadlessContainer {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn can_play_type(&self, mime_type: &str) -> Playability {
        self.codecs.get(mime_type).copied().unwrap_or(Playability::No)
    }

    fn create_media(&self, kind: MediaKind) -> Arc<dyn MediaElement> {
        let media = Arc::new(HeadlessMedia::new(
            self.next_id(),
            kind,
            self.duration,
            self.broken.clone(),
            self.autoplay_blocked,
        ));
        lock(&self.elements).media.push(media.clone());
        media
    }

    fn create_image(&self, src: &str, width: u32, height: u32) -> Arc<dyn ImageElement> {
        let image = Arc::new(HeadlessImage {
            id: self.next_id(),
            src: src.to_string(),
            width,
            height,
            events: EventEmitter::new(),
        });
        lock(&self.elements).images.push(image.clone());
        image
    }

    fn attach(&self, element: ElementId) {
        let mut elements = lock(&self.elements);
        if !elements.attached.contains(&element) {
            elements.attached.push(element);
        }
    }

    fn detach(&self, element: ElementId) {
        lock(&self.elements).attached.retain(|id| *id != element);
    }

    fn open(&self, url: &str) {
        log::info!("Opening {}", url);
        lock(&self.elements).opened.push(url.to_string());
    }

    async fn load_vpaid(
        &self,
        kind: VpaidKind,
        uri: &str,
        bridge: Option<&str>,
    ) -> PlayerResult<Arc<dyn VpaidAd>> {
        if self.broken.contains(uri) {
            return Err(PlayerError::Vpaid(format!("failed to load {}", uri)));
        }
        let unit = Arc::new(HeadlessVpaid::new(
            self.next_id(),
            kind,
            uri,
            bridge.map(str::to_string),
            self.duration,
        ));
        lock(&self.elements).units.push(unit.clone());
        Ok(unit)
    }
}

struct MediaState {
    src: Option<String>,
    preload: String,
    paused: bool,
    current_time: f64,
    volume: f64,
    error: Option<String>,
    unlocked: bool,
    autoplay_blocked: bool,
}

/// A media element whose clock only moves on [`HeadlessMedia::advance`]
pub struct HeadlessMedia {
    id: ElementId,
    kind: MediaKind,
    duration: f64,
    broken: HashSet<String>,
    events: EventEmitter,
    state: Mutex<MediaState>,
}

impl HeadlessMedia {
    fn new(id: ElementId, kind: MediaKind, duration: f64, broken: HashSet<String>, autoplay_blocked: bool) -> Self {
        Self {
            id,
            kind,
            duration,
            broken,
            events: EventEmitter::new(),
            state: Mutex::new(MediaState {
                src: None,
                preload: "metadata".to_string(),
                paused: true,
                current_time: 0.0,
                volume: 1.0,
                error: None,
                unlocked: false,
                autoplay_blocked,
            }),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn src(&self) -> Option<String> {
        lock(&self.state).src.clone()
    }

    pub fn preload(&self) -> String {
        lock(&self.state).preload.clone()
    }

    pub fn is_unlocked(&self) -> bool {
        lock(&self.state).unlocked
    }

    /// Play `seconds` of media. Emits timeupdate, and ended at the end.
    pub fn advance(&self, seconds: f64) {
        let ended = {
            let mut state = lock(&self.state);
            if state.paused || state.src.is_none() {
                return;
            }
            state.current_time = (state.current_time + seconds).min(self.duration);
            let ended = state.current_time >= self.duration;
            if ended {
                state.paused = true;
            }
            ended
        };

        self.events.emit(native::TIMEUPDATE, &[]);
        if ended {
            self.events.emit(native::ENDED, &[]);
        }
    }

    /// Simulate a user click on the element
    pub fn click(&self) {
        self.events.emit(native::CLICK, &[]);
    }

    /// Simulate a decode error during playback
    pub fn fail(&self, message: &str) {
        lock(&self.state).error = Some(message.to_string());
        self.events.emit(native::ERROR, &[]);
    }
}

impl MediaElement for HeadlessMedia {
    fn id(&self) -> ElementId {
        self.id
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn set_src(&self, uri: &str) {
        let broken = self.broken.contains(uri);
        {
            let mut state = lock(&self.state);
            state.src = Some(uri.to_string());
            state.current_time = 0.0;
            if broken {
                state.error = Some(format!("MEDIA_ERR_SRC_NOT_SUPPORTED: {}", uri));
            }
        }

        if broken {
            self.events.emit(native::ERROR, &[]);
        } else {
            self.events.emit(native::DURATIONCHANGE, &[]);
            self.events.emit(native::LOADEDMETADATA, &[]);
        }
    }

    fn set_preload(&self, preload: &str) {
        lock(&self.state).preload = preload.to_string();
    }

    fn play(&self) {
        {
            let mut state = lock(&self.state);
            if !state.paused || state.src.is_none() {
                return;
            }
            if state.autoplay_blocked && !state.unlocked {
                state.error = Some("NotAllowedError: play() can only be initiated by a user gesture".to_string());
                drop(state);
                self.events.emit(native::ERROR, &[]);
                return;
            }
            if state.current_time >= self.duration {
                state.current_time = 0.0;
            }
            state.paused = false;
        }
        self.events.emit(native::PLAY, &[]);
        self.events.emit(native::PLAYING, &[]);
    }

    fn pause(&self) {
        {
            let mut state = lock(&self.state);
            if state.paused {
                return;
            }
            state.paused = true;
        }
        self.events.emit(native::PAUSE, &[]);
    }

    fn paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).current_time
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn volume(&self) -> f64 {
        lock(&self.state).volume
    }

    fn set_volume(&self, volume: f64) {
        {
            let mut state = lock(&self.state);
            if state.volume == volume {
                return;
            }
            state.volume = volume;
        }
        self.events.emit(native::VOLUMECHANGE, &[]);
    }

    fn error_message(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    fn unlock(&self) {
        lock(&self.state).unlocked = true;
    }
}

pub struct HeadlessImage {
    id: ElementId,
    src: String,
    width: u32,
    height: u32,
    events: EventEmitter,
}

impl HeadlessImage {
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn click(&self) {
        self.events.emit(native::CLICK, &[]);
    }
}

impl ImageElement for HeadlessImage {
    fn id(&self) -> ElementId {
        self.id
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitArgs {
    pub width: f64,
    pub height: f64,
    pub view_mode: String,
    pub desired_bitrate: u32,
    pub creative_data: String,
}

struct UnitState {
    init: Option<InitArgs>,
    playing: bool,
    position: f64,
    quartiles: usize,
    volume: f64,
    refuse_start: Option<String>,
}

/// A scripted VPAID unit that answers every command immediately
pub struct HeadlessVpaid {
    id: ElementId,
    kind: VpaidKind,
    uri: String,
    bridge: Option<String>,
    duration: f64,
    events: EventEmitter,
    state: Mutex<UnitState>,
}

impl HeadlessVpaid {
    fn new(id: ElementId, kind: VpaidKind, uri: &str, bridge: Option<String>, duration: f64) -> Self {
        Self {
            id,
            kind,
            uri: uri.to_string(),
            bridge,
            duration,
            events: EventEmitter::new(),
            state: Mutex::new(UnitState {
                init: None,
                playing: false,
                position: 0.0,
                quartiles: 0,
                volume: 1.0,
                refuse_start: None,
            }),
        }
    }

    pub fn kind(&self) -> VpaidKind {
        self.kind
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn bridge(&self) -> Option<&str> {
        self.bridge.as_deref()
    }

    pub fn init_args(&self) -> Option<InitArgs> {
        lock(&self.state).init.clone()
    }

    /// Answer the next `startAd` with `AdError(message)` instead of starting
    pub fn fail_next_start(&self, message: &str) {
        lock(&self.state).refuse_start = Some(message.to_string());
    }

    /// Emit any event as the unit itself would
    pub fn emit(&self, event: AdEvent, args: &[Value]) {
        self.events.emit(event, args);
    }

    /// Play `seconds` of the creative, reporting progress as a unit does
    pub fn advance(&self, seconds: f64) {
        let (remaining, crossed, complete) = {
            let mut state = lock(&self.state);
            if !state.playing {
                return;
            }
            state.position = (state.position + seconds).min(self.duration);
            let crossed = quartiles_reached(state.quartiles, state.position, self.duration);
            state.quartiles += crossed.len();
            let complete = state.position >= self.duration;
            if complete {
                state.playing = false;
            }
            (self.duration - state.position, crossed, complete)
        };

        self.events.emit(AdEvent::AdRemainingTimeChange, &[Value::from(remaining)]);
        for quartile in crossed {
            self.events.emit(quartile, &[]);
        }
        if complete {
            self.events.emit(AdEvent::AdVideoComplete, &[]);
            self.events.emit(AdEvent::AdStopped, &[]);
        }
    }
}

impl VpaidAd for HeadlessVpaid {
    fn element(&self) -> ElementId {
        self.id
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn handshake_version(&self, version: &str) -> String {
        version.to_string()
    }

    fn init_ad(&self, width: f64, height: f64, view_mode: &str, desired_bitrate: u32, creative_data: &str) {
        lock(&self.state).init = Some(InitArgs {
            width,
            height,
            view_mode: view_mode.to_string(),
            desired_bitrate,
            creative_data: creative_data.to_string(),
        });
        self.events.emit(AdEvent::AdLoaded, &[]);
    }

    fn start_ad(&self) {
        let refusal = {
            let mut state = lock(&self.state);
            let refusal = state.refuse_start.take();
            state.playing = refusal.is_none();
            refusal
        };
        if let Some(message) = refusal {
            self.events.emit(AdEvent::AdError, &[Value::from(message)]);
            return;
        }
        self.events.emit(AdEvent::AdStarted, &[]);
        self.events.emit(AdEvent::AdImpression, &[]);
        self.events.emit(AdEvent::AdVideoStart, &[]);
    }

    fn stop_ad(&self) {
        lock(&self.state).playing = false;
        self.events.emit(AdEvent::AdStopped, &[]);
    }

    fn pause_ad(&self) {
        lock(&self.state).playing = false;
        self.events.emit(AdEvent::AdPaused, &[]);
    }

    fn resume_ad(&self) {
        lock(&self.state).playing = true;
        self.events.emit(AdEvent::AdPlaying, &[]);
    }

    fn ad_remaining_time(&self) -> f64 {
        self.duration - lock(&self.state).position
    }

    fn ad_duration(&self) -> f64 {
        self.duration
    }

    fn ad_volume(&self) -> f64 {
        lock(&self.state).volume
    }

    fn set_ad_volume(&self, volume: f64) {
        lock(&self.state).volume = volume;
        self.events.emit(AdEvent::AdVolumeChange, &[]);
    }
}
