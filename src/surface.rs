//! The native surfaces renderers drive: a container that hosts elements,
//! media elements with their native event vocabulary, and hosted VPAID units.

use crate::error::PlayerResult;
use crate::events::EventEmitter;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Native media element events
pub mod native {
    pub const LOADEDMETADATA: &str = "loadedmetadata";
    pub const ERROR: &str = "error";
    pub const PLAY: &str = "play";
    pub const PLAYING: &str = "playing";
    pub const PAUSE: &str = "pause";
    pub const ENDED: &str = "ended";
    pub const TIMEUPDATE: &str = "timeupdate";
    pub const DURATIONCHANGE: &str = "durationchange";
    pub const VOLUMECHANGE: &str = "volumechange";
    pub const CLICK: &str = "click";
}

/// Answer to "can this container decode that MIME type?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Playability {
    No = 0,
    Maybe = 1,
    Probably = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VpaidKind {
    JavaScript,
    Flash,
}

/// An `<audio>` or `<video>` element
pub trait MediaElement: Send + Sync {
    fn id(&self) -> ElementId;
    fn events(&self) -> &EventEmitter;
    fn set_src(&self, uri: &str);
    fn set_preload(&self, preload: &str);
    fn play(&self);
    fn pause(&self);
    fn paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn error_message(&self) -> Option<String>;

    /// Prime playback from inside a user gesture
    fn unlock(&self) {}
}

/// A companion image
pub trait ImageElement: Send + Sync {
    fn id(&self) -> ElementId;
    fn events(&self) -> &EventEmitter;
}

/// A hosted VPAID unit. It emits VPAID-named events on [`VpaidAd::events`].
pub trait VpaidAd: Send + Sync {
    /// The element (frame or plugin object) hosting the unit
    fn element(&self) -> ElementId;
    fn events(&self) -> &EventEmitter;
    fn handshake_version(&self, version: &str) -> String;
    fn init_ad(&self, width: f64, height: f64, view_mode: &str, desired_bitrate: u32, creative_data: &str);
    fn start_ad(&self);
    fn stop_ad(&self);
    fn pause_ad(&self);
    fn resume_ad(&self);
    fn ad_remaining_time(&self) -> f64;
    fn ad_duration(&self) -> f64;
    fn ad_volume(&self) -> f64;
    fn set_ad_volume(&self, volume: f64);
}

/// Where the ad is displayed
#[async_trait]
pub trait Container: Send + Sync {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn can_play_type(&self, mime_type: &str) -> Playability;
    fn create_media(&self, kind: MediaKind) -> Arc<dyn MediaElement>;
    fn create_image(&self, src: &str, width: u32, height: u32) -> Arc<dyn ImageElement>;
    fn attach(&self, element: ElementId);
    fn detach(&self, element: ElementId);

    /// Navigate a new browsing context to `url`
    fn open(&self, url: &str);

    /// Load a VPAID unit. Flash units are hosted by the bridge at `bridge`.
    async fn load_vpaid(
        &self,
        kind: VpaidKind,
        uri: &str,
        bridge: Option<&str>,
    ) -> PlayerResult<Arc<dyn VpaidAd>>;
}
