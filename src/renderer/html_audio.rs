use super::media::MediaCore;
use super::{AdState, Renderer, RendererKind};
use crate::error::PlayerResult;
use crate::events::{AdEvent, Emitter, EventEmitter, Value};
use crate::models::{Icon, MediaFile};
use crate::surface::{Container, MediaKind, native};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Plays an audio ad in an `<audio>` element, with an icon rendered as its
/// companion image.
///
/// Clicking either the image or the audio element asks the player to
/// handle the click-through.
pub struct HtmlAudio {
    core: Arc<MediaCore>,
    icons: Vec<Icon>,
    unlocked: AtomicBool,
}

impl HtmlAudio {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self {
            core: MediaCore::new(MediaKind::Audio, container),
            icons: Vec::new(),
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn with_icons(mut self, icons: Vec<Icon>) -> Self {
        self.icons = icons;
        self
    }

    /// The largest icon narrower than the container. Icons are listed
    /// smallest first, so the search runs from the end.
    fn pick_icon(&self) -> Option<&Icon> {
        let width = self.core.container().width();
        self.icons
            .iter()
            .rev()
            .find(|icon| width > f64::from(icon.width) && !icon.resource.is_empty())
    }

    fn show_image(&self) {
        let Some(icon) = self.pick_icon() else {
            return;
        };

        let image = self
            .core
            .container()
            .create_image(&icon.resource, icon.width, icon.height);
        let events = self.core.events().clone();
        let click = image.events().on(native::CLICK, move |_| {
            events.emit(AdEvent::AdClickThru, &[Value::Null, Value::Null, Value::from(true)])
        });
        self.core.adopt(image.id());

        // A detached image no longer clicks through
        let image_events = image.events().clone();
        self.core.events().once(AdEvent::AdStopped, move |_| image_events.off(click));
    }
}

impl Emitter for HtmlAudio {
    fn events(&self) -> &EventEmitter {
        self.core.events()
    }
}

#[async_trait]
impl Renderer for HtmlAudio {
    fn kind(&self) -> RendererKind {
        RendererKind::HtmlAudio
    }

    fn state(&self) -> AdState {
        self.core.state()
    }

    async fn load(&self, media_files: &[MediaFile], _ad_parameters: Option<&str>) -> PlayerResult<()> {
        self.core.load(media_files).await?;
        self.show_image();
        Ok(())
    }

    async fn start_ad(&self) -> PlayerResult<()> {
        if !self.unlocked.load(Ordering::Relaxed) {
            log::debug!("Starting audio that was never unlocked; playback may be blocked");
        }
        self.core.start_ad().await
    }

    async fn stop_ad(&self) -> PlayerResult<()> {
        self.core.stop_ad().await
    }

    async fn pause_ad(&self) -> PlayerResult<()> {
        self.core.pause_ad().await
    }

    async fn resume_ad(&self) -> PlayerResult<()> {
        self.core.resume_ad().await
    }

    fn ad_remaining_time(&self) -> PlayerResult<f64> {
        self.core.ad_remaining_time()
    }

    fn ad_duration(&self) -> PlayerResult<f64> {
        self.core.ad_duration()
    }

    fn ad_volume(&self) -> PlayerResult<f64> {
        self.core.ad_volume()
    }

    fn set_ad_volume(&self, volume: f64) -> PlayerResult<()> {
        self.core.set_ad_volume(volume)
    }

    fn unlock_audio(&self) -> PlayerResult<()> {
        let element = self.core.element()?;
        if !self.unlocked.swap(true, Ordering::Relaxed) {
            element.unlock();
        }
        Ok(())
    }
}
