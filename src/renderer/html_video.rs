use super::media::MediaCore;
use super::{AdState, Renderer, RendererKind};
use crate::error::PlayerResult;
use crate::events::{Emitter, EventEmitter};
use crate::models::MediaFile;
use crate::surface::{Container, MediaKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Plays a progressive video file in a `<video>` element
pub struct HtmlVideo {
    core: Arc<MediaCore>,
}

impl HtmlVideo {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self {
            core: MediaCore::new(MediaKind::Video, container),
        }
    }
}

impl Emitter for HtmlVideo {
    fn events(&self) -> &EventEmitter {
        self.core.events()
    }
}

#[async_trait]
impl Renderer for HtmlVideo {
    fn kind(&self) -> RendererKind {
        RendererKind::HtmlVideo
    }

    fn state(&self) -> AdState {
        self.core.state()
    }

    async fn load(&self, media_files: &[MediaFile], _ad_parameters: Option<&str>) -> PlayerResult<()> {
        self.core.load(media_files).await
    }

    async fn start_ad(&self) -> PlayerResult<()> {
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
}
