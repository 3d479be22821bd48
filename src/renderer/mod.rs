//! Renderers: one per creative format, all driven through [`Renderer`].
//!
//! A renderer moves through `Unloaded -> Loaded -> Started <-> Paused ->
//! Stopped`. `Stopped` is terminal, whether reached through `stop_ad` or
//! because the media ended.

mod html_audio;
mod html_video;
mod media;
mod tracker;
mod vpaid;

pub use html_audio::HtmlAudio;
pub use html_video::HtmlVideo;
pub use media::pick_media_file;
pub use tracker::MediaTracker;
pub(crate) use tracker::quartiles_reached;
pub use vpaid::{FlashVpaid, JavaScriptVpaid};

use crate::error::{PlayerError, PlayerResult};
use crate::events::{Emitter, EventEmitter, Value};
use crate::models::MediaFile;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RendererKind {
    JavaScriptVpaid,
    FlashVpaid,
    HtmlAudio,
    HtmlVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdState {
    Unloaded,
    Loaded,
    Started,
    Paused,
    Stopped,
}

/// Every renderer emits canonical lifecycle events through [`Emitter`]
#[async_trait]
pub trait Renderer: Emitter + Send + Sync {
    fn kind(&self) -> RendererKind;

    fn state(&self) -> AdState;

    /// Resolves once the media is ready to play
    async fn load(&self, media_files: &[MediaFile], ad_parameters: Option<&str>) -> PlayerResult<()>;

    /// Fails with [`PlayerError::AlreadyStarted`] on a second call
    async fn start_ad(&self) -> PlayerResult<()>;

    /// Detaches the ad from the container. Always succeeds.
    async fn stop_ad(&self) -> PlayerResult<()>;

    /// A no-op when the ad is not playing
    async fn pause_ad(&self) -> PlayerResult<()>;

    /// Fails if the ad never started, a no-op when it is not paused
    async fn resume_ad(&self) -> PlayerResult<()>;

    fn ad_remaining_time(&self) -> PlayerResult<f64>;
    fn ad_duration(&self) -> PlayerResult<f64>;
    fn ad_volume(&self) -> PlayerResult<f64>;
    fn set_ad_volume(&self, volume: f64) -> PlayerResult<()>;

    /// Prime audio playback from inside a user gesture
    fn unlock_audio(&self) -> PlayerResult<()> {
        Ok(())
    }
}

/// Resolve with the first of `events` emitted by `emitter`, then stop
/// listening to all of them.
pub(crate) fn wait_for(emitter: &EventEmitter, events: &[&str]) -> oneshot::Receiver<(String, Vec<Value>)> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let subscriptions = Arc::new(Mutex::new(Vec::new()));

    for event in events {
        let tx = tx.clone();
        let name = event.to_string();
        let source = emitter.clone();
        let own = subscriptions.clone();

        let subscription = emitter.on(event, move |args| {
            let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) else {
                return;
            };
            if let Ok(mut own) = own.lock() {
                for subscription in own.drain(..) {
                    source.off(subscription);
                }
            }
            let _ = tx.send((name.clone(), args.to_vec()));
        });

        if let Ok(mut subscriptions) = subscriptions.lock() {
            subscriptions.push(subscription);
        }
    }

    rx
}

/// Await a [`wait_for`] receiver, turning a vanished source into an error
pub(crate) async fn settle(
    rx: oneshot::Receiver<(String, Vec<Value>)>,
) -> PlayerResult<(String, Vec<Value>)> {
    rx.await
        .map_err(|_| PlayerError::Media("the element went away before answering".to_string()))
}

/// First string argument of an error event, or a fallback
pub(crate) fn error_message(args: &[Value], fallback: impl FnOnce() -> Option<String>) -> String {
    args.first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(fallback)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_resolves_with_first_event_and_unsubscribes() {
        let emitter = EventEmitter::new();
        let rx = wait_for(&emitter, &["ok", "fail"]);
        assert_eq!(emitter.listener_count("ok"), 1);

        emitter.emit("fail", &[Value::from("nope")]);
        emitter.emit("ok", &[]);

        let (name, args) = settle(rx).await.unwrap();
        assert_eq!(name, "fail");
        assert_eq!(args, vec![Value::from("nope")]);
        assert_eq!(emitter.listener_count("ok"), 0);
        assert_eq!(emitter.listener_count("fail"), 0);
    }

    #[test]
    fn error_message_prefers_event_argument() {
        assert_eq!(error_message(&[Value::from("decode")], || None), "decode");
        assert_eq!(error_message(&[], || Some("native".to_string())), "native");
        assert_eq!(error_message(&[Value::Null], || None), "unknown error");
    }
}
