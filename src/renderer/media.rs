use super::{AdState, MediaTracker, error_message, settle, wait_for};
use crate::error::{PlayerError, PlayerResult};
use crate::events::{AdEvent, EventEmitter, EventProxy, Value};
use crate::models::MediaFile;
use crate::surface::{Container, ElementId, MediaElement, MediaKind, Playability, native};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Choose the file to play at `width`.
///
/// Files without a URI or that the container cannot play are discarded first. The rest are ranked
/// by playability, then bitrate (highest first), then by how close their
/// declared width is to `width`. The winner must be certainly playable.
pub fn pick_media_file<'a, F>(files: &'a [MediaFile], width: f64, can_play: F) -> Option<&'a MediaFile>
where
    F: Fn(&str) -> Playability,
{
    let distance = |file: &MediaFile| {
        file.width
            .map_or(f64::INFINITY, |declared| (width - f64::from(declared)).abs())
    };

    let (file, playability) = files
        .iter()
        .filter(|file| !file.url.trim().is_empty())
        .map(|file| (file, can_play(&file.mime_type)))
        .filter(|(_, playability)| *playability > Playability::No)
        .min_by(|(a, a_play), (b, b_play)| {
            b_play
                .cmp(a_play)
                .then_with(|| b.bitrate.unwrap_or(0).cmp(&a.bitrate.unwrap_or(0)))
                .then_with(|| distance(a).partial_cmp(&distance(b)).unwrap_or(Ordering::Equal))
        })?;

    (playability == Playability::Probably).then_some(file)
}

struct Playback {
    element: Option<Arc<dyn MediaElement>>,
    state: AdState,
    started: bool,
    attached: Vec<ElementId>,
}

/// Drives one `<audio>` or `<video>` element. Shared by the HTML renderers.
pub(crate) struct MediaCore {
    kind: MediaKind,
    container: Arc<dyn Container>,
    events: EventEmitter,
    playback: Mutex<Playback>,
}

impl MediaCore {
    pub(crate) fn new(kind: MediaKind, container: Arc<dyn Container>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            container,
            events: EventEmitter::new(),
            playback: Mutex::new(Playback {
                element: None,
                state: AdState::Unloaded,
                started: false,
                attached: Vec::new(),
            }),
        })
    }

    fn label(&self) -> &'static str {
        match self.kind {
            MediaKind::Audio => "<audio>",
            MediaKind::Video => "<video>",
        }
    }

    fn playback(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub(crate) fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    pub(crate) fn state(&self) -> AdState {
        self.playback().state
    }

    /// The element, once loaded and until stopped
    pub(crate) fn element(&self) -> PlayerResult<Arc<dyn MediaElement>> {
        let playback = self.playback();
        if playback.state == AdState::Stopped {
            return Err(PlayerError::Stopped);
        }
        playback.element.clone().ok_or(PlayerError::NotLoaded(self.label()))
    }

    /// Keep `element` in the container until the ad stops
    pub(crate) fn adopt(&self, element: ElementId) {
        self.container.attach(element);
        self.playback().attached.push(element);
    }

    fn release(&self, element: ElementId) {
        self.playback().attached.retain(|id| *id != element);
        self.container.detach(element);
    }

    pub(crate) async fn load(self: &Arc<Self>, media_files: &[MediaFile]) -> PlayerResult<()> {
        if self.state() != AdState::Unloaded {
            return Err(PlayerError::Media(format!("{} is already loaded", self.label())));
        }

        let container = self.container.clone();
        let file = pick_media_file(media_files, container.width(), |mime| container.can_play_type(mime))
            .ok_or(PlayerError::NoPlayableMedia)?;
        log::debug!("Loading {} from {} ({})", self.label(), file.url, file.mime_type);

        let element = self.container.create_media(self.kind);
        element.set_preload("auto");

        let ready = wait_for(element.events(), &[native::LOADEDMETADATA, native::ERROR]);
        self.adopt(element.id());
        element.set_src(file.url.trim());

        let (event, args) = settle(ready).await?;
        if event == native::ERROR {
            let message = error_message(&args, || element.error_message());
            self.release(element.id());
            self.events.emit(AdEvent::AdError, &[Value::from(message.clone())]);
            return Err(PlayerError::Media(message));
        }

        self.wire(&element);
        {
            let mut playback = self.playback();
            playback.element = Some(element);
            playback.state = AdState::Loaded;
        }
        self.events.emit(AdEvent::AdLoaded, &[]);
        Ok(())
    }

    /// Translate the element's native events into canonical ones
    fn wire(self: &Arc<Self>, element: &Arc<dyn MediaElement>) {
        let source = element.events();
        let media: Weak<dyn MediaElement> = Arc::downgrade(element);

        // The impression goes out before any progress event
        {
            let events = self.events.clone();
            source.once(native::PLAYING, move |_| events.emit(AdEvent::AdImpression, &[]));
        }

        let tracker = MediaTracker::new(element);
        EventProxy::new(AdEvent::names()).from(&tracker).to(&self.events);

        {
            let core = Arc::downgrade(self);
            source.once(native::ENDED, move |_| {
                if let Some(core) = core.upgrade() {
                    core.finish();
                }
            });
        }
        {
            let events = self.events.clone();
            source.on(native::CLICK, move |_| {
                events.emit(AdEvent::AdClickThru, &[Value::Null, Value::Null, Value::from(true)])
            });
        }
        {
            let events = self.events.clone();
            let media = media.clone();
            source.on(native::ERROR, move |args| {
                let native_message = || media.upgrade().and_then(|m| m.error_message());
                let message = error_message(args, native_message);
                events.emit(AdEvent::AdError, &[Value::from(message)]);
            });
        }
        {
            let events = self.events.clone();
            let media = media.clone();
            source.on(native::DURATIONCHANGE, move |_| {
                let duration = media.upgrade().map(|m| m.duration());
                events.emit(AdEvent::AdDurationChange, &[Value::from(duration)]);
            });
        }
        {
            let events = self.events.clone();
            source.on(native::VOLUMECHANGE, move |_| {
                let volume = media.upgrade().map(|m| m.volume());
                events.emit(AdEvent::AdVolumeChange, &[Value::from(volume)]);
            });
        }
    }

    pub(crate) async fn start_ad(&self) -> PlayerResult<()> {
        let element = self.element()?;
        {
            let mut playback = self.playback();
            if playback.started {
                return Err(PlayerError::AlreadyStarted);
            }
            playback.started = true;
        }

        let playing = wait_for(element.events(), &[native::PLAYING, native::ERROR]);
        element.play();
        let answer = match settle(playing).await {
            Ok((event, args)) if event == native::ERROR => {
                Err(PlayerError::Media(error_message(&args, || element.error_message())))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = answer {
            // Playback never began, so the ad may be started again
            self.playback().started = false;
            return Err(e);
        }

        self.transition(AdState::Started);
        self.events.emit(AdEvent::AdStarted, &[]);
        Ok(())
    }

    pub(crate) async fn pause_ad(&self) -> PlayerResult<()> {
        let element = self.element()?;
        if element.paused() {
            return Ok(());
        }

        let paused = wait_for(element.events(), &[native::PAUSE]);
        element.pause();
        settle(paused).await?;

        self.transition(AdState::Paused);
        self.events.emit(AdEvent::AdPaused, &[]);
        Ok(())
    }

    pub(crate) async fn resume_ad(&self) -> PlayerResult<()> {
        let element = self.element()?;
        if !self.playback().started {
            return Err(PlayerError::NotStarted);
        }
        if !element.paused() {
            return Ok(());
        }

        let playing = wait_for(element.events(), &[native::PLAY]);
        element.play();
        settle(playing).await?;

        self.transition(AdState::Started);
        self.events.emit(AdEvent::AdPlaying, &[]);
        Ok(())
    }

    pub(crate) async fn stop_ad(&self) -> PlayerResult<()> {
        self.finish();
        Ok(())
    }

    /// Detach everything and enter the terminal state. Emits AdStopped once.
    fn finish(&self) {
        let (element, attached) = {
            let mut playback = self.playback();
            if playback.state == AdState::Stopped {
                return;
            }
            playback.state = AdState::Stopped;
            (playback.element.clone(), std::mem::take(&mut playback.attached))
        };

        if let Some(element) = element {
            if !element.paused() {
                element.pause();
            }
        }
        for id in attached {
            self.container.detach(id);
        }
        log::debug!("{} stopped", self.label());
        self.events.emit(AdEvent::AdStopped, &[]);
    }

    fn transition(&self, state: AdState) {
        let mut playback = self.playback();
        if playback.state != AdState::Stopped {
            playback.state = state;
        }
    }

    pub(crate) fn ad_remaining_time(&self) -> PlayerResult<f64> {
        let element = self.element()?;
        Ok((element.duration() - element.current_time()).max(0.0))
    }

    pub(crate) fn ad_duration(&self) -> PlayerResult<f64> {
        Ok(self.element()?.duration())
    }

    pub(crate) fn ad_volume(&self) -> PlayerResult<f64> {
        Ok(self.element()?.volume())
    }

    pub(crate) fn set_ad_volume(&self, volume: f64) -> PlayerResult<()> {
        self.element()?.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, bitrate: Option<u32>, width: Option<u32>, url: &str) -> MediaFile {
        MediaFile {
            url: url.to_string(),
            mime_type: mime.to_string(),
            bitrate,
            width,
            ..MediaFile::default()
        }
    }

    fn browser(mime: &str) -> Playability {
        match mime {
            "video/mp4" => Playability::Probably,
            "video/webm" => Playability::Maybe,
            _ => Playability::No,
        }
    }

    #[test]
    fn highest_bitrate_wins_among_equally_playable() {
        let files = [
            file("video/mp4", Some(500), Some(640), "low"),
            file("video/mp4", Some(1500), Some(1920), "high"),
        ];
        assert_eq!(pick_media_file(&files, 640.0, browser).unwrap().url, "high");
    }

    #[test]
    fn width_breaks_bitrate_ties() {
        let files = [
            file("video/mp4", Some(800), Some(1920), "wide"),
            file("video/mp4", Some(800), Some(640), "narrow"),
        ];
        assert_eq!(pick_media_file(&files, 700.0, browser).unwrap().url, "narrow");
    }

    #[test]
    fn unplayable_files_never_win_on_width() {
        let files = [
            file("video/x-flv", Some(800), Some(640), "flash"),
            file("video/mp4", Some(800), Some(1920), "mp4"),
        ];
        assert_eq!(pick_media_file(&files, 640.0, browser).unwrap().url, "mp4");
    }

    #[test]
    fn maybe_playable_is_not_enough() {
        let files = [file("video/webm", Some(800), Some(640), "webm")];
        assert!(pick_media_file(&files, 640.0, browser).is_none());
    }

    #[test]
    fn probably_beats_maybe_regardless_of_bitrate() {
        let files = [
            file("video/webm", Some(4000), Some(640), "webm"),
            file("video/mp4", Some(300), Some(640), "mp4"),
        ];
        assert_eq!(pick_media_file(&files, 640.0, browser).unwrap().url, "mp4");
    }

    #[test]
    fn files_without_a_uri_are_skipped() {
        let files = [
            file("video/mp4", Some(4000), Some(640), "  "),
            file("video/mp4", Some(300), Some(640), "real"),
        ];
        assert_eq!(pick_media_file(&files, 640.0, browser).unwrap().url, "real");
        assert!(pick_media_file(&files[..1], 640.0, browser).is_none());
    }

    #[test]
    fn no_files_no_pick() {
        assert!(pick_media_file(&[], 640.0, browser).is_none());
    }
}
