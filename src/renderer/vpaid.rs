use super::{AdState, Renderer, RendererKind, error_message, settle, wait_for};
use crate::error::{PlayerError, PlayerResult};
use crate::events::{AdEvent, Emitter, EventEmitter, EventProxy, Value};
use crate::models::MediaFile;
use crate::surface::{Container, VpaidAd, VpaidKind};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

const VPAID_VERSION: &str = "2.0";

struct Session {
    ad: Option<Arc<dyn VpaidAd>>,
    state: AdState,
    started: bool,
}

/// Drives a hosted VPAID unit. The unit already speaks the canonical
/// vocabulary; volume changes are re-emitted with the current volume.
struct VpaidCore {
    kind: VpaidKind,
    bridge: Option<String>,
    container: Arc<dyn Container>,
    events: EventEmitter,
    session: Mutex<Session>,
}

impl VpaidCore {
    fn new(kind: VpaidKind, container: Arc<dyn Container>, bridge: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            bridge,
            container,
            events: EventEmitter::new(),
            session: Mutex::new(Session {
                ad: None,
                state: AdState::Unloaded,
                started: false,
            }),
        })
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ad(&self) -> PlayerResult<Arc<dyn VpaidAd>> {
        let session = self.session();
        if session.state == AdState::Stopped {
            return Err(PlayerError::Stopped);
        }
        session.ad.clone().ok_or(PlayerError::NotLoaded("VPAID creative"))
    }

    async fn load(self: &Arc<Self>, media_files: &[MediaFile], ad_parameters: Option<&str>) -> PlayerResult<()> {
        if self.session().state != AdState::Unloaded {
            return Err(PlayerError::Vpaid("the creative is already loaded".to_string()));
        }

        let file = media_files.first().ok_or(PlayerError::NoPlayableMedia)?;
        let ad = self
            .container
            .load_vpaid(self.kind, file.url.trim(), self.bridge.as_deref())
            .await?;

        let version = ad.handshake_version(VPAID_VERSION);
        log::debug!("VPAID unit {} speaks version {}", file.url, version);

        self.wire(&ad);

        let loaded = wait_for(ad.events(), &[AdEvent::AdLoaded.as_str(), AdEvent::AdError.as_str()]);
        self.container.attach(ad.element());
        ad.init_ad(
            self.container.width(),
            self.container.height(),
            "normal",
            file.bitrate.unwrap_or(0),
            ad_parameters.unwrap_or_default(),
        );

        let (event, args) = settle(loaded).await?;
        if event == AdEvent::AdError.as_str() {
            self.container.detach(ad.element());
            return Err(PlayerError::Vpaid(error_message(&args, || None)));
        }

        let mut session = self.session();
        session.ad = Some(ad);
        session.state = AdState::Loaded;
        Ok(())
    }

    fn wire(self: &Arc<Self>, ad: &Arc<dyn VpaidAd>) {
        let relayed = AdEvent::ALL
            .into_iter()
            .filter(|event| *event != AdEvent::AdVolumeChange)
            .map(AdEvent::as_str);
        EventProxy::new(relayed).from(ad.events()).to(&self.events);

        let source = ad.events();
        {
            let events = self.events.clone();
            let unit: Weak<dyn VpaidAd> = Arc::downgrade(ad);
            source.on(AdEvent::AdVolumeChange, move |_| {
                let volume = unit.upgrade().map(|unit| unit.ad_volume());
                events.emit(AdEvent::AdVolumeChange, &[Value::from(volume)]);
            });
        }
        {
            // Units may stop on their own, e.g. when the creative completes
            let core = Arc::downgrade(self);
            source.on(AdEvent::AdStopped, move |_| {
                if let Some(core) = core.upgrade() {
                    core.release();
                }
            });
        }
    }

    /// Enter the terminal state and detach the unit
    fn release(&self) {
        let ad = {
            let mut session = self.session();
            if session.state == AdState::Stopped {
                return;
            }
            session.state = AdState::Stopped;
            session.ad.clone()
        };
        if let Some(ad) = ad {
            self.container.detach(ad.element());
        }
    }

    fn transition(&self, state: AdState) {
        let mut session = self.session();
        if session.state != AdState::Stopped {
            session.state = state;
        }
    }

    /// Call `command` on the unit and wait for `answer` (or AdError)
    async fn command(&self, ad: &Arc<dyn VpaidAd>, answer: AdEvent, command: fn(&dyn VpaidAd)) -> PlayerResult<()> {
        let reply = wait_for(ad.events(), &[answer.as_str(), AdEvent::AdError.as_str()]);
        command(ad.as_ref());
        let (event, args) = settle(reply).await?;
        if event == AdEvent::AdError.as_str() {
            return Err(PlayerError::Vpaid(error_message(&args, || None)));
        }
        Ok(())
    }

    async fn start_ad(&self) -> PlayerResult<()> {
        let ad = self.ad()?;
        {
            let mut session = self.session();
            if session.started {
                return Err(PlayerError::AlreadyStarted);
            }
            session.started = true;
        }
        if let Err(e) = self.command(&ad, AdEvent::AdStarted, |ad| ad.start_ad()).await {
            // The unit refused to start, so it may be asked again
            self.session().started = false;
            return Err(e);
        }
        self.transition(AdState::Started);
        Ok(())
    }

    async fn stop_ad(&self) -> PlayerResult<()> {
        let ad = {
            let session = self.session();
            if session.state == AdState::Stopped {
                return Ok(());
            }
            session.ad.clone()
        };

        match ad {
            Some(ad) => {
                // A unit that errors while stopping is still torn down
                if let Err(e) = self.command(&ad, AdEvent::AdStopped, |ad| ad.stop_ad()).await {
                    log::warn!("VPAID unit failed to stop cleanly: {}", e);
                }
                self.release();
            }
            None => {
                self.release();
                self.events.emit(AdEvent::AdStopped, &[]);
            }
        }
        Ok(())
    }

    async fn pause_ad(&self) -> PlayerResult<()> {
        let ad = self.ad()?;
        if self.session().state != AdState::Started {
            return Ok(());
        }
        self.command(&ad, AdEvent::AdPaused, |ad| ad.pause_ad()).await?;
        self.transition(AdState::Paused);
        Ok(())
    }

    async fn resume_ad(&self) -> PlayerResult<()> {
        let ad = self.ad()?;
        let state = {
            let session = self.session();
            if !session.started {
                return Err(PlayerError::NotStarted);
            }
            session.state
        };
        if state != AdState::Paused {
            return Ok(());
        }
        self.command(&ad, AdEvent::AdPlaying, |ad| ad.resume_ad()).await?;
        self.transition(AdState::Started);
        Ok(())
    }
}

macro_rules! vpaid_renderer {
    ($(#[$doc:meta])* $name:ident, $renderer_kind:expr) => {
        $(#[$doc])*
        pub struct $name {
            core: Arc<VpaidCore>,
        }

        impl Emitter for $name {
            fn events(&self) -> &EventEmitter {
                &self.core.events
            }
        }

        #[async_trait]
        impl Renderer for $name {
            fn kind(&self) -> RendererKind {
                $renderer_kind
            }

            fn state(&self) -> AdState {
                self.core.session().state
            }

            async fn load(&self, media_files: &[MediaFile], ad_parameters: Option<&str>) -> PlayerResult<()> {
                self.core.load(media_files, ad_parameters).await
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
                Ok(self.core.ad()?.ad_remaining_time())
            }

            fn ad_duration(&self) -> PlayerResult<f64> {
                Ok(self.core.ad()?.ad_duration())
            }

            fn ad_volume(&self) -> PlayerResult<f64> {
                Ok(self.core.ad()?.ad_volume())
            }

            fn set_ad_volume(&self, volume: f64) -> PlayerResult<()> {
                self.core.ad()?.set_ad_volume(volume.clamp(0.0, 1.0));
                Ok(())
            }
        }
    };
}

vpaid_renderer!(
    /// Runs a JavaScript VPAID unit in a frame inside the container
    JavaScriptVpaid,
    RendererKind::JavaScriptVpaid
);

vpaid_renderer!(
    /// Runs a Flash VPAID unit through the bridge SWF
    FlashVpaid,
    RendererKind::FlashVpaid
);

impl JavaScriptVpaid {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self {
            core: VpaidCore::new(VpaidKind::JavaScript, container, None),
        }
    }
}

impl FlashVpaid {
    pub fn new(container: Arc<dyn Container>, swf_uri: impl Into<String>) -> Self {
        Self {
            core: VpaidCore::new(VpaidKind::Flash, container, Some(swf_uri.into())),
        }
    }
}
