use crate::client::{HttpFetcher, VastClient, VastFetcher};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, PlayerResult, VastError};
use crate::events::{self, AdEvent, Emitter, EventEmitter, EventProxy, Subscription, Value};
use crate::models::Vast;
use crate::renderer::{Renderer, RendererKind};
use crate::selection::select_creative;
use crate::surface::Container;
use crate::tracking::{HttpPixelTransport, PixelReporter, PixelTransport};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

#[derive(Default)]
struct PlayerState {
    vast: Option<Arc<Vast>>,
    ready: bool,
    loading: bool,
    renderer: Option<Arc<dyn Renderer>>,
    relays: Vec<(EventEmitter, Subscription)>,
}

fn lock(state: &Mutex<PlayerState>) -> MutexGuard<'_, PlayerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a load in flight. Dropping it, including when the load future
/// itself is dropped, lets the next load through.
struct LoadSlot {
    state: Arc<Mutex<PlayerState>>,
}

impl LoadSlot {
    fn acquire(state: &Arc<Mutex<PlayerState>>) -> PlayerResult<Self> {
        let mut guard = lock(state);
        if guard.loading {
            return Err(PlayerError::LoadInProgress);
        }
        guard.loading = true;
        Ok(Self { state: state.clone() })
    }
}

impl Drop for LoadSlot {
    fn drop(&mut self) {
        lock(&self.state).loading = false;
    }
}

/// Loads a VAST ad into a container and plays it.
///
/// The player emits `ready` and `error`, and relays every canonical event
/// of the active renderer.
pub struct VastPlayer {
    container: Arc<dyn Container>,
    config: PlayerConfig,
    client: VastClient,
    transport: Arc<dyn PixelTransport>,
    events: EventEmitter,
    state: Arc<Mutex<PlayerState>>,
}

impl std::fmt::Debug for VastPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VastPlayer").finish_non_exhaustive()
    }
}

impl VastPlayer {
    /// A player that fetches over HTTP and fires real pixels
    pub fn new(container: Arc<dyn Container>, config: impl Into<PlayerConfig>) -> PlayerResult<Self> {
        let config = config.into();
        let fetcher = HttpFetcher::new(Duration::from_millis(config.vast.timeout_ms))?;
        Ok(Self::with_collaborators(
            container,
            config,
            Arc::new(fetcher),
            Arc::new(HttpPixelTransport::new()),
        ))
    }

    pub fn with_collaborators(
        container: Arc<dyn Container>,
        config: impl Into<PlayerConfig>,
        fetcher: Arc<dyn VastFetcher>,
        transport: Arc<dyn PixelTransport>,
    ) -> Self {
        let player = Self {
            container,
            config: config.into(),
            client: VastClient::new(fetcher),
            transport,
            events: EventEmitter::new(),
            state: Arc::new(Mutex::new(PlayerState::default())),
        };
        player.handle_click_through();
        player
    }

    /// Open the click-through when the renderer leaves it to the player
    fn handle_click_through(&self) {
        let container = self.container.clone();
        let state = Arc::downgrade(&self.state);

        self.events.on(AdEvent::AdClickThru, move |args| {
            let player_handles = args.get(2).and_then(Value::as_bool).unwrap_or(false);
            if !player_handles {
                return;
            }

            let url = args
                .first()
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .or_else(|| declared_click_through(&state));

            match url {
                Some(url) => container.open(&url),
                None => log::debug!("Click-through requested but the ad declares no URL"),
            }
        });
    }

    fn state(&self) -> MutexGuard<'_, PlayerState> {
        lock(&self.state)
    }

    /// Load the first VAST URI that can be fetched, falling back through
    /// the rest in order, and get its ad ready to start.
    pub async fn load<I, S>(&self, uris: I) -> PlayerResult<&Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let uris: Vec<String> = uris.into_iter().map(|uri| uri.as_ref().to_string()).collect();
        let slot = LoadSlot::acquire(&self.state)?;
        let result = self.load_ad(&uris).await;
        drop(slot);

        match result {
            Ok(()) => {
                self.events.emit(events::READY, &[]);
                Ok(self)
            }
            Err(e) => {
                log::error!("Failed to load ad: {}", e);
                self.events.emit(events::ERROR, &[Value::from(e.to_string())]);
                Err(e)
            }
        }
    }

    async fn load_ad(&self, uris: &[String]) -> PlayerResult<()> {
        self.retire_renderer().await;

        let vast = Arc::new(self.fetch_first(uris).await?);
        self.state().vast = Some(vast.clone());

        let selection = select_creative(&vast)?;
        log::info!("Playing the ad with {:?}", selection.kind);

        let renderer = selection.instantiate(self.container.clone(), &self.config);
        PixelReporter::new(
            vast.tracking_descriptors(),
            self.config.tracking.mapper.clone(),
            self.transport.clone(),
        )
        .track(renderer.events());
        let relays = EventProxy::new(AdEvent::names())
            .from(renderer.as_ref())
            .to(&self.events);
        {
            let mut state = self.state();
            state.renderer = Some(renderer.clone());
            state.relays = relays;
        }

        renderer
            .load(&selection.media_files, selection.ad_parameters.as_deref())
            .await?;

        self.state().ready = true;
        Ok(())
    }

    async fn fetch_first(&self, uris: &[String]) -> PlayerResult<Vast> {
        let mut last_error = None;

        for (index, uri) in uris.iter().enumerate() {
            match self.client.get(uri, &self.config.vast).await {
                Ok(vast) => return Ok(vast),
                Err(e) if index + 1 < uris.len() => {
                    log::warn!("Failed to load VAST from {}, trying the next URI: {}", uri, e);
                    last_error = Some(e);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| VastError::Other("no VAST URI to load".to_string()))
            .into())
    }

    /// Stop and disconnect the renderer of a previous load
    async fn retire_renderer(&self) {
        let (renderer, relays) = {
            let mut state = self.state();
            state.ready = false;
            state.vast = None;
            (state.renderer.take(), std::mem::take(&mut state.relays))
        };

        for (source, subscription) in relays {
            source.off(subscription);
        }
        if let Some(renderer) = renderer {
            let _ = renderer.stop_ad().await;
        }
    }

    fn renderer(&self) -> PlayerResult<Arc<dyn Renderer>> {
        let state = self.state();
        if !state.ready {
            return Err(PlayerError::NotReady);
        }
        state.renderer.clone().ok_or(PlayerError::NotReady)
    }

    pub async fn start_ad(&self) -> PlayerResult<&Self> {
        self.renderer()?.start_ad().await?;
        Ok(self)
    }

    pub async fn stop_ad(&self) -> PlayerResult<&Self> {
        self.renderer()?.stop_ad().await?;
        Ok(self)
    }

    pub async fn pause_ad(&self) -> PlayerResult<&Self> {
        self.renderer()?.pause_ad().await?;
        Ok(self)
    }

    pub async fn resume_ad(&self) -> PlayerResult<&Self> {
        self.renderer()?.resume_ad().await?;
        Ok(self)
    }

    pub fn ad_remaining_time(&self) -> PlayerResult<f64> {
        self.renderer()?.ad_remaining_time()
    }

    pub fn ad_duration(&self) -> PlayerResult<f64> {
        self.renderer()?.ad_duration()
    }

    pub fn ad_volume(&self) -> PlayerResult<f64> {
        self.renderer()?.ad_volume()
    }

    pub fn set_ad_volume(&self, volume: f64) -> PlayerResult<()> {
        self.renderer()?.set_ad_volume(volume)
    }

    /// Call from inside the first user gesture so audio ads may play
    pub fn unlock_audio(&self) -> PlayerResult<()> {
        self.renderer()?.unlock_audio()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    /// The last document loaded, once fetched
    pub fn vast(&self) -> Option<Arc<Vast>> {
        self.state().vast.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state().ready
    }

    pub fn renderer_kind(&self) -> Option<RendererKind> {
        self.state().renderer.as_ref().map(|renderer| renderer.kind())
    }
}

impl Emitter for VastPlayer {
    fn events(&self) -> &EventEmitter {
        &self.events
    }
}

fn declared_click_through(state: &Weak<Mutex<PlayerState>>) -> Option<String> {
    let state = state.upgrade()?;
    let state = lock(&state);
    state
        .vast
        .as_ref()?
        .first_creative()?
        .click_through()
        .map(str::to_string)
}
