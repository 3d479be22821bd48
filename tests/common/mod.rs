#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use vast_player::headless::HeadlessContainer;
use vast_player::{
    Emitter, PixelTransport, PlayerConfig, PlayerOptions, VastError, VastFetcher, VastPlayer,
};

/// Serves VAST documents from memory
pub struct MapFetcher {
    documents: HashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new(documents: &[(&str, String)]) -> Arc<Self> {
        Arc::new(Self {
            documents: documents
                .iter()
                .map(|(uri, xml)| (uri.to_string(), xml.clone()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VastFetcher for MapFetcher {
    async fn fetch(&self, uri: &str) -> vast_player::error::Result<String> {
        self.requests.lock().unwrap().push(uri.to_string());
        self.documents.get(uri).cloned().ok_or_else(|| VastError::FetchFailed {
            uri: uri.to_string(),
            reason: "404 Not Found".to_string(),
        })
    }
}

/// Holds every fetch until the gate is opened, then serves from a [`MapFetcher`]
pub struct GatedFetcher {
    inner: Arc<MapFetcher>,
    pub gate: Notify,
    waiting: AtomicUsize,
}

impl GatedFetcher {
    /// Fetches that have reached the gate so far
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VastFetcher for GatedFetcher {
    async fn fetch(&self, uri: &str) -> vast_player::error::Result<String> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.fetch(uri).await
    }
}

/// Remembers every pixel instead of requesting it
#[derive(Default)]
pub struct RecordingTransport {
    fired: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn fired(&self) -> Vec<String> {
        self.fired.lock().unwrap().clone()
    }
}

impl PixelTransport for RecordingTransport {
    fn fire(&self, uri: &str) {
        self.fired.lock().unwrap().push(uri.to_string());
    }
}

pub struct Harness {
    pub player: VastPlayer,
    pub container: Arc<HeadlessContainer>,
    pub fetcher: Arc<MapFetcher>,
    pub pixels: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new(documents: &[(&str, String)]) -> Self {
        Self::with_options(documents, PlayerOptions::default())
    }

    pub fn with_options(documents: &[(&str, String)], options: PlayerOptions) -> Self {
        let container = Arc::new(HeadlessContainer::new(640.0, 360.0).with_common_codecs());
        Self::with_container(documents, options, container)
    }

    pub fn with_container(
        documents: &[(&str, String)],
        options: PlayerOptions,
        container: Arc<HeadlessContainer>,
    ) -> Self {
        let fetcher = MapFetcher::new(documents);
        let pixels = Arc::new(RecordingTransport::default());
        let player = VastPlayer::with_collaborators(
            container.clone(),
            PlayerConfig::from(options),
            fetcher.clone(),
            pixels.clone(),
        );
        Self {
            player,
            container,
            fetcher,
            pixels,
        }
    }

    /// A harness whose fetches wait on the returned gate
    pub fn gated(documents: &[(&str, String)]) -> (Self, Arc<GatedFetcher>) {
        let container = Arc::new(HeadlessContainer::new(640.0, 360.0).with_common_codecs());
        let fetcher = MapFetcher::new(documents);
        let gated = Arc::new(GatedFetcher {
            inner: fetcher.clone(),
            gate: Notify::new(),
            waiting: AtomicUsize::new(0),
        });
        let pixels = Arc::new(RecordingTransport::default());
        let player = VastPlayer::with_collaborators(
            container.clone(),
            PlayerConfig::default(),
            gated.clone(),
            pixels.clone(),
        );
        let harness = Self {
            player,
            container,
            fetcher,
            pixels,
        };
        (harness, gated)
    }

    /// Names of every `names` event the player emits, in order
    pub fn record(&self, names: &[&str]) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in names {
            let seen = seen.clone();
            let name = name.to_string();
            self.player
                .on(name.clone(), move |_| seen.lock().unwrap().push(name.clone()));
        }
        seen
    }
}

/// An inline ad with the given `<MediaFiles>` content, linear tracking and
/// extra `<Linear>` children
pub fn inline_ad(impressions: &[&str], media_files: &str, tracking: &[(&str, &str)], extra: &str) -> String {
    let impressions: String = impressions
        .iter()
        .map(|uri| format!("<Impression><![CDATA[{}]]></Impression>", uri))
        .collect();
    let tracking: String = tracking
        .iter()
        .map(|(event, uri)| format!(r#"<Tracking event="{}"><![CDATA[{}]]></Tracking>"#, event, uri))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<VAST version="3.0">
  <Ad id="ad-1">
    <InLine>
      <AdSystem version="1.0">Acme</AdSystem>
      <AdTitle>Spring sale</AdTitle>
      {impressions}
      <Error><![CDATA[https://track.example/error?code=[ERRORCODE]]]></Error>
      <Creatives>
        <Creative id="c-1" sequence="1">
          <Linear>
            <Duration>00:00:30</Duration>
            <AdParameters><![CDATA[{{"campaign":"spring"}}]]></AdParameters>
            <TrackingEvents>{tracking}</TrackingEvents>
            <VideoClicks>
              <ClickThrough><![CDATA[https://brand.example/landing]]></ClickThrough>
              <ClickTracking><![CDATA[https://track.example/click]]></ClickTracking>
            </VideoClicks>
            <MediaFiles>{media_files}</MediaFiles>
            {extra}
          </Linear>
        </Creative>
      </Creatives>
    </InLine>
  </Ad>
</VAST>"#
    )
}

pub const MP4: &str = r#"<MediaFile type="video/mp4" delivery="progressive" bitrate="800" width="640" height="360"><![CDATA[https://cdn.example/ad-640.mp4]]></MediaFile>"#;
pub const MP4_HD: &str = r#"<MediaFile type="video/mp4" delivery="progressive" bitrate="2000" width="1280" height="720"><![CDATA[https://cdn.example/ad-1280.mp4]]></MediaFile>"#;
pub const WEBM: &str = r#"<MediaFile type="video/webm" delivery="progressive" bitrate="4000" width="640" height="360"><![CDATA[https://cdn.example/ad.webm]]></MediaFile>"#;
pub const MP3: &str = r#"<MediaFile type="audio/mpeg" delivery="progressive" bitrate="128"><![CDATA[https://cdn.example/ad.mp3]]></MediaFile>"#;
pub const JS_VPAID: &str = r#"<MediaFile type="application/javascript" apiFramework="VPAID" delivery="progressive" bitrate="300"><![CDATA[https://cdn.example/unit.js]]></MediaFile>"#;
pub const SWF_VPAID: &str = r#"<MediaFile type="application/x-shockwave-flash" apiFramework="VPAID" delivery="progressive"><![CDATA[https://cdn.example/unit.swf]]></MediaFile>"#;

pub const ICONS: &str = r#"<Icons>
  <Icon program="logo" width="100" height="100"><StaticResource creativeType="image/png"><![CDATA[https://cdn.example/100.png]]></StaticResource></Icon>
  <Icon program="logo" width="300" height="250"><StaticResource creativeType="image/png"><![CDATA[https://cdn.example/300.png]]></StaticResource></Icon>
  <Icon program="logo" width="1000" height="600"><StaticResource creativeType="image/png"><![CDATA[https://cdn.example/1000.png]]></StaticResource></Icon>
</Icons>"#;

pub fn wrapper_ad(next: &str, impression: &str) -> String {
    format!(
        r#"<VAST version="3.0"><Ad id="w-1"><Wrapper>
            <AdSystem>Exchange</AdSystem>
            <VASTAdTagURI><![CDATA[{next}]]></VASTAdTagURI>
            <Impression><![CDATA[{impression}]]></Impression>
            <Creatives><Creative><Linear>
              <TrackingEvents><Tracking event="start"><![CDATA[{impression}/start]]></Tracking></TrackingEvents>
            </Linear></Creative></Creatives>
        </Wrapper></Ad></VAST>"#
    )
}
