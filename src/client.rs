use crate::config::VastOptions;
use crate::error::{Result, VastError};
use crate::models::{Impression, TrackingEvent, Vast, Wrapper};
use crate::parser;
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Source of raw VAST XML
#[async_trait]
pub trait VastFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<String>;
}

/// Fetches VAST over HTTP(S), or from disk for `file://` URIs and local paths
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VastError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn fetch_url(&self, uri: &str) -> Result<String> {
        // Random request ID to correlate log lines
        let req_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        let url = url::Url::parse(uri)?;
        log::debug!("[{}] Fetching VAST from {}", req_id, url);
        let start_time = std::time::Instant::now();

        let failed = |reason: String| VastError::FetchFailed {
            uri: uri.to_string(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            log::debug!("[{}] Request failed after {:?}", req_id, start_time.elapsed());
            failed(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP status {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("Failed to read response body: {}", e)))?;

        log::debug!("[{}] Completed in {:?}", req_id, start_time.elapsed());
        Ok(body)
    }
}

#[async_trait]
impl VastFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<String> {
        if let Some(path) = uri.strip_prefix("file://") {
            log::debug!("Reading VAST from file: {}", path);
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        if Path::new(uri).exists() {
            log::debug!("Reading VAST from local file: {}", uri);
            return Ok(tokio::fs::read_to_string(uri).await?);
        }

        self.fetch_url(uri).await
    }
}

/// Fetches a VAST document and unwraps wrapper chains. Each player owns its
/// own client, so fetchers are never shared behind the caller's back.
#[derive(Clone)]
pub struct VastClient {
    fetcher: Arc<dyn VastFetcher>,
}

impl VastClient {
    pub fn new(fetcher: Arc<dyn VastFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and parse `uri`. When wrappers are resolved, the tracking of
    /// every wrapper hop is carried into the inline ad that ends the chain.
    pub async fn get(&self, uri: &str, options: &VastOptions) -> Result<Vast> {
        let xml = self.fetcher.fetch(uri).await?;
        let mut vast = parser::parse_vast(&xml)?;

        if !options.resolve_wrappers {
            return Ok(vast);
        }

        let mut visited = HashSet::from([uri.to_string()]);
        let mut inherited = WrapperTracking::default();
        let mut hops = 0;

        while let Some(wrapper) = first_wrapper(&vast) {
            if hops >= options.max_redirects {
                return Err(VastError::TooManyRedirects(options.max_redirects));
            }
            hops += 1;

            let next = wrapper.vast_ad_tag_uri.clone();
            if !visited.insert(next.clone()) {
                return Err(VastError::WrapperCycle(next));
            }

            inherited.absorb(&wrapper);
            log::info!("Following wrapper {} ({}/{})", next, hops, options.max_redirects);

            let xml = self.fetcher.fetch(&next).await?;
            vast = parser::parse_vast(&xml)?;
        }

        inherited.apply(&mut vast);
        Ok(vast)
    }
}

fn first_wrapper(vast: &Vast) -> Option<Wrapper> {
    let ad = vast.first_ad()?;
    if ad.is_wrapper() { ad.wrapper.clone() } else { None }
}

/// Tracking collected from the wrappers of a chain
#[derive(Default)]
struct WrapperTracking {
    impressions: Vec<Impression>,
    errors: Vec<String>,
    tracking_events: Vec<TrackingEvent>,
    click_tracking: Vec<String>,
}

impl WrapperTracking {
    fn absorb(&mut self, wrapper: &Wrapper) {
        self.impressions.extend(wrapper.impressions.iter().cloned());
        self.errors.extend(wrapper.errors.iter().cloned());

        for linear in wrapper.creatives.iter().filter_map(|c| c.linear.as_ref()) {
            self.tracking_events.extend(linear.tracking_events.iter().cloned());
            if let Some(clicks) = &linear.video_clicks {
                self.click_tracking.extend(clicks.click_tracking.iter().cloned());
            }
        }
    }

    fn apply(self, vast: &mut Vast) {
        let Some(inline) = vast.ads.first_mut().and_then(|ad| ad.inline.as_mut()) else {
            return;
        };

        prepend(&mut inline.impressions, &self.impressions);
        prepend(&mut inline.errors, &self.errors);

        for linear in inline.creatives.iter_mut().filter_map(|c| c.linear.as_mut()) {
            prepend(&mut linear.tracking_events, &self.tracking_events);
            let clicks = linear.video_clicks.get_or_insert_with(Default::default);
            prepend(&mut clicks.click_tracking, &self.click_tracking);
        }
    }
}

fn prepend<T: Clone>(target: &mut Vec<T>, items: &[T]) {
    let own = std::mem::replace(target, items.to_vec());
    target.extend(own);
}
