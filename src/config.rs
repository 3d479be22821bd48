use crate::tracking::TrackingMapper;
use serde::{Deserialize, Serialize};

/// Bridge SWF that hosts Flash VPAID units
pub const DEFAULT_VPAID_SWF_URI: &str =
    "https://cdn.jsdelivr.net/npm/vast-player@0.2/dist/vast-player--vpaid.swf";

/// How VAST documents are fetched and unwrapped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VastOptions {
    /// Follow wrapper ads to their inline ad
    pub resolve_wrappers: bool,

    /// Maximum number of wrapper hops
    pub max_redirects: u32,

    /// Per-request fetch timeout, in milliseconds
    pub timeout_ms: u64,
}

impl Default for VastOptions {
    fn default() -> Self {
        Self {
            resolve_wrappers: true,
            max_redirects: 5,
            timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpaidOptions {
    pub swf_uri: String,
}

impl Default for VpaidOptions {
    fn default() -> Self {
        Self {
            swf_uri: DEFAULT_VPAID_SWF_URI.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackingOptions {
    /// Applied to every pixel URI before it is fired
    pub mapper: TrackingMapper,
}

/// Fully resolved player configuration
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    pub vast: VastOptions,
    pub vpaid: VpaidOptions,
    pub tracking: TrackingOptions,
}

/// Caller-supplied options. Every field is optional; anything left unset
/// falls back to the built-in default, however deeply it is nested.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerOptions {
    pub vast: VastOverrides,
    pub vpaid: VpaidOverrides,
    #[serde(skip)]
    pub tracking: TrackingOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VastOverrides {
    #[serde(alias = "resolveWrappers")]
    pub resolve_wrappers: Option<bool>,
    #[serde(alias = "maxRedirects")]
    pub max_redirects: Option<u32>,
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VpaidOverrides {
    #[serde(alias = "swfUri")]
    pub swf_uri: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackingOverrides {
    pub mapper: Option<TrackingMapper>,
}

impl PlayerOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| format!("toml parse error: {}", e))
    }

    pub fn with_mapper(mut self, mapper: TrackingMapper) -> Self {
        self.tracking.mapper = Some(mapper);
        self
    }

    /// Deep-merge these options over the defaults
    pub fn resolve(self) -> PlayerConfig {
        let vast_defaults = VastOptions::default();
        let vpaid_defaults = VpaidOptions::default();

        PlayerConfig {
            vast: VastOptions {
                resolve_wrappers: self
                    .vast
                    .resolve_wrappers
                    .unwrap_or(vast_defaults.resolve_wrappers),
                max_redirects: self.vast.max_redirects.unwrap_or(vast_defaults.max_redirects),
                timeout_ms: self.vast.timeout_ms.unwrap_or(vast_defaults.timeout_ms),
            },
            vpaid: VpaidOptions {
                swf_uri: self.vpaid.swf_uri.unwrap_or(vpaid_defaults.swf_uri),
            },
            tracking: TrackingOptions {
                mapper: self.tracking.mapper.unwrap_or_default(),
            },
        }
    }
}

impl From<PlayerOptions> for PlayerConfig {
    fn from(options: PlayerOptions) -> Self {
        options.resolve()
    }
}
