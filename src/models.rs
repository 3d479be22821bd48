use serde::{Deserialize, Serialize};

/// Represents a VAST document (Video Ad Serving Template)
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Vast {
    /// The VAST version (e.g., "2.0", "3.0", "4.0", etc.)
    pub version: String,

    /// The Ad elements within the VAST document
    pub ads: Vec<Ad>,

    /// Document-level error tracking URLs (used for "no ad" responses)
    pub errors: Vec<String>,
}

/// Represents an Ad within a VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Ad {
    /// The ad ID
    pub id: Option<String>,

    /// The ad sequence number (for ad pods)
    pub sequence: Option<u32>,

    /// The in-line ad details
    pub inline: Option<InLine>,

    /// The wrapper ad details
    pub wrapper: Option<Wrapper>,
}

/// Represents an InLine ad, which contains all the media files and tracking information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct InLine {
    /// The ad system name and version
    pub ad_system: AdSystem,

    /// The ad title
    pub ad_title: String,

    /// Impression tracking URLs
    pub impressions: Vec<Impression>,

    /// The description of the ad
    pub description: Option<String>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    /// Creative elements
    pub creatives: Vec<Creative>,
}

/// Represents a Wrapper ad, which references another VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Wrapper {
    /// The ad system name and version
    pub ad_system: AdSystem,

    /// The URL of the next VAST document
    pub vast_ad_tag_uri: String,

    /// Impression tracking URLs
    pub impressions: Vec<Impression>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    /// Creative elements (tracking only, wrappers carry no media)
    pub creatives: Vec<Creative>,
}

/// Represents the ad system information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct AdSystem {
    pub name: String,
    pub version: Option<String>,
}

/// Represents an impression tracking URL
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Impression {
    pub id: Option<String>,
    pub url: String,
}

/// Represents a creative element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Creative {
    /// The creative ID
    pub id: Option<String>,

    /// The creative sequence number
    pub sequence: Option<u32>,

    /// The creative ad ID
    pub ad_id: Option<String>,

    /// Linear ad details
    pub linear: Option<Linear>,
}

/// Represents a linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Linear {
    /// The duration of the ad
    pub duration: Option<String>,

    /// Opaque creative data handed to VPAID units
    pub ad_parameters: Option<String>,

    /// Media files
    pub media_files: Vec<MediaFile>,

    /// Video clicks
    pub video_clicks: Option<VideoClicks>,

    /// Tracking events
    pub tracking_events: Vec<TrackingEvent>,

    /// Industry icons; audio ads render one as a companion image
    pub icons: Vec<Icon>,
}

/// Represents a media file
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct MediaFile {
    /// The media file URL
    pub url: String,

    /// The media file MIME type
    pub mime_type: String,

    /// The API framework required to run the file (e.g. "VPAID")
    pub api_framework: Option<String>,

    /// The media file codec
    pub codec: Option<String>,

    /// The media file bitrate
    pub bitrate: Option<u32>,

    /// The media file width
    pub width: Option<u32>,

    /// The media file height
    pub height: Option<u32>,

    /// The media file delivery type (progressive or streaming)
    pub delivery: Option<String>,
}

impl MediaFile {
    pub fn is_vpaid(&self) -> bool {
        self.api_framework.as_deref() == Some("VPAID")
    }
}

/// Represents video click-through and click-tracking URLs
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct VideoClicks {
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
    pub custom_click: Vec<String>,
}

/// Represents a tracking event
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TrackingEvent {
    /// The event type (e.g., "start", "firstQuartile", "midpoint", "thirdQuartile", "complete", etc.)
    pub event: String,

    /// The tracking URL
    pub url: String,
}

/// Represents an icon attached to a linear creative
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Icon {
    pub program: Option<String>,
    pub width: u32,
    pub height: u32,

    /// The StaticResource image URL
    pub resource: String,

    pub click_through: Option<String>,
}

/// One tracking pixel: the event that triggers it and the URI to request
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct TrackingDescriptor {
    pub event: String,
    pub uri: String,
}

impl TrackingDescriptor {
    pub fn new(event: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            uri: uri.into(),
        }
    }
}

impl Vast {
    pub fn first_ad(&self) -> Option<&Ad> {
        self.ads.first()
    }

    /// The creative the player renders. Ad pods are not supported, so only
    /// the first creative of the first ad is ever considered.
    pub fn first_creative(&self) -> Option<&Creative> {
        self.first_ad().and_then(|ad| ad.creatives().first())
    }

    /// Flatten the first ad's tracking into pixels, in document order:
    /// impressions, errors, linear tracking events, then click tracking.
    pub fn tracking_descriptors(&self) -> Vec<TrackingDescriptor> {
        let mut pixels = Vec::new();
        let Some(ad) = self.first_ad() else {
            return pixels;
        };

        for impression in ad.impressions() {
            pixels.push(TrackingDescriptor::new("impression", impression.url.clone()));
        }
        for uri in ad.error_urls() {
            pixels.push(TrackingDescriptor::new("error", uri.clone()));
        }
        if let Some(creative) = self.first_creative() {
            for event in creative.tracking_events() {
                pixels.push(TrackingDescriptor::new(event.event.clone(), event.url.clone()));
            }
            for uri in creative.click_tracking() {
                pixels.push(TrackingDescriptor::new("clickThrough", uri.clone()));
            }
        }

        pixels
    }
}

impl Ad {
    pub fn is_wrapper(&self) -> bool {
        self.inline.is_none() && self.wrapper.is_some()
    }

    pub fn impressions(&self) -> &[Impression] {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => &inline.impressions,
            (None, Some(wrapper)) => &wrapper.impressions,
            (None, None) => &[],
        }
    }

    pub fn error_urls(&self) -> &[String] {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => &inline.errors,
            (None, Some(wrapper)) => &wrapper.errors,
            (None, None) => &[],
        }
    }

    /// Creatives of the inline ad. Wrapper creatives only carry tracking
    /// and are never rendered, so they are not returned here.
    pub fn creatives(&self) -> &[Creative] {
        match &self.inline {
            Some(inline) => &inline.creatives,
            None => &[],
        }
    }
}

impl Creative {
    pub fn media_files(&self) -> &[MediaFile] {
        self.linear.as_ref().map_or(&[], |linear| &linear.media_files)
    }

    pub fn tracking_events(&self) -> &[TrackingEvent] {
        self.linear.as_ref().map_or(&[], |linear| &linear.tracking_events)
    }

    pub fn icons(&self) -> &[Icon] {
        self.linear.as_ref().map_or(&[], |linear| &linear.icons)
    }

    pub fn ad_parameters(&self) -> Option<&str> {
        self.linear.as_ref()?.ad_parameters.as_deref()
    }

    pub fn click_through(&self) -> Option<&str> {
        self.video_clicks()?.click_through.as_deref()
    }

    pub fn click_tracking(&self) -> &[String] {
        self.video_clicks().map_or(&[], |clicks| &clicks.click_tracking)
    }

    fn video_clicks(&self) -> Option<&VideoClicks> {
        self.linear.as_ref()?.video_clicks.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad_with_tracking() -> Vast {
        Vast {
            version: "3.0".to_string(),
            ads: vec![Ad {
                inline: Some(InLine {
                    impressions: vec![Impression {
                        id: None,
                        url: "https://t.example/imp".to_string(),
                    }],
                    errors: vec!["https://t.example/err".to_string()],
                    creatives: vec![Creative {
                        linear: Some(Linear {
                            tracking_events: vec![TrackingEvent {
                                event: "start".to_string(),
                                url: "https://t.example/start".to_string(),
                            }],
                            video_clicks: Some(VideoClicks {
                                click_through: Some("https://brand.example".to_string()),
                                click_tracking: vec!["https://t.example/click".to_string()],
                                custom_click: Vec::new(),
                            }),
                            ..Linear::default()
                        }),
                        ..Creative::default()
                    }],
                    ..InLine::default()
                }),
                ..Ad::default()
            }],
            errors: Vec::new(),
        }
    }

    #[test]
    fn tracking_descriptors_keep_document_order() {
        let events: Vec<_> = ad_with_tracking()
            .tracking_descriptors()
            .into_iter()
            .map(|pixel| pixel.event)
            .collect();
        assert_eq!(events, ["impression", "error", "start", "clickThrough"]);
    }

    #[test]
    fn empty_document_has_no_creative_or_pixels() {
        let vast = Vast::default();
        assert!(vast.first_creative().is_none());
        assert!(vast.tracking_descriptors().is_empty());
    }

    #[test]
    fn creative_accessors_tolerate_missing_linear() {
        let creative = Creative::default();
        assert!(creative.media_files().is_empty());
        assert!(creative.click_through().is_none());
        assert!(creative.ad_parameters().is_none());
    }

    #[test]
    fn click_through_comes_from_video_clicks() {
        let vast = ad_with_tracking();
        let creative = vast.first_creative().unwrap();
        assert_eq!(creative.click_through(), Some("https://brand.example"));
    }
}
