use crate::config::PlayerConfig;
use crate::error::{PlayerError, PlayerResult};
use crate::models::{Icon, MediaFile, Vast};
use crate::renderer::{FlashVpaid, HtmlAudio, HtmlVideo, JavaScriptVpaid, Renderer, RendererKind};
use crate::surface::Container;
use serde::Serialize;
use std::sync::Arc;

pub const MIME_JAVASCRIPT: &str = "application/javascript";
pub const MIME_JAVASCRIPT_LEGACY: &str = "application/x-javascript";
pub const MIME_FLASH: &str = "application/x-shockwave-flash";

/// The renderer chosen for an ad and what it will load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub kind: RendererKind,
    pub media_files: Vec<MediaFile>,
    pub icons: Vec<Icon>,
    pub ad_parameters: Option<String>,
}

fn is_javascript_vpaid(file: &MediaFile) -> bool {
    file.is_vpaid() && (file.mime_type == MIME_JAVASCRIPT || file.mime_type == MIME_JAVASCRIPT_LEGACY)
}

fn is_flash_vpaid(file: &MediaFile) -> bool {
    file.is_vpaid() && file.mime_type == MIME_FLASH
}

/// Pick a renderer for the first creative of the first ad.
///
/// JavaScript VPAID wins over Flash VPAID, which wins over an audio ad
/// with icons, which wins over plain video. Which file actually plays is
/// decided later by the renderer.
pub fn select_creative(vast: &Vast) -> PlayerResult<Selection> {
    let creative = vast
        .first_creative()
        .ok_or_else(|| PlayerError::Selection("the response has no ad with a creative".to_string()))?;

    let files = creative.media_files();
    if files.is_empty() {
        return Err(PlayerError::Selection("the creative has no media files".to_string()));
    }

    let ad_parameters = creative.ad_parameters().map(str::to_string);
    let subset = |pred: fn(&MediaFile) -> bool| -> Vec<MediaFile> {
        files.iter().filter(|file| pred(file)).cloned().collect()
    };

    let javascript = subset(is_javascript_vpaid);
    let flash = subset(is_flash_vpaid);
    let selection = if !javascript.is_empty() {
        Selection {
            kind: RendererKind::JavaScriptVpaid,
            media_files: javascript,
            icons: Vec::new(),
            ad_parameters,
        }
    } else if !flash.is_empty() {
        Selection {
            kind: RendererKind::FlashVpaid,
            media_files: flash,
            icons: Vec::new(),
            ad_parameters,
        }
    } else if !creative.icons().is_empty() {
        Selection {
            kind: RendererKind::HtmlAudio,
            media_files: files.to_vec(),
            icons: creative.icons().to_vec(),
            ad_parameters,
        }
    } else {
        Selection {
            kind: RendererKind::HtmlVideo,
            media_files: files.to_vec(),
            icons: Vec::new(),
            ad_parameters,
        }
    };

    log::debug!(
        "Selected {:?} with {} media file(s)",
        selection.kind,
        selection.media_files.len()
    );
    Ok(selection)
}

impl Selection {
    /// A fresh renderer of the selected kind, bound to `container`
    pub fn instantiate(&self, container: Arc<dyn Container>, config: &PlayerConfig) -> Arc<dyn Renderer> {
        match self.kind {
            RendererKind::JavaScriptVpaid => Arc::new(JavaScriptVpaid::new(container)),
            RendererKind::FlashVpaid => Arc::new(FlashVpaid::new(container, config.vpaid.swf_uri.clone())),
            RendererKind::HtmlAudio => Arc::new(HtmlAudio::new(container).with_icons(self.icons.clone())),
            RendererKind::HtmlVideo => Arc::new(HtmlVideo::new(container)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_vast;

    fn vast_with(media_files: &str, icons: &str) -> Vast {
        let xml = format!(
            r#"<VAST version="3.0">
              <Ad id="1"><InLine>
                <AdSystem>Test</AdSystem><AdTitle>Ad</AdTitle>
                <Impression><![CDATA[https://t.example/imp]]></Impression>
                <Creatives><Creative><Linear>
                  <Duration>00:00:15</Duration>
                  <AdParameters><![CDATA[{{"id":7}}]]></AdParameters>
                  <MediaFiles>{}</MediaFiles>
                  {}
                </Linear></Creative></Creatives>
              </InLine></Ad>
            </VAST>"#,
            media_files, icons
        );
        parse_vast(&xml).unwrap()
    }

    const MP4: &str = r#"<MediaFile type="video/mp4" delivery="progressive" width="640" height="360"><![CDATA[https://cdn.example/ad.mp4]]></MediaFile>"#;
    const JS: &str = r#"<MediaFile type="application/javascript" apiFramework="VPAID" delivery="progressive"><![CDATA[https://cdn.example/unit.js]]></MediaFile>"#;
    const SWF: &str = r#"<MediaFile type="application/x-shockwave-flash" apiFramework="VPAID" delivery="progressive"><![CDATA[https://cdn.example/unit.swf]]></MediaFile>"#;
    const ICONS: &str = r#"<Icons><Icon program="logo" width="100" height="100"><StaticResource creativeType="image/png"><![CDATA[https://cdn.example/logo.png]]></StaticResource></Icon></Icons>"#;

    #[test]
    fn javascript_vpaid_wins_over_everything() {
        let vast = vast_with(&format!("{}{}{}{}", MP4, SWF, JS, JS), ICONS);
        let selection = select_creative(&vast).unwrap();
        assert_eq!(selection.kind, RendererKind::JavaScriptVpaid);
        assert_eq!(selection.media_files.len(), 2);
        assert!(selection.media_files.iter().all(|f| f.mime_type == MIME_JAVASCRIPT));
        assert_eq!(selection.ad_parameters.as_deref(), Some(r#"{"id":7}"#));
    }

    #[test]
    fn legacy_javascript_type_counts() {
        let legacy = JS.replace(MIME_JAVASCRIPT, MIME_JAVASCRIPT_LEGACY);
        let selection = select_creative(&vast_with(&legacy, "")).unwrap();
        assert_eq!(selection.kind, RendererKind::JavaScriptVpaid);
    }

    #[test]
    fn flash_vpaid_beats_icons_and_video() {
        let selection = select_creative(&vast_with(&format!("{}{}", MP4, SWF), ICONS)).unwrap();
        assert_eq!(selection.kind, RendererKind::FlashVpaid);
        assert_eq!(selection.media_files.len(), 1);
    }

    #[test]
    fn javascript_without_vpaid_framework_is_plain_media() {
        let plain = JS.replace(r#" apiFramework="VPAID""#, "");
        let selection = select_creative(&vast_with(&format!("{}{}", plain, MP4), "")).unwrap();
        assert_eq!(selection.kind, RendererKind::HtmlVideo);
        assert_eq!(selection.media_files.len(), 2);
    }

    #[test]
    fn icons_select_audio() {
        let selection = select_creative(&vast_with(MP4, ICONS)).unwrap();
        assert_eq!(selection.kind, RendererKind::HtmlAudio);
        assert_eq!(selection.icons.len(), 1);
        assert_eq!(selection.icons[0].resource, "https://cdn.example/logo.png");
    }

    #[test]
    fn plain_files_select_video() {
        let selection = select_creative(&vast_with(MP4, "")).unwrap();
        assert_eq!(selection.kind, RendererKind::HtmlVideo);
        assert!(selection.icons.is_empty());
    }

    #[test]
    fn empty_response_is_a_selection_error() {
        let vast = parse_vast(r#"<VAST version="3.0"></VAST>"#).unwrap();
        assert!(matches!(select_creative(&vast), Err(PlayerError::Selection(_))));
    }

    #[test]
    fn creative_without_media_is_a_selection_error() {
        assert!(matches!(
            select_creative(&vast_with("", "")),
            Err(PlayerError::Selection(_))
        ));
    }
}
