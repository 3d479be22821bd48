use crate::error::{Result, VastError};
use crate::models::*;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::str::from_utf8;

type XmlReader<'a> = Reader<&'a [u8]>;

/// Parse a VAST XML string into a Vast struct
pub fn parse_vast(xml: &str) -> Result<Vast> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut vast = Vast::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"VAST" => {
                vast.version = attr_value(e, b"version")
                    .ok_or_else(|| VastError::MissingField("VAST version".to_string()))?;
                parse_vast_children(&mut reader, &mut vast)?;
                break;
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"VAST" => {
                // <VAST version="3.0"/> is a valid "no ad" response
                vast.version = attr_value(e, b"version")
                    .ok_or_else(|| VastError::MissingField("VAST version".to_string()))?;
                break;
            }
            Ok(Event::Eof) => {
                return Err(VastError::MissingField("VAST root element".to_string()));
            }
            Err(e) => return Err(VastError::XmlParseError(e)),
            _ => (),
        }
        buf.clear();
    }

    Ok(vast)
}

fn parse_vast_children(reader: &mut XmlReader, vast: &mut Vast) -> Result<()> {
    for_each_child(reader, b"VAST", |reader, e| {
        match e.name().as_ref() {
            b"Ad" => vast.ads.push(parse_ad(reader, e)?),
            b"Error" => vast.errors.push(read_text_element(reader)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })
}

fn parse_ad(reader: &mut XmlReader, start: &BytesStart) -> Result<Ad> {
    let mut ad = Ad {
        id: attr_value(start, b"id"),
        sequence: attr_parse(start, b"sequence"),
        ..Ad::default()
    };

    for_each_child(reader, b"Ad", |reader, e| {
        match e.name().as_ref() {
            b"InLine" => ad.inline = Some(parse_inline(reader)?),
            b"Wrapper" => ad.wrapper = Some(parse_wrapper(reader)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(ad)
}

fn parse_inline(reader: &mut XmlReader) -> Result<InLine> {
    let mut inline = InLine::default();

    for_each_child(reader, b"InLine", |reader, e| {
        match e.name().as_ref() {
            b"AdSystem" => inline.ad_system = parse_ad_system(reader, e)?,
            b"AdTitle" => inline.ad_title = read_text_element(reader)?,
            b"Impression" => inline.impressions.push(parse_impression(reader, e)?),
            b"Description" => inline.description = Some(read_text_element(reader)?),
            b"Error" => inline.errors.push(read_text_element(reader)?),
            b"Creatives" => inline.creatives = parse_creatives(reader)?,
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(inline)
}

fn parse_wrapper(reader: &mut XmlReader) -> Result<Wrapper> {
    let mut wrapper = Wrapper::default();

    for_each_child(reader, b"Wrapper", |reader, e| {
        match e.name().as_ref() {
            b"AdSystem" => wrapper.ad_system = parse_ad_system(reader, e)?,
            b"VASTAdTagURI" => wrapper.vast_ad_tag_uri = read_text_element(reader)?,
            b"Impression" => wrapper.impressions.push(parse_impression(reader, e)?),
            b"Error" => wrapper.errors.push(read_text_element(reader)?),
            b"Creatives" => wrapper.creatives = parse_creatives(reader)?,
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    if wrapper.vast_ad_tag_uri.is_empty() {
        return Err(VastError::MissingField("Wrapper VASTAdTagURI".to_string()));
    }

    Ok(wrapper)
}

fn parse_ad_system(reader: &mut XmlReader, start: &BytesStart) -> Result<AdSystem> {
    Ok(AdSystem {
        version: attr_value(start, b"version"),
        name: read_text_element(reader)?,
    })
}

fn parse_impression(reader: &mut XmlReader, start: &BytesStart) -> Result<Impression> {
    Ok(Impression {
        id: attr_value(start, b"id"),
        url: read_text_element(reader)?,
    })
}

fn parse_creatives(reader: &mut XmlReader) -> Result<Vec<Creative>> {
    let mut creatives = Vec::new();

    for_each_child(reader, b"Creatives", |reader, e| {
        match e.name().as_ref() {
            b"Creative" => creatives.push(parse_creative(reader, e)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(creatives)
}

fn parse_creative(reader: &mut XmlReader, start: &BytesStart) -> Result<Creative> {
    let mut creative = Creative {
        id: attr_value(start, b"id"),
        sequence: attr_parse(start, b"sequence"),
        // VAST 2 spells it AdID, VAST 3+ adId
        ad_id: attr_value(start, b"adId").or_else(|| attr_value(start, b"AdID")),
        linear: None,
    };

    // CompanionAds and NonLinearAds are never rendered, so they are skipped
    for_each_child(reader, b"Creative", |reader, e| {
        match e.name().as_ref() {
            b"Linear" => creative.linear = Some(parse_linear(reader)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(creative)
}

fn parse_linear(reader: &mut XmlReader) -> Result<Linear> {
    let mut linear = Linear::default();

    for_each_child(reader, b"Linear", |reader, e| {
        match e.name().as_ref() {
            b"Duration" => linear.duration = Some(read_text_element(reader)?),
            b"AdParameters" => linear.ad_parameters = Some(read_text_element(reader)?),
            b"MediaFiles" => linear.media_files = parse_media_files(reader)?,
            b"VideoClicks" => linear.video_clicks = Some(parse_video_clicks(reader)?),
            b"TrackingEvents" => linear.tracking_events = parse_tracking_events(reader)?,
            b"Icons" => linear.icons = parse_icons(reader)?,
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(linear)
}

fn parse_media_files(reader: &mut XmlReader) -> Result<Vec<MediaFile>> {
    let mut media_files = Vec::new();

    for_each_child(reader, b"MediaFiles", |reader, e| {
        match e.name().as_ref() {
            b"MediaFile" => media_files.push(parse_media_file(reader, e)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(media_files)
}

fn parse_media_file(reader: &mut XmlReader, start: &BytesStart) -> Result<MediaFile> {
    Ok(MediaFile {
        mime_type: attr_value(start, b"type").unwrap_or_default(),
        api_framework: attr_value(start, b"apiFramework"),
        codec: attr_value(start, b"codec"),
        bitrate: attr_parse(start, b"bitrate"),
        width: attr_parse(start, b"width"),
        height: attr_parse(start, b"height"),
        delivery: attr_value(start, b"delivery"),
        url: read_text_element(reader)?,
    })
}

fn parse_video_clicks(reader: &mut XmlReader) -> Result<VideoClicks> {
    let mut video_clicks = VideoClicks::default();

    for_each_child(reader, b"VideoClicks", |reader, e| {
        match e.name().as_ref() {
            b"ClickThrough" => video_clicks.click_through = Some(read_text_element(reader)?),
            b"ClickTracking" => video_clicks.click_tracking.push(read_text_element(reader)?),
            b"CustomClick" => video_clicks.custom_click.push(read_text_element(reader)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(video_clicks)
}

fn parse_tracking_events(reader: &mut XmlReader) -> Result<Vec<TrackingEvent>> {
    let mut tracking_events = Vec::new();

    for_each_child(reader, b"TrackingEvents", |reader, e| {
        match e.name().as_ref() {
            b"Tracking" => tracking_events.push(TrackingEvent {
                event: attr_value(e, b"event").unwrap_or_default(),
                url: read_text_element(reader)?,
            }),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(tracking_events)
}

fn parse_icons(reader: &mut XmlReader) -> Result<Vec<Icon>> {
    let mut icons = Vec::new();

    for_each_child(reader, b"Icons", |reader, e| {
        match e.name().as_ref() {
            b"Icon" => icons.push(parse_icon(reader, e)?),
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(icons)
}

fn parse_icon(reader: &mut XmlReader, start: &BytesStart) -> Result<Icon> {
    let mut icon = Icon {
        program: attr_value(start, b"program"),
        width: attr_parse(start, b"width").unwrap_or(0),
        height: attr_parse(start, b"height").unwrap_or(0),
        ..Icon::default()
    };

    for_each_child(reader, b"Icon", |reader, e| {
        match e.name().as_ref() {
            b"StaticResource" => icon.resource = read_text_element(reader)?,
            b"IconClicks" => {
                for_each_child(reader, b"IconClicks", |reader, e| {
                    match e.name().as_ref() {
                        b"IconClickThrough" => {
                            icon.click_through = Some(read_text_element(reader)?)
                        }
                        name => skip_element(reader, name)?,
                    }
                    Ok(())
                })?;
            }
            name => skip_element(reader, name)?,
        }
        Ok(())
    })?;

    Ok(icon)
}

/// Walk the direct child elements of `parent` until its end tag, handing
/// each opening tag to `visit`. `visit` must consume the child's end tag.
fn for_each_child<F>(reader: &mut XmlReader, parent: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(&mut XmlReader, &BytesStart) -> Result<()>,
{
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => visit(reader, e)?,
            Ok(Event::End(ref e)) if e.name().as_ref() == parent => break,
            Ok(Event::Eof) => {
                return Err(VastError::Other("Unexpected end of file".to_string()));
            }
            Err(e) => return Err(VastError::XmlParseError(e)),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Read the text content of the current element, up to its end tag
fn read_text_element(reader: &mut XmlReader) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(e)) => {
                text.push_str(&e.unescape()?);
            }
            Ok(Event::CData(e)) => {
                if let Ok(value) = from_utf8(&e) {
                    text.push_str(value);
                }
            }
            Ok(Event::End(_)) => break,
            Ok(Event::Eof) => {
                return Err(VastError::Other("Unexpected end of file".to_string()));
            }
            Err(e) => return Err(VastError::XmlParseError(e)),
            _ => (),
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}

/// Skip the current element and all of its children. The opening tag has
/// already been consumed.
fn skip_element(reader: &mut XmlReader, name: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(ref e)) => {
                if depth == 0 {
                    if e.name().as_ref() != name {
                        return Err(VastError::Other(format!(
                            "Mismatched end tag while skipping {}",
                            String::from_utf8_lossy(name)
                        )));
                    }
                    break;
                }
                depth -= 1;
            }
            Ok(Event::Eof) => {
                return Err(VastError::Other("Unexpected end of file".to_string()));
            }
            Err(e) => return Err(VastError::XmlParseError(e)),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

fn attr_value(start: &BytesStart, key: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| from_utf8(&attr.value).ok().map(|value| value.trim().to_string()))
}

fn attr_parse<T: std::str::FromStr>(start: &BytesStart, key: &[u8]) -> Option<T> {
    attr_value(start, key).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INLINE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VAST version="3.0">
  <Ad id="ad-1">
    <InLine>
      <AdSystem version="1.0">Test</AdSystem>
      <AdTitle>Spot</AdTitle>
      <Impression id="a"><![CDATA[https://t.example/imp?cb=[CACHEBUSTING]]]></Impression>
      <Impression><![CDATA[https://t.example/imp2]]></Impression>
      <Error>https://t.example/err?code=[ERRORCODE]</Error>
      <Extensions><Extension type="x"><Nested>ignored</Nested></Extension></Extensions>
      <Creatives>
        <Creative id="c-1" sequence="1">
          <Linear>
            <Duration>00:00:15</Duration>
            <AdParameters><![CDATA[{"id":42}]]></AdParameters>
            <TrackingEvents>
              <Tracking event="start">https://t.example/start</Tracking>
              <Tracking event="complete">https://t.example/complete</Tracking>
            </TrackingEvents>
            <VideoClicks>
              <ClickThrough>https://brand.example/</ClickThrough>
              <ClickTracking>https://t.example/click</ClickTracking>
            </VideoClicks>
            <MediaFiles>
              <MediaFile delivery="progressive" type="video/mp4" bitrate="800" width="640" height="360">
                https://cdn.example/640.mp4
              </MediaFile>
              <MediaFile type="application/javascript" apiFramework="VPAID">https://cdn.example/unit.js</MediaFile>
            </MediaFiles>
            <Icons>
              <Icon program="AdChoices" width="300" height="250">
                <StaticResource creativeType="image/png">https://cdn.example/300.png</StaticResource>
                <IconClicks><IconClickThrough>https://brand.example/icon</IconClickThrough></IconClicks>
              </Icon>
            </Icons>
          </Linear>
        </Creative>
        <Creative><CompanionAds><Companion width="300" height="250"/></CompanionAds></Creative>
      </Creatives>
    </InLine>
  </Ad>
</VAST>"#;

    #[test]
    fn parses_inline_ad() {
        let vast = parse_vast(INLINE).unwrap();
        assert_eq!(vast.version, "3.0");
        assert_eq!(vast.ads.len(), 1);

        let ad = &vast.ads[0];
        assert_eq!(ad.id.as_deref(), Some("ad-1"));
        assert_eq!(ad.impressions().len(), 2);
        assert_eq!(ad.impressions()[0].url, "https://t.example/imp?cb=[CACHEBUSTING]");
        assert_eq!(ad.error_urls(), ["https://t.example/err?code=[ERRORCODE]"]);
        assert_eq!(ad.creatives().len(), 2);

        let creative = vast.first_creative().unwrap();
        assert_eq!(creative.ad_parameters(), Some(r#"{"id":42}"#));
        assert_eq!(creative.click_through(), Some("https://brand.example/"));
        assert_eq!(creative.tracking_events().len(), 2);

        let files = creative.media_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].url, "https://cdn.example/640.mp4");
        assert_eq!(files[0].bitrate, Some(800));
        assert_eq!(files[0].width, Some(640));
        assert!(!files[0].is_vpaid());
        assert!(files[1].is_vpaid());

        let icons = creative.icons();
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].width, 300);
        assert_eq!(icons[0].resource, "https://cdn.example/300.png");
        assert_eq!(icons[0].click_through.as_deref(), Some("https://brand.example/icon"));
    }

    #[test]
    fn parses_wrapper_ad() {
        let xml = r#"<VAST version="2.0"><Ad><Wrapper>
            <AdSystem>W</AdSystem>
            <VASTAdTagURI><![CDATA[https://ads.example/next]]></VASTAdTagURI>
            <Impression>https://t.example/wrapper-imp</Impression>
        </Wrapper></Ad></VAST>"#;
        let vast = parse_vast(xml).unwrap();
        let ad = vast.first_ad().unwrap();
        assert!(ad.is_wrapper());
        assert_eq!(ad.wrapper.as_ref().unwrap().vast_ad_tag_uri, "https://ads.example/next");
        assert!(ad.creatives().is_empty());
    }

    #[test]
    fn empty_vast_is_a_no_ad_response() {
        let vast = parse_vast(r#"<VAST version="3.0"/>"#).unwrap();
        assert!(vast.ads.is_empty());
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = parse_vast("<VAST><Ad/></VAST>").unwrap_err();
        assert!(matches!(err, VastError::MissingField(_)));
    }

    #[test]
    fn non_vast_document_is_rejected() {
        assert!(parse_vast("<html><body>nope</body></html>").is_err());
        assert!(parse_vast("").is_err());
    }

    #[test]
    fn truncated_document_is_rejected() {
        assert!(parse_vast(r#"<VAST version="3.0"><Ad><InLine>"#).is_err());
    }
}
