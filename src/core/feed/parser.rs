use chrono::{DateTime, Utc};

use super::types::{ParsedChannel, ParsedEntry};

#[derive(Debug, thiserror::Error)]
pub enum FeedParseError {
    #[error("feed payload is empty")]
    EmptyPayload,
    #[error("feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("xml parse error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("document is not an RSS channel")]
    NotRss,
}

/// Decodes an RSS-2.0-shaped document into a channel and its items, in
/// document order. Text fields get one entity-repair pass on top of the XML
/// decode, so feeds that double-encode (`&amp;amp;`) come out clean.
pub fn parse_channel(raw: &[u8]) -> Result<ParsedChannel, FeedParseError> {
    let trimmed = trim_leading_ascii_whitespace(raw);
    if trimmed.is_empty() {
        return Err(FeedParseError::EmptyPayload);
    }
    let text = std::str::from_utf8(trimmed)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if !root.has_tag_name("rss") {
        return Err(FeedParseError::NotRss);
    }
    let channel = root
        .children()
        .find(|node| node.has_tag_name("channel"))
        .ok_or(FeedParseError::NotRss)?;

    let entries = channel
        .children()
        .filter(|node| node.has_tag_name("item"))
        .map(entry_from_item)
        .collect();

    Ok(ParsedChannel {
        title: repair_text(&child_text(channel, "title").unwrap_or_default()),
        link: child_text(channel, "link").unwrap_or_default(),
        description: repair_text(&child_text(channel, "description").unwrap_or_default()),
        entries,
    })
}

fn entry_from_item(item: roxmltree::Node<'_, '_>) -> ParsedEntry {
    let published_raw = child_text(item, "pubDate");
    let published_at = published_raw.as_deref().and_then(parse_publish_date);

    ParsedEntry {
        title: repair_text(&child_text(item, "title").unwrap_or_default()),
        link: child_text(item, "link").unwrap_or_default(),
        description: child_text(item, "description").map(|text| repair_text(&text)),
        published_raw,
        published_at,
    }
}

/// Attempts the supported publish-date formats in order; a string matching
/// none of them yields `None`, never an error.
pub fn parse_publish_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // RFC 1123 with a numeric ("-0700") or named ("MST") zone; chrono's
    // RFC 2822 parser accepts both spellings.
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Plain ISO-8601 UTC ("2006-01-02T22:04:05Z").
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    None
}

// Some feeds escape their text twice; the XML decode leaves "&amp;" behind
// and this second pass takes it the rest of the way.
fn repair_text(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}

fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
}

fn trim_leading_ascii_whitespace(raw: &[u8]) -> &[u8] {
    let mut index = 0;
    while index < raw.len() && raw[index].is_ascii_whitespace() {
        index += 1;
    }
    &raw[index..]
}
