use chrono::{DateTime, Utc};

/// Channel-level metadata and items decoded from one RSS document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChannel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub entries: Vec<ParsedEntry>,
}

/// One raw item found inside a fetched feed document, prior to persistence.
///
/// `published_raw` keeps the original `pubDate` text; `published_at` is the
/// normalized instant, unset when the text matches none of the supported
/// formats.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub published_raw: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}
