//! The feed-polling and ingestion loop.
//!
//! One feed is in flight at a time: each tick claims the feed whose last
//! successful poll is oldest, records the poll, fetches and parses the
//! document, then persists each entry, skipping URLs that already exist.
//! Ticks tolerate partial failure; only startup configuration problems are
//! fatal.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::core::feed::fetcher::{self, FetchError};
use crate::core::feed::parser::{self, FeedParseError};
use crate::core::storage::models::NewPost;
use crate::core::storage::repository::{PostInsert, Repository, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("feed store failure: {0}")]
    Store(#[from] StorageError),
    #[error("fetching {url} failed: {source}")]
    Fetch { url: String, source: FetchError },
    #[error("parsing {url} failed: {source}")]
    Parse { url: String, source: FeedParseError },
}

/// What one tick did; duplicates and skips are expected steady state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub feed_url: Option<String>,
    pub created: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Ingestor {
    repository: Repository,
    client: reqwest::Client,
    interval: Duration,
}

impl Ingestor {
    pub fn new(repository: Repository, interval: Duration) -> Result<Self, FetchError> {
        let client = fetcher::build_client(fetcher::DEFAULT_FETCH_TIMEOUT)?;
        Ok(Self {
            repository,
            client,
            interval,
        })
    }

    /// Runs ticks forever, one per interval. The stop signal wakes the
    /// sleep and is observed at the top of the next iteration.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "ingestion loop started");
        loop {
            if *stop.borrow() {
                info!("stop signal received, leaving ingestion loop");
                return;
            }
            match self.tick().await {
                Ok(_) => {}
                Err(err @ TickError::Store(_)) => error!(error = %err, "tick skipped"),
                Err(err) => warn!(error = %err, "tick skipped"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.changed() => {}
            }
        }
    }

    /// One claim → mark polled → fetch → normalize → persist pass.
    pub async fn tick(&self) -> Result<TickReport, TickError> {
        let tick_started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let Some(feed) = self.repository.next_feed_to_poll().await? else {
            debug!("no feeds to poll");
            return Ok(TickReport::default());
        };

        // Poll-first: rotate the feed to the back of the queue before the
        // fetch, so a persistently failing feed cannot monopolize the
        // schedule.
        self.repository
            .mark_feed_polled(feed.id, &tick_started_at)
            .await?;

        let body = fetcher::fetch_feed(&self.client, &feed.url)
            .await
            .map_err(|source| TickError::Fetch {
                url: feed.url.clone(),
                source,
            })?;
        let channel = parser::parse_channel(&body).map_err(|source| TickError::Parse {
            url: feed.url.clone(),
            source,
        })?;

        let mut report = TickReport {
            feed_url: Some(feed.url.clone()),
            ..TickReport::default()
        };
        for entry in channel.entries {
            if entry.link.is_empty() {
                debug!(feed = %feed.url, title = %entry.title, "entry has no link, skipping");
                report.skipped += 1;
                continue;
            }
            let post = NewPost {
                feed_id: feed.id,
                title: entry.title,
                url: entry.link,
                description: entry.description,
                published_at: entry
                    .published_at
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            };
            match self.repository.insert_post(&post).await {
                Ok(PostInsert::Created) => report.created += 1,
                Ok(PostInsert::DuplicateUrl) => report.duplicates += 1,
                Err(err) => {
                    warn!(feed = %feed.url, url = %post.url, error = %err, "failed to persist post");
                    report.failed += 1;
                }
            }
        }

        info!(
            feed = %feed.url,
            created = report.created,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "tick finished"
        );
        Ok(report)
    }
}

/// Parses the operator-supplied poll interval ("45s", "10m", "1h30m",
/// "250ms"). Invalid strings are a fatal configuration error.
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(raw.to_string());
    let mut rest = raw.trim();
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(digits_end);
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let (amount, tail) = if let Some(tail) = tail.strip_prefix("ms") {
            (Duration::from_millis(value), tail)
        } else if let Some(tail) = tail.strip_prefix('s') {
            (Duration::from_secs(value), tail)
        } else if let Some(tail) = tail.strip_prefix('m') {
            let seconds = value.checked_mul(60).ok_or_else(invalid)?;
            (Duration::from_secs(seconds), tail)
        } else if let Some(tail) = tail.strip_prefix('h') {
            let seconds = value.checked_mul(3600).ok_or_else(invalid)?;
            (Duration::from_secs(seconds), tail)
        } else {
            return Err(invalid());
        };
        total = total.checked_add(amount).ok_or_else(invalid)?;
        rest = tail;
    }
    if total.is_zero() {
        return Err(invalid());
    }
    Ok(total)
}
