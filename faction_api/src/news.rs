use std::{collections::HashSet, time::Duration};

use chrono::Utc;
use faction_common::Secret;
use log::*;

use crate::{api::parse_json, GameApi, GameApiError, NewsEntry, NewsResponse, OutcomeKind, Transport};

pub const DEPOSIT_NEWS_CATEGORY: &str = "depositFunds";
const NEWS_PATH: &str = "/v2/faction/news";

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Maximum number of entries requested per page.
    pub page_size: usize,
    /// Hard ceiling on pages fetched per call to [`DepositFetcher::fetch_recent_deposits`].
    pub max_pages: usize,
    /// Local and upstream clocks further apart than this trigger a warning.
    pub max_clock_skew: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { page_size: 100, max_pages: 10, max_clock_skew: Duration::from_secs(60) }
    }
}

/// The deposit news collected for one faction.
#[derive(Debug, Clone, Default)]
pub struct DepositFeed {
    /// Unique entries within the window, newest first.
    pub entries: Vec<NewsEntry>,
    /// Inclusive window bounds in upstream unix time.
    pub from: i64,
    pub to: i64,
    /// Seconds to add to a local timestamp to express it in upstream time, measured when the window was chosen.
    pub clock_offset: i64,
    pub pages_fetched: usize,
    /// The page ceiling was hit before the window was covered. Older deposits may be missing.
    pub truncated: bool,
    /// Set when paging stopped early because a page request failed. The entries collected so far are still valid.
    pub interrupted_by: Option<OutcomeKind>,
}

impl DepositFeed {
    pub fn is_complete(&self) -> bool {
        !self.truncated && self.interrupted_by.is_none()
    }
}

/// Pages backwards through a faction's deposit news.
///
/// The fetcher keeps no state between calls. Each call covers `[upstream_now - lookback, upstream_now]`, so scheduled
/// reruns overlap and pick up anything a previous, partial run missed.
#[derive(Clone)]
pub struct DepositFetcher<T> {
    api: GameApi<T>,
    config: FeedConfig,
}

impl<T: Transport> DepositFetcher<T> {
    pub fn new(api: GameApi<T>, config: FeedConfig) -> Self {
        let config = FeedConfig { page_size: config.page_size.max(1), max_pages: config.max_pages.max(1), ..config };
        Self { api, config }
    }

    pub fn api(&self) -> &GameApi<T> {
        &self.api
    }

    /// Fetches deposit news for the last `lookback`.
    ///
    /// Fails only if the upstream clock cannot be read, in which case nothing has been collected. A failing page
    /// request ends paging and returns what was gathered so far, with [`DepositFeed::interrupted_by`] set.
    pub async fn fetch_recent_deposits(
        &self,
        credentials: &[Secret<String>],
        lookback: Duration,
    ) -> Result<DepositFeed, GameApiError> {
        let (now, clock_offset) = self.upstream_now(credentials).await?;
        let lookback = i64::try_from(lookback.as_secs()).unwrap_or(i64::MAX);
        let from = now.saturating_sub(lookback);
        let mut feed = DepositFeed { from, to: now, clock_offset, ..Default::default() };
        let mut seen = HashSet::new();
        let mut upper = now;
        loop {
            if feed.pages_fetched >= self.config.max_pages {
                error!(
                    "📰️ Hit the ceiling of {} news pages before reaching the start of the window. Deposits between \
                     {from} and {upper} were not fetched and may go unmatched until they are paid again.",
                    self.config.max_pages
                );
                feed.truncated = true;
                break;
            }
            let page = match self.fetch_page(credentials, from, upper).await {
                Ok(page) => page,
                Err(kind) => {
                    warn!(
                        "📰️ News page {} failed ({kind}). Returning the {} entries collected so far.",
                        feed.pages_fetched + 1,
                        feed.entries.len()
                    );
                    feed.interrupted_by = Some(kind);
                    break;
                },
            };
            feed.pages_fetched += 1;
            let page_len = page.len();
            let oldest = page.iter().map(|e| e.timestamp).min();
            let newest = page.iter().map(|e| e.timestamp).max();
            let mut fresh = 0usize;
            for entry in page {
                if entry.timestamp < from || entry.timestamp > now {
                    trace!("📰️ Ignoring news item {} outside the window", entry.id);
                    continue;
                }
                if seen.insert(entry.id.clone()) {
                    fresh += 1;
                    feed.entries.push(entry);
                }
            }
            trace!("📰️ Page {}: {page_len} items, {fresh} new", feed.pages_fetched);
            if page_len < self.config.page_size {
                break;
            }
            if fresh == 0 {
                debug!("📰️ Page {} held nothing new. Stopping.", feed.pages_fetched);
                break;
            }
            let (Some(oldest), Some(newest)) = (oldest, newest) else { break };
            let single_second = oldest == newest;
            if single_second {
                error!(
                    "📰️ A full page of {page_len} news items all carry the timestamp {oldest}. Any further items in \
                     that second cannot be fetched and may go unmatched until they are paid again."
                );
                feed.truncated = true;
            }
            if oldest <= from {
                break;
            }
            // The oldest second may hold more items than fitted on this page, so it is requested again. `seen` drops
            // the repeats.
            upper = if single_second { oldest - 1 } else { oldest };
        }
        debug!(
            "📰️ Collected {} deposit news items in {} page(s) for window [{from}, {now}]",
            feed.entries.len(),
            feed.pages_fetched
        );
        Ok(feed)
    }

    /// The upstream time, and the offset from the local clock to it.
    async fn upstream_now(&self, credentials: &[Secret<String>]) -> Result<(i64, i64), GameApiError> {
        let upstream = self.api.server_time(credentials).await?;
        let local = Utc::now();
        let offset = (upstream - local).num_seconds();
        let max_skew = i64::try_from(self.config.max_clock_skew.as_secs()).unwrap_or(i64::MAX);
        if offset.abs() > max_skew {
            warn!(
                "📰️ Local clock is {}s away from the upstream clock. Using upstream time for the news window and \
                 claim times.",
                offset.abs()
            );
        }
        Ok((upstream.timestamp(), offset))
    }

    async fn fetch_page(
        &self,
        credentials: &[Secret<String>],
        from: i64,
        to: i64,
    ) -> Result<Vec<NewsEntry>, OutcomeKind> {
        let params = [
            ("cat", DEPOSIT_NEWS_CATEGORY.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
            ("limit", self.config.page_size.to_string()),
            ("sort", "DESC".to_string()),
            ("striptags", "false".to_string()),
        ];
        let url = self.api.url(NEWS_PATH, &params).map_err(|e| {
            error!("📰️ {e}");
            OutcomeKind::ClientError
        })?;
        let outcome = self.api.execute_with_credentials(url.as_str(), credentials).await;
        parse_json::<NewsResponse>(&outcome).map(|r| r.news).map_err(|e| {
            debug!("📰️ News page request failed. {e}");
            e.outcome_kind().unwrap_or(OutcomeKind::UnexpectedError)
        })
    }
}
