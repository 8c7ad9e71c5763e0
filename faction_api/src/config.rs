use std::time::Duration;

use faction_common::helpers::{env_duration_millis, env_duration_secs, env_or_default};
use log::*;

use crate::{BreakerConfig, FeedConfig, RetryPolicy};

pub const DEFAULT_API_BASE_URL: &str = "https://api.torn.com";

#[derive(Debug, Clone)]
pub struct GameApiConfig {
    /// Scheme and host of the upstream API, without a trailing slash.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    pub feed: FeedConfig,
}

impl Default for GameApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            feed: FeedConfig::default(),
        }
    }
}

impl GameApiConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("FP_API_BASE_URL").unwrap_or_else(|_| {
            info!("🪛️ FP_API_BASE_URL not set, using {DEFAULT_API_BASE_URL} as default");
            DEFAULT_API_BASE_URL.to_string()
        });
        let base_url = base_url.trim_end_matches('/').to_string();
        let retry = RetryPolicy {
            max_attempts: env_or_default("FP_API_MAX_ATTEMPTS", defaults.retry.max_attempts),
            base_delay: env_duration_millis("FP_API_BASE_DELAY_MS", defaults.retry.base_delay),
            rate_limit_delay: env_duration_millis("FP_API_RATE_LIMIT_DELAY_MS", defaults.retry.rate_limit_delay),
            ..defaults.retry
        };
        let breaker = BreakerConfig {
            failure_threshold: env_or_default("FP_BREAKER_THRESHOLD", defaults.breaker.failure_threshold),
            cooldown: env_duration_secs("FP_BREAKER_COOLDOWN", defaults.breaker.cooldown),
        };
        let feed = FeedConfig {
            page_size: env_or_default("FP_NEWS_PAGE_SIZE", defaults.feed.page_size),
            max_pages: env_or_default("FP_NEWS_MAX_PAGES", defaults.feed.max_pages),
            ..defaults.feed
        };
        Self {
            base_url,
            connect_timeout: env_duration_secs("FP_API_CONNECT_TIMEOUT", defaults.connect_timeout),
            request_timeout: env_duration_secs("FP_API_READ_TIMEOUT", defaults.request_timeout),
            retry,
            breaker,
            feed,
        }
    }
}
