//! Sliding-window limiter for the public chat endpoint.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

pub const CHAT_MESSAGES_PER_WINDOW: usize = 20;
pub const CHAT_WINDOW_SECONDS: i64 = 60;

#[derive(Debug)]
pub struct RateLimiter {
    hits: DashMap<String, VecDeque<DateTime<Utc>>>,
    limit: usize,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(CHAT_MESSAGES_PER_WINDOW, Duration::seconds(CHAT_WINDOW_SECONDS))
    }
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: DashMap::new(),
            limit,
            window,
        }
    }

    /// Counts a hit for `key`. On refusal returns how long until a slot frees up.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> Result<(), Duration> {
        let mut entry = self.hits.entry(key.to_string()).or_default();
        while entry.front().is_some_and(|t| *t <= now - self.window) {
            entry.pop_front();
        }
        if entry.len() >= self.limit {
            let oldest = entry.front().copied().unwrap_or(now);
            return Err(oldest + self.window - now);
        }
        entry.push_back(now);
        Ok(())
    }

    /// Drops keys with no hits inside the window.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.hits
            .retain(|_, hits| hits.back().is_some_and(|t| *t > now - self.window));
    }
}
