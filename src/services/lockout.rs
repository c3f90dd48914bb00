//! Failed-login lockout. State lives in process memory and is lost on restart.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
pub const LOCKOUT_DURATION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy)]
struct AttemptState {
    failures: u32,
    last_failure: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct LoginAttemptTracker {
    attempts: DashMap<String, AttemptState>,
    max_failures: u32,
    lockout: Duration,
}

impl Default for LoginAttemptTracker {
    fn default() -> Self {
        Self::new(MAX_FAILED_ATTEMPTS, Duration::minutes(LOCKOUT_DURATION_MINUTES))
    }
}

impl LoginAttemptTracker {
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            attempts: DashMap::new(),
            max_failures,
            lockout,
        }
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Remaining lock time, if the account is locked at `now`.
    pub fn locked_for(&self, email: &str, now: DateTime<Utc>) -> Option<Duration> {
        let key = Self::key(email);
        let until = self.attempts.get(&key)?.locked_until?;
        if until > now {
            Some(until - now)
        } else {
            // Lock elapsed: start counting afresh.
            self.attempts.remove(&key);
            None
        }
    }

    /// Records a failed attempt and returns true when it triggered a lock.
    pub fn record_failure(&self, email: &str, now: DateTime<Utc>) -> bool {
        let key = Self::key(email);
        let mut entry = self.attempts.entry(key.clone()).or_insert(AttemptState {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });
        entry.failures += 1;
        entry.last_failure = now;
        if entry.failures >= self.max_failures {
            entry.failures = 0;
            entry.locked_until = Some(now + self.lockout);
            warn!(email = %key, minutes = self.lockout.num_minutes(), "Account locked after repeated failed logins.");
            return true;
        }
        false
    }

    pub fn record_success(&self, email: &str) {
        self.attempts.remove(&Self::key(email));
    }

    /// Drops elapsed locks and failure counts idle for longer than the lockout.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, state| match state.locked_until {
            Some(until) => until > now,
            None => state.last_failure + self.lockout > now,
        });
        before.saturating_sub(self.attempts.len())
    }
}
