//! Request admission control. The gate is an injected capability so
//! handlers depend only on the `AdmissionGate` interface; the
//! in-memory fixed-window limiter backs single-instance deployments
//! and tests can substitute their own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_requests: u32,
    /// Time until the current window resets. Drives the
    /// `Retry-After` header on rejection.
    pub retry_after: Duration,
}

pub trait AdmissionGate: Send + Sync {
    fn check_and_consume(&self, key: &str) -> RateLimitDecision;
}

struct Entry {
    count: u32,
    reset_at: Instant,
}

/// Per-key fixed window counter. State is process-local and resets
/// on restart.
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    store: Mutex<HashMap<String, Entry>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            store: Mutex::new(HashMap::new()),
        }
    }

    fn check_and_consume_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut store = self.store.lock().expect("rate limit store poisoned");

        match store.get_mut(key) {
            Some(entry) if now < entry.reset_at => {
                if entry.count >= self.max_requests {
                    return RateLimitDecision {
                        allowed: false,
                        remaining_requests: 0,
                        retry_after: entry.reset_at - now,
                    };
                }
                entry.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining_requests: self.max_requests.saturating_sub(entry.count),
                    retry_after: entry.reset_at - now,
                }
            }
            _ => {
                // First request in a fresh window, or the previous
                // window expired.
                store.insert(
                    key.to_string(),
                    Entry {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining_requests: self.max_requests.saturating_sub(1),
                    retry_after: self.window,
                }
            }
        }
    }

    /// Drop expired entries. Called from the periodic sweep task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut store = self.store.lock().expect("rate limit store poisoned");
        store.retain(|_, entry| now < entry.reset_at);
    }
}

impl AdmissionGate for InMemoryRateLimiter {
    fn check_and_consume(&self, key: &str) -> RateLimitDecision {
        self.check_and_consume_at(key, Instant::now())
    }
}
