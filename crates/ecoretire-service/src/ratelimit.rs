//! Per-API-key sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    per_minute: u32,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Ok(())` if the request is allowed, else `Err(retry_after)`.
    pub fn check(&self, api_key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut buckets = self.buckets.lock().unwrap();
        let entry = buckets.entry(api_key.to_string()).or_default();

        while let Some(oldest) = entry.front() {
            if now.duration_since(*oldest) > window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() as u32 >= self.per_minute {
            let retry_after = window - now.duration_since(*entry.front().unwrap());
            return Err(retry_after);
        }

        entry.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_rate_then_rejects() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.check("key-1").is_ok());
        assert!(limiter.check("key-1").is_ok());
        assert!(limiter.check("key-1").is_err());
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }
}
