//! Fixed-window request limiting keyed by client IP.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_secs: 60,
            max_clients: 10_000,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    cfg: RateLimitConfig,
    state: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

#[derive(Clone, Copy, Debug)]
struct ClientWindow {
    window_start: Instant,
    last_seen: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check(&self, client_key: &str) -> RateLimitVerdict {
        let cfg = self.cfg;
        if cfg.requests_per_window == 0 {
            return RateLimitVerdict {
                allowed: true,
                retry_after_secs: 0,
            };
        }

        let now = Instant::now();
        let window = Duration::from_secs(cfg.window_secs.max(1));
        let mut guard = self.state.lock().await;

        if !guard.contains_key(client_key) && guard.len() >= cfg.max_clients && cfg.max_clients > 0
        {
            evict_least_recently_seen(&mut guard);
        }

        let entry = guard
            .entry(client_key.to_string())
            .or_insert_with(|| ClientWindow {
                window_start: now,
                last_seen: now,
                count: 0,
            });

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.last_seen = now;

        if entry.count < cfg.requests_per_window {
            entry.count += 1;
            return RateLimitVerdict {
                allowed: true,
                retry_after_secs: 0,
            };
        }

        let elapsed_now = now.saturating_duration_since(entry.window_start);
        let retry_after = window.saturating_sub(elapsed_now).as_secs().max(1);

        RateLimitVerdict {
            allowed: false,
            retry_after_secs: retry_after,
        }
    }
}

fn evict_least_recently_seen(map: &mut HashMap<String, ClientWindow>) {
    if map.is_empty() {
        return;
    }

    let mut oldest_key: Option<String> = None;
    let mut oldest_time = Instant::now();
    let mut first = true;

    for (k, v) in map.iter() {
        if first || v.last_seen < oldest_time {
            oldest_time = v.last_seen;
            oldest_key = Some(k.clone());
            first = false;
        }
    }

    if let Some(k) = oldest_key {
        map.remove(&k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 3,
            window_secs: 60,
            max_clients: 16,
        });

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await.allowed);
        }
        let verdict = limiter.check("10.0.0.1").await;
        assert!(!verdict.allowed);
        assert!(verdict.retry_after_secs >= 1);

        // a different client has its own window
        assert!(limiter.check("10.0.0.2").await.allowed);
    }

    #[tokio::test]
    async fn zero_limit_disables_limiting() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 0,
            window_secs: 60,
            max_clients: 16,
        });
        for _ in 0..100 {
            assert!(limiter.check("10.0.0.1").await.allowed);
        }
    }

    #[tokio::test]
    async fn evicts_oldest_client_at_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_secs: 60,
            max_clients: 2,
        });
        assert!(limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
        // "a" is the least recently seen and gets evicted to make room
        assert!(limiter.check("c").await.allowed);
        // evicted client starts a fresh window
        assert!(limiter.check("a").await.allowed);
    }
}
