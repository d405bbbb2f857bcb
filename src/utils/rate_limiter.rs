//! Rate Limiter (C1)
//!
//! Two disciplines composed: a counting semaphore bounds concurrent in-flight
//! calls, a token bucket bounds the long-run rate. `acquire()` returns a
//! guard; dropping it releases the concurrency slot, so callers get the
//! "release on all exits, including exceptions" contract for free via `Drop`
//! rather than a manual try/finally.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimiterKind {
    Lighthouse,
    SearchConsole,
    Llm,
    GitRemote,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Concurrency cap + token-bucket rate cap, composed.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    rate_per_sec: f64,
    bucket: Mutex<TokenBucket>,
}

/// Held while a caller has both a concurrency slot and a spent token.
/// Releases the concurrency slot on drop.
pub struct RateLimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, rate_per_sec: f64, burst: f64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            rate_per_sec,
            bucket: Mutex::new(TokenBucket { tokens: burst, last_refill: Instant::now() }),
        }
    }

    /// Block until both a concurrency slot and a rate-limit token are
    /// available. On token starvation, sleeps for the exact deficit rather
    /// than polling.
    pub async fn acquire(&self) -> RateLimiterPermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.max_tokens());
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.rate_per_sec))
                }
            };

            match wait {
                None => break,
                Some(d) => tokio::time::sleep(d).await,
            }
        }

        RateLimiterPermit { _permit: permit }
    }

    fn max_tokens(&self) -> f64 {
        // Burst is the initial ceiling; refill never exceeds it in steady state.
        self.rate_per_sec.max(1.0) * 4.0
    }
}

/// Defaults from §4.1: concurrency 4, rate 4/s, burst 4; LLM/Lighthouse/
/// Search-Console/Git share this policy unless overridden in config.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub max_concurrent: usize,
    pub rate_per_sec: f64,
    pub burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_concurrent: 4, rate_per_sec: 4.0, burst: 4.0 }
    }
}

/// One limiter instance per external API kind, process-wide. Built once at
/// startup and held in `AppState`; tests construct their own registry rather
/// than reaching through a module-level static, so limiter state never
/// leaks across test cases.
pub struct RateLimiterRegistry {
    limiters: HashMap<RateLimiterKind, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new(configs: HashMap<RateLimiterKind, RateLimiterConfig>) -> Self {
        let limiters = configs
            .into_iter()
            .map(|(kind, cfg)| {
                (kind, Arc::new(RateLimiter::new(cfg.max_concurrent, cfg.rate_per_sec, cfg.burst)))
            })
            .collect();
        Self { limiters }
    }

    pub fn with_defaults() -> Self {
        let mut configs = HashMap::new();
        configs.insert(RateLimiterKind::Lighthouse, RateLimiterConfig::default());
        configs.insert(RateLimiterKind::SearchConsole, RateLimiterConfig::default());
        configs.insert(RateLimiterKind::Llm, RateLimiterConfig::default());
        configs.insert(RateLimiterKind::GitRemote, RateLimiterConfig::default());
        Self::new(configs)
    }

    pub fn get(&self, kind: RateLimiterKind) -> Arc<RateLimiter> {
        Arc::clone(
            self.limiters
                .get(&kind)
                .unwrap_or_else(|| panic!("no rate limiter configured for {:?}", kind)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_paced_grants() {
        // rate=4, concurrency=4, burst=10: first 10 acquires should not block
        // on the token bucket, later ones pace out roughly every 250ms.
        let limiter = RateLimiter::new(20, 4.0, 10.0);
        let start = Instant::now();

        for _ in 0..10 {
            let _permit = limiter.acquire().await;
        }
        assert!(Instant::now().duration_since(start) < Duration::from_millis(50));

        let _permit = limiter.acquire().await;
        let elapsed = Instant::now().duration_since(start);
        assert!(elapsed >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn concurrency_cap_blocks_excess() {
        let limiter = Arc::new(RateLimiter::new(2, 1000.0, 1000.0));
        let p1 = limiter.acquire().await;
        let p2 = limiter.acquire().await;

        let limiter_clone = Arc::clone(&limiter);
        let handle = tokio::spawn(async move { limiter_clone.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(p1);
        let _p3 = handle.await.unwrap();
        drop(p2);
    }
}
