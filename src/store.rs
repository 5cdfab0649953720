use dashmap::DashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{Args, StoreKind};
use crate::error::StoreError;
use crate::redis_store::RedisStore;

// Reply of one increment-and-check round-trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub admitted: bool,
    pub remaining: u32,
    // Unix epoch millis at which a slot frees up
    pub reset_ms: i64,
}

/// Shared counter store behind the admission guard.
///
/// `hit` must be atomic per key: two concurrent calls for the same key can
/// never both take the last free slot. Rejected hits are not recorded.
pub trait CounterStore: Send + Sync {
    fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> impl Future<Output = Result<Hit, StoreError>> + Send;
}

// In-process store - sliding log of admitted timestamps per key
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, VecDeque<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> Hit {
        let window_ms = window_millis(window);

        // entry() holds the shard lock until `log` drops
        let mut log = self.entries.entry(key.to_string()).or_default();

        while log.front().is_some_and(|&t| now_ms - t >= window_ms) {
            log.pop_front();
        }

        if log.len() >= limit as usize {
            let reset_ms = log.front().map_or(now_ms, |&t| t + window_ms);
            return Hit {
                admitted: false,
                remaining: 0,
                reset_ms,
            };
        }

        log.push_back(now_ms);
        let oldest = log.front().copied().unwrap_or(now_ms);
        Hit {
            admitted: true,
            remaining: limit.saturating_sub(log.len() as u32),
            reset_ms: oldest + window_ms,
        }
    }

    // Drop keys with nothing left inside the window, returns how many went
    pub fn purge_expired(&self, now_ms: i64, window: Duration) -> usize {
        let window_ms = window_millis(window);
        let before = self.entries.len();
        self.entries
            .retain(|_, log| log.back().is_some_and(|&t| now_ms - t < window_ms));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl CounterStore for MemoryStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<Hit, StoreError> {
        Ok(self.record(key, limit, window, now_ms))
    }
}

// Concrete store chosen at startup
pub enum StoreBackend {
    Memory(Arc<MemoryStore>),
    Redis(RedisStore),
}

impl CounterStore for StoreBackend {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<Hit, StoreError> {
        match self {
            StoreBackend::Memory(store) => store.hit(key, limit, window, now_ms).await,
            StoreBackend::Redis(store) => store.hit(key, limit, window, now_ms).await,
        }
    }
}

// Pick the store from CLI args. None means the guard runs fail-open.
pub fn build_store(args: &Args) -> Option<StoreBackend> {
    match args.store {
        StoreKind::Memory => {
            info!("Using in-memory counter store");
            Some(StoreBackend::Memory(Arc::new(MemoryStore::new())))
        }
        StoreKind::Redis => {
            let Some(url) = args.redis_url.as_deref() else {
                warn!("Redis store selected without --redis-url; rate limiting disabled");
                return None;
            };
            match RedisStore::open(url) {
                Ok(store) => {
                    info!("Using Redis counter store");
                    Some(StoreBackend::Redis(store))
                }
                Err(e) => {
                    warn!(error = %e, "Invalid Redis url; rate limiting disabled");
                    None
                }
            }
        }
        StoreKind::Disabled => {
            warn!("Rate limiting disabled by configuration");
            None
        }
    }
}

// Background sweeper - keeps the in-memory store from growing without bound
pub async fn expiry_sweeper(
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    every: Duration,
) {
    let mut ticker = interval(every);

    info!("Expiry sweeper started (interval: {:?})", every);

    loop {
        ticker.tick().await;
        let removed = store.purge_expired(clock.now().timestamp_millis(), window);
        if removed > 0 {
            debug!(removed, remaining = store.len(), "Purged expired rate limit entries");
        }
    }
}

pub(crate) fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let store = MemoryStore::new();
        let remaining: Vec<u32> = (0..5)
            .map(|i| store.record("k", 5, MINUTE, i * 1000))
            .inspect(|hit| assert!(hit.admitted))
            .map(|hit| hit.remaining)
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = store.record("k", 5, MINUTE, 5000);
        assert!(!sixth.admitted);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_ms, 60_000);
    }

    #[test]
    fn window_slides_instead_of_resetting() {
        let store = MemoryStore::new();
        for t in [0, 30_000] {
            assert!(store.record("k", 2, MINUTE, t).admitted);
        }
        // A fixed window would reset at 60s; the request at 0 only leaves at 60s
        assert!(!store.record("k", 2, MINUTE, 59_999).admitted);
        assert!(store.record("k", 2, MINUTE, 60_000).admitted);
        // 30s and 60s are both still in the window
        assert!(!store.record("k", 2, MINUTE, 89_999).admitted);
    }

    #[test]
    fn burst_straddling_a_minute_boundary_is_rejected() {
        let store = MemoryStore::new();
        for t in [59_000, 59_100, 59_200, 59_300, 59_400] {
            assert!(store.record("k", 5, MINUTE, t).admitted);
        }
        for t in [60_500, 60_600] {
            let hit = store.record("k", 5, MINUTE, t);
            assert!(!hit.admitted);
            assert_eq!(hit.reset_ms, 119_000);
        }
    }

    #[test]
    fn rejected_requests_take_no_slot() {
        let store = MemoryStore::new();
        assert!(store.record("k", 1, MINUTE, 0).admitted);
        for t in 1..50 {
            assert!(!store.record("k", 1, MINUTE, t * 1000).admitted);
        }
        assert!(store.record("k", 1, MINUTE, 60_000).admitted);
    }

    #[test]
    fn keys_are_independent() {
        let store = MemoryStore::new();
        assert!(store.record("a", 1, MINUTE, 0).admitted);
        assert!(!store.record("a", 1, MINUTE, 1).admitted);
        let b = store.record("b", 1, MINUTE, 2);
        assert!(b.admitted);
        assert_eq!(b.remaining, 0);
    }

    #[test]
    fn purge_drops_only_idle_keys() {
        let store = MemoryStore::new();
        store.record("old", 5, MINUTE, 0);
        store.record("fresh", 5, MINUTE, 50_000);

        assert_eq!(store.purge_expired(70_000, MINUTE), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.record("fresh", 5, MINUTE, 70_000).remaining, 3);
    }

    #[test]
    fn concurrent_hits_never_overshoot() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| store.record("shared", 25, MINUTE, 1_000).admitted)
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }

    #[test]
    fn unconfigured_redis_means_no_store() {
        let args = Args::try_parse_from(["contact-gateway", "--store", "redis"]).unwrap();
        let args = Args {
            redis_url: None,
            ..args
        };
        assert!(build_store(&args).is_none());

        let args = Args {
            store: StoreKind::Disabled,
            ..args
        };
        assert!(build_store(&args).is_none());
    }

    #[test]
    fn memory_is_the_default_store() {
        let args = Args::try_parse_from(["contact-gateway"]).unwrap();
        assert!(matches!(build_store(&args), Some(StoreBackend::Memory(_))));
    }
}
