use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::PriceError;
use crate::store::{PriceRecord, PriceStore};
use crate::validate::is_valid;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One price request, stamped with the time it was made.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub identifier: String,
    pub now_ms: i64,
}

/// Freshness rules on top of a [`PriceStore`].
pub struct PriceCache {
    store: Arc<dyn PriceStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(store: Arc<dyn PriceStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn query(&self, identifier: &str) -> PriceQuery {
        PriceQuery {
            identifier: identifier.to_owned(),
            now_ms: self.clock.now_ms(),
        }
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<PriceRecord>, PriceError> {
        self.store.get_record(identifier).await
    }

    /// Stores `price` for `identifier`, stamped with the current time.
    pub async fn put(
        &self,
        identifier: &str,
        price: f64,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<PriceRecord, PriceError> {
        let record = PriceRecord {
            identifier: identifier.to_owned(),
            price,
            last_updated: self.clock.now_ms(),
            metadata,
        };
        self.store.upsert_record(record.clone()).await?;
        Ok(record)
    }

    /// True when a non-zero record exists that is at most `ttl` old.
    /// Storage errors count as "not fresh".
    pub async fn is_fresh(&self, identifier: &str, ttl: Duration) -> bool {
        let query = self.query(identifier);
        matches!(self.fresh_record(&query, ttl).await, Ok(Some(_)))
    }

    pub async fn fresh_record(
        &self,
        query: &PriceQuery,
        ttl: Duration,
    ) -> Result<Option<PriceRecord>, PriceError> {
        let record = self.store.get_record(&query.identifier).await?;
        Ok(record.filter(|r| is_fresh_at(r, query.now_ms, ttl)))
    }
}

fn is_fresh_at(record: &PriceRecord, now_ms: i64, ttl: Duration) -> bool {
    is_valid(record.price) && now_ms - record.last_updated <= ttl.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const T0: i64 = 1_700_000_000_000;

    fn cache_with_clock() -> (PriceCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(T0));
        let cache = PriceCache::new(Arc::new(MemoryStore::new()), clock.clone(), DEFAULT_TTL);
        (cache, clock)
    }

    #[tokio::test]
    async fn test_put_stamps_call_time() {
        let (cache, _) = cache_with_clock();
        let record = cache.put("0x2::sui::SUI", 1.23, None).await.unwrap();
        assert_eq!(record.last_updated, T0);
        assert_eq!(cache.get("0x2::sui::SUI").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_freshness_window_is_inclusive() {
        let (cache, clock) = cache_with_clock();
        cache.put("tok", 2.0, None).await.unwrap();
        clock.advance(DEFAULT_TTL);
        assert!(cache.is_fresh("tok", DEFAULT_TTL).await);
        clock.advance(Duration::from_millis(1));
        assert!(!cache.is_fresh("tok", DEFAULT_TTL).await);
        // Stale records stay readable.
        assert_eq!(cache.get("tok").await.unwrap().unwrap().price, 2.0);
    }

    #[tokio::test]
    async fn test_zero_price_is_never_fresh() {
        let (cache, clock) = cache_with_clock();
        cache.put("0xdef::mod::TOK", 0.0, None).await.unwrap();
        clock.advance(Duration::from_secs(60));
        assert!(!cache.is_fresh("0xdef::mod::TOK", DEFAULT_TTL).await);
    }

    #[tokio::test]
    async fn test_absent_is_not_fresh() {
        let (cache, _) = cache_with_clock();
        assert!(!cache.is_fresh("missing", DEFAULT_TTL).await);
        assert!(cache.get("missing").await.unwrap().is_none());
    }
}
