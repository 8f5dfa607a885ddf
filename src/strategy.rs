use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;

use crate::cache::PriceCache;
use crate::observe::{LogObserver, ResolutionEvent, ResolutionObserver};
use crate::policy::SourcePolicy;
use crate::source::SourceResult;
use crate::TokenPricing;

/// Resolves identifiers to USD prices: cache first, then the policy's
/// source chain one source at a time, writing the first valid price back.
pub struct PriceEngine {
    cache: PriceCache,
    policy: SourcePolicy,
    observer: Arc<dyn ResolutionObserver>,
    deadline: Option<Duration>,
}

impl PriceEngine {
    pub fn new(cache: PriceCache, policy: SourcePolicy) -> Self {
        Self {
            cache,
            policy,
            observer: Arc::new(LogObserver),
            deadline: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bounds a whole resolution. Unbounded by default, so the chain always
    /// runs to a result or to exhaustion.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// USD price of `identifier`, or `None` when nothing could price it.
    /// Never fails: deadline expiry and panics also end up as `None`.
    pub async fn get_token_price(&self, identifier: &str) -> Option<f64> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        let resolution = AssertUnwindSafe(self.resolve(identifier)).catch_unwind();
        let outcome = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, resolution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let reason = format!("deadline of {:?} expired", limit);
                    self.observer.record(&ResolutionEvent::Aborted {
                        identifier,
                        reason: &reason,
                    });
                    return None;
                }
            },
            None => resolution.await,
        };

        match outcome {
            Ok(price) => price,
            Err(panic) => {
                let reason = format!("panicked: {}", panic_message(&*panic));
                self.observer.record(&ResolutionEvent::Aborted {
                    identifier,
                    reason: &reason,
                });
                None
            }
        }
    }

    async fn resolve(&self, identifier: &str) -> Option<f64> {
        let started = Instant::now();
        let query = self.cache.query(identifier);

        match self.cache.fresh_record(&query, self.cache.ttl()).await {
            Ok(Some(record)) => {
                self.observer.record(&ResolutionEvent::CacheHit {
                    identifier,
                    price: record.price,
                });
                return Some(record.price);
            }
            Ok(None) => {}
            Err(error) => self.observer.record(&ResolutionEvent::CacheReadFailed {
                identifier,
                error: &error,
            }),
        }

        for slot in self.policy.chain_for(identifier) {
            let source = slot.name();
            self.observer
                .record(&ResolutionEvent::SourceAttempted { identifier, source });
            let attempt_started = Instant::now();
            let result = slot.attempt(identifier).await;
            self.observer.record(&ResolutionEvent::SourceFinished {
                identifier,
                source,
                result: &result,
                latency: attempt_started.elapsed(),
            });

            if let SourceResult::Valid(price) = result {
                let mut metadata = BTreeMap::new();
                metadata.insert("source".to_owned(), source.to_owned());
                if let Err(error) = self.cache.put(identifier, price, Some(metadata)).await {
                    self.observer.record(&ResolutionEvent::CacheWriteFailed {
                        identifier,
                        error: &error,
                    });
                }
                self.observer.record(&ResolutionEvent::Resolved {
                    identifier,
                    source,
                    price,
                    elapsed: started.elapsed(),
                });
                return Some(price);
            }
        }

        self.observer.record(&ResolutionEvent::Exhausted {
            identifier,
            elapsed: started.elapsed(),
        });
        None
    }
}

#[async_trait]
impl TokenPricing for PriceEngine {
    async fn get_token_price(&self, identifier: &str) -> Option<f64> {
        PriceEngine::get_token_price(self, identifier).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
