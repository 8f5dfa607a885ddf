//! Structured resolution events.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::PriceError;
use crate::source::SourceResult;

#[derive(Debug)]
pub enum ResolutionEvent<'a> {
    CacheHit {
        identifier: &'a str,
        price: f64,
    },
    CacheReadFailed {
        identifier: &'a str,
        error: &'a PriceError,
    },
    SourceAttempted {
        identifier: &'a str,
        source: &'a str,
    },
    SourceFinished {
        identifier: &'a str,
        source: &'a str,
        result: &'a SourceResult,
        latency: Duration,
    },
    Resolved {
        identifier: &'a str,
        source: &'a str,
        price: f64,
        elapsed: Duration,
    },
    CacheWriteFailed {
        identifier: &'a str,
        error: &'a PriceError,
    },
    Exhausted {
        identifier: &'a str,
        elapsed: Duration,
    },
    /// The resolution was cut short by its deadline or an internal fault.
    Aborted {
        identifier: &'a str,
        reason: &'a str,
    },
}

pub trait ResolutionObserver: Send + Sync {
    fn record(&self, event: &ResolutionEvent<'_>);
}

/// Writes every event through the `log` facade.
pub struct LogObserver;

impl ResolutionObserver for LogObserver {
    fn record(&self, event: &ResolutionEvent<'_>) {
        match event {
            ResolutionEvent::CacheHit { identifier, price } => {
                debug!("{}: cache hit at {}", identifier, price)
            }
            ResolutionEvent::CacheReadFailed { identifier, error } => {
                warn!("{}: cache read failed, resolving live: {}", identifier, error)
            }
            ResolutionEvent::SourceAttempted { identifier, source } => {
                debug!("{}: trying {}", identifier, source)
            }
            ResolutionEvent::SourceFinished {
                identifier,
                source,
                result,
                latency,
            } => debug!("{}: {} was {} after {:?}", identifier, source, result, latency),
            ResolutionEvent::Resolved {
                identifier,
                source,
                price,
                elapsed,
            } => info!("{}: {} from {} in {:?}", identifier, price, source, elapsed),
            ResolutionEvent::CacheWriteFailed { identifier, error } => {
                warn!("{}: could not store price: {}", identifier, error)
            }
            ResolutionEvent::Exhausted { identifier, elapsed } => {
                warn!("{}: no source could price it ({:?})", identifier, elapsed)
            }
            ResolutionEvent::Aborted { identifier, reason } => {
                error!("{}: resolution aborted: {}", identifier, reason)
            }
        }
    }
}
