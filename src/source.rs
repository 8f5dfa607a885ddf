use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::error::PriceError;
use crate::retry::{retry, RetryPolicy};
use crate::validate::validate;

/// One external price integration.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Asks the source once for an unvalidated USD price.
    ///
    /// `Ok(None)` means the source answered but has no price for
    /// `identifier`; errors are transport, timeout or parse failures.
    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError>;
}

/// Outcome of trying one source for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    Valid(f64),
    /// The source answered with a number that failed validation.
    Invalid(f64),
    Unavailable(String),
}

impl SourceResult {
    pub fn price(&self) -> Option<f64> {
        match self {
            Self::Valid(price) => Some(*price),
            _ => None,
        }
    }
}

impl fmt::Display for SourceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(price) => write!(f, "valid ({})", price),
            Self::Invalid(candidate) => write!(f, "invalid ({})", candidate),
            Self::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

/// A source together with the retry budget it gets in the chain.
#[derive(Clone)]
pub struct SourceSlot {
    pub source: Arc<dyn PriceSource>,
    pub retry: RetryPolicy,
}

impl SourceSlot {
    pub fn new(source: Arc<dyn PriceSource>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Asks the source under its retry budget and validates the answer.
    pub async fn attempt(&self, identifier: &str) -> SourceResult {
        let label = format!("{} [{}]", self.name(), identifier);
        let source = &self.source;
        match retry(&label, &self.retry, move || source.candidate(identifier)).await {
            Ok(Some(candidate)) => match validate(self.name(), candidate) {
                Ok(price) => SourceResult::Valid(price),
                Err(error) => {
                    debug!("{}: {}", label, error);
                    SourceResult::Invalid(candidate)
                }
            },
            Ok(None) => SourceResult::Unavailable("no price in response".to_owned()),
            Err(error) => SourceResult::Unavailable(error.to_string()),
        }
    }
}

impl fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSlot")
            .field("source", &self.name())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Scripted {
        answers: Mutex<Vec<Result<Option<f64>, PriceError>>>,
    }

    #[async_trait]
    impl PriceSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn candidate(&self, _: &str) -> Result<Option<f64>, PriceError> {
            self.answers.lock().remove(0)
        }
    }

    fn slot(answers: Vec<Result<Option<f64>, PriceError>>, attempts: u32) -> SourceSlot {
        SourceSlot::new(
            Arc::new(Scripted {
                answers: Mutex::new(answers),
            }),
            RetryPolicy::new(attempts, Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_after_retry() {
        let slot = slot(
            vec![Err(PriceError::transport("u", "reset")), Ok(Some(3.5))],
            2,
        );
        assert_eq!(slot.attempt("tok").await, SourceResult::Valid(3.5));
    }

    #[tokio::test]
    async fn test_zero_is_invalid() {
        let slot = slot(vec![Ok(Some(0.0))], 1);
        assert_eq!(slot.attempt("tok").await, SourceResult::Invalid(0.0));
    }

    #[tokio::test]
    async fn test_nan_is_invalid() {
        let slot = slot(vec![Ok(Some(f64::NAN))], 1);
        assert!(matches!(slot.attempt("tok").await, SourceResult::Invalid(c) if c.is_nan()));
    }

    #[tokio::test]
    async fn test_missing_price_and_errors_are_unavailable() {
        let slot_none = slot(vec![Ok(None)], 1);
        assert!(matches!(slot_none.attempt("tok").await, SourceResult::Unavailable(_)));

        let slot_err = slot(vec![Err(PriceError::parse("scripted", "bad shape"))], 1);
        match slot_err.attempt("tok").await {
            SourceResult::Unavailable(reason) => assert!(reason.contains("bad shape")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
