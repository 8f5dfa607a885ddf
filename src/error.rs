use std::time::Duration;

use thiserror::Error;

/// Failures that can occur while resolving a price.
///
/// None of these ever reach a caller of `get_token_price`: adapters turn
/// transport and parse failures into "no candidate", the cache degrades to a
/// miss on read errors, and write errors are only logged.
#[derive(Error, Debug)]
pub enum PriceError {
    /// The request could not be sent, or the source answered with an
    /// unsuccessful HTTP status.
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The hard per-call deadline expired and the call was dropped.
    #[error("Timed out after {}ms: {url}", .after.as_millis())]
    Timeout { url: String, after: Duration },

    /// The source answered, but not with the shape its adapter expects.
    #[error("Malformed response from {provider}: {message}")]
    Parse { provider: String, message: String },

    /// A numeric candidate outside the accepted domain.
    #[error("Rejected candidate {value} from {provider}")]
    Validation { provider: String, value: f64 },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PriceError {
    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_owned(),
            message: message.into(),
        }
    }

    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_owned(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
