pub mod cache;
pub mod cg;
pub mod dexscreener;
pub mod error;
pub mod fetch;
pub mod finance;
pub mod identifier;
pub mod indexer;
pub mod market_ids;
pub mod observe;
pub mod oracle;
pub mod parse;
pub mod policy;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod source;
pub mod store;
pub mod strategy;
pub mod swap;
#[doc(hidden)]
pub mod testing;
pub mod validate;

use async_trait::async_trait;

pub use error::PriceError;
pub use settings::Settings;
pub use source::{PriceSource, SourceResult, SourceSlot};
pub use strategy::PriceEngine;

/// What callers of the engine depend on: an identifier in, a USD price or
/// nothing out.
#[async_trait]
pub trait TokenPricing: Send + Sync {
    async fn get_token_price(&self, identifier: &str) -> Option<f64>;
}
