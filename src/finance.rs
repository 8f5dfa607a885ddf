//! Alternative aggregator: a finance-protocol API with a batch price
//! endpoint, asked about a single identifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::identifier::same_asset;
use crate::parse::{typed, JsonNumber, ParseOutcome};
use crate::source::PriceSource;

pub const FINANCE_API: &str = "finance_api";

#[derive(Deserialize)]
struct CoinPrices {
    data: Option<Vec<CoinPrice>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPrice {
    coin_type: String,
    price: Option<JsonNumber>,
}

pub struct FinanceApiSource {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    timeout: Duration,
}

impl FinanceApiSource {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }
}

fn parse_prices(res: Value, identifier: &str) -> ParseOutcome {
    let prices: CoinPrices = match typed(res) {
        Ok(prices) => prices,
        Err(message) => return ParseOutcome::Malformed(message),
    };
    let entry = prices
        .data
        .unwrap_or_default()
        .into_iter()
        .find(|p| same_asset(&p.coin_type, identifier));
    ParseOutcome::from_field("price", entry.and_then(|p| p.price).as_ref())
}

#[async_trait]
impl PriceSource for FinanceApiSource {
    fn name(&self) -> &str {
        FINANCE_API
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let request = JsonRequest::post(
            format!("{}/coins/price", self.base_url),
            json!({ "coinTypes": [identifier] }),
        );
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        parse_prices(res, identifier).into_candidate(FINANCE_API)
    }
}
