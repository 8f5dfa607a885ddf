//! On-chain price oracle: single and batch lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::identifier::same_asset;
use crate::parse::{typed, JsonNumber, ParseOutcome};
use crate::source::PriceSource;

pub const ORACLE: &str = "oracle";
pub const ORACLE_BATCH: &str = "oracle_batch";

#[derive(Deserialize)]
struct PriceInfo {
    price: Option<JsonNumber>,
}

impl PriceInfo {
    fn outcome(&self) -> ParseOutcome {
        ParseOutcome::from_field("price", self.price.as_ref())
    }
}

pub struct OracleAPI {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    timeout: Duration,
}

impl OracleAPI {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    pub async fn price(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let url = format!("{}/api/price-info/{}", self.base_url, identifier);
        let res = self.fetcher.fetch(&JsonRequest::get(url), self.timeout).await?;
        parse_single(res).into_candidate(ORACLE)
    }

    pub async fn prices(
        &self,
        identifiers: &[&str],
    ) -> Result<HashMap<String, ParseOutcome>, PriceError> {
        let url = format!("{}/api/price-info", self.base_url);
        let request = JsonRequest::post(url, json!({ "coins": identifiers }));
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        debug!("Oracle batch response {:?}", res);
        parse_batch(res).map_err(|message| PriceError::parse(ORACLE_BATCH, message))
    }
}

fn parse_single(res: Value) -> ParseOutcome {
    match typed::<PriceInfo>(res) {
        Ok(info) => info.outcome(),
        Err(message) => ParseOutcome::Malformed(message),
    }
}

fn parse_batch(res: Value) -> Result<HashMap<String, ParseOutcome>, String> {
    let entries: HashMap<String, PriceInfo> = typed(res)?;
    Ok(entries
        .into_iter()
        .map(|(coin, info)| (coin, info.outcome()))
        .collect())
}

/// Direct single-identifier lookup.
pub struct OracleSource {
    api: Arc<OracleAPI>,
}

impl OracleSource {
    pub fn new(api: Arc<OracleAPI>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PriceSource for OracleSource {
    fn name(&self) -> &str {
        ORACLE
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        self.api.price(identifier).await
    }
}

/// The batch endpoint asked about one identifier, which sometimes answers
/// when the single endpoint does not.
pub struct OracleBatchSource {
    api: Arc<OracleAPI>,
}

impl OracleBatchSource {
    pub fn new(api: Arc<OracleAPI>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PriceSource for OracleBatchSource {
    fn name(&self) -> &str {
        ORACLE_BATCH
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let prices = self.api.prices(&[identifier]).await?;
        let outcome = prices
            .into_iter()
            .find(|(coin, _)| same_asset(coin, identifier))
            .map_or(ParseOutcome::Unpriced, |(_, outcome)| outcome);
        outcome.into_candidate(ORACLE_BATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Method;
    use crate::testing::ScriptedFetcher;

    const TOK: &str = "0xabc::mod::TOK";

    fn api(fetcher: &Arc<ScriptedFetcher>) -> Arc<OracleAPI> {
        Arc::new(OracleAPI::new(
            fetcher.clone(),
            "https://oracle.example/",
            Duration::from_secs(8),
        ))
    }

    #[test]
    fn test_parse_single() {
        assert_eq!(parse_single(json!({"price": 1.25})), ParseOutcome::Priced(1.25));
        assert_eq!(parse_single(json!({"price": "0.5"})), ParseOutcome::Priced(0.5));
        assert_eq!(parse_single(json!({})), ParseOutcome::Unpriced);
        assert!(matches!(parse_single(json!([1, 2])), ParseOutcome::Malformed(_)));
        assert!(matches!(parse_single(json!({"price": "soon"})), ParseOutcome::Malformed(_)));
    }

    #[tokio::test]
    async fn test_single_lookup_hits_price_info_path() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().respond("/api/price-info/0xabc", json!({"price": 2.5})),
        );
        let source = OracleSource::new(api(&fetcher));
        assert_eq!(source.candidate(TOK).await.unwrap(), Some(2.5));
        let requests = fetcher.requests();
        assert_eq!(requests[0].url, "https://oracle.example/api/price-info/0xabc::mod::TOK");
    }

    #[tokio::test]
    async fn test_batch_lookup_sends_single_element_array() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(
            "/api/price-info",
            json!({ "0x0abc::mod::TOK": {"price": 3.0} }),
        ));
        let source = OracleBatchSource::new(api(&fetcher));
        assert_eq!(source.candidate(TOK).await.unwrap(), Some(3.0));
        let request = &fetcher.requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, Some(json!({"coins": [TOK]})));
    }

    #[tokio::test]
    async fn test_batch_without_entry_is_unpriced() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond("/api/price-info", json!({})));
        let source = OracleBatchSource::new(api(&fetcher));
        assert_eq!(source.candidate(TOK).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_coin_sentinel_is_passed_through_for_validation() {
        let fetcher =
            Arc::new(ScriptedFetcher::new().respond("/api/price-info/", json!({"price": -1})));
        let source = OracleSource::new(api(&fetcher));
        assert_eq!(source.candidate(TOK).await.unwrap(), Some(-1.0));
    }
}
