//! On-chain aggregator/indexer: DEX-derived prices by token address, plus
//! the market-data IDs it cross-references.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::parse::{typed, JsonNumber, ParseOutcome};
use crate::source::PriceSource;

pub const INDEXER: &str = "indexer";

#[derive(Deserialize)]
struct Envelope<T> {
    success: Option<bool>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct PriceData {
    value: Option<JsonNumber>,
}

#[derive(Deserialize)]
struct Overview {
    extensions: Option<Extensions>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Extensions {
    coingecko_id: Option<String>,
}

pub struct IndexerSource {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    api_key: Option<String>,
    network: String,
    timeout: Duration,
    auxiliary_timeout: Duration,
}

impl IndexerSource {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: &str,
        api_key: Option<String>,
        network: &str,
        timeout: Duration,
        auxiliary_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            network: network.to_owned(),
            timeout,
            auxiliary_timeout,
        }
    }

    fn request(&self, path: &str, identifier: &str) -> JsonRequest {
        let mut request = JsonRequest::get(format!("{}{}", self.base_url, path))
            .query("address", identifier)
            .header("x-chain", self.network.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key.as_str());
        }
        request
    }

    /// The market-data aggregator ID the indexer lists for `identifier`.
    pub async fn market_id(&self, identifier: &str) -> Result<Option<String>, PriceError> {
        let request = self.request("/defi/token_overview", identifier);
        let res = self.fetcher.fetch(&request, self.auxiliary_timeout).await?;
        parse_market_id(res).map_err(|message| PriceError::parse(INDEXER, message))
    }
}

fn parse_price(res: Value) -> ParseOutcome {
    let envelope: Envelope<PriceData> = match typed(res) {
        Ok(envelope) => envelope,
        Err(message) => return ParseOutcome::Malformed(message),
    };
    if envelope.success == Some(false) {
        return ParseOutcome::Unpriced;
    }
    ParseOutcome::from_field("value", envelope.data.and_then(|d| d.value).as_ref())
}

fn parse_market_id(res: Value) -> Result<Option<String>, String> {
    let envelope: Envelope<Overview> = typed(res)?;
    Ok(envelope
        .data
        .and_then(|o| o.extensions)
        .and_then(|e| e.coingecko_id)
        .filter(|id| !id.trim().is_empty()))
}

#[async_trait]
impl PriceSource for IndexerSource {
    fn name(&self) -> &str {
        INDEXER
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let request = self.request("/defi/price", identifier);
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        parse_price(res).into_candidate(INDEXER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use serde_json::json;

    fn indexer(fetcher: &Arc<ScriptedFetcher>, key: Option<&str>) -> IndexerSource {
        IndexerSource::new(
            fetcher.clone(),
            "https://indexer.example",
            key.map(str::to_owned),
            "sui",
            Duration::from_secs(8),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(
            parse_price(json!({"success": true, "data": {"value": 0.42}})),
            ParseOutcome::Priced(0.42)
        );
        assert_eq!(
            parse_price(json!({"success": false, "message": "not found"})),
            ParseOutcome::Unpriced
        );
        assert_eq!(parse_price(json!({"success": true, "data": null})), ParseOutcome::Unpriced);
        assert!(matches!(parse_price(json!("oops")), ParseOutcome::Malformed(_)));
    }

    #[test]
    fn test_parse_market_id() {
        let res = json!({"data": {"extensions": {"coingeckoId": "tok-coin"}}});
        assert_eq!(parse_market_id(res).unwrap().as_deref(), Some("tok-coin"));
        let blank = json!({"data": {"extensions": {"coingeckoId": ""}}});
        assert_eq!(parse_market_id(blank).unwrap(), None);
        assert_eq!(parse_market_id(json!({"data": {}})).unwrap(), None);
    }

    #[tokio::test]
    async fn test_price_request_carries_chain_and_key() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(
            "/defi/price?address=0xabc::mod::TOK",
            json!({"success": true, "data": {"value": 1.5}}),
        ));
        let source = indexer(&fetcher, Some("secret"));
        assert_eq!(source.candidate("0xabc::mod::TOK").await.unwrap(), Some(1.5));
        let request = &fetcher.requests()[0];
        assert!(request.headers.contains(&("x-chain".to_owned(), "sui".to_owned())));
        assert!(request.headers.contains(&("X-API-KEY".to_owned(), "secret".to_owned())));
    }

    #[tokio::test]
    async fn test_market_id_uses_overview() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(
            "/defi/token_overview",
            json!({"data": {"extensions": {"coingeckoId": "tok-coin"}}}),
        ));
        let source = indexer(&fetcher, None);
        assert_eq!(
            source.market_id("0xabc::mod::TOK").await.unwrap().as_deref(),
            Some("tok-coin")
        );
        assert_eq!(fetcher.requests()[0].headers.len(), 1);
    }
}
