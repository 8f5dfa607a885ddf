//! DEX pair lookups: a pair search by identifier and a last-resort scan of
//! the pairs a token trades in against the base asset.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::identifier::{contract_address, same_asset};
use crate::parse::{typed, JsonNumber};
use crate::source::PriceSource;
use crate::validate::is_valid;

pub const DEX_SEARCH: &str = "dex_search";
pub const BASE_PAIR_SCAN: &str = "base_pair_scan";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub chain_id: Option<String>,
    pub dex_id: Option<String>,
    pub price_usd: Option<JsonNumber>,
    pub liquidity: Option<Liquidity>,
    pub base_token: Option<PairToken>,
    pub quote_token: Option<PairToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    pub usd: Option<JsonNumber>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairToken {
    pub address: Option<String>,
    pub symbol: Option<String>,
}

impl Pair {
    pub fn price(&self) -> Option<f64> {
        self.price_usd.as_ref().and_then(JsonNumber::as_f64)
    }

    pub fn liquidity_usd(&self) -> f64 {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd.as_ref())
            .and_then(JsonNumber::as_f64)
            .unwrap_or(0.0)
    }

    fn on_network(&self, network: &str) -> bool {
        self.chain_id
            .as_deref()
            .map_or(false, |chain| chain.eq_ignore_ascii_case(network))
    }

    fn quoted_in(&self, asset: &str) -> bool {
        self.quote_token
            .as_ref()
            .and_then(|t| t.address.as_deref())
            .map_or(false, |address| same_asset(address, asset))
    }
}

#[derive(Deserialize)]
struct PairsResponse {
    pairs: Option<Vec<Pair>>,
}

/// Highest-liquidity pair on `network` with a usable price; failing that,
/// any pair with a usable price.
pub fn select_pair(pairs: &[Pair], network: &str) -> Option<f64> {
    let best = pairs
        .iter()
        .filter(|p| p.on_network(network) && p.liquidity_usd() > 0.0)
        .filter_map(|p| p.price().map(|price| (p.liquidity_usd(), price)))
        .filter(|(_, price)| is_valid(*price))
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    if let Some((liquidity, price)) = best {
        debug!("Selected pair with ${} liquidity", liquidity);
        return Some(price);
    }
    pairs.iter().filter_map(Pair::price).find(|p| is_valid(*p))
}

/// A pair quoted directly in `base_asset` if there is one, else the first
/// pair with a parseable price.
pub fn select_base_quoted(pairs: &[Pair], base_asset: &str) -> Option<f64> {
    pairs
        .iter()
        .filter(|p| p.quoted_in(base_asset))
        .find_map(Pair::price)
        .or_else(|| pairs.iter().find_map(Pair::price))
}

pub struct DexScreenerAPI {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    timeout: Duration,
}

impl DexScreenerAPI {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: &str, timeout: Duration) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Pair>, PriceError> {
        let request =
            JsonRequest::get(format!("{}/latest/dex/search", self.base_url)).query("q", query);
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        parse_pairs(DEX_SEARCH, res)
    }

    pub async fn token_pairs(&self, identifier: &str) -> Result<Vec<Pair>, PriceError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, identifier);
        let res = self.fetcher.fetch(&JsonRequest::get(url), self.timeout).await?;
        parse_pairs(BASE_PAIR_SCAN, res)
    }
}

fn parse_pairs(provider: &str, res: Value) -> Result<Vec<Pair>, PriceError> {
    let parsed: PairsResponse = typed(res).map_err(|message| PriceError::parse(provider, message))?;
    Ok(parsed.pairs.unwrap_or_default())
}

pub struct DexSearchSource {
    api: Arc<DexScreenerAPI>,
    network: String,
}

impl DexSearchSource {
    pub fn new(api: Arc<DexScreenerAPI>, network: &str) -> Self {
        Self {
            api,
            network: network.to_owned(),
        }
    }
}

#[async_trait]
impl PriceSource for DexSearchSource {
    fn name(&self) -> &str {
        DEX_SEARCH
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let mut pairs = self.api.search(identifier).await?;
        if pairs.is_empty() {
            let address = contract_address(identifier);
            if address != identifier {
                debug!("No pairs for {}, searching by address {}", identifier, address);
                pairs = self.api.search(address).await?;
            }
        }
        Ok(select_pair(&pairs, &self.network))
    }
}

pub struct BasePairScanSource {
    api: Arc<DexScreenerAPI>,
    base_asset: String,
}

impl BasePairScanSource {
    pub fn new(api: Arc<DexScreenerAPI>, base_asset: &str) -> Self {
        Self {
            api,
            base_asset: base_asset.to_owned(),
        }
    }
}

#[async_trait]
impl PriceSource for BasePairScanSource {
    fn name(&self) -> &str {
        BASE_PAIR_SCAN
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        let pairs = self.api.token_pairs(identifier).await?;
        Ok(select_base_quoted(&pairs, &self.base_asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use serde_json::json;

    const SUI: &str = "0x2::sui::SUI";
    const PADDED_SUI: &str =
        "0x0000000000000000000000000000000000000000000000000000000000000002::sui::SUI";

    fn pairs(value: Value) -> Vec<Pair> {
        serde_json::from_value(value).unwrap()
    }

    fn api(fetcher: &Arc<ScriptedFetcher>) -> Arc<DexScreenerAPI> {
        Arc::new(DexScreenerAPI::new(
            fetcher.clone(),
            "https://dex.example",
            Duration::from_secs(8),
        ))
    }

    #[test]
    fn test_select_pair_prefers_deepest_liquidity_on_network() {
        let pairs = pairs(json!([
            {"chainId": "sui", "priceUsd": "1.00", "liquidity": {"usd": 1000}},
            {"chainId": "sui", "priceUsd": "1.10", "liquidity": {"usd": 5000}},
            {"chainId": "ethereum", "priceUsd": "9.99", "liquidity": {"usd": 90000}},
        ]));
        assert_eq!(select_pair(&pairs, "sui"), Some(1.10));
    }

    #[test]
    fn test_select_pair_skips_deepest_pair_without_usable_price() {
        let pairs = pairs(json!([
            {"chainId": "sui", "priceUsd": "0", "liquidity": {"usd": 9000}},
            {"chainId": "sui", "priceUsd": "1.10", "liquidity": {"usd": 5000}},
            {"chainId": "sui", "priceUsd": "-2", "liquidity": {"usd": 7000}},
        ]));
        assert_eq!(select_pair(&pairs, "sui"), Some(1.10));
    }

    #[test]
    fn test_select_pair_falls_back_to_any_usable_price() {
        let pairs = pairs(json!([
            {"chainId": "sui", "priceUsd": "2.0", "liquidity": {"usd": 0}},
            {"chainId": "aptos", "priceUsd": "0", "liquidity": {"usd": 100}},
            {"chainId": "aptos", "priceUsd": "3.5"},
        ]));
        assert_eq!(select_pair(&pairs, "ethereum"), Some(2.0));
        assert_eq!(select_pair(&[], "sui"), None);
    }

    #[test]
    fn test_select_base_quoted() {
        let pairs = pairs(json!([
            {"priceUsd": "0.8", "quoteToken": {"address": "0xusdc::usdc::USDC"}},
            {"priceUsd": "0.9", "quoteToken": {"address": PADDED_SUI}},
        ]));
        assert_eq!(select_base_quoted(&pairs, SUI), Some(0.9));

        let unquoted = pairs_without_base();
        assert_eq!(select_base_quoted(&unquoted, SUI), Some(0.7));
    }

    fn pairs_without_base() -> Vec<Pair> {
        pairs(json!([
            {"priceUsd": null, "quoteToken": {"address": "0xusdc::usdc::USDC"}},
            {"priceUsd": "0.7", "quoteToken": {"address": "0xusdt::usdt::USDT"}},
        ]))
    }

    #[tokio::test]
    async fn test_search_falls_back_to_contract_address() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .respond("q=0xabc::mod::TOK", json!({"pairs": null}))
                .respond(
                    "q=0xabc",
                    json!({"pairs": [
                        {"chainId": "sui", "priceUsd": "4.2", "liquidity": {"usd": 10}}
                    ]}),
                ),
        );
        let source = DexSearchSource::new(api(&fetcher), "sui");
        assert_eq!(source.candidate("0xabc::mod::TOK").await.unwrap(), Some(4.2));
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_search_malformed_is_error() {
        let fetcher =
            Arc::new(ScriptedFetcher::new().respond("/latest/dex/search", json!({"pairs": 3})));
        let source = DexSearchSource::new(api(&fetcher), "sui");
        assert!(matches!(
            source.candidate("0xabc::mod::TOK").await,
            Err(PriceError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_base_pair_scan_uses_token_endpoint() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(
            "/latest/dex/tokens/0xabc::mod::TOK",
            json!({"pairs": [{"priceUsd": "0.05", "quoteToken": {"address": SUI}}]}),
        ));
        let source = BasePairScanSource::new(api(&fetcher), SUI);
        assert_eq!(source.candidate("0xabc::mod::TOK").await.unwrap(), Some(0.05));
    }
}
