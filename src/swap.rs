//! Quote-based pricing through a swap aggregator: sell one whole unit of the
//! asset for the reference stable asset and read the output amount.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::identifier::{canonical, same_asset};
use crate::parse::{typed, JsonNumber};
use crate::source::PriceSource;

pub const SWAP_QUOTE: &str = "swap_quote";

/// Asset that quotes are denominated in, assumed to trade at one dollar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceAsset {
    pub identifier: String,
    pub decimals: u8,
}

/// Decimal precision per asset, read from coin metadata over JSON-RPC and
/// memoised.
pub struct DecimalsLookup {
    fetcher: Arc<dyn JsonFetcher>,
    rpc_url: String,
    timeout: Duration,
    known: RwLock<HashMap<String, u8>>,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<CoinMetadata>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct CoinMetadata {
    decimals: u8,
}

impl DecimalsLookup {
    pub fn new<I>(fetcher: Arc<dyn JsonFetcher>, rpc_url: &str, timeout: Duration, known: I) -> Self
    where
        I: IntoIterator<Item = (String, u8)>,
    {
        Self {
            fetcher,
            rpc_url: rpc_url.to_owned(),
            timeout,
            known: RwLock::new(known.into_iter().map(|(k, v)| (canonical(&k), v)).collect()),
        }
    }

    pub async fn decimals(&self, identifier: &str) -> Result<Option<u8>, PriceError> {
        let key = canonical(identifier);
        let known = self.known.read().get(&key).copied();
        if known.is_some() {
            return Ok(known);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "suix_getCoinMetadata",
            "params": [identifier],
        });
        let res = self
            .fetcher
            .fetch(&JsonRequest::post(self.rpc_url.as_str(), body), self.timeout)
            .await?;
        let parsed: RpcResponse =
            typed(res).map_err(|message| PriceError::parse(SWAP_QUOTE, message))?;
        if let Some(error) = parsed.error {
            return Err(PriceError::parse(SWAP_QUOTE, format!("metadata rpc error: {}", error)));
        }
        let decimals = parsed.result.map(|m| m.decimals);
        if let Some(decimals) = decimals {
            self.known.write().insert(key, decimals);
        }
        Ok(decimals)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    return_amount: Option<JsonNumber>,
}

pub struct SwapQuoteSource {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    timeout: Duration,
    reference: ReferenceAsset,
    decimals: Arc<DecimalsLookup>,
}

impl SwapQuoteSource {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: &str,
        timeout: Duration,
        reference: ReferenceAsset,
        decimals: Arc<DecimalsLookup>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
            reference,
            decimals,
        }
    }
}

/// `10^decimals` as an integer string, the on-chain size of one whole unit.
fn one_unit(decimals: u8) -> String {
    format!("1{}", "0".repeat(decimals as usize))
}

fn scale(amount: f64, decimals: u8) -> f64 {
    amount / 10f64.powi(decimals as i32)
}

#[async_trait]
impl PriceSource for SwapQuoteSource {
    fn name(&self) -> &str {
        SWAP_QUOTE
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        if same_asset(identifier, &self.reference.identifier) {
            return Ok(None);
        }
        let decimals_in = match self.decimals.decimals(identifier).await? {
            Some(decimals) => decimals,
            None => {
                debug!("{}: no coin metadata, cannot size a quote", identifier);
                return Ok(None);
            }
        };

        let request = JsonRequest::get(format!("{}/quote", self.base_url))
            .query("amount", one_unit(decimals_in))
            .query("from", identifier)
            .query("to", self.reference.identifier.as_str());
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        let quote: QuoteResponse =
            typed(res).map_err(|message| PriceError::parse(SWAP_QUOTE, message))?;

        match quote.return_amount {
            None => Ok(None),
            Some(amount) => match amount.as_f64() {
                Some(out) => Ok(Some(scale(out, self.reference.decimals))),
                None => Err(PriceError::parse(
                    SWAP_QUOTE,
                    format!("returnAmount is not numeric: {:?}", amount),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;

    const USDC: &str = "0xdba3::usdc::USDC";
    const TOK: &str = "0xabc::mod::TOK";

    fn source(fetcher: &Arc<ScriptedFetcher>) -> SwapQuoteSource {
        let decimals = Arc::new(DecimalsLookup::new(
            fetcher.clone(),
            "https://rpc.example",
            Duration::from_secs(5),
            vec![(USDC.to_owned(), 6)],
        ));
        SwapQuoteSource::new(
            fetcher.clone(),
            "https://swap.example",
            Duration::from_secs(8),
            ReferenceAsset {
                identifier: USDC.to_owned(),
                decimals: 6,
            },
            decimals,
        )
    }

    #[test]
    fn test_units() {
        assert_eq!(one_unit(0), "1");
        assert_eq!(one_unit(9), "1000000000");
        assert!((scale(1_234_567.0, 6) - 1.234567).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_quote_is_scaled_by_both_decimals() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .respond(
                    "rpc.example",
                    json!({"jsonrpc": "2.0", "id": 1, "result": {"decimals": 9}}),
                )
                .respond("/quote?amount=1000000000&from=0xabc", json!({"returnAmount": "2500000"})),
        );
        let source = source(&fetcher);
        assert_eq!(source.candidate(TOK).await.unwrap(), Some(2.5));
        // Decimals are memoised.
        assert_eq!(source.candidate(TOK).await.unwrap(), Some(2.5));
        assert_eq!(fetcher.request_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_unpriced() {
        let fetcher =
            Arc::new(ScriptedFetcher::new().respond("rpc.example", json!({"result": null})));
        assert_eq!(source(&fetcher).candidate(TOK).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rpc_error_is_parse_error() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().respond(
                "rpc.example",
                json!({"error": {"code": -32602, "message": "bad"}}),
            ),
        );
        assert!(matches!(
            source(&fetcher).candidate(TOK).await,
            Err(PriceError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_reference_asset_is_not_quoted_against_itself() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        assert_eq!(source(&fetcher).candidate(USDC).await.unwrap(), None);
        assert_eq!(fetcher.request_count(), 0);
    }
}
