use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PriceError;
use crate::fetch::{JsonFetcher, JsonRequest};
use crate::identifier::symbol;
use crate::indexer::IndexerSource;
use crate::market_ids::MarketIdTable;
use crate::parse::{typed, JsonNumber, ParseOutcome};
use crate::source::PriceSource;
use crate::validate::is_valid;

pub const MARKET: &str = "market";
pub const MARKET_KNOWN: &str = "market_known";

const COIN_LIST_MAX_AGE: Duration = Duration::from_secs(3600 * 24);

#[derive(Debug, Clone, Deserialize)]
pub struct CoinListEntry {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

impl CoinListEntry {
    fn listed_on(&self, network: &str) -> bool {
        self.platforms
            .get(network)
            .map_or(false, |address| address.as_deref().map_or(false, |a| !a.is_empty()))
    }
}

struct CoinListCache {
    data: Arc<Vec<CoinListEntry>>,
    last_refresh: Option<Instant>,
}

pub struct CoinGeckoAPI {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    auxiliary_timeout: Duration,
    coin_list: Mutex<CoinListCache>,
}

impl CoinGeckoAPI {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        auxiliary_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            timeout,
            auxiliary_timeout,
            coin_list: Mutex::new(CoinListCache {
                data: Arc::new(vec![]),
                last_refresh: None,
            }),
        }
    }

    fn request(&self, path: &str) -> JsonRequest {
        let request = JsonRequest::get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.header("x-cg-demo-api-key", key.as_str()),
            None => request,
        }
    }

    pub async fn simple_price(&self, market_id: &str) -> Result<Option<f64>, PriceError> {
        let request = self
            .request("/simple/price")
            .query("ids", market_id)
            .query("vs_currencies", "usd");
        let res = self.fetcher.fetch(&request, self.timeout).await?;
        debug!("CoinGecko response {:?}", res);
        parse_simple_price(res, market_id).into_candidate(MARKET)
    }

    async fn fetch_coin_list(&self) -> Result<Vec<CoinListEntry>, PriceError> {
        let request = self.request("/coins/list").query("include_platform", "true");
        let res = self.fetcher.fetch(&request, self.auxiliary_timeout).await?;
        typed(res).map_err(|message| PriceError::parse(MARKET, message))
    }

    /// The coin list, refreshed once it is a day old.
    async fn coin_list(&self) -> Result<Arc<Vec<CoinListEntry>>, PriceError> {
        let mut fresh_list = None::<Vec<CoinListEntry>>;
        loop {
            {
                let mut cache = self.coin_list.lock();
                let refreshed = fresh_list.is_some();
                if let Some(list) = fresh_list.take() {
                    info!("Refreshed CoinGecko coin list ({} coins)", list.len());
                    cache.data = Arc::new(list);
                    cache.last_refresh = Some(Instant::now());
                }
                let current = cache
                    .last_refresh
                    .map_or(false, |at| at.elapsed() < COIN_LIST_MAX_AGE);
                if refreshed || (!cache.data.is_empty() && current) {
                    return Ok(cache.data.clone());
                }
            }
            fresh_list = Some(self.fetch_coin_list().await?);
        }
    }

    /// Finds the market ID for `symbol`, preferring a coin listed on `network`.
    pub async fn search_symbol(
        &self,
        symbol: &str,
        network: &str,
    ) -> Result<Option<String>, PriceError> {
        let list = self.coin_list().await?;
        Ok(pick_by_symbol(&list, symbol, network))
    }
}

fn parse_simple_price(res: Value, market_id: &str) -> ParseOutcome {
    let prices: HashMap<String, HashMap<String, JsonNumber>> = match typed(res) {
        Ok(prices) => prices,
        Err(message) => return ParseOutcome::Malformed(message),
    };
    ParseOutcome::from_field("usd", prices.get(market_id).and_then(|quote| quote.get("usd")))
}

fn pick_by_symbol(list: &[CoinListEntry], symbol: &str, network: &str) -> Option<String> {
    let mut matches = list.iter().filter(|c| c.symbol.eq_ignore_ascii_case(symbol));
    let first = matches.next()?;
    if first.listed_on(network) {
        return Some(first.id.clone());
    }
    Some(
        matches
            .find(|c| c.listed_on(network))
            .unwrap_or(first)
            .id
            .clone(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only identifiers already in the market-ID table.
    KnownIdOnly,
    /// Discover missing IDs through the indexer, then by symbol.
    Discover,
}

/// General market-data aggregator source.
pub struct MarketSource {
    api: Arc<CoinGeckoAPI>,
    ids: Arc<MarketIdTable>,
    indexer: Option<Arc<IndexerSource>>,
    network: String,
    lookup: Lookup,
}

impl MarketSource {
    pub fn new(
        api: Arc<CoinGeckoAPI>,
        ids: Arc<MarketIdTable>,
        network: &str,
        lookup: Lookup,
    ) -> Self {
        Self {
            api,
            ids,
            indexer: None,
            network: network.to_owned(),
            lookup,
        }
    }

    /// Uses `indexer` to cross-reference market IDs before searching by symbol.
    pub fn with_indexer(mut self, indexer: Arc<IndexerSource>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    async fn via_indexer(&self, identifier: &str) -> Option<f64> {
        let indexer = self.indexer.as_ref()?;
        let market_id = match indexer.market_id(identifier).await {
            Ok(Some(market_id)) => market_id,
            Ok(None) => return None,
            Err(e) => {
                debug!("{}: indexer cross reference failed: {}", identifier, e);
                return None;
            }
        };
        self.ids.record(identifier, &market_id).await;
        match self.api.simple_price(&market_id).await {
            Ok(price) => price.filter(|p| is_valid(*p)),
            Err(e) => {
                debug!("{}: price for {} failed: {}", identifier, market_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl PriceSource for MarketSource {
    fn name(&self) -> &str {
        match self.lookup {
            Lookup::KnownIdOnly => MARKET_KNOWN,
            Lookup::Discover => MARKET,
        }
    }

    async fn candidate(&self, identifier: &str) -> Result<Option<f64>, PriceError> {
        if let Some(market_id) = self.ids.get(identifier) {
            return self.api.simple_price(&market_id).await;
        }
        if self.lookup == Lookup::KnownIdOnly {
            return Ok(None);
        }

        if let Some(price) = self.via_indexer(identifier).await {
            return Ok(Some(price));
        }

        let symbol = match symbol(identifier) {
            Some(symbol) => symbol,
            None => return Ok(None),
        };
        match self.api.search_symbol(symbol, &self.network).await? {
            Some(market_id) => {
                self.ids.record(identifier, &market_id).await;
                self.api.simple_price(&market_id).await
            }
            None => Ok(None),
        }
    }
}
