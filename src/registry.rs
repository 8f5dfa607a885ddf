//! Builds a [`PriceEngine`] out of [`Settings`]: every source by name, the
//! chains that reference them, and the cache underneath.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;

use crate::cache::{Clock, PriceCache, SystemClock};
use crate::cg::{CoinGeckoAPI, Lookup, MarketSource};
use crate::dexscreener::{BasePairScanSource, DexScreenerAPI, DexSearchSource};
use crate::error::PriceError;
use crate::fetch::{HttpFetcher, JsonFetcher};
use crate::finance::FinanceApiSource;
use crate::indexer::IndexerSource;
use crate::market_ids::MarketIdTable;
use crate::oracle::{OracleAPI, OracleBatchSource, OracleSource};
use crate::policy::SourcePolicy;
use crate::settings::Settings;
use crate::source::{PriceSource, SourceSlot};
use crate::store::{JsonFileStore, MemoryStore, PriceStore};
use crate::strategy::PriceEngine;
use crate::swap::{DecimalsLookup, ReferenceAsset, SwapQuoteSource};

/// Every source the engine knows, keyed by its name.
pub fn build_sources(
    settings: &Settings,
    fetcher: Arc<dyn JsonFetcher>,
    ids: Arc<MarketIdTable>,
) -> HashMap<String, Arc<dyn PriceSource>> {
    let endpoints = &settings.endpoints;
    let timeout = settings.general_timeout();
    let auxiliary = settings.auxiliary_timeout();

    let oracle = Arc::new(OracleAPI::new(fetcher.clone(), &endpoints.oracle, timeout));
    let dex = Arc::new(DexScreenerAPI::new(fetcher.clone(), &endpoints.dexscreener, timeout));
    let coingecko = Arc::new(CoinGeckoAPI::new(
        fetcher.clone(),
        &endpoints.coingecko,
        settings.coingecko_api_key.clone(),
        timeout,
        auxiliary,
    ));
    let indexer = Arc::new(IndexerSource::new(
        fetcher.clone(),
        &endpoints.indexer,
        settings.indexer_api_key.clone(),
        &settings.network,
        timeout,
        auxiliary,
    ));
    let decimals = Arc::new(DecimalsLookup::new(
        fetcher.clone(),
        &endpoints.rpc,
        auxiliary,
        vec![
            (settings.base_asset.clone(), settings.base_decimals),
            (settings.reference.identifier.clone(), settings.reference.decimals),
        ],
    ));

    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(OracleSource::new(oracle.clone())),
        indexer.clone(),
        Arc::new(DexSearchSource::new(dex.clone(), &settings.network)),
        Arc::new(
            MarketSource::new(coingecko.clone(), ids.clone(), &settings.network, Lookup::Discover)
                .with_indexer(indexer),
        ),
        Arc::new(MarketSource::new(coingecko, ids, &settings.network, Lookup::KnownIdOnly)),
        Arc::new(SwapQuoteSource::new(
            fetcher.clone(),
            &endpoints.swap,
            timeout,
            ReferenceAsset {
                identifier: settings.reference.identifier.clone(),
                decimals: settings.reference.decimals,
            },
            decimals,
        )),
        Arc::new(FinanceApiSource::new(fetcher, &endpoints.finance, timeout)),
        Arc::new(OracleBatchSource::new(oracle)),
        Arc::new(BasePairScanSource::new(dex, &settings.base_asset)),
    ];
    sources
        .into_iter()
        .map(|source| (source.name().to_owned(), source))
        .collect()
}

/// Resolves `names` against `sources`, attaching each one's retry budget.
pub fn chain(
    settings: &Settings,
    sources: &HashMap<String, Arc<dyn PriceSource>>,
    names: &[String],
) -> Result<Vec<SourceSlot>, PriceError> {
    names
        .iter()
        .map(|name| {
            sources
                .get(name)
                .map(|source| SourceSlot::new(source.clone(), settings.retry_for(name)))
                .ok_or_else(|| PriceError::Config(format!("unknown price source '{}'", name)))
        })
        .collect()
}

pub fn build_policy(
    settings: &Settings,
    sources: &HashMap<String, Arc<dyn PriceSource>>,
) -> Result<SourcePolicy, PriceError> {
    let policy = &settings.policy;
    let mut built = SourcePolicy::new(chain(settings, sources, &policy.default)?)
        .with_base_asset(&settings.base_asset, chain(settings, sources, &policy.base)?);
    for rule in &policy.overrides {
        built = built.with_override(&rule.identifier, chain(settings, sources, &rule.sources)?);
    }
    Ok(built)
}

fn known_market_ids(settings: &Settings) -> Vec<(String, String)> {
    settings
        .known_market_ids
        .iter()
        .map(|known| (known.identifier.clone(), known.market_id.clone()))
        .collect()
}

pub async fn open_market_ids(settings: &Settings) -> Result<MarketIdTable, PriceError> {
    let known = known_market_ids(settings);
    match &settings.market_ids_path {
        Some(path) => MarketIdTable::persisted(known, path).await,
        None => Ok(MarketIdTable::new(known)),
    }
}

pub async fn open_store(settings: &Settings) -> Result<Arc<dyn PriceStore>, PriceError> {
    Ok(match &settings.store_path {
        Some(path) => {
            info!("Keeping prices in {}", path);
            Arc::new(JsonFileStore::open(path).await?)
        }
        None => Arc::new(MemoryStore::new()),
    })
}

/// Engine over the given collaborators; nothing here touches the network.
pub fn engine_with(
    settings: &Settings,
    fetcher: Arc<dyn JsonFetcher>,
    ids: Arc<MarketIdTable>,
    store: Arc<dyn PriceStore>,
    clock: Arc<dyn Clock>,
) -> Result<PriceEngine, PriceError> {
    let sources = build_sources(settings, fetcher, ids);
    let policy = build_policy(settings, &sources)?;
    let cache = PriceCache::new(store, clock, settings.cache_ttl());
    Ok(PriceEngine::new(cache, policy).with_deadline(settings.resolution_deadline()))
}

/// Engine talking HTTP with the wall clock.
pub async fn engine_from_settings(settings: &Settings) -> Result<PriceEngine, PriceError> {
    let fetcher = Arc::new(HttpFetcher::build()?);
    let ids = Arc::new(open_market_ids(settings).await?);
    let store = open_store(settings).await?;
    engine_with(settings, fetcher, ids, store, Arc::new(SystemClock))
}
