//! Engine configuration: an optional file overridden by `PRICE_ENGINE_*`
//! environment variables (nested keys separated by `__`).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::cache::DEFAULT_TTL;
use crate::cg::{MARKET, MARKET_KNOWN};
use crate::dexscreener::{BASE_PAIR_SCAN, DEX_SEARCH};
use crate::fetch::{AUXILIARY_TIMEOUT, GENERAL_TIMEOUT};
use crate::finance::FINANCE_API;
use crate::indexer::INDEXER;
use crate::oracle::{ORACLE, ORACLE_BATCH};
use crate::retry::RetryPolicy;
use crate::swap::SWAP_QUOTE;

pub const DEFAULT_CONFIG_FILE: &str = "PriceEngine";
pub const ENV_PREFIX: &str = "PRICE_ENGINE";

pub const SUI: &str = "0x2::sui::SUI";
pub const USDC: &str =
    "0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7::usdc::USDC";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Chain tag sources use to filter pairs and listings.
    pub network: String,
    pub base_asset: String,
    pub base_decimals: u8,
    pub reference: ReferenceSettings,
    pub cache_ttl_secs: u64,
    /// Overall bound on one resolution; 0, the default, leaves it unbounded.
    pub resolution_deadline_ms: u64,
    pub timeouts: TimeoutSettings,
    pub retry: RetrySettings,
    pub endpoints: Endpoints,
    pub indexer_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub known_market_ids: Vec<KnownMarketId>,
    /// Where discovered market ids are kept between runs.
    pub market_ids_path: Option<String>,
    /// JSON file for price records; records stay in memory when unset.
    pub store_path: Option<String>,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceSettings {
    pub identifier: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub general_ms: u64,
    pub auxiliary_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    /// Attempts per source name; unlisted sources use their default.
    pub attempts: HashMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub oracle: String,
    pub indexer: String,
    pub dexscreener: String,
    pub coingecko: String,
    pub swap: String,
    pub finance: String,
    pub rpc: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct KnownMarketId {
    pub identifier: String,
    pub market_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceOverride {
    pub identifier: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub default: Vec<String>,
    pub base: Vec<String>,
    pub overrides: Vec<SourceOverride>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: "sui".to_owned(),
            base_asset: SUI.to_owned(),
            base_decimals: 9,
            reference: ReferenceSettings::default(),
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            resolution_deadline_ms: 0,
            timeouts: TimeoutSettings::default(),
            retry: RetrySettings::default(),
            endpoints: Endpoints::default(),
            indexer_api_key: None,
            coingecko_api_key: None,
            known_market_ids: vec![
                KnownMarketId {
                    identifier: SUI.to_owned(),
                    market_id: "sui".to_owned(),
                },
                KnownMarketId {
                    identifier: USDC.to_owned(),
                    market_id: "usd-coin".to_owned(),
                },
            ],
            market_ids_path: None,
            store_path: None,
            policy: PolicySettings::default(),
        }
    }
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            identifier: USDC.to_owned(),
            decimals: 6,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            general_ms: GENERAL_TIMEOUT.as_millis() as u64,
            auxiliary_ms: AUXILIARY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: RetryPolicy::DEFAULT_BASE_DELAY.as_millis() as u64,
            attempts: HashMap::new(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            oracle: "https://aftermath.finance".to_owned(),
            indexer: "https://public-api.birdeye.so".to_owned(),
            dexscreener: "https://api.dexscreener.com".to_owned(),
            coingecko: "https://api.coingecko.com/api/v3".to_owned(),
            swap: "https://api.7k.ag".to_owned(),
            finance: "https://open-api.naviprotocol.io/api".to_owned(),
            rpc: "https://fullnode.mainnet.sui.io:443".to_owned(),
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            default: names(&[
                ORACLE,
                INDEXER,
                DEX_SEARCH,
                MARKET,
                SWAP_QUOTE,
                FINANCE_API,
                ORACLE_BATCH,
                BASE_PAIR_SCAN,
            ]),
            base: names(&[MARKET_KNOWN, ORACLE, INDEXER, DEX_SEARCH]),
            overrides: vec![],
        }
    }
}

impl Settings {
    /// Reads `file` (any extension `config` understands, optional) and then
    /// the environment, on top of the defaults.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut cfg = Config::default();
        let name = file.unwrap_or(DEFAULT_CONFIG_FILE);
        cfg.merge(File::with_name(name).required(file.is_some()))
            .with_context(|| format!("Reading config file {}", name))?;
        cfg.merge(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .context("Reading PRICE_ENGINE_* environment")?;
        cfg.try_into().context("Parsing settings")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn resolution_deadline(&self) -> Option<Duration> {
        match self.resolution_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn general_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.general_ms)
    }

    pub fn auxiliary_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.auxiliary_ms)
    }

    /// Retry budget for `source`: two attempts for the leading sources,
    /// one for the fallbacks, unless configured otherwise.
    pub fn retry_for(&self, source: &str) -> RetryPolicy {
        let default_attempts = match source {
            ORACLE | INDEXER | DEX_SEARCH | MARKET | MARKET_KNOWN => RetryPolicy::DEFAULT_ATTEMPTS,
            _ => 1,
        };
        let attempts = self
            .retry
            .attempts
            .get(source)
            .copied()
            .unwrap_or(default_attempts);
        RetryPolicy::new(attempts, Duration::from_millis(self.retry.base_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_policy() {
        let settings = Settings::default();
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.general_timeout(), Duration::from_millis(8000));
        assert_eq!(settings.auxiliary_timeout(), Duration::from_millis(5000));
        assert_eq!(settings.policy.default.len(), 8);
        assert_eq!(settings.policy.base, vec!["market_known", "oracle", "indexer", "dex_search"]);
        assert_eq!(settings.retry_for(ORACLE).max_attempts, 2);
        assert_eq!(settings.retry_for(BASE_PAIR_SCAN).max_attempts, 1);
        assert_eq!(settings.resolution_deadline(), None);
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir()
            .join(format!("coinprice-settings-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
network = "sui"
base_asset = "BASE::ASSET"
cache_ttl_secs = 60
resolution_deadline_ms = 90000

[retry]
base_delay_ms = 250
[retry.attempts]
swap_quote = 3

[[known_market_ids]]
identifier = "BASE::ASSET"
market_id = "base-coin"

[policy]
default = ["dex_search", "oracle"]

[[policy.overrides]]
identifier = "0xabc::mod::TOK"
sources = ["indexer"]
"#
        )
        .unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.base_asset, "BASE::ASSET");
        assert_eq!(settings.cache_ttl(), Duration::from_secs(60));
        assert_eq!(settings.resolution_deadline(), Some(Duration::from_secs(90)));
        assert_eq!(settings.retry_for(SWAP_QUOTE).max_attempts, 3);
        assert_eq!(
            settings.retry_for(SWAP_QUOTE).base_delay,
            Duration::from_millis(250)
        );
        assert_eq!(settings.known_market_ids[0].market_id, "base-coin");
        assert_eq!(settings.policy.default, vec!["dex_search", "oracle"]);
        assert_eq!(settings.policy.base.len(), 4);
        assert_eq!(settings.policy.overrides[0].sources, vec!["indexer"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some("/nonexistent/coinprice.toml")).is_err());
    }
}
