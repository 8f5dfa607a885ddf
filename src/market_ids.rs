//! Identifier → market-data aggregator ID mapping.
//!
//! Seeded from configured known pairs, appended to as the market source
//! discovers new IDs, and optionally mirrored to a JSON file so discoveries
//! survive restarts.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::error::PriceError;
use crate::identifier::canonical;

pub struct MarketIdTable {
    ids: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

impl MarketIdTable {
    pub fn new<I, K, V>(known: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let ids = known
            .into_iter()
            .map(|(k, v)| (canonical(k.as_ref()), v.into()))
            .collect();
        Self {
            ids: RwLock::new(ids),
            path: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Adds the entries saved at `path` (if any) on top of `known`, and keeps
    /// the file updated from now on. Saved entries win over known ones.
    pub async fn persisted<I, K, V>(known: I, path: impl Into<PathBuf>) -> Result<Self, PriceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let path = path.into();
        let mut table = Self::new(known);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let saved: HashMap<String, String> = serde_json::from_slice(&bytes)
                    .map_err(|e| PriceError::Config(format!("reading {}: {}", path.display(), e)))?;
                info!("Loaded {} market ids from {}", saved.len(), path.display());
                let mut ids = table.ids.write();
                for (identifier, market_id) in saved {
                    ids.insert(canonical(&identifier), market_id);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PriceError::Config(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        }
        table.path = Some(path);
        Ok(table)
    }

    pub fn get(&self, identifier: &str) -> Option<String> {
        self.ids.read().get(&canonical(identifier)).cloned()
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// Remembers a discovered mapping. Persistence failures are logged only.
    pub async fn record(&self, identifier: &str, market_id: &str) {
        let key = canonical(identifier);
        {
            let mut ids = self.ids.write();
            if ids.get(&key).map(String::as_str) == Some(market_id) {
                return;
            }
            ids.insert(key, market_id.to_owned());
        }
        debug!("Mapped {} to market id {}", identifier, market_id);

        if let Some(path) = &self.path {
            let _guard = self.write_lock.lock().await;
            let bytes = {
                let ids = self.ids.read();
                serde_json::to_vec_pretty(&*ids)
            };
            let written = match bytes {
                Ok(bytes) => tokio::fs::write(path, bytes).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = written {
                warn!("Could not save market ids to {}: {}", path.display(), e);
            }
        }
    }
}
