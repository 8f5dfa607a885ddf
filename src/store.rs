//! Persistent record stores behind the price cache.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::PriceError;

/// Last known price of one asset. A price of zero means "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub identifier: String,
    pub price: f64,
    /// Milliseconds since the Unix epoch.
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn get_record(&self, identifier: &str) -> Result<Option<PriceRecord>, PriceError>;

    /// Inserts or replaces the record for `record.identifier`.
    async fn upsert_record(&self, record: PriceRecord) -> Result<(), PriceError>;
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, PriceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn get_record(&self, identifier: &str) -> Result<Option<PriceRecord>, PriceError> {
        Ok(self.records.read().get(identifier).cloned())
    }

    async fn upsert_record(&self, record: PriceRecord) -> Result<(), PriceError> {
        self.records.write().insert(record.identifier.clone(), record);
        Ok(())
    }
}

/// Keeps records in memory and rewrites a JSON file on every upsert.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<HashMap<String, PriceRecord>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PriceError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<PriceRecord> = serde_json::from_slice(&bytes).map_err(|e| {
                    PriceError::Cache(format!("reading {}: {}", path.display(), e))
                })?;
                list.into_iter()
                    .map(|r| (r.identifier.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(PriceError::Cache(format!(
                    "opening {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        info!("Loaded {} price records from {}", records.len(), path.display());
        Ok(Self {
            path,
            records: RwLock::new(records),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl PriceStore for JsonFileStore {
    async fn get_record(&self, identifier: &str) -> Result<Option<PriceRecord>, PriceError> {
        Ok(self.records.read().get(identifier).cloned())
    }

    async fn upsert_record(&self, record: PriceRecord) -> Result<(), PriceError> {
        let _guard = self.write_lock.lock().await;
        let bytes = {
            let mut records = self.records.write();
            records.insert(record.identifier.clone(), record);
            let mut list: Vec<&PriceRecord> = records.values().collect();
            list.sort_by(|a, b| a.identifier.cmp(&b.identifier));
            serde_json::to_vec_pretty(&list).map_err(|e| PriceError::Cache(e.to_string()))?
        };
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| PriceError::Cache(format!("writing {}: {}", self.path.display(), e)))
    }
}
