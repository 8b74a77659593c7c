//! Data-source identifiers and the persisted source preference.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PreferenceError;

/// Canonical data-source identifiers.
///
/// `ALL` doubles as the fixed fallback priority order; membership validation
/// for [`SourceRegistry::set_preference`] is free because invalid names
/// cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Eastmoney,
    Sina,
    Tushare,
}

impl SourceId {
    pub const ALL: [Self; 3] = [Self::Eastmoney, Self::Sina, Self::Tushare];

    /// Preference used when storage is absent or unreadable.
    pub const DEFAULT: Self = Self::Sina;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eastmoney => "eastmoney",
            Self::Sina => "sina",
            Self::Tushare => "tushare",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = PreferenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eastmoney" => Ok(Self::Eastmoney),
            "sina" => Ok(Self::Sina),
            "tushare" => Ok(Self::Tushare),
            other => Err(PreferenceError::UnknownSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// On-disk shape of the preference record.
#[derive(Debug, Serialize, Deserialize)]
struct PreferenceRecord {
    data_source: SourceId,
}

/// Durable storage for the preferred source.
///
/// `load` returning `Ok(None)` means "nothing persisted yet"; corruption is
/// an `Err` so the registry can log it and fall back to the default.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Option<SourceId>, PreferenceError>;
    fn save(&self, source: SourceId) -> Result<(), PreferenceError>;
}

/// Preference persisted as a small JSON file: `{"data_source": "sina"}`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Option<SourceId>, PreferenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let record: PreferenceRecord = serde_json::from_str(&raw)?;
        Ok(Some(record.data_source))
    }

    fn save(&self, source: SourceId) -> Result<(), PreferenceError> {
        let record = PreferenceRecord {
            data_source: source,
        };
        let raw = serde_json::to_string_pretty(&record)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<SourceId>>,
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<Option<SourceId>, PreferenceError> {
        Ok(*self.slot.lock().expect("preference slot lock is not poisoned"))
    }

    fn save(&self, source: SourceId) -> Result<(), PreferenceError> {
        *self.slot.lock().expect("preference slot lock is not poisoned") = Some(source);
        Ok(())
    }
}

/// Owns read/write access to the persisted preference and caches the value
/// after the first load, keeping storage off the hot path.
pub struct SourceRegistry {
    store: Arc<dyn PreferenceStore>,
    cached: RwLock<Option<SourceId>>,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    /// Current preferred source. Unreadable or absent storage yields the
    /// default; this never fails.
    pub fn preference(&self) -> SourceId {
        if let Some(source) = *self
            .cached
            .read()
            .expect("preference cache lock is not poisoned")
        {
            return source;
        }

        let loaded = match self.store.load() {
            Ok(Some(source)) => source,
            Ok(None) => SourceId::DEFAULT,
            Err(err) => {
                error!(error = %err, "failed to read source preference, using default");
                SourceId::DEFAULT
            }
        };
        *self
            .cached
            .write()
            .expect("preference cache lock is not poisoned") = Some(loaded);
        loaded
    }

    /// Persist a new preference. Storage failures are logged and reported as
    /// `false`; they never interrupt a fetch.
    pub fn set_preference(&self, source: SourceId) -> bool {
        match self.store.save(source) {
            Ok(()) => {
                *self
                    .cached
                    .write()
                    .expect("preference cache lock is not poisoned") = Some(source);
                info!(source = %source, "data source preference updated");
                true
            }
            Err(err) => {
                error!(error = %err, source = %source, "failed to persist source preference");
                false
            }
        }
    }
}
