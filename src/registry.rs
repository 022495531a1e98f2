//! School register (reference table)
//!
//! Read-only rows of {UDISE, School, District, Block, Device Name, Status}.
//! Loaded whole, cached for a TTL, and swapped wholesale on refresh. A failed
//! load never falls back to an older copy.

use crate::error::ScanError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Devices with this status are hidden from the device list
const INACTIVE_STATUS: &str = "Inactive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    #[serde(rename = "UDISE")]
    pub udise: String,
    #[serde(rename = "School")]
    pub school: String,
    #[serde(rename = "District", default)]
    pub district: String,
    #[serde(rename = "Block", default)]
    pub block: String,
    #[serde(rename = "Device Name")]
    pub device_name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl RegistryRecord {
    pub fn is_active(&self) -> bool {
        !self.status.trim().eq_ignore_ascii_case(INACTIVE_STATUS)
    }
}

/// School-level details shared by all of a school's rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolInfo {
    pub udise: String,
    pub school: String,
    pub district: String,
    pub block: String,
}

/// Canonical string form of a UDISE code
///
/// Spreadsheets hand numeric codes back as floats, so `"12345.0"` and
/// `" 12345 "` both become `"12345"`.
pub fn canonical_udise(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// An immutable snapshot of the reference table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Vec<RegistryRecord>,
}

impl Registry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.udise = canonical_udise(&r.udise);
                r
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Sorted, de-duplicated `"UDISE - School"` labels matching `query`
    ///
    /// Matching is a case-insensitive substring test on the label; an empty
    /// query lists every school.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.trim().to_lowercase();
        let mut labels: Vec<String> = self
            .records
            .iter()
            .map(|r| format!("{} - {}", r.udise, r.school))
            .filter(|label| needle.is_empty() || label.to_lowercase().contains(&needle))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    pub fn school(&self, udise: &str) -> Option<SchoolInfo> {
        let udise = canonical_udise(udise);
        self.records
            .iter()
            .find(|r| r.udise == udise)
            .map(|r| SchoolInfo {
                udise: r.udise.clone(),
                school: r.school.clone(),
                district: r.district.clone(),
                block: r.block.clone(),
            })
    }

    /// Device names of a school, inactive rows excluded, in table order
    pub fn active_devices(&self, udise: &str) -> Vec<String> {
        let udise = canonical_udise(udise);
        let mut devices: Vec<String> = Vec::new();
        for record in self.records.iter().filter(|r| r.udise == udise && r.is_active()) {
            if !devices.contains(&record.device_name) {
                devices.push(record.device_name.clone());
            }
        }
        devices
    }
}

/// Where the reference table is loaded from
pub trait RegistrySource: Send + Sync {
    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Load every row; any failure means no data at all
    fn load(&self) -> Result<Vec<RegistryRecord>, ScanError>;
}

/// Reference table stored as a CSV file with a header row
pub struct CsvRegistrySource {
    path: PathBuf,
}

impl CsvRegistrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistrySource for CsvRegistrySource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Vec<RegistryRecord>, ScanError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| {
                ScanError::RegistryUnavailable(format!("Failed to open {:?}: {}", self.path, e))
            })?;

        reader
            .deserialize()
            .enumerate()
            .map(|(i, row)| {
                row.map_err(|e| {
                    ScanError::RegistryUnavailable(format!(
                        "Malformed row {} in {:?}: {}",
                        i + 2,
                        self.path,
                        e
                    ))
                })
            })
            .collect()
    }
}

struct Loaded {
    registry: Arc<Registry>,
    loaded_at: Instant,
}

/// Time-bounded cache of the reference table
pub struct RegistryCache {
    source: Arc<dyn RegistrySource>,
    ttl: Duration,
    slot: RwLock<Option<Loaded>>,
}

impl RegistryCache {
    pub fn new(source: Arc<dyn RegistrySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Current snapshot, reloading it if it has expired
    pub fn get(&self) -> Result<Arc<Registry>, ScanError> {
        if let Some(loaded) = self.slot.read().as_ref() {
            if loaded.loaded_at.elapsed() < self.ttl {
                return Ok(loaded.registry.clone());
            }
        }

        let mut slot = self.slot.write();
        // Another request may have refreshed while we waited for the lock
        if let Some(loaded) = slot.as_ref() {
            if loaded.loaded_at.elapsed() < self.ttl {
                return Ok(loaded.registry.clone());
            }
        }

        match self.source.load() {
            Ok(records) => {
                let registry = Arc::new(Registry::new(records));
                tracing::info!(
                    "Loaded {} reference rows from {}",
                    registry.len(),
                    self.source.describe()
                );
                *slot = Some(Loaded {
                    registry: registry.clone(),
                    loaded_at: Instant::now(),
                });
                Ok(registry)
            }
            Err(e) => {
                tracing::error!("Reference table load failed: {}", e);
                *slot = None;
                Err(e)
            }
        }
    }
}
