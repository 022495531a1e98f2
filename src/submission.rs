//! Submission log: verification gate, duplicate guard, append-only store
//!
//! Rows are positional. Downstream consumers of the sheet read columns by
//! position, so `SubmissionLayout` is the wire format.

use crate::error::ScanError;
use crate::registry::{canonical_udise, Registry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Column order of the submission table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionLayout {
    /// (UDISE, School, Device Name, Serial, Email)
    #[default]
    Basic,
    /// (District, Block, UDISE, School, Device Name, Serial, Email)
    WithLocation,
}

impl SubmissionLayout {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Self::Basic => &["UDISE", "School", "Device Name", "Serial", "Email"],
            Self::WithLocation => &[
                "District",
                "Block",
                "UDISE",
                "School",
                "Device Name",
                "Serial",
                "Email",
            ],
        }
    }

    fn location_columns(&self) -> usize {
        match self {
            Self::Basic => 0,
            Self::WithLocation => 2,
        }
    }

    pub fn to_row(&self, record: &SubmissionRecord) -> Vec<String> {
        let mut row = Vec::with_capacity(self.header().len());
        if *self == Self::WithLocation {
            row.push(record.district.clone().unwrap_or_default());
            row.push(record.block.clone().unwrap_or_default());
        }
        row.extend([
            record.udise.clone(),
            record.school.clone(),
            record.device_name.clone(),
            record.serial.clone(),
            record.email.clone(),
        ]);
        row
    }

    pub fn from_row(&self, row: &[String]) -> Result<SubmissionRecord, ScanError> {
        if row.len() < self.header().len() {
            return Err(ScanError::Storage(format!(
                "expected {} columns, found {}",
                self.header().len(),
                row.len()
            )));
        }

        let offset = self.location_columns();
        let location = |i: usize| (offset > 0).then(|| row[i].clone());
        Ok(SubmissionRecord {
            district: location(0),
            block: location(1),
            udise: row[offset].clone(),
            school: row[offset + 1].clone(),
            device_name: row[offset + 2].clone(),
            serial: row[offset + 3].clone(),
            email: row[offset + 4].clone(),
        })
    }
}

/// One accepted serial capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub udise: String,
    pub school: String,
    pub device_name: String,
    pub serial: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

/// What the installer sends after reviewing the extracted serial
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionDraft {
    pub udise: String,
    pub device_name: String,
    pub serial: String,
    pub email: String,
}

/// A draft that passed the verification gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDraft {
    pub udise: String,
    pub device_name: String,
    pub serial: String,
    pub email: String,
}

impl SubmissionDraft {
    /// Verification gate: the reviewed serial and the contact must be present
    pub fn verify(self) -> Result<VerifiedDraft, ScanError> {
        let serial = self.serial.trim();
        let email = self.email.trim();
        let udise = canonical_udise(&self.udise);
        let device_name = self.device_name.trim();

        if serial.is_empty() {
            return Err(ScanError::Verification("serial is empty".to_string()));
        }
        if email.is_empty() {
            return Err(ScanError::Verification("email is empty".to_string()));
        }
        if udise.is_empty() || device_name.is_empty() {
            return Err(ScanError::Verification(
                "school and device must be selected".to_string(),
            ));
        }

        Ok(VerifiedDraft {
            udise,
            device_name: device_name.to_string(),
            serial: serial.to_string(),
            email: email.to_string(),
        })
    }
}

impl VerifiedDraft {
    /// Resolve the school and check the device against the register
    pub fn resolve(self, registry: &Registry) -> Result<SubmissionRecord, ScanError> {
        let school = registry
            .school(&self.udise)
            .ok_or_else(|| ScanError::UnknownSchool(self.udise.clone()))?;

        if !registry
            .active_devices(&self.udise)
            .contains(&self.device_name)
        {
            return Err(ScanError::UnknownDevice {
                udise: self.udise,
                device: self.device_name,
            });
        }

        Ok(SubmissionRecord {
            udise: school.udise,
            school: school.school,
            device_name: self.device_name,
            serial: self.serial,
            email: self.email,
            district: Some(school.district),
            block: Some(school.block),
        })
    }
}

/// True if a record for `(udise, device_name)` already exists
///
/// Linear scan, case-sensitive, UDISE compared in canonical form.
pub fn is_duplicate(existing: &[SubmissionRecord], udise: &str, device_name: &str) -> bool {
    let udise = canonical_udise(udise);
    existing
        .iter()
        .any(|r| canonical_udise(&r.udise) == udise && r.device_name == device_name)
}

/// Append-only submission table
pub trait SubmissionStore: Send + Sync {
    fn describe(&self) -> String;

    fn existing(&self) -> Result<Vec<SubmissionRecord>, ScanError>;

    /// Duplicate check followed by append
    ///
    /// Rejects with `DuplicateSubmission` when the key is already present.
    /// Atomicity against other writers of the same table is up to the store.
    fn submit(&self, record: SubmissionRecord) -> Result<SubmissionRecord, ScanError>;
}

/// Submission table kept in a CSV file
///
/// Check-then-append is serialised within this process; other processes
/// writing the same file are not coordinated with.
pub struct CsvSubmissionStore {
    path: PathBuf,
    layout: SubmissionLayout,
    lock: Mutex<()>,
}

impl CsvSubmissionStore {
    /// Open the store, writing the header row into a missing or empty file
    ///
    /// An existing header must match `layout` column for column.
    pub fn open(path: impl Into<PathBuf>, layout: SubmissionLayout) -> Result<Self, ScanError> {
        let path = path.into();

        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(ScanError::Storage(format!(
                    "Failed to inspect {:?}: {}",
                    path, e
                )))
            }
        };

        if is_empty {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScanError::Storage(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
            let mut writer = csv::Writer::from_path(&path)
                .map_err(|e| ScanError::Storage(format!("Failed to create {:?}: {}", path, e)))?;
            writer
                .write_record(layout.header())
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| ScanError::Storage(format!("Failed to write header: {}", e)))?;
            tracing::info!("Created submission table {:?}", path);
        } else {
            check_header(&path, layout)?;
        }

        Ok(Self {
            path,
            layout,
            lock: Mutex::new(()),
        })
    }

    fn read_rows(&self) -> Result<Vec<SubmissionRecord>, ScanError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| ScanError::Storage(format!("Failed to open {:?}: {}", self.path, e)))?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| ScanError::Storage(format!("Malformed row: {}", e)))?;
            let fields: Vec<String> = row.iter().map(str::to_string).collect();
            records.push(self.layout.from_row(&fields)?);
        }
        Ok(records)
    }

    fn append_row(&self, record: &SubmissionRecord) -> Result<(), ScanError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| ScanError::Storage(format!("Failed to open {:?}: {}", self.path, e)))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(self.layout.to_row(record))
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| ScanError::Storage(format!("Failed to append row: {}", e)))
    }
}

/// Fail if the file's header row is not the one `layout` writes
fn check_header(path: &Path, layout: SubmissionLayout) -> Result<(), ScanError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ScanError::Storage(format!("Failed to open {:?}: {}", path, e)))?;

    let found: Vec<String> = match reader.records().next() {
        Some(row) => row
            .map_err(|e| ScanError::Storage(format!("Malformed header in {:?}: {}", path, e)))?
            .iter()
            .map(|field| field.trim().to_string())
            .collect(),
        None => Vec::new(),
    };

    if found != layout.header() {
        return Err(ScanError::Storage(format!(
            "{:?} has columns {:?} but the {:?} layout expects {:?}",
            path,
            found,
            layout,
            layout.header()
        )));
    }
    Ok(())
}

impl SubmissionStore for CsvSubmissionStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn existing(&self) -> Result<Vec<SubmissionRecord>, ScanError> {
        let _guard = self.lock.lock();
        self.read_rows()
    }

    fn submit(&self, record: SubmissionRecord) -> Result<SubmissionRecord, ScanError> {
        let _guard = self.lock.lock();

        if is_duplicate(&self.read_rows()?, &record.udise, &record.device_name) {
            tracing::warn!(
                "Rejected duplicate submission for {} / {}",
                record.udise,
                record.device_name
            );
            return Err(ScanError::DuplicateSubmission {
                udise: record.udise,
                device: record.device_name,
            });
        }

        self.append_row(&record)?;
        tracing::info!(
            "Recorded serial for {} / {} in {}",
            record.udise,
            record.device_name,
            self.describe()
        );
        Ok(record)
    }
}
