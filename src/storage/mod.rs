//! Valuation history: a CSV row file for display plus a JSON side map of
//! full inputs keyed by uid. Memory and both files move in lock-step.

pub mod uid;

use crate::config::StorageConfig;
use crate::models::{GradeAxis, HistoryRecord, StoredInputs, ValuationInput, ValuationResult};
use crate::utils::{fmt_amount, fmt_percent};
use crate::valuation::grades;
use chrono::{Local, NaiveDateTime};
use csv::ByteRecord;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use self::uid::UidGenerator;

pub const HISTORY_FILE: &str = "valuation_history_autosave.csv";
pub const INPUTS_FILE: &str = "valuation_history_inputs_autosave.json";
const APP_DIR: &str = "CNSValuator";
const BOM: &str = "\u{feff}";

pub const CSV_FIELDNAMES: [&str; 15] = [
    "UID",
    "시간",
    "물건명",
    "등급",
    "임대안정성",
    "임대안정성설명",
    "접근성등급",
    "접근성설명",
    "시설등급",
    "시설설명",
    "Market Value",
    "Value-Add Potential",
    "HBU Value",
    "NOI",
    "CapRate(%)",
];

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("내보낼 히스토리가 없습니다 (history is empty)")]
    Empty,

    #[error("{path}: history was not read, refusing to rewrite it")]
    Unread { path: PathBuf },
}

impl HistoryError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Config override, else `%LOCALAPPDATA%`, `%APPDATA%` or `$HOME`, joined
/// with the application folder.
pub fn resolve_data_dir(config: &StorageConfig) -> PathBuf {
    if let Some(dir) = &config.data_dir {
        return dir.clone();
    }
    ["LOCALAPPDATA", "APPDATA", "HOME"]
        .iter()
        .find_map(|k| std::env::var_os(k).filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[derive(Debug, Clone)]
pub struct HistoryPaths {
    pub rows: PathBuf,
    pub inputs: PathBuf,
}

impl HistoryPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            rows: dir.join(HISTORY_FILE),
            inputs: dir.join(INPUTS_FILE),
        }
    }
}

// ── Record construction ───────────────────────────────────────────────────────

/// Display row for a fresh valuation. Uid and timestamp are assigned on append.
pub fn record_for(input: &ValuationInput, result: &ValuationResult) -> HistoryRecord {
    let g = &input.grades;
    let name = input.property_name.trim();
    HistoryRecord {
        uid: String::new(),
        timestamp: String::new(),
        property_name: if name.is_empty() { "-".into() } else { name.into() },
        location_grade: g.location.label(),
        stability_grade: g.stability.label(),
        stability_desc: grades::description(GradeAxis::Stability, g.stability).into(),
        accessibility_grade: g.accessibility.label(),
        accessibility_desc: grades::description(GradeAxis::Accessibility, g.accessibility).into(),
        facility_grade: g.facility.label(),
        facility_desc: grades::description(GradeAxis::Facility, g.facility).into(),
        market_value: fmt_amount(result.market_value),
        potential_value: fmt_amount(result.potential_value),
        hbu_value: fmt_amount(result.combined_value),
        noi: fmt_amount(result.noi),
        cap_rate: fmt_percent(input.cap_rate_pct),
        inputs: None,
    }
}

// ── CSV helpers ───────────────────────────────────────────────────────────────

/// Rows that did not parse are written back byte-for-byte after the parsed ones.
fn write_rows(path: &Path, records: &[HistoryRecord], unparsed: &[ByteRecord]) -> Result<(), HistoryError> {
    let mut file = File::create(path).map_err(|e| HistoryError::io(path, e))?;
    file.write_all(BOM.as_bytes())
        .map_err(|e| HistoryError::io(path, e))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);
    writer
        .write_record(CSV_FIELDNAMES)
        .map_err(|e| HistoryError::csv(path, e))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| HistoryError::csv(path, e))?;
    }
    for raw in unparsed {
        writer
            .write_byte_record(raw)
            .map_err(|e| HistoryError::csv(path, e))?;
    }
    writer.flush().map_err(|e| HistoryError::io(path, e))
}

fn append_row(path: &Path, record: &HistoryRecord) -> Result<(), HistoryError> {
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    if needs_header {
        write_rows(path, &[], &[])?;
    }

    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| HistoryError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer
        .serialize(record)
        .map_err(|e| HistoryError::csv(path, e))?;
    writer.flush().map_err(|e| HistoryError::io(path, e))
}

/// Parsed rows, plus the raw rows that did not parse.
fn read_rows(path: &Path) -> Result<(Vec<HistoryRecord>, Vec<ByteRecord>), HistoryError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Default::default()),
        Err(e) => return Err(HistoryError::io(path, e)),
    };
    let body = bytes.strip_prefix(BOM.as_bytes()).unwrap_or(&bytes[..]);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Default::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);
    let headers = reader
        .byte_headers()
        .map_err(|e| HistoryError::csv(path, e))?
        .clone();

    let mut records = Vec::new();
    let mut unparsed = Vec::new();
    for (i, result) in reader.byte_records().enumerate() {
        let raw = result.map_err(|e| HistoryError::csv(path, e))?;
        match raw.deserialize::<HistoryRecord>(Some(&headers)) {
            Ok(r) => records.push(r),
            Err(e) => {
                warn!("History row {} in {:?} kept unparsed: {}", i + 1, path, e);
                unparsed.push(raw);
            }
        }
    }
    Ok((records, unparsed))
}

fn remove_if_exists(path: &Path) -> Result<(), HistoryError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HistoryError::io(path, e)),
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Result of an append. The record is in memory even if `autosave` failed.
#[derive(Debug)]
pub struct Appended {
    pub uid: String,
    pub autosave: Result<(), HistoryError>,
}

pub struct HistoryStore {
    paths: HistoryPaths,
    records: Vec<HistoryRecord>,
    /// Rows on disk that did not parse; carried through rewrites.
    unparsed: Vec<ByteRecord>,
    inputs: BTreeMap<String, StoredInputs>,
    uids: UidGenerator,
    /// Set when the last reload failed; rewrites would lose the unread rows.
    unread: bool,
}

impl HistoryStore {
    /// Store rooted at `dir`, created if missing. Nothing is read yet.
    pub fn open(dir: &Path) -> Result<Self, HistoryError> {
        fs::create_dir_all(dir).map_err(|e| HistoryError::io(dir, e))?;
        Ok(Self {
            paths: HistoryPaths::in_dir(dir),
            records: Vec::new(),
            unparsed: Vec::new(),
            inputs: BTreeMap::new(),
            uids: UidGenerator::default(),
            unread: false,
        })
    }

    pub fn paths(&self) -> &HistoryPaths {
        &self.paths
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.uid == uid)
    }

    pub fn inputs_for(&self, uid: &str) -> Option<&StoredInputs> {
        self.get(uid)
            .and_then(|r| r.inputs.as_ref())
            .or_else(|| self.inputs.get(uid))
    }

    pub fn append(&mut self, record: HistoryRecord, inputs: Option<StoredInputs>) -> Appended {
        self.append_at(record, inputs, Local::now().naive_local())
    }

    pub fn append_at(
        &mut self,
        mut record: HistoryRecord,
        inputs: Option<StoredInputs>,
        now: NaiveDateTime,
    ) -> Appended {
        // Ids from an earlier run in the same second are already on disk.
        let uid = loop {
            let uid = self.uids.next(now);
            if self.get(&uid).is_none() {
                break uid;
            }
        };
        record.uid = uid.clone();
        record.timestamp = now.format("%Y-%m-%d %H:%M").to_string();
        record.inputs = inputs.clone();

        let row_result = append_row(&self.paths.rows, &record);
        self.records.push(record);

        let inputs_result = match inputs {
            Some(inputs) => {
                self.inputs.insert(uid.clone(), inputs);
                self.save_inputs()
            }
            None => Ok(()),
        };

        let autosave = row_result.and(inputs_result);
        match &autosave {
            Ok(()) => debug!("History {} saved", uid),
            Err(e) => warn!("History {} kept in memory, autosave failed: {}", uid, e),
        }
        Appended { uid, autosave }
    }

    fn ensure_read(&self) -> Result<(), HistoryError> {
        if self.unread {
            return Err(HistoryError::Unread {
                path: self.paths.rows.clone(),
            });
        }
        Ok(())
    }

    /// Drop records by uid, then rewrite both files. Returns how many went.
    ///
    /// The row file is written first; the side map is attempted even if that
    /// fails, and the first error is returned.
    pub fn remove(&mut self, uids: &[String]) -> Result<usize, HistoryError> {
        self.ensure_read()?;
        let before = self.records.len();
        self.records.retain(|r| !uids.contains(&r.uid));
        for uid in uids {
            self.inputs.remove(uid);
        }
        let removed = before - self.records.len();

        if removed > 0 {
            info!("Removed {} history record(s)", removed);
            let rows = write_rows(&self.paths.rows, &self.records, &self.unparsed);
            let inputs = self.save_inputs();
            rows.and(inputs)?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.ensure_read()?;
        self.records.clear();
        self.unparsed.clear();
        self.inputs.clear();
        remove_if_exists(&self.paths.rows)?;
        remove_if_exists(&self.paths.inputs)?;
        info!("History cleared");
        Ok(())
    }

    /// Rebuild memory from disk. A corrupt or missing side map counts as empty.
    pub fn reload(&mut self) -> Result<usize, HistoryError> {
        self.inputs = self.load_inputs();
        let (mut records, unparsed) = match read_rows(&self.paths.rows) {
            Ok(rows) => rows,
            Err(e) => {
                self.unread = true;
                return Err(e);
            }
        };
        for record in &mut records {
            record.inputs = self.inputs.get(&record.uid).cloned();
        }
        if !unparsed.is_empty() {
            warn!("{} history row(s) could not be read and are kept as-is", unparsed.len());
        }
        self.records = records;
        self.unparsed = unparsed;
        self.unread = false;
        info!("Loaded {} history record(s)", self.records.len());
        Ok(self.records.len())
    }

    pub fn export_to(&self, path: &Path) -> Result<usize, HistoryError> {
        if self.records.is_empty() {
            return Err(HistoryError::Empty);
        }
        write_rows(path, &self.records, &self.unparsed)?;
        info!("Exported {} record(s) to {:?}", self.records.len(), path);
        Ok(self.records.len())
    }

    fn load_inputs(&self) -> BTreeMap<String, StoredInputs> {
        let path = &self.paths.inputs;
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Inputs file {:?} unreadable: {}", path, e);
                }
                return BTreeMap::new();
            }
        };
        serde_json::from_str(text.trim_start_matches(BOM)).unwrap_or_else(|e| {
            warn!("Inputs file {:?} is corrupt, starting empty: {}", path, e);
            BTreeMap::new()
        })
    }

    fn save_inputs(&self) -> Result<(), HistoryError> {
        let path = &self.paths.inputs;
        let json = serde_json::to_string_pretty(&self.inputs).map_err(|source| HistoryError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(path, json).map_err(|e| HistoryError::io(path, e))
    }
}
