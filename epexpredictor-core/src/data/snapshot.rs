//! Parquet snapshots of a [`TimeSeriesCache`].
//!
//! Layout: `{storage_dir}/{kind}_{zone}.parquet` plus a
//! `{kind}_{zone}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Schema validation on load (UTC `time` column, numeric value columns)
//! - Quarantine for unreadable files (`{filename}.quarantined`)
//! - Metadata sidecar (row count, covered range, blake3 of the file)

use super::cache::TimeSeriesCache;
use super::frame::{Frame, TimeSeriesRow};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Name of the timestamp column inside a snapshot file.
pub const TIME_COLUMN: &str = "time";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("snapshot validation error: {0}")]
    Validation(String),

    #[error("snapshot metadata error: {0}")]
    Meta(String),
}

/// Sidecar describing the last snapshot written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub kind: String,
    pub zone: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

/// One store's snapshot location.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    kind: String,
    zone: String,
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(dir: impl AsRef<Path>, kind: &str, zone: &str) -> Self {
        let path = dir.as_ref().join(format!("{kind}_{zone}.parquet"));
        Self {
            kind: kind.to_string(),
            zone: zone.to_string(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn meta_path(&self) -> PathBuf {
        self.path.with_extension("meta.json")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the full cache contents, replacing any previous snapshot.
    pub fn write(&self, cache: &TimeSeriesCache) -> Result<SnapshotMeta, SnapshotError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| SnapshotError::Io(format!("failed to create dir: {e}")))?;
        }

        let mut df = cache_to_dataframe(cache)?;
        let tmp_path = self.path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;

        let bytes = fs::read(&tmp_path)
            .map_err(|e| SnapshotError::Io(format!("re-read for hashing: {e}")))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            SnapshotError::Io(format!("atomic rename failed: {e}"))
        })?;

        let meta = SnapshotMeta {
            kind: self.kind.clone(),
            zone: self.zone.clone(),
            row_count: cache.len(),
            columns: cache.columns().to_vec(),
            first: cache.first_time(),
            last: cache.last_time(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            written_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| SnapshotError::Meta(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(), meta_json)
            .map_err(|e| SnapshotError::Meta(format!("meta write: {e}")))?;

        Ok(meta)
    }

    /// Read the snapshot back. `Ok(None)` when none has been written yet.
    pub fn load(&self) -> Result<Option<TimeSeriesCache>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let frame = load_and_validate_parquet(&self.path)?;
        Ok(Some(TimeSeriesCache::from_frame(&frame)))
    }

    /// Like [`load`](Self::load), but an unreadable file is moved aside and
    /// treated as absent.
    pub fn load_or_quarantine(&self) -> Option<TimeSeriesCache> {
        match self.load() {
            Ok(cache) => cache,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "quarantining unreadable snapshot"
                );
                self.quarantine();
                None
            }
        }
    }

    /// Move the snapshot out of the way so the next load starts empty.
    pub fn quarantine(&self) {
        let quarantine = self.path.with_extension("parquet.quarantined");
        let _ = fs::rename(&self.path, quarantine);
        let _ = fs::remove_file(self.meta_path());
    }

    pub fn read_meta(&self) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn utc_datetime() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into()))
}

fn cache_to_dataframe(cache: &TimeSeriesCache) -> Result<DataFrame, SnapshotError> {
    let times: Vec<i64> = cache.iter().map(|(t, _)| t.timestamp_millis()).collect();

    let mut columns = Vec::with_capacity(cache.columns().len() + 1);
    columns.push(
        Column::new(TIME_COLUMN.into(), times)
            .cast(&utc_datetime())
            .map_err(|e| SnapshotError::Parquet(format!("time cast: {e}")))?,
    );
    for (idx, name) in cache.columns().iter().enumerate() {
        let values: Vec<f64> = cache.iter().map(|(_, row)| row[idx]).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }

    DataFrame::new(columns)
        .map_err(|e| SnapshotError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), SnapshotError> {
    let file = fs::File::create(path)
        .map_err(|e| SnapshotError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| SnapshotError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Frame, SnapshotError> {
    let file =
        fs::File::open(path).map_err(|e| SnapshotError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| SnapshotError::Parquet(format!("read: {e}")))?;

    dataframe_to_frame(&df)
}

fn dataframe_to_frame(df: &DataFrame) -> Result<Frame, SnapshotError> {
    let time_col = df
        .column(TIME_COLUMN)
        .map_err(|_| SnapshotError::Validation(format!("missing column '{TIME_COLUMN}'")))?;

    let millis_per_unit = match time_col.dtype() {
        DataType::Datetime(unit, Some(tz)) if tz.as_str() == "UTC" => match unit {
            TimeUnit::Milliseconds => 1.0,
            TimeUnit::Microseconds => 1e-3,
            TimeUnit::Nanoseconds => 1e-6,
        },
        other => {
            return Err(SnapshotError::Validation(format!(
                "'{TIME_COLUMN}' must be a UTC datetime, found {other}"
            )))
        }
    };

    let raw_times = time_col
        .cast(&DataType::Int64)
        .map_err(|e| SnapshotError::Parquet(format!("time cast: {e}")))?;
    let time_ca = raw_times
        .i64()
        .map_err(|e| SnapshotError::Parquet(format!("time column type: {e}")))?;

    let mut names = Vec::new();
    let mut value_cols = Vec::new();
    for col in df.get_columns() {
        if col.name().as_str() == TIME_COLUMN {
            continue;
        }
        let casted = col.cast(&DataType::Float64).map_err(|e| {
            SnapshotError::Validation(format!("column '{}' is not numeric: {e}", col.name()))
        })?;
        names.push(col.name().to_string());
        value_cols.push(casted);
    }

    let value_cas = value_cols
        .iter()
        .map(|c| {
            c.f64()
                .map_err(|e| SnapshotError::Parquet(format!("value column type: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let raw = time_ca
            .get(i)
            .ok_or_else(|| SnapshotError::Validation(format!("null time at row {i}")))?;
        let millis = (raw as f64 * millis_per_unit).round() as i64;
        let time = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| SnapshotError::Validation(format!("time out of range at row {i}")))?;
        let values = value_cas
            .iter()
            .map(|ca| ca.get(i).unwrap_or(f64::NAN))
            .collect();
        rows.push(TimeSeriesRow::new(time, values));
    }

    Ok(Frame::from_rows(names, rows))
}
