//! Local JSONL record store.
//!
//! One JSON object per line, append-only. Used when spreadsheet
//! persistence is disabled.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{RecordStore, RecordStoreError, RowId};
use crate::domain::WorkdayRecord;

/// A stored line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// When the line was appended
    pub appended_at: DateTime<Utc>,

    #[serde(flatten)]
    pub record: WorkdayRecord,
}

/// Append-only JSONL file of workday records
pub struct JsonlRecordStore {
    path: PathBuf,
    /// Lines in the file, counted on first append. Also serializes appends.
    rows: Mutex<Option<usize>>,
}

impl JsonlRecordStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            rows: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored record in append order
    pub async fn read_all(&self) -> Result<Vec<StoredRecord>, RecordStoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    async fn count_lines(&self) -> Result<usize, RecordStoreError> {
        if !self.path.exists() {
            return Ok(0);
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut count = 0;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                count += 1;
            }
        }

        Ok(count)
    }
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append_record(&self, record: &WorkdayRecord) -> Result<RowId, RecordStoreError> {
        let mut rows = self.rows.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = match *rows {
            Some(n) => n,
            None => self.count_lines().await?,
        };
        let row = existing + 1;

        let stored = StoredRecord {
            appended_at: Utc::now(),
            record: record.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(&stored)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        *rows = Some(row);
        Ok(row.to_string())
    }
}
