//! Workday fields and the persisted workday record.

use serde::{Deserialize, Serialize};

use super::result::ProcessingResult;

/// The ten domain fields, in spreadsheet column order
pub const FIELD_SCHEMA: [&str; 10] = [
    "day",
    "date",
    "recording_date",
    "start_time",
    "end_time",
    "project_name",
    "sub_project",
    "work_description",
    "workers",
    "additional_notes",
];

/// Marker written into the status column of every new row ("pending approval")
pub const PENDING_APPROVAL: &str = "⏳ ממתין לאישור";

/// Structured workday fields. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdayFields {
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub recording_date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub sub_project: String,
    #[serde(default)]
    pub work_description: String,
    #[serde(default)]
    pub workers: String,
    #[serde(default)]
    pub additional_notes: String,
}

impl WorkdayFields {
    /// Look up a field by its schema name
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "day" => &self.day,
            "date" => &self.date,
            "recording_date" => &self.recording_date,
            "start_time" => &self.start_time,
            "end_time" => &self.end_time,
            "project_name" => &self.project_name,
            "sub_project" => &self.sub_project,
            "work_description" => &self.work_description,
            "workers" => &self.workers,
            "additional_notes" => &self.additional_notes,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Set a field by its schema name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "day" => &mut self.day,
            "date" => &mut self.date,
            "recording_date" => &mut self.recording_date,
            "start_time" => &mut self.start_time,
            "end_time" => &mut self.end_time,
            "project_name" => &mut self.project_name,
            "sub_project" => &mut self.sub_project,
            "work_description" => &mut self.work_description,
            "workers" => &mut self.workers,
            "additional_notes" => &mut self.additional_notes,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Values in schema order
    pub fn values(&self) -> [&str; 10] {
        [
            &self.day,
            &self.date,
            &self.recording_date,
            &self.start_time,
            &self.end_time,
            &self.project_name,
            &self.sub_project,
            &self.work_description,
            &self.workers,
            &self.additional_notes,
        ]
    }

    /// True when every field is empty
    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|v| v.is_empty())
    }
}

/// A finished row, ready for append-only persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdayRecord {
    #[serde(flatten)]
    pub fields: WorkdayFields,

    /// What was said, always populated
    pub raw_transcription: String,

    /// Approval status column
    pub status: String,
}

impl WorkdayRecord {
    /// Convert a processing result into a record.
    ///
    /// Returns `None` for failed results: those never produce a row.
    pub fn from_result(result: &ProcessingResult) -> Option<Self> {
        if !result.is_recordable() {
            return None;
        }

        Some(Self {
            fields: result.fields.clone(),
            raw_transcription: result.raw_transcription.clone(),
            status: PENDING_APPROVAL.to_string(),
        })
    }

    /// The twelve spreadsheet cells in column order
    pub fn to_row(&self) -> Vec<String> {
        let mut row: Vec<String> = self.fields.values().iter().map(|v| v.to_string()).collect();
        row.push(self.raw_transcription.clone());
        row.push(self.status.clone());
        row
    }
}
