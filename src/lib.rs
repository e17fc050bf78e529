//! shaliwood - voice messages to structured workday records
//!
//! Field workers send Hebrew voice messages to a Telegram bot describing
//! their workday. A scheduled pass replays the recent updates, transcribes
//! each voice message, extracts the workday fields, and appends one row per
//! message to a Google Sheet.
//!
//! # Architecture
//!
//! Progress is tracked by a persisted checkpoint: the id of the last update
//! that has been fully accounted for. Each pass processes only updates past
//! it, in id order, and advances it after every update, so re-running a pass
//! never duplicates rows.
//!
//! # Modules
//!
//! - `adapters`: External services (Telegram, OpenAI, Google Sheets, JSONL)
//! - `core`: Processing logic (VoiceProcessor, BatchReconciler, Checkpoint)
//! - `domain`: Data structures (Update, WorkdayRecord, BatchStatistics)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Scheduled pass over the last 24 hours
//! shaliwood reconcile
//!
//! # Process a local recording
//! shaliwood file memo.ogg
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{BatchReconciler, Checkpoint, FileCheckpointStore, VoiceProcessor};
pub use domain::{BatchStatistics, ProcessingResult, ProcessingStatus, Update, WorkdayFields, WorkdayRecord};
