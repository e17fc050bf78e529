//! Domain types for the voice pipeline.
//!
//! This module contains the core data structures:
//! - Update: Inbound message events
//! - WorkdayFields / WorkdayRecord: Structured rows
//! - ProcessingResult: Per-message pipeline outcome
//! - BatchStatistics: Per-pass counters

pub mod result;
pub mod stats;
pub mod update;
pub mod workday;

// Re-export commonly used types
pub use result::{ProcessingResult, ProcessingStatus};
pub use stats::{BatchStatistics, MessageSummary};
pub use update::{clamp_window, AudioRef, Update, UpdateKind, UpdatePage, UpdateQuery, MAX_RETENTION_HOURS};
pub use workday::{WorkdayFields, WorkdayRecord, FIELD_SCHEMA, PENDING_APPROVAL};
