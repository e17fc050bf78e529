//! Core pipeline logic.
//!
//! This module contains:
//! - Fields: Parsing of structured extraction responses
//! - Processor: Audio → ProcessingResult
//! - Checkpoint: Persisted high-water mark and pass lock
//! - Reconciler: Checkpointed batch replay of recent updates

pub mod checkpoint;
pub mod fields;
pub mod processor;
pub mod reconciler;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, PassLock};
pub use processor::{AudioRequest, ServiceTimeouts, VoiceArchive, VoiceProcessor, DEFAULT_LANGUAGE};
pub use reconciler::{BatchReconciler, ReconcileError, ReconcilerOptions, UpdateOutcome};
