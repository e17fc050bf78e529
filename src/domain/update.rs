//! Inbound message events as seen by the pipeline.
//!
//! Updates are owned by the message source. The pipeline only reads them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Retention window of the upstream message source, in hours.
///
/// Older updates are gone upstream and cannot be recovered.
pub const MAX_RETENTION_HOURS: u32 = 24;

/// Kind of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Voice note carrying an audio reference
    Voice,

    /// Plain text message
    Text,

    /// Anything else (photos, stickers, service messages)
    Other,
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateKind::Voice => write!(f, "voice"),
            UpdateKind::Text => write!(f, "text"),
            UpdateKind::Other => write!(f, "other"),
        }
    }
}

/// Opaque handle to downloadable audio (a Telegram `file_id`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One inbound message event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing id assigned by the source
    pub id: i64,

    /// When the message was sent
    pub timestamp: DateTime<Utc>,

    /// Sender id, if the source exposes one
    pub sender_id: Option<i64>,

    /// Message kind
    pub kind: UpdateKind,

    /// Audio handle (voice updates only)
    pub audio_ref: Option<AudioRef>,
}

impl Update {
    /// Build a voice update
    pub fn voice(id: i64, timestamp: DateTime<Utc>, sender_id: Option<i64>, audio: AudioRef) -> Self {
        Self {
            id,
            timestamp,
            sender_id,
            kind: UpdateKind::Voice,
            audio_ref: Some(audio),
        }
    }

    /// Build a text update
    pub fn text(id: i64, timestamp: DateTime<Utc>, sender_id: Option<i64>) -> Self {
        Self {
            id,
            timestamp,
            sender_id,
            kind: UpdateKind::Text,
            audio_ref: None,
        }
    }

    pub fn is_voice(&self) -> bool {
        self.kind == UpdateKind::Voice
    }

    /// Sender as a display string ("unknown" when absent)
    pub fn sender_label(&self) -> String {
        self.sender_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Query sent to the message source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateQuery {
    /// Only updates with `id > since` are wanted
    pub since: i64,

    /// Window size in hours, already clamped to the retention window
    pub window_hours: u32,

    /// Oldest acceptable message timestamp
    pub not_before: DateTime<Utc>,

    /// Recognized kinds; everything else is dropped by the source
    pub kinds: Vec<UpdateKind>,
}

impl UpdateQuery {
    /// Build a query for the last `hours_back` hours, clamped to retention
    pub fn recent(since: i64, hours_back: u32, now: DateTime<Utc>) -> Self {
        let window_hours = clamp_window(hours_back);
        Self {
            since,
            window_hours,
            not_before: now - Duration::hours(i64::from(window_hours)),
            kinds: vec![UpdateKind::Voice, UpdateKind::Text],
        }
    }

    /// Whether an update satisfies this query
    pub fn accepts(&self, update: &Update) -> bool {
        update.id > self.since
            && update.timestamp >= self.not_before
            && self.kinds.contains(&update.kind)
    }
}

/// One page of updates returned by the message source.
///
/// Fetching a page confirms everything below `query.since + 1` upstream,
/// so the next page may only be requested once this one is accounted for.
#[derive(Debug, Clone, Default)]
pub struct UpdatePage {
    /// Updates matching the query
    pub updates: Vec<Update>,

    /// Highest id seen on the page, including updates the query dropped
    pub last_id: Option<i64>,

    /// The page was full; more updates may be waiting
    pub has_more: bool,
}

/// Clamp a requested look-back to the source's retention window
pub fn clamp_window(hours_back: u32) -> u32 {
    hours_back.min(MAX_RETENTION_HOURS)
}
