//! Telegram Offset Integration Tests
//!
//! Runs full passes against a mock Bot API that, like the real one, drops
//! every update below the highest offset it has been asked for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use shaliwood::adapters::{
    ExtractionOutcome, Extractor, RecordStore, RecordStoreError, RowId, TelegramClient, Transcriber,
    TranscriptionError,
};
use shaliwood::core::{BatchReconciler, CheckpointStore, FileCheckpointStore, VoiceProcessor};
use shaliwood::domain::{WorkdayFields, WorkdayRecord};

const TOKEN: &str = "test-token";

/// Server-side update queue with Telegram's confirm-on-offset rule
struct Backlog {
    updates: Vec<Value>,
    confirmed: Mutex<i64>,
}

impl Backlog {
    fn voice_notes(count: i64) -> Arc<Self> {
        let now = Utc::now().timestamp();
        let updates = (1..=count)
            .map(|id| {
                json!({
                    "update_id": id,
                    "message": {
                        "message_id": id,
                        "date": now - 60,
                        "from": { "id": 7 },
                        "voice": { "file_id": format!("voice-{}", id), "duration": 8 }
                    }
                })
            })
            .collect();

        Arc::new(Self {
            updates,
            confirmed: Mutex::new(0),
        })
    }

    fn confirmed(&self) -> i64 {
        *self.confirmed.lock().unwrap()
    }
}

struct GetUpdates(Arc<Backlog>);

impl Respond for GetUpdates {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let offset = body["offset"].as_i64().unwrap_or(0);
        let limit = body["limit"].as_u64().unwrap_or(100) as usize;

        let mut confirmed = self.0.confirmed.lock().unwrap();
        if offset > 0 {
            *confirmed = (*confirmed).max(offset - 1);
        }

        let result: Vec<Value> = self
            .0
            .updates
            .iter()
            .filter(|u| u["update_id"].as_i64().unwrap() > *confirmed)
            .take(limit)
            .cloned()
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
    }
}

struct GetFile;

impl Respond for GetFile {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let file_id = body["file_id"].as_str().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "file_id": file_id, "file_path": format!("voice/{}.oga", file_id) }
        }))
    }
}

async fn mock_bot_api(backlog: Arc<Backlog>) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .respond_with(GetUpdates(backlog))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getFile", TOKEN)))
        .respond_with(GetFile)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/file/bot{}/voice/voice-\d+\.oga$", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OggS".to_vec()))
        .mount(&server)
        .await;

    server
}

struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    fn name(&self) -> &str {
        "echo"
    }

    async fn transcribe(&self, _audio: &[u8], _language: &str) -> Result<String, TranscriptionError> {
        Ok("יום עבודה באתר".to_string())
    }
}

struct SiteExtractor;

#[async_trait]
impl Extractor for SiteExtractor {
    fn name(&self) -> &str {
        "site"
    }

    async fn extract(&self, text: &str, _schema: &[&str], reference_date: NaiveDate) -> ExtractionOutcome {
        ExtractionOutcome::Fields(WorkdayFields {
            date: reference_date.format("%d/%m/%Y").to_string(),
            project_name: text.to_string(),
            ..Default::default()
        })
    }
}

/// Refuses appends once it holds `outage_after` rows, until the outage ends
struct OutageStore {
    rows: Mutex<Vec<WorkdayRecord>>,
    outage_after: usize,
    outage: AtomicBool,
}

impl OutageStore {
    fn new(outage_after: usize) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            outage_after,
            outage: AtomicBool::new(true),
        }
    }

    fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for OutageStore {
    fn name(&self) -> &str {
        "outage"
    }

    async fn append_record(&self, record: &WorkdayRecord) -> Result<RowId, RecordStoreError> {
        let mut rows = self.rows.lock().unwrap();
        if self.outage.load(Ordering::SeqCst) && rows.len() >= self.outage_after {
            return Err(RecordStoreError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        rows.push(record.clone());
        Ok(rows.len().to_string())
    }
}

fn reconciler(server: &MockServer, store: Arc<OutageStore>, checkpoint: Arc<FileCheckpointStore>) -> BatchReconciler {
    let source = TelegramClient::new(TOKEN.to_string(), Duration::from_secs(5))
        .unwrap()
        .with_api_base(server.uri());
    let processor = VoiceProcessor::new(Arc::new(EchoTranscriber), Some(Arc::new(SiteExtractor)));
    BatchReconciler::new(Arc::new(source), Arc::new(processor), store, checkpoint)
}

async fn run_twice(outage_after: usize) -> (u32, u32, Arc<OutageStore>, i64) {
    let dir = TempDir::new().unwrap();
    let backlog = Backlog::voice_notes(150);
    let server = mock_bot_api(backlog.clone()).await;
    let store = Arc::new(OutageStore::new(outage_after));
    let checkpoint = Arc::new(FileCheckpointStore::new(dir.path().join("checkpoint.json")));

    let rec = reconciler(&server, store.clone(), checkpoint.clone());

    let first = rec.fetch_and_process_recent_messages(24).await.unwrap();
    assert_eq!(first.halted_at, Some(outage_after as i64 + 1));
    assert_eq!(checkpoint.load().await.unwrap().value(), outage_after as i64);
    assert!(backlog.confirmed() <= outage_after as i64);

    store.outage.store(false, Ordering::SeqCst);

    let second = rec.fetch_and_process_recent_messages(24).await.unwrap();
    assert!(second.halted_at.is_none());

    let end = checkpoint.load().await.unwrap().value();
    (first.processed_voice, second.processed_voice, store, end)
}

#[tokio::test]
async fn test_outage_on_first_update_loses_nothing() {
    let (first, second, store, end) = run_twice(0).await;

    assert_eq!(first, 0);
    assert_eq!(first + second, 150);
    assert_eq!(store.len(), 150);
    assert_eq!(end, 150);
}

#[tokio::test]
async fn test_outage_on_second_page_loses_nothing() {
    let (first, second, store, end) = run_twice(119).await;

    assert_eq!(first, 119);
    assert_eq!(first + second, 150);
    assert_eq!(store.len(), 150);
    assert_eq!(end, 150);
}
