//! HTTP Adapter Integration Tests
//!
//! Exercises the Telegram, OpenAI and Google Sheets adapters against a
//! local mock server.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shaliwood::adapters::{
    ExtractionOutcome, Extractor, MessageSource, OpenAiClient, OpenAiExtractor, RecordStore,
    RecordStoreError, ServiceAccountKey, SheetsRecordStore, TelegramClient, Transcriber,
    TranscriptionError, WhisperTranscriber,
};
use shaliwood::domain::{
    AudioRef, ProcessingResult, UpdateKind, UpdateQuery, WorkdayFields, WorkdayRecord, FIELD_SCHEMA,
};

const TOKEN: &str = "test-token";
const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Telegram
// ---------------------------------------------------------------------------

fn telegram(server: &MockServer) -> TelegramClient {
    TelegramClient::new(TOKEN.to_string(), TIMEOUT)
        .unwrap()
        .with_api_base(server.uri())
}

fn tg_text(update_id: i64, date: i64) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": { "message_id": update_id, "date": date, "from": { "id": 7 }, "text": "בוקר טוב" }
    })
}

fn tg_voice(update_id: i64, date: i64, file_id: &str) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": date,
            "from": { "id": 7 },
            "voice": { "file_id": file_id, "duration": 12 }
        }
    })
}

#[tokio::test]
async fn test_telegram_fetch_classifies_and_filters() {
    let server = MockServer::start().await;
    let now = Utc::now().timestamp();
    let two_days_ago = now - 48 * 3600;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .and(body_partial_json(json!({ "offset": 101, "allowed_updates": ["message"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                tg_text(101, two_days_ago),
                tg_voice(102, now - 60, "voice-a"),
                tg_text(103, now - 30),
                { "update_id": 104, "message": { "message_id": 9, "date": now, "sticker": {} } },
                { "update_id": 105, "edited_message": { "message_id": 3, "date": now } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = UpdateQuery::recent(100, 24, Utc::now());
    let page = telegram(&server).fetch_updates(&query).await.unwrap();
    let updates = &page.updates;

    let ids: Vec<i64> = updates.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![102, 103]);

    // Dropped updates still count as seen
    assert_eq!(page.last_id, Some(105));
    assert!(!page.has_more);

    assert_eq!(updates[0].kind, UpdateKind::Voice);
    assert_eq!(updates[0].audio_ref, Some(AudioRef("voice-a".to_string())));
    assert_eq!(updates[0].sender_id, Some(7));
    assert_eq!(updates[1].kind, UpdateKind::Text);
}

#[tokio::test]
async fn test_telegram_fetch_returns_one_page() {
    let server = MockServer::start().await;
    let now = Utc::now().timestamp();

    let first_page: Vec<serde_json::Value> = (1..=100).map(|id| tg_text(id, now)).collect();

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .and(body_partial_json(json!({ "offset": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": first_page })))
        .expect(1)
        .mount(&server)
        .await;

    // Asking for the next page would confirm the first one upstream
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .and(body_partial_json(json!({ "offset": 101 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [tg_voice(101, now, "voice-b")]
        })))
        .expect(0)
        .mount(&server)
        .await;

    let query = UpdateQuery::recent(0, 24, Utc::now());
    let page = telegram(&server).fetch_updates(&query).await.unwrap();

    assert_eq!(page.updates.len(), 100);
    assert_eq!(page.last_id, Some(100));
    assert!(page.has_more);
}

#[tokio::test]
async fn test_telegram_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let query = UpdateQuery::recent(0, 24, Utc::now());
    let err = telegram(&server).fetch_updates(&query).await.unwrap_err();

    assert!(err.to_string().contains("Unauthorized"));
}

#[tokio::test]
async fn test_telegram_download_audio() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getFile", TOKEN)))
        .and(body_partial_json(json!({ "file_id": "voice-a" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "file_id": "voice-a", "file_path": "voice/file_12.oga" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/file/bot{}/voice/file_12.oga", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OggS\x00\x02".to_vec()))
        .mount(&server)
        .await;

    let audio = telegram(&server)
        .download_audio(&AudioRef("voice-a".to_string()))
        .await
        .unwrap();

    assert_eq!(audio, b"OggS\x00\x02".to_vec());
}

#[tokio::test]
async fn test_telegram_download_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getFile", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "file_id": "voice-a", "file_path": "voice/gone.oga" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/file/bot{}/voice/gone.oga", TOKEN)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = telegram(&server)
        .download_audio(&AudioRef("voice-a".to_string()))
        .await;

    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

fn openai(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new("sk-test".to_string(), TIMEOUT)
        .unwrap()
        .with_api_base(server.uri())
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "  עבדנו היום על הגג  " })))
        .expect(1)
        .mount(&server)
        .await;

    let transcriber = WhisperTranscriber::new(openai(&server), "whisper-1");
    let text = transcriber.transcribe(b"OggS", "he").await.unwrap();

    assert_eq!(text, "עבדנו היום על הגג");
}

#[tokio::test]
async fn test_whisper_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let transcriber = WhisperTranscriber::new(openai(&server), "whisper-1");
    let err = transcriber.transcribe(b"OggS", "he").await.unwrap_err();

    match err {
        TranscriptionError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_whisper_empty_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "   " })))
        .mount(&server)
        .await;

    let transcriber = WhisperTranscriber::new(openai(&server), "whisper-1");

    assert!(matches!(
        transcriber.transcribe(b"OggS", "he").await,
        Err(TranscriptionError::Empty)
    ));
}

#[tokio::test]
async fn test_extraction_maps_fields() {
    let server = MockServer::start().await;

    let content = json!({
        "date": "2025-06-21",
        "start_time": "7:00",
        "project_name": "וילה בהרצליה",
        "workers": "משה, יוסי",
        "additional_notes": null
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&content)))
        .expect(1)
        .mount(&server)
        .await;

    let extractor = OpenAiExtractor::new(openai(&server), "gpt-4o");
    let outcome = extractor
        .extract(
            "עבדנו בוילה בהרצליה",
            &FIELD_SCHEMA,
            NaiveDate::from_ymd_opt(2025, 6, 22).unwrap(),
        )
        .await;

    let ExtractionOutcome::Fields(fields) = outcome else {
        panic!("expected fields, got {:?}", outcome);
    };
    assert_eq!(fields.date, "21/06/2025");
    assert_eq!(fields.day, "שבת");
    assert_eq!(fields.start_time, "07:00");
    assert_eq!(fields.project_name, "וילה בהרצליה");
    assert_eq!(fields.additional_notes, "");
}

#[tokio::test]
async fn test_extraction_malformed_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("I could not find a report here.")))
        .mount(&server)
        .await;

    let extractor = OpenAiExtractor::new(openai(&server), "gpt-4o");
    let outcome = extractor
        .extract("שלום", &FIELD_SCHEMA, NaiveDate::from_ymd_opt(2025, 6, 22).unwrap())
        .await;

    assert!(matches!(outcome, ExtractionOutcome::Malformed(_)));
}

#[tokio::test]
async fn test_extraction_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let extractor = OpenAiExtractor::new(openai(&server), "gpt-4o");
    let outcome = extractor
        .extract("שלום", &FIELD_SCHEMA, NaiveDate::from_ymd_opt(2025, 6, 22).unwrap())
        .await;

    assert!(matches!(outcome, ExtractionOutcome::ServiceError(_)));
}

// ---------------------------------------------------------------------------
// Google Sheets
// ---------------------------------------------------------------------------

const TEST_KEY: &str = include_str!("fixtures/test_service_account.pem");

fn sheets(server: &MockServer) -> SheetsRecordStore {
    let key = ServiceAccountKey {
        client_email: "bot@shaliwood-test.iam.gserviceaccount.com".to_string(),
        private_key: TEST_KEY.to_string(),
        token_uri: format!("{}/token", server.uri()),
    };

    SheetsRecordStore::new("sheet-123".to_string(), "A:L".to_string(), key, TIMEOUT)
        .unwrap()
        .with_api_base(server.uri())
}

fn sample_record() -> WorkdayRecord {
    let fields = WorkdayFields {
        date: "22/06/2025".to_string(),
        project_name: "גג רעפים".to_string(),
        ..Default::default()
    };
    WorkdayRecord::from_result(&ProcessingResult::success("עבדנו על גג רעפים".to_string(), fields)).unwrap()
}

#[tokio::test]
async fn test_sheets_append_reuses_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/A:L:append"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "sheet-123",
            "updates": { "updatedRange": "Sheet1!A2:L2", "updatedRows": 1 }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let store = sheets(&server);
    let record = sample_record();

    assert_eq!(store.append_record(&record).await.unwrap(), "Sheet1!A2:L2");
    store.append_record(&record).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let append = requests
        .iter()
        .find(|r| r.url.path().ends_with(":append"))
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&append.body).unwrap();
    let row = body["values"][0].as_array().unwrap();
    assert_eq!(row.len(), 12);
    assert_eq!(row[5], "גג רעפים");
    assert_eq!(row[10], "עבדנו על גג רעפים");
}

#[tokio::test]
async fn test_sheets_token_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let err = sheets(&server).append_record(&sample_record()).await.unwrap_err();

    assert!(matches!(err, RecordStoreError::Auth(_)));
}

#[tokio::test]
async fn test_sheets_append_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "ya29.test" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123/values/A:L:append"))
        .respond_with(ResponseTemplate::new(403).set_body_string("The caller does not have permission"))
        .mount(&server)
        .await;

    let err = sheets(&server).append_record(&sample_record()).await.unwrap_err();

    assert!(matches!(err, RecordStoreError::Api { status: 403, .. }));
}
