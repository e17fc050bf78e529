//! OpenAI adapters: Whisper transcription and chat-based field extraction.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExtractionOutcome, Extractor, Transcriber, TranscriptionError};
use crate::core::fields::parse_extraction;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Shared HTTP plumbing for OpenAI endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client whose requests are bounded by `timeout`
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }
}

/// Whisper transcription response
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Speech-to-text via `/audio/transcriptions`
pub struct WhisperTranscriber {
    client: OpenAiClient,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        let file_part = Part::bytes(audio.to_vec())
            .file_name("voice.ogg")
            .mime_str("audio/ogg")?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .part("file", file_part);

        let response = self
            .client
            .client
            .post(self.client.url("audio/transcriptions"))
            .bearer_auth(&self.client.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: TranscriptionResponse = response.json().await?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }

        debug!(chars = text.chars().count(), "Audio transcribed");
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Structured extraction via `/chat/completions` in JSON mode
pub struct OpenAiExtractor {
    client: OpenAiClient,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Raw completion text for a prompt
    async fn complete(&self, system: &str, user: &str) -> Result<Option<String>> {
        let response = self
            .client
            .client
            .post(self.client.url("chat/completions"))
            .bearer_auth(&self.client.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "temperature": 0.0,
                "max_tokens": 1000,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await
            .context("Failed to call chat completions")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI error ({}): {}", status, text);
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion envelope")?;

        Ok(body.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

const SYSTEM_PROMPT: &str =
    "You extract structured data from Hebrew daily work reports of a roofing company. \
     Always answer with a single valid JSON object.";

/// User prompt listing the schema and the reference date
fn build_prompt(text: &str, schema: &[&str], reference_date: NaiveDate) -> String {
    let keys = schema
        .iter()
        .map(|name| format!("  \"{}\": \"\"", name))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "Report:\n{text}\n\n\
         Reference date: {date} (DD/MM/YYYY). Resolve relative days such as \"היום\", \
         \"אתמול\" or \"לפני X ימים\" against it.\n\
         Fill only what is stated or clearly implied; leave anything else as \"\". \
         Dates as DD/MM/YYYY, times as HH:MM (24h), workers comma-separated. \
         Keep all values in Hebrew.\n\
         Return exactly this JSON object:\n{{\n{keys}\n}}",
        text = text,
        date = reference_date.format("%d/%m/%Y"),
        keys = keys,
    )
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn extract(
        &self,
        text: &str,
        schema: &[&str],
        reference_date: NaiveDate,
    ) -> ExtractionOutcome {
        if text.trim().is_empty() {
            return ExtractionOutcome::Malformed("empty transcription".to_string());
        }

        let prompt = build_prompt(text, schema, reference_date);
        match self.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(Some(content)) => parse_extraction(&content, schema),
            Ok(None) => ExtractionOutcome::Malformed("completion had no content".to_string()),
            Err(e) => {
                warn!(error = %e, "Extraction request failed");
                ExtractionOutcome::ServiceError(format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FIELD_SCHEMA;

    #[test]
    fn test_prompt_lists_schema_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let prompt = build_prompt("עבדנו שמונה שעות", &FIELD_SCHEMA, date);

        assert!(prompt.contains("עבדנו שמונה שעות"));
        assert!(prompt.contains("21/06/2025"));
        for name in FIELD_SCHEMA {
            assert!(prompt.contains(&format!("\"{}\"", name)));
        }
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let client = OpenAiClient::new("k".to_string(), Duration::from_secs(1))
            .unwrap()
            .with_api_base("http://127.0.0.1:1234/v1/");
        assert_eq!(client.url("chat/completions"), "http://127.0.0.1:1234/v1/chat/completions");
    }
}
