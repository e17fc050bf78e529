//! Telegram Bot API adapter: the message source for batch reconciliation.
//!
//! Updates are pulled with `getUpdates`, one page per call. Passing `offset`
//! acknowledges everything below it upstream, so the offset is always
//! derived from the persisted checkpoint and never from a page just fetched.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MessageSource;
use crate::domain::{AudioRef, Update, UpdateKind, UpdatePage, UpdateQuery};

/// Maximum page size accepted by `getUpdates`
const PAGE_SIZE: usize = 100;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// API base URL (overridable for tests)
    api_base: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response envelope from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    /// Unix timestamp
    date: i64,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    voice: Option<TgVoice>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub timeout_seconds: u64,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
        })
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Result<Self> {
        Self::new(config.bot_token, Duration::from_secs(config.timeout_seconds))
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Build file download URL
    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    /// Fetch one page of message updates starting at `offset`
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&serde_json::json!({
                "offset": offset,
                "limit": PAGE_SIZE,
                "timeout": 1,
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .context("Failed to fetch Telegram updates")?;

        let result: TelegramResponse<Vec<TgUpdate>> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        Ok(result.result.unwrap_or_default())
    }

    /// Resolve a `file_id` to a downloadable path
    async fn get_file_path(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .context("Failed to request Telegram file")?;

        let result: TelegramResponse<TgFile> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .and_then(|f| f.file_path)
            .with_context(|| format!("Telegram returned no file path for {}", file_id))
    }
}

/// Map a raw update onto the domain type. Updates without a message are dropped.
fn to_domain(raw: TgUpdate) -> Option<Update> {
    let message = raw.message?;
    let timestamp = Utc.timestamp_opt(message.date, 0).single()?;
    let sender_id = message.from.map(|u| u.id);

    let update = match (message.voice, message.text) {
        (Some(voice), _) => Update::voice(raw.update_id, timestamp, sender_id, AudioRef(voice.file_id)),
        (None, Some(_)) => Update::text(raw.update_id, timestamp, sender_id),
        (None, None) => Update {
            kind: UpdateKind::Other,
            ..Update::text(raw.update_id, timestamp, sender_id)
        },
    };

    Some(update)
}

#[async_trait]
impl MessageSource for TelegramClient {
    async fn fetch_updates(&self, query: &UpdateQuery) -> Result<UpdatePage> {
        // Telegram confirms every update below the offset
        let offset = query.since + 1;
        let raw = self.get_updates(offset).await?;
        let page_len = raw.len();
        let last_id = raw.iter().map(|u| u.update_id).max();
        debug!(offset, page_len, ?last_id, "Fetched Telegram page");

        let updates = raw
            .into_iter()
            .filter_map(to_domain)
            .filter(|u| query.accepts(u))
            .collect();

        Ok(UpdatePage {
            updates,
            last_id,
            has_more: page_len >= PAGE_SIZE,
        })
    }

    async fn download_audio(&self, audio: &AudioRef) -> Result<Vec<u8>> {
        let file_path = self.get_file_path(audio.as_str()).await?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .context("Failed to download voice file")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Voice download failed with HTTP {}", status);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read voice file body")?;

        Ok(bytes.to_vec())
    }
}
