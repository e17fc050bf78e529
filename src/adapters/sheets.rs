//! Google Sheets record store.
//!
//! Authenticates with a service account (RS256 JWT exchanged for an
//! OAuth access token) and appends each record as one 12-column row.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{RecordStore, RecordStoreError, RowId};
use crate::domain::WorkdayRecord;

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Requested token lifetime
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the token actually expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Fields of a service-account credentials file that we use
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a service-account JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {}", path.display()))
    }
}

/// JWT claims for the OAuth JWT-bearer grant
#[derive(Debug, Serialize)]
struct ServiceAccountClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

/// Append-only store backed by a spreadsheet
pub struct SheetsRecordStore {
    spreadsheet_id: String,
    range: String,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    api_base: String,
    client: reqwest::Client,
    cached_token: Mutex<Option<CachedToken>>,
}

impl SheetsRecordStore {
    /// Create a store for `spreadsheet_id`, appending into `range` (e.g. `A:L`)
    pub fn new(
        spreadsheet_id: String,
        range: String,
        key: ServiceAccountKey,
        timeout: Duration,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Failed to parse service account private key")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Sheets HTTP client")?;

        Ok(Self {
            spreadsheet_id,
            range,
            key,
            encoding_key,
            api_base: DEFAULT_API_BASE.to_string(),
            client,
            cached_token: Mutex::new(None),
        })
    }

    /// Point the client at a different API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn append_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_base, self.spreadsheet_id, self.range
        )
    }

    /// Signed assertion for the token exchange
    fn assertion(&self) -> Result<String, RecordStoreError> {
        let now = chrono::Utc::now().timestamp();
        let claims = ServiceAccountClaims {
            iss: self.key.client_email.clone(),
            scope: SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| RecordStoreError::Auth(format!("JWT signing failed: {}", e)))
    }

    /// Return a cached access token or fetch a fresh one
    async fn access_token(&self) -> Result<String, RecordStoreError> {
        let mut cached = self.cached_token.lock().await;

        if let Some(ref token) = *cached {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.assertion()?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RecordStoreError::Auth(format!("token exchange failed ({}): {}", status, text)));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Obtained Sheets access token");

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl RecordStore for SheetsRecordStore {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn append_record(&self, record: &WorkdayRecord) -> Result<RowId, RecordStoreError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(self.append_url())
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&serde_json::json!({ "values": [record.to_row()] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RecordStoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: AppendResponse = response.json().await?;
        let row = body
            .updates
            .and_then(|u| u.updated_range)
            .unwrap_or_else(|| self.range.clone());

        info!(%row, "Workday row appended to spreadsheet");
        Ok(row)
    }
}
