//! Configuration for shaliwood.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SHALIWOOD_HOME, TELEGRAM_TOKEN, OPENAI_API_KEY, ...)
//! 2. Config file (.shaliwood/config.yaml)
//! 3. Defaults (~/.shaliwood)
//!
//! Config file discovery:
//! - Searches current directory and parents for .shaliwood/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{ReconcilerOptions, ServiceTimeouts, DEFAULT_LANGUAGE};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub services: Option<ServicesConfig>,
    #[serde(default)]
    pub timeouts: Option<TimeoutsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to config file)
    pub home: Option<String>,
    /// Where archived voice messages go (relative to config file)
    pub voice_save_dir: Option<String>,
    /// Service account credentials (relative to config file)
    pub credentials_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    pub language: Option<String>,
    pub transcription_model: Option<String>,
    pub extraction_model: Option<String>,
    pub sheet_range: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    pub transcription_seconds: Option<u64>,
    pub extraction_seconds: Option<u64>,
    pub append_seconds: Option<u64>,
    pub telegram_seconds: Option<u64>,
}

/// Resolved timeouts, in seconds
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub transcription_seconds: u64,
    pub extraction_seconds: u64,
    pub append_seconds: u64,
    pub telegram_seconds: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            transcription_seconds: 120,
            extraction_seconds: 60,
            append_seconds: 30,
            telegram_seconds: 30,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (checkpoint, lock, local records)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub telegram_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub credentials_file: PathBuf,
    pub sheet_range: String,
    pub save_voice_messages: bool,
    pub voice_save_dir: PathBuf,
    pub language: String,
    pub transcription_model: String,
    pub extraction_model: String,
    pub timeouts: TimeoutSettings,
}

impl ResolvedConfig {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.home.join("checkpoint.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.home.join("checkpoint.lock")
    }

    pub fn local_records_path(&self) -> PathBuf {
        self.home.join("records.jsonl")
    }

    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .context("Required environment variable 'TELEGRAM_TOKEN' is not set")
    }

    pub fn require_openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("Required environment variable 'OPENAI_API_KEY' is not set")
    }

    pub fn require_spreadsheet_id(&self) -> Result<&str> {
        self.spreadsheet_id
            .as_deref()
            .context("Required environment variable 'SPREADSHEET_ID' is not set")
    }

    pub fn service_timeouts(&self) -> ServiceTimeouts {
        ServiceTimeouts {
            transcription: Duration::from_secs(self.timeouts.transcription_seconds),
            extraction: Duration::from_secs(self.timeouts.extraction_seconds),
        }
    }

    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            language: self.language.clone(),
            archive_audio: self.save_voice_messages,
            append_timeout: Duration::from_secs(self.timeouts.append_seconds),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".shaliwood").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Non-empty environment variable
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean flag the way the deployment scripts set it
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".shaliwood");

    let config_file = find_config_file();
    let parsed = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    resolve(parsed.as_ref(), config_file.as_deref(), default_home)
}

/// Merge a parsed config file with the environment
fn resolve(parsed: Option<&ConfigFile>, config_path: Option<&Path>, default_home: PathBuf) -> Result<ResolvedConfig> {
    // Base directory is the parent of .shaliwood/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let paths = parsed.map(|c| c.paths.clone()).unwrap_or_default();
    let services = parsed.and_then(|c| c.services.clone());
    let timeouts = parsed.and_then(|c| c.timeouts.clone());

    let home = if let Some(env_home) = env_var("SHALIWOOD_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(base_dir, home_path)
    } else {
        default_home
    };

    let voice_save_dir = if let Some(dir) = env_var("VOICE_SAVE_DIR") {
        PathBuf::from(dir)
    } else if let Some(ref dir) = paths.voice_save_dir {
        resolve_path(base_dir, dir)
    } else {
        PathBuf::from("voice_messages")
    };

    let credentials_file = if let Some(file) = env_var("GOOGLE_SHEETS_CREDENTIALS_FILE") {
        PathBuf::from(file)
    } else if let Some(ref file) = paths.credentials_file {
        resolve_path(base_dir, file)
    } else {
        PathBuf::from("credentials.json")
    };

    let sheet_range = env_var("SHEET_RANGE")
        .or_else(|| services.as_ref().and_then(|s| s.sheet_range.clone()))
        .unwrap_or_else(|| "A:L".to_string());

    let defaults = TimeoutSettings::default();
    let timeouts = TimeoutSettings {
        transcription_seconds: timeouts
            .as_ref()
            .and_then(|t| t.transcription_seconds)
            .unwrap_or(defaults.transcription_seconds),
        extraction_seconds: timeouts
            .as_ref()
            .and_then(|t| t.extraction_seconds)
            .unwrap_or(defaults.extraction_seconds),
        append_seconds: timeouts
            .as_ref()
            .and_then(|t| t.append_seconds)
            .unwrap_or(defaults.append_seconds),
        telegram_seconds: timeouts
            .as_ref()
            .and_then(|t| t.telegram_seconds)
            .unwrap_or(defaults.telegram_seconds),
    };

    Ok(ResolvedConfig {
        home,
        config_file: config_path.map(Path::to_path_buf),
        telegram_token: env_var("TELEGRAM_TOKEN"),
        openai_api_key: env_var("OPENAI_API_KEY"),
        spreadsheet_id: env_var("SPREADSHEET_ID"),
        credentials_file,
        sheet_range,
        save_voice_messages: env_var("SAVE_VOICE_MESSAGES")
            .map(|v| parse_flag(&v))
            .unwrap_or(false),
        voice_save_dir,
        language: services
            .as_ref()
            .and_then(|s| s.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        transcription_model: services
            .as_ref()
            .and_then(|s| s.transcription_model.clone())
            .unwrap_or_else(|| "whisper-1".to_string()),
        extraction_model: services
            .as_ref()
            .and_then(|s| s.extraction_model.clone())
            .unwrap_or_else(|| "gpt-4o".to_string()),
        timeouts,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
