use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::RetryPolicy;
use crate::{Error, Result};

/// Top-level configuration, loaded from an optional TOML file and then
/// overridden by `SITEPROOF_*` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub providers: ProvidersConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Root directory for artifact bytes
    pub blob_root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("siteproof.db"),
            blob_root: PathBuf::from("storage"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 3,
            backoff_base_secs: 5,
            backoff_cap_secs: 300,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_cap: Duration::from_secs(self.backoff_cap_secs),
        }
    }
}

/// External engines. Anything left as `None` is treated as unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OCR binary, e.g. `tesseract`
    pub ocr_command: Option<String>,
    /// Audio/video decoder, e.g. `ffmpeg`
    pub ffmpeg_command: Option<String>,
    /// Speech-to-text binary, e.g. `whisper-cli`
    pub whisper_command: Option<String>,
    /// Whisper model file passed with `-m`
    pub whisper_model: Option<PathBuf>,
    /// llama.cpp-compatible server base URL, e.g. `http://127.0.0.1:8080`
    pub llm_url: Option<String>,
    pub llm_timeout_secs: u64,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    /// Model calls per extraction; extra calls carry a repair prompt
    pub llm_attempts: u32,
    /// Characters of artifact text sent to the model
    pub llm_max_chars: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            ocr_command: None,
            ffmpeg_command: None,
            whisper_command: None,
            whisper_model: None,
            llm_url: None,
            llm_timeout_secs: 120,
            llm_max_tokens: 700,
            llm_temperature: 0.1,
            llm_attempts: 2,
            llm_max_chars: 12_000,
        }
    }
}

impl ProvidersConfig {
    /// Fill unset tool commands with whatever is found on `PATH`.
    pub fn detect_tools(&mut self) {
        if self.ocr_command.is_none() && which::which("tesseract").is_ok() {
            self.ocr_command = Some("tesseract".to_string());
        }
        if self.ffmpeg_command.is_none() && which::which("ffmpeg").is_ok() {
            self.ffmpeg_command = Some("ffmpeg".to_string());
        }
        if self.whisper_command.is_none() {
            self.whisper_command = ["whisper-cli", "whisper"]
                .into_iter()
                .find(|bin| which::which(bin).is_ok())
                .map(str::to_string);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Upper bound on discovery claims kept per artifact
    pub discovery_max_facts: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            discovery_max_facts: 40,
        }
    }
}

impl Config {
    /// Load from `path` if given (a missing file is an error), apply environment
    /// overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// Apply `SITEPROOF_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SITEPROOF_DB") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SITEPROOF_STORAGE") {
            self.store.blob_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("SITEPROOF_MAX_ATTEMPTS") {
            self.worker.max_attempts = parse_env("SITEPROOF_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("SITEPROOF_POLL_MS") {
            self.worker.poll_interval_ms = parse_env("SITEPROOF_POLL_MS", &v)?;
        }
        if let Some(v) = lookup("SITEPROOF_LLM_URL") {
            self.providers.llm_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("SITEPROOF_LLM_TIMEOUT_SECS") {
            self.providers.llm_timeout_secs = parse_env("SITEPROOF_LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SITEPROOF_LLM_ATTEMPTS") {
            self.providers.llm_attempts = parse_env("SITEPROOF_LLM_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("SITEPROOF_LLM_MAX_CHARS") {
            self.providers.llm_max_chars = parse_env("SITEPROOF_LLM_MAX_CHARS", &v)?;
        }
        if let Some(v) = lookup("SITEPROOF_OCR") {
            self.providers.ocr_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("SITEPROOF_FFMPEG") {
            self.providers.ffmpeg_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("SITEPROOF_WHISPER") {
            self.providers.whisper_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = lookup("SITEPROOF_WHISPER_MODEL") {
            self.providers.whisper_model = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.max_attempts == 0 {
            return Err(Error::Config("worker.max_attempts must be >= 1".into()));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(Error::Config("worker.poll_interval_ms must be > 0".into()));
        }
        if self.worker.backoff_cap_secs < self.worker.backoff_base_secs {
            return Err(Error::Config(
                "worker.backoff_cap_secs must be >= worker.backoff_base_secs".into(),
            ));
        }
        if self.providers.llm_timeout_secs == 0 {
            return Err(Error::Config("providers.llm_timeout_secs must be > 0".into()));
        }
        if self.providers.llm_attempts == 0 {
            return Err(Error::Config("providers.llm_attempts must be >= 1".into()));
        }
        if self.providers.llm_max_chars == 0 {
            return Err(Error::Config("providers.llm_max_chars must be > 0".into()));
        }
        if self.extraction.discovery_max_facts == 0 {
            return Err(Error::Config(
                "extraction.discovery_max_facts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse '{value}'")))
}
