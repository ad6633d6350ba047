use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{DEFAULT_HIGH_RISK_KEYWORDS, DEFAULT_WEAK_KEYWORDS};
use crate::error::{GuardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Local port the one-shot redirect listener binds to
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_consent_timeout_secs")]
    pub consent_timeout_secs: u64,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Tokens this close to expiry are treated as expired
    #[serde(default = "default_expiry_skew_secs")]
    pub expiry_skew_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            redirect_port: default_redirect_port(),
            consent_timeout_secs: default_consent_timeout_secs(),
            token_path: default_token_path(),
            scopes: default_scopes(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            expiry_skew_secs: default_expiry_skew_secs(),
        }
    }
}

impl OAuthConfig {
    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }

    pub fn expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_skew_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Attempts per page, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Upper bound on items collected by a full drain; unset means unbounded
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_items: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FetchConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    /// Delete High items as soon as they are seen
    #[serde(default = "default_auto_delete")]
    pub auto_delete: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            dedup_capacity: default_dedup_capacity(),
            auto_delete: default_auto_delete(),
        }
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Inclusive range of Unicode scalar values counted as emoji
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmojiRange {
    pub start: u32,
    pub end: u32,
}

impl EmojiRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, c: char) -> bool {
        (self.start..=self.end).contains(&(c as u32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_emoji_overload_threshold")]
    pub emoji_overload_threshold: usize,
    #[serde(default = "default_hype_emote_threshold")]
    pub hype_emote_threshold: usize,
    #[serde(default = "default_video_emoji_range")]
    pub video_emoji_range: EmojiRange,
    #[serde(default = "default_live_emoji_range")]
    pub live_emoji_range: EmojiRange,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            emoji_overload_threshold: default_emoji_overload_threshold(),
            hype_emote_threshold: default_hype_emote_threshold(),
            video_emoji_range: default_video_emoji_range(),
            live_emoji_range: default_live_emoji_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_high_risk")]
    pub high_risk: Vec<String>,
    #[serde(default = "default_weak")]
    pub weak: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            high_risk: default_high_risk(),
            weak: default_weak(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_max_concurrent_deletes")]
    pub max_concurrent_deletes: usize,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deletes: default_max_concurrent_deletes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

fn default_redirect_port() -> u16 {
    42813
}

fn default_consent_timeout_secs() -> u64 {
    120
}

fn default_token_path() -> PathBuf {
    PathBuf::from(".yt-spam-guard/token.json")
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/youtube.force-ssl".to_string()]
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_expiry_skew_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_dedup_capacity() -> usize {
    500
}

fn default_auto_delete() -> bool {
    true
}

fn default_min_length() -> usize {
    10
}

fn default_emoji_overload_threshold() -> usize {
    6
}

fn default_hype_emote_threshold() -> usize {
    3
}

fn default_video_emoji_range() -> EmojiRange {
    EmojiRange::new(0x1F600, 0x1F64F)
}

fn default_live_emoji_range() -> EmojiRange {
    EmojiRange::new(0x1F300, 0x1FAFF)
}

fn default_high_risk() -> Vec<String> {
    DEFAULT_HIGH_RISK_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_weak() -> Vec<String> {
    DEFAULT_WEAK_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_max_concurrent_deletes() -> usize {
    4
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".yt-spam-guard/logs")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GuardError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GuardError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GuardError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GuardError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GuardError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.oauth.consent_timeout_secs == 0 {
            return Err(GuardError::ConfigError(
                "oauth.consent_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.oauth.scopes.is_empty() {
            return Err(GuardError::ConfigError(
                "oauth.scopes must contain at least one scope".to_string(),
            ));
        }
        for (name, uri) in [("auth_uri", &self.oauth.auth_uri), ("token_uri", &self.oauth.token_uri)] {
            url::Url::parse(uri).map_err(|e| {
                GuardError::ConfigError(format!("oauth.{} is not a valid URL: {}", name, e))
            })?;
        }

        // YouTube caps maxResults at 100 for comment threads
        if self.fetch.page_size == 0 || self.fetch.page_size > 100 {
            return Err(GuardError::ConfigError(
                "fetch.page_size must be between 1 and 100".to_string(),
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(GuardError::ConfigError(
                "fetch.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.fetch.max_attempts > 10 {
            return Err(GuardError::ConfigError(
                "fetch.max_attempts cannot exceed 10".to_string(),
            ));
        }
        if self.fetch.max_backoff_ms < self.fetch.initial_backoff_ms {
            return Err(GuardError::ConfigError(
                "fetch.max_backoff_ms cannot be lower than fetch.initial_backoff_ms".to_string(),
            ));
        }
        if self.fetch.max_items == Some(0) {
            return Err(GuardError::ConfigError(
                "fetch.max_items must be greater than 0 when set".to_string(),
            ));
        }

        if self.live.poll_interval_secs == 0 {
            return Err(GuardError::ConfigError(
                "live.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.live.dedup_capacity < 2 {
            return Err(GuardError::ConfigError(
                "live.dedup_capacity must be at least 2".to_string(),
            ));
        }

        for (name, range) in [
            ("video_emoji_range", self.classifier.video_emoji_range),
            ("live_emoji_range", self.classifier.live_emoji_range),
        ] {
            if range.start > range.end || char::from_u32(range.end).is_none() {
                return Err(GuardError::ConfigError(format!(
                    "classifier.{} is not a valid Unicode range",
                    name
                )));
            }
        }
        if self.classifier.emoji_overload_threshold == 0 {
            return Err(GuardError::ConfigError(
                "classifier.emoji_overload_threshold must be greater than 0".to_string(),
            ));
        }

        for keyword in self.keywords.high_risk.iter().chain(&self.keywords.weak) {
            if keyword.trim().is_empty() {
                return Err(GuardError::ConfigError(
                    "keywords cannot contain empty strings".to_string(),
                ));
            }
        }

        if self.actuator.max_concurrent_deletes == 0 {
            return Err(GuardError::ConfigError(
                "actuator.max_concurrent_deletes must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
