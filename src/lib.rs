//! YouTube Spam Guard
//!
//! Finds and removes spam from the comments of a YouTube video and from the
//! chat of a live broadcast, acting on behalf of the channel owner.
//!
//! # Overview
//!
//! - **Authorization**: OAuth2 authorization-code flow with a local redirect
//!   listener, persisted and refreshed credentials
//! - **Classification**: deterministic rule-based verdicts (high risk,
//!   possible spam, safe) driven by keyword lists
//! - **Batch analysis**: every comment of a video, paginated with retry
//! - **Live monitoring**: a polling session with cross-tick deduplication,
//!   optional auto-deletion and an event stream for front ends
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use yt_spam_guard::auth::{CredentialManager, FileCredentialStore, SystemBrowser};
//! use yt_spam_guard::oauth::{ClientSecrets, GoogleTokenEndpoint};
//! use yt_spam_guard::{Config, KeywordLists, Moderator, ProductionYouTubeClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let credentials = Arc::new(CredentialManager::new(
//!         config.oauth.clone(),
//!         Arc::new(FileCredentialStore::new(&config.oauth.token_path)),
//!         Arc::new(GoogleTokenEndpoint::new(&config.oauth.token_uri, config.fetch.request_timeout())?),
//!         Arc::new(SystemBrowser),
//!     ));
//!     credentials
//!         .configure(ClientSecrets::new("id", "secret", "http://localhost:42813")?)
//!         .await?;
//!
//!     let client = Arc::new(ProductionYouTubeClient::new(
//!         credentials.clone(),
//!         config.fetch.page_size,
//!         config.fetch.request_timeout(),
//!     )?);
//!     let moderator = Moderator::new(&config, credentials, client);
//!
//!     let report = moderator
//!         .analyze_batch("https://youtu.be/dQw4w9WgXcQ", &KeywordLists::default())
//!         .await?;
//!     println!("{} high-risk comments", report.high.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`oauth`] - Authorization URL, token endpoint and redirect listener
//! - [`auth`] - Credential lifecycle, persistence and refresh
//! - [`client`] - YouTube Data API client trait and production implementation
//! - [`classifier`] - Rule-based spam classification
//! - [`fetcher`] - Paginated fetching with retry
//! - [`dedup`] - Bounded seen-message cache for live sessions
//! - [`scheduler`] - Batch analysis and the live polling session
//! - [`actuator`] - Deletion of flagged items
//! - [`events`] - Live-session event fan-out
//! - [`moderator`] - Facade used by front ends
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod actuator;
pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod models;
pub mod moderator;
pub mod oauth;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use error::{GuardError, Result};

// Core data models
pub use models::{
    BatchReport, Category, ClassificationResult, FlaggedItem, Item, ModerationOutcome,
    OutcomeStatus, OutcomeSummary, Page, Reason, SourceMode,
};

// Classification
pub use classifier::{KeywordLists, SpamClassifier};

// Config types
pub use config::{ClassifierConfig, Config, FetchConfig, LiveConfig, OAuthConfig};

// Credentials
pub use auth::{AuthState, Credential, CredentialManager, CredentialStore, TokenProvider};

// Client traits
pub use client::{ProductionYouTubeClient, YouTubeClient};

// Live monitoring
pub use events::{ListenerHandle, MonitorEvent, Subscription};
pub use fetcher::{FeedTarget, LiveSource, PageFetcher, RetryPolicy};
pub use scheduler::{BatchAnalyzer, LiveMonitor, LiveSettings, MonitorState, StartStatus};

// Facade
pub use moderator::{extract_video_id, Moderator};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
