//! Top-level facade wiring credentials, analysis, live monitoring and deletion

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::actuator::ModerationActuator;
use crate::auth::{CredentialManager, TokenProvider};
use crate::classifier::{KeywordLists, SpamClassifier};
use crate::client::YouTubeClient;
use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::events::{ListenerHandle, MonitorEvent, Subscription};
use crate::fetcher::{LiveSource, RetryPolicy};
use crate::models::{BatchReport, ModerationOutcome, SourceMode};
use crate::scheduler::{BatchAnalyzer, LiveMonitor, LiveSettings, StartStatus};

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Pull the 11-character video id out of a YouTube link, or accept a bare id
pub fn extract_video_id(link: &str) -> Result<String> {
    let link = link.trim();
    if VIDEO_ID.is_match(link) {
        return Ok(link.to_string());
    }

    let invalid = || GuardError::BadRequest(format!("Not a YouTube video link: {:?}", link));
    let url = Url::parse(link)
        .or_else(|_| Url::parse(&format!("https://{}", link)))
        .map_err(|_| invalid())?;
    let host = url.host_str().unwrap_or_default().trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments().and_then(|mut s| s.next()).map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments().into_iter().flatten();
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("shorts") | Some("live") | Some("embed") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    candidate
        .filter(|id| VIDEO_ID.is_match(id))
        .ok_or_else(invalid)
}

/// Entry point for front ends
pub struct Moderator {
    credentials: Arc<CredentialManager>,
    client: Arc<dyn YouTubeClient>,
    analyzer: BatchAnalyzer,
    monitor: LiveMonitor,
    video_actuator: ModerationActuator,
}

impl Moderator {
    pub fn new(config: &Config, credentials: Arc<CredentialManager>, client: Arc<dyn YouTubeClient>) -> Self {
        let classifier = Arc::new(SpamClassifier::new(config.classifier.clone()));
        let tokens: Arc<dyn TokenProvider> = credentials.clone();

        Self {
            analyzer: BatchAnalyzer::new(
                Arc::clone(&client),
                Arc::clone(&tokens),
                Arc::clone(&classifier),
                RetryPolicy::from_config(&config.fetch),
                config.fetch.max_items,
            ),
            monitor: LiveMonitor::new(
                Arc::clone(&client),
                tokens,
                classifier,
                LiveSettings::from_config(config),
            ),
            video_actuator: ModerationActuator::new(
                Arc::clone(&client),
                SourceMode::Video,
                config.actuator.max_concurrent_deletes,
            ),
            credentials,
            client,
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn client(&self) -> Arc<dyn YouTubeClient> {
        Arc::clone(&self.client)
    }

    pub async fn authorize(&self) -> Result<()> {
        self.credentials.authorize().await?;
        Ok(())
    }

    /// Classify every comment on the video behind `link`
    pub async fn analyze_batch(&self, link: &str, keywords: &KeywordLists) -> Result<BatchReport> {
        let video_id = extract_video_id(link)?;
        info!(video_id = %video_id, "Analyzing video comments");
        self.analyzer.analyze(&video_id, keywords).await
    }

    /// Start the live session and forward its events to `on_event`
    ///
    /// `on_event` is attached only when this call starts a session; an
    /// already running session keeps its existing listeners and returns no handle.
    pub async fn start_live_monitor<F>(
        &self,
        source: LiveSource,
        keywords: KeywordLists,
        on_event: F,
    ) -> Result<(StartStatus, Option<ListenerHandle>)>
    where
        F: FnMut(MonitorEvent) + Send + 'static,
    {
        // Subscribe first so the new session's Started event is buffered
        let subscription = self.monitor.subscribe();
        match self.monitor.start(source, keywords).await? {
            status @ StartStatus::Started { .. } => Ok((status, Some(subscription.forward_to(on_event)))),
            StartStatus::AlreadyRunning => {
                subscription.cancel();
                Ok((StartStatus::AlreadyRunning, None))
            }
        }
    }

    pub async fn stop_live_monitor(&self) -> bool {
        self.monitor.stop().await
    }

    pub fn monitor(&self) -> &LiveMonitor {
        &self.monitor
    }

    pub fn subscribe(&self) -> Subscription<MonitorEvent> {
        self.monitor.subscribe()
    }

    /// Delete video comments by id, one outcome per id
    pub async fn delete_items(&self, ids: &[String]) -> Vec<ModerationOutcome> {
        self.video_actuator.delete_items(ids).await
    }
}
