//! One-shot video analysis and the periodic live-chat session

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actuator::ModerationActuator;
use crate::auth::TokenProvider;
use crate::classifier::{normalize, KeywordLists, SpamClassifier};
use crate::client::YouTubeClient;
use crate::config::Config;
use crate::dedup::DedupCache;
use crate::error::Result;
use crate::events::{EventEmitter, MonitorEvent, Subscription};
use crate::fetcher::{resolve_live_chat_id, FeedTarget, LiveSource, PageFetcher, RetryPolicy};
use crate::models::{BatchReport, Category, FlaggedItem, Item, SourceMode};

/// Classify a fully fetched batch with a fresh duplicate history
pub fn classify_batch(classifier: &SpamClassifier, keywords: &KeywordLists, items: Vec<Item>) -> BatchReport {
    let mut report = BatchReport {
        total: items.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for item in items {
        let verdict = classifier.classify_item(&item, keywords, &mut seen);
        match verdict.category {
            Category::High => report.high.push(FlaggedItem {
                item,
                reason: verdict.reason,
            }),
            Category::Possible => report.possible.push(FlaggedItem {
                item,
                reason: verdict.reason,
            }),
            Category::Safe => report.safe_count += 1,
        }
    }

    report
}

/// Fetches every comment on a video and classifies the lot
pub struct BatchAnalyzer {
    client: Arc<dyn YouTubeClient>,
    tokens: Arc<dyn TokenProvider>,
    classifier: Arc<SpamClassifier>,
    retry: RetryPolicy,
    max_items: Option<usize>,
}

impl BatchAnalyzer {
    pub fn new(
        client: Arc<dyn YouTubeClient>,
        tokens: Arc<dyn TokenProvider>,
        classifier: Arc<SpamClassifier>,
        retry: RetryPolicy,
        max_items: Option<usize>,
    ) -> Self {
        Self {
            client,
            tokens,
            classifier,
            retry,
            max_items,
        }
    }

    /// All-or-nothing: a failed page yields an error and no partial report
    pub async fn analyze(&self, video_id: &str, keywords: &KeywordLists) -> Result<BatchReport> {
        self.tokens.access_token().await?;

        let fetcher = PageFetcher::new(
            Arc::clone(&self.client),
            FeedTarget::VideoComments {
                video_id: video_id.to_string(),
            },
            self.retry.clone(),
        );
        let items = fetcher.drain_all(None, self.max_items).await?;
        let report = classify_batch(&self.classifier, keywords, items);

        info!(
            video_id,
            total = report.total,
            high = report.high.len(),
            possible = report.possible.len(),
            safe = report.safe_count,
            "Batch analysis complete"
        );
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartStatus {
    Started { session_id: Uuid, live_chat_id: String },
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub poll_interval: Duration,
    pub dedup_capacity: usize,
    pub auto_delete: bool,
    pub max_concurrent_deletes: usize,
    pub retry: RetryPolicy,
}

impl LiveSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.live.poll_interval(),
            dedup_capacity: config.live.dedup_capacity,
            auto_delete: config.live.auto_delete,
            max_concurrent_deletes: config.actuator.max_concurrent_deletes,
            retry: RetryPolicy::from_config(&config.fetch),
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Default)]
struct TickSummary {
    fetched: usize,
    fresh: usize,
    flagged: usize,
    deleted: usize,
}

/// Per-session state owned by the polling task
struct Session {
    id: Uuid,
    tokens: Arc<dyn TokenProvider>,
    fetcher: PageFetcher,
    actuator: ModerationActuator,
    classifier: Arc<SpamClassifier>,
    keywords: KeywordLists,
    cursor: Option<String>,
    dedup: DedupCache,
    auto_delete: bool,
    events: EventEmitter<MonitorEvent>,
}

impl Session {
    async fn tick(&mut self) -> Result<TickSummary> {
        self.tokens.access_token().await?;

        let page = self.fetcher.fetch_page(self.cursor.as_deref()).await?;
        if let Some(next) = page.next_cursor {
            self.cursor = Some(next);
        }

        let mut summary = TickSummary {
            fetched: page.items.len(),
            ..Default::default()
        };
        let mut seen_this_tick = HashSet::new();
        let mut to_delete = Vec::new();

        for item in page.items {
            if !self.dedup.insert(dedup_key(&item)) {
                continue;
            }
            summary.fresh += 1;

            let verdict = self
                .classifier
                .classify_item(&item, &self.keywords, &mut seen_this_tick);
            if verdict.is_flagged() {
                summary.flagged += 1;
            }
            if verdict.category == Category::High {
                to_delete.push(item.id.clone());
            }
            self.events.emit(MonitorEvent::Message { item, verdict });
        }

        if self.auto_delete && !to_delete.is_empty() {
            for outcome in self.actuator.delete_items(&to_delete).await {
                if outcome.is_deleted() {
                    summary.deleted += 1;
                }
                self.events.emit(MonitorEvent::Deletion(outcome));
            }
        }

        Ok(summary)
    }
}

/// Messages are keyed by id; id-less messages fall back to their text
fn dedup_key(item: &Item) -> String {
    if item.id.is_empty() {
        format!("text:{}", normalize(&item.text))
    } else {
        item.id.clone()
    }
}

type SharedState = Arc<StdMutex<MonitorState>>;

fn set_state(state: &SharedState, next: MonitorState) {
    *state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
}

fn get_state(state: &SharedState) -> MonitorState {
    *state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_session(
    mut session: Session,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
    state: SharedState,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        match session.tick().await {
            Ok(summary) => debug!(
                session = %session.id,
                fetched = summary.fetched,
                fresh = summary.fresh,
                flagged = summary.flagged,
                deleted = summary.deleted,
                "Tick complete"
            ),
            Err(e) if e.is_session_terminal() => {
                error!(session = %session.id, "Live session halted: {}", e);
                set_state(&state, MonitorState::Stopped);
                session.events.emit(MonitorEvent::Halted {
                    error: e.to_string(),
                    reauthorization_required: e.requires_reauthorization(),
                });
                return;
            }
            Err(e) => {
                warn!(session = %session.id, "Tick failed, will retry next interval: {}", e);
                session.events.emit(MonitorEvent::TickFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    info!(session = %session.id, "Live session stopped");
    set_state(&state, MonitorState::Stopped);
    session.events.emit(MonitorEvent::Stopped);
}

struct ActiveSession {
    id: Uuid,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls a live chat on a fixed interval; at most one session at a time
pub struct LiveMonitor {
    client: Arc<dyn YouTubeClient>,
    tokens: Arc<dyn TokenProvider>,
    classifier: Arc<SpamClassifier>,
    settings: LiveSettings,
    events: EventEmitter<MonitorEvent>,
    active: Mutex<Option<ActiveSession>>,
    state: SharedState,
}

impl LiveMonitor {
    pub fn new(
        client: Arc<dyn YouTubeClient>,
        tokens: Arc<dyn TokenProvider>,
        classifier: Arc<SpamClassifier>,
        settings: LiveSettings,
    ) -> Self {
        Self {
            client,
            tokens,
            classifier,
            settings,
            events: EventEmitter::new(),
            active: Mutex::new(None),
            state: Arc::new(StdMutex::new(MonitorState::Idle)),
        }
    }

    pub fn subscribe(&self) -> Subscription<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> MonitorState {
        get_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Resolve the chat and begin polling; the first tick runs immediately
    pub async fn start(&self, source: LiveSource, keywords: KeywordLists) -> Result<StartStatus> {
        let mut active = self.active.lock().await;
        if self.is_running() {
            info!("Live session already running");
            return Ok(StartStatus::AlreadyRunning);
        }
        if let Some(finished) = active.take() {
            let _ = finished.handle.await;
        }

        self.tokens.access_token().await?;
        let live_chat_id =
            resolve_live_chat_id(self.client.as_ref(), &source, &self.settings.retry).await?;

        let session_id = Uuid::new_v4();
        let session = Session {
            id: session_id,
            tokens: Arc::clone(&self.tokens),
            fetcher: PageFetcher::new(
                Arc::clone(&self.client),
                FeedTarget::LiveChat {
                    live_chat_id: live_chat_id.clone(),
                },
                self.settings.retry.clone(),
            ),
            actuator: ModerationActuator::new(
                Arc::clone(&self.client),
                SourceMode::Live,
                self.settings.max_concurrent_deletes,
            ),
            classifier: Arc::clone(&self.classifier),
            keywords,
            cursor: None,
            dedup: DedupCache::new(self.settings.dedup_capacity),
            auto_delete: self.settings.auto_delete,
            events: self.events.clone(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        set_state(&self.state, MonitorState::Running);
        self.events.emit(MonitorEvent::Started {
            session_id,
            live_chat_id: live_chat_id.clone(),
        });
        info!(session = %session_id, live_chat_id = %live_chat_id, "Live session started");

        let handle = tokio::spawn(run_session(
            session,
            self.settings.poll_interval,
            stop_rx,
            Arc::clone(&self.state),
        ));
        *active = Some(ActiveSession {
            id: session_id,
            stop_tx,
            handle,
        });

        Ok(StartStatus::Started {
            session_id,
            live_chat_id,
        })
    }

    /// Stop polling and wait for an in-flight tick to finish.
    ///
    /// Returns false when there was no session to stop.
    pub async fn stop(&self) -> bool {
        let Some(session) = self.active.lock().await.take() else {
            return false;
        };

        let _ = session.stop_tx.send(true);
        if let Err(e) = session.handle.await {
            if e.is_panic() {
                error!(session = %session.id, "Live session task panicked");
            }
        }

        set_state(&self.state, MonitorState::Stopped);
        true
    }
}

impl Drop for LiveMonitor {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            let _ = session.stop_tx.send(true);
            session.handle.abort();
        }
    }
}
