//! Cursor-driven page fetching with retry on transient failures

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::YouTubeClient;
use crate::config::FetchConfig;
use crate::error::{GuardError, Result};
use crate::models::{Item, Page};

/// What a fetcher reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTarget {
    VideoComments { video_id: String },
    LiveChat { live_chat_id: String },
}

/// How a live session locates its chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveSource {
    /// The authenticated channel's currently active broadcast
    ActiveBroadcast,
    /// The live chat attached to a given video
    Video(String),
}

/// Exponential backoff for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts < self.max_attempts => {
                    // The server's Retry-After is a floor, never capped by max_backoff
                    let wait = match &e {
                        GuardError::RateLimitExceeded { retry_after } => {
                            delay.max(Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, self.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, self.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct PageFetcher {
    client: Arc<dyn YouTubeClient>,
    target: FeedTarget,
    retry: RetryPolicy,
}

impl PageFetcher {
    pub fn new(client: Arc<dyn YouTubeClient>, target: FeedTarget, retry: RetryPolicy) -> Self {
        Self {
            client,
            target,
            retry,
        }
    }

    pub fn target(&self) -> &FeedTarget {
        &self.target
    }

    /// Fetch one page; `None` or an empty cursor starts from the beginning
    pub async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page> {
        let cursor = cursor.filter(|c| !c.is_empty()).map(str::to_string);
        let client = Arc::clone(&self.client);
        let target = self.target.clone();

        // Attempts own their inputs; live sessions run this inside tokio::spawn
        let mut page = self
            .retry
            .run("fetch_page", move || {
                let client = Arc::clone(&client);
                let target = target.clone();
                let cursor = cursor.clone();
                async move {
                    match target {
                        FeedTarget::VideoComments { video_id } => {
                            client.list_comment_threads(&video_id, cursor).await
                        }
                        FeedTarget::LiveChat { live_chat_id } => {
                            client.list_live_chat_messages(&live_chat_id, cursor).await
                        }
                    }
                }
            })
            .await?;

        if page.next_cursor.as_deref() == Some("") {
            page.next_cursor = None;
        }
        Ok(page)
    }

    /// Follow cursors until exhausted; any page failure fails the whole drain.
    ///
    /// With `max_items`, collection stops once the bound is reached and the
    /// result is truncated to exactly that many items.
    pub async fn drain_all(&self, initial_cursor: Option<&str>, max_items: Option<usize>) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut cursor = initial_cursor.map(str::to_string);
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(cursor.as_deref()).await?;
            pages += 1;
            items.extend(page.items);

            if let Some(limit) = max_items {
                if items.len() >= limit {
                    if page.next_cursor.is_some() || items.len() > limit {
                        warn!(limit, "Item limit reached, remaining comments were not fetched");
                    }
                    items.truncate(limit);
                    break;
                }
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!("Server returned the same page cursor twice, stopping");
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
            debug!(pages, collected = items.len(), "Following next page cursor");
        }

        info!(pages, items = items.len(), "Drained {:?}", self.target);
        Ok(items)
    }
}

/// Resolve the chat a live session should poll
pub async fn resolve_live_chat_id(
    client: &dyn YouTubeClient,
    source: &LiveSource,
    retry: &RetryPolicy,
) -> Result<String> {
    let live_chat_id = retry
        .run("resolve_live_chat", move || async move {
            match source {
                LiveSource::ActiveBroadcast => client.active_live_chat_id().await,
                LiveSource::Video(video_id) => client.live_chat_id_for_video(video_id).await,
            }
        })
        .await?;

    info!(live_chat_id = %live_chat_id, "Resolved live chat");
    Ok(live_chat_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceMode;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};

    mock! {
        pub Client {}

        #[async_trait]
        impl YouTubeClient for Client {
            async fn list_comment_threads(&self, video_id: &str, page_token: Option<String>) -> Result<Page>;
            async fn active_live_chat_id(&self) -> Result<String>;
            async fn live_chat_id_for_video(&self, video_id: &str) -> Result<String>;
            async fn list_live_chat_messages(&self, live_chat_id: &str, page_token: Option<String>) -> Result<Page>;
            async fn delete_comment(&self, comment_id: &str) -> Result<()>;
            async fn delete_live_chat_message(&self, message_id: &str) -> Result<()>;
        }
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            text: format!("comment {}", id),
            author: "viewer".to_string(),
            published_at: None,
            source_mode: SourceMode::Video,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Page {
        Page {
            items: ids.iter().map(|id| item(id)).collect(),
            next_cursor: next.map(str::to_string),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn video_fetcher(client: MockClient, retry: RetryPolicy) -> PageFetcher {
        PageFetcher::new(
            Arc::new(client),
            FeedTarget::VideoComments {
                video_id: "dQw4w9WgXcQ".to_string(),
            },
            retry,
        )
    }

    #[tokio::test]
    async fn test_drain_all_follows_cursors() {
        let mut client = MockClient::new();
        client
            .expect_list_comment_threads()
            .withf(|_, token| token.is_none())
            .times(1)
            .returning(|_, _| Ok(page(&["a", "b"], Some("p2"))));
        client
            .expect_list_comment_threads()
            .withf(|_, token| token.as_deref() == Some("p2"))
            .times(1)
            .returning(|_, _| Ok(page(&["c"], None)));

        let fetcher = video_fetcher(client, fast_retry(1));
        let items = fetcher.drain_all(None, None).await.unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_drain_all_truncates_at_max_items() {
        let mut client = MockClient::new();
        client
            .expect_list_comment_threads()
            .times(1)
            .returning(|_, _| Ok(page(&["a", "b", "c"], Some("p2"))));

        let fetcher = video_fetcher(client, fast_retry(1));
        let items = fetcher.drain_all(None, Some(2)).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_all_fails_whole_batch() {
        let mut client = MockClient::new();
        client
            .expect_list_comment_threads()
            .withf(|_, token| token.is_none())
            .returning(|_, _| Ok(page(&["a"], Some("p2"))));
        client
            .expect_list_comment_threads()
            .withf(|_, token| token.as_deref() == Some("p2"))
            .returning(|_, _| Err(GuardError::Forbidden("commentsDisabled".to_string())));

        let fetcher = video_fetcher(client, fast_retry(3));
        let err = fetcher.drain_all(None, None).await.unwrap_err();
        assert!(matches!(err, GuardError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_drain_all_stops_on_repeated_cursor() {
        let mut client = MockClient::new();
        client
            .expect_list_comment_threads()
            .times(2)
            .returning(|_, _| Ok(page(&["x"], Some("same"))));

        let fetcher = video_fetcher(client, fast_retry(1));
        let items = fetcher.drain_all(None, None).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_page_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut client = MockClient::new();
        client
            .expect_list_live_chat_messages()
            .withf(|chat, _| chat == "chat-1")
            .returning(move |_, _| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GuardError::ServerError {
                        status: 503,
                        message: "backend".to_string(),
                    })
                } else {
                    Ok(page(&["m1"], Some("next")))
                }
            });

        let fetcher = PageFetcher::new(
            Arc::new(client),
            FeedTarget::LiveChat {
                live_chat_id: "chat-1".to_string(),
            },
            fast_retry(3),
        );

        let page = fetcher.fetch_page(None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("next"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_page_normalizes_empty_cursors() {
        let mut client = MockClient::new();
        client
            .expect_list_comment_threads()
            .withf(|_, token| token.is_none())
            .returning(|_, _| Ok(page(&[], Some(""))));

        let fetcher = video_fetcher(client, fast_retry(1));
        let page = fetcher.fetch_page(Some("")).await.unwrap();
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_retry(3)
            .run("test_op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GuardError::NetworkError("reset".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_retry(5)
            .run("test_op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GuardError::NotFound("gone".to_string()))
            })
            .await;

        assert!(matches!(result, Err(GuardError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_waits_at_least_retry_after() {
        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();
        let result: Result<u32> = fast_retry(2)
            .run("rate_limited_op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(GuardError::RateLimitExceeded { retry_after: 1 })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_fetch_page_future_is_send() {
        let fetcher = video_fetcher(MockClient::new(), fast_retry(1));
        assert_send(async move {
            let _ = fetcher.fetch_page(Some("p2")).await;
        });
    }

    #[tokio::test]
    async fn test_resolve_live_chat_from_video() {
        let mut client = MockClient::new();
        client
            .expect_live_chat_id_for_video()
            .withf(|video| video == "live-video")
            .returning(|_| Ok("chat-9".to_string()));
        client.expect_active_live_chat_id().times(0);

        let chat = resolve_live_chat_id(&client, &LiveSource::Video("live-video".to_string()), &fast_retry(1))
            .await
            .unwrap();
        assert_eq!(chat, "chat-9");
    }

    #[tokio::test]
    async fn test_resolve_live_chat_without_broadcast() {
        let mut client = MockClient::new();
        client
            .expect_active_live_chat_id()
            .returning(|| Err(GuardError::NotFound("No active live broadcasts found".to_string())));

        let err = resolve_live_chat_id(&client, &LiveSource::ActiveBroadcast, &fast_retry(3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No active live broadcasts"));
    }
}
