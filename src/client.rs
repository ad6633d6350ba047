//! YouTube Data API client: comment threads, live chat, deletions

use async_trait::async_trait;
use google_youtube3::{
    api::{CommentThread, LiveBroadcast, LiveChatMessage},
    hyper_rustls, hyper_util, YouTube,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::{GuardError, Result};
use crate::models::{Item, Page, SourceMode};

/// Type alias for the YouTube hub to simplify type signatures
pub type YouTubeHub =
    YouTube<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Operations the moderator needs from the platform
#[async_trait]
pub trait YouTubeClient: Send + Sync {
    /// One page of top-level comments on a video
    async fn list_comment_threads(&self, video_id: &str, page_token: Option<String>) -> Result<Page>;

    /// Chat id of the authenticated channel's active broadcast
    async fn active_live_chat_id(&self) -> Result<String>;

    /// Chat id attached to a specific live video
    async fn live_chat_id_for_video(&self, video_id: &str) -> Result<String>;

    /// One page of live chat messages
    async fn list_live_chat_messages(&self, live_chat_id: &str, page_token: Option<String>) -> Result<Page>;

    async fn delete_comment(&self, comment_id: &str) -> Result<()>;

    async fn delete_live_chat_message(&self, message_id: &str) -> Result<()>;
}

type HubFactory = Box<dyn Fn(String) -> YouTubeHub + Send + Sync>;

/// Production client backed by google-youtube3.
///
/// A hub is assembled per call around the current access token, so token
/// refresh stays with the credential manager. The underlying HTTP client
/// (and its connection pool) is shared.
pub struct ProductionYouTubeClient {
    make_hub: HubFactory,
    tokens: Arc<dyn TokenProvider>,
    page_size: u32,
    request_timeout: Duration,
}

impl ProductionYouTubeClient {
    pub fn new(tokens: Arc<dyn TokenProvider>, page_size: u32, request_timeout: Duration) -> Result<Self> {
        // HTTP/1 only, matching what the generated API crates are tested with
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(
                hyper_rustls::HttpsConnectorBuilder::new()
                    .with_native_roots()
                    .map_err(|e| GuardError::ConfigError(format!("Failed to load TLS roots: {}", e)))?
                    .https_or_http()
                    .enable_http1()
                    .build(),
            );

        Ok(Self {
            make_hub: Box::new(move |token| YouTube::new(client.clone(), token)),
            tokens,
            page_size,
            request_timeout,
        })
    }

    async fn hub(&self) -> Result<YouTubeHub> {
        let token = self.tokens.access_token().await?;
        Ok((self.make_hub)(token))
    }

    /// Bound a generated API call by the request timeout
    async fn timed<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = google_youtube3::Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(GuardError::from),
            Err(_) => {
                warn!("YouTube API {} call timed out after {:?}", operation, self.request_timeout);
                Err(GuardError::NetworkError(format!(
                    "API call timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl YouTubeClient for ProductionYouTubeClient {
    async fn list_comment_threads(&self, video_id: &str, page_token: Option<String>) -> Result<Page> {
        let hub = self.hub().await?;
        let mut call = hub
            .comment_threads()
            .list(&vec!["snippet".to_string()])
            .video_id(video_id)
            .max_results(self.page_size)
            .text_format("plainText");
        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = self.timed("commentThreads.list", call.doit()).await?;
        let items: Vec<Item> = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_comment_thread)
            .collect();

        debug!(video_id, count = items.len(), "Fetched comment page");
        Ok(Page {
            items,
            next_cursor: response.next_page_token,
        })
    }

    async fn active_live_chat_id(&self) -> Result<String> {
        let hub = self.hub().await?;
        let call = hub
            .live_broadcasts()
            .list(&vec!["snippet".to_string()])
            .broadcast_status("active");

        let (_, response) = self.timed("liveBroadcasts.list", call.doit()).await?;
        first_live_chat_id(response.items.unwrap_or_default())
            .ok_or_else(|| GuardError::NotFound("No active live broadcasts found".to_string()))
    }

    async fn live_chat_id_for_video(&self, video_id: &str) -> Result<String> {
        let hub = self.hub().await?;
        let call = hub
            .videos()
            .list(&vec!["liveStreamingDetails".to_string()])
            .add_id(video_id);

        let (_, response) = self.timed("videos.list", call.doit()).await?;
        response
            .items
            .unwrap_or_default()
            .into_iter()
            .find_map(|video| video.live_streaming_details?.active_live_chat_id)
            .ok_or_else(|| {
                GuardError::NotFound(format!("Video {} has no active live chat", video_id))
            })
    }

    async fn list_live_chat_messages(&self, live_chat_id: &str, page_token: Option<String>) -> Result<Page> {
        let hub = self.hub().await?;
        let mut call = hub
            .live_chat_messages()
            .list(live_chat_id, &vec!["snippet".to_string(), "authorDetails".to_string()]);
        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = self.timed("liveChatMessages.list", call.doit()).await?;
        if let Some(offline_at) = response.offline_at {
            return Err(GuardError::NotFound(format!(
                "Live chat went offline at {}",
                offline_at
            )));
        }

        let items: Vec<Item> = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(parse_live_chat_message)
            .collect();

        debug!(count = items.len(), "Fetched live chat page");
        Ok(Page {
            items,
            next_cursor: response.next_page_token,
        })
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        let hub = self.hub().await?;
        let call = hub.comments().delete(comment_id);
        self.timed("comments.delete", call.doit()).await?;
        Ok(())
    }

    async fn delete_live_chat_message(&self, message_id: &str) -> Result<()> {
        let hub = self.hub().await?;
        let call = hub.live_chat_messages().delete(message_id);
        self.timed("liveChatMessages.delete", call.doit()).await?;
        Ok(())
    }
}

/// Extract the top-level comment; threads without an id are skipped
fn parse_comment_thread(thread: CommentThread) -> Option<Item> {
    let comment = thread.snippet?.top_level_comment?;
    let Some(id) = comment.id else {
        debug!("Skipping comment without id");
        return None;
    };
    let snippet = comment.snippet.unwrap_or_default();

    Some(Item {
        id,
        text: snippet
            .text_display
            .or(snippet.text_original)
            .unwrap_or_default(),
        author: snippet.author_display_name.unwrap_or_default(),
        published_at: snippet.published_at,
        source_mode: SourceMode::Video,
    })
}

fn parse_live_chat_message(message: LiveChatMessage) -> Option<Item> {
    let Some(id) = message.id else {
        debug!("Skipping live chat message without id");
        return None;
    };
    let snippet = message.snippet.unwrap_or_default();
    let text = snippet
        .display_message
        .or_else(|| snippet.text_message_details.and_then(|d| d.message_text))
        .unwrap_or_default();

    Some(Item {
        id,
        text,
        author: message
            .author_details
            .and_then(|a| a.display_name)
            .unwrap_or_default(),
        published_at: snippet.published_at,
        source_mode: SourceMode::Live,
    })
}

fn first_live_chat_id(broadcasts: Vec<LiveBroadcast>) -> Option<String> {
    broadcasts
        .into_iter()
        .find_map(|broadcast| broadcast.snippet?.live_chat_id)
}
