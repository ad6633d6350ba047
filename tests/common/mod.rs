//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use yt_spam_guard::auth::TokenProvider;
use yt_spam_guard::client::YouTubeClient;
use yt_spam_guard::error::{GuardError, Result};
use yt_spam_guard::events::Subscription;
use yt_spam_guard::models::{Item, Page, SourceMode};

/// Build a video comment
pub fn comment(id: &str, text: &str) -> Item {
    Item {
        id: id.to_string(),
        text: text.to_string(),
        author: format!("@author_{}", id),
        published_at: None,
        source_mode: SourceMode::Video,
    }
}

/// Build a live chat message
pub fn chat_message(id: &str, text: &str) -> Item {
    Item {
        source_mode: SourceMode::Live,
        ..comment(id, text)
    }
}

pub fn page(items: Vec<Item>, next_cursor: Option<&str>) -> Page {
    Page {
        items,
        next_cursor: next_cursor.map(str::to_string),
    }
}

/// Scripted YouTube client: pages and errors are served in push order.
///
/// An exhausted queue answers with an empty page, like a quiet chat.
#[derive(Default)]
pub struct FakeYouTubeClient {
    comment_pages: Mutex<VecDeque<Result<Page>>>,
    chat_pages: Mutex<VecDeque<Result<Page>>>,
    live_chat_id: Mutex<Option<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    deleted_comments: Mutex<Vec<String>>,
    deleted_messages: Mutex<Vec<String>>,
    comment_requests: Mutex<Vec<Option<String>>>,
    chat_requests: Mutex<Vec<Option<String>>>,
}

impl FakeYouTubeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live_chat(live_chat_id: &str) -> Self {
        let client = Self::new();
        *client.live_chat_id.lock().unwrap() = Some(live_chat_id.to_string());
        client
    }

    pub fn push_comment_page(&self, page: Page) {
        self.comment_pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_comment_error(&self, error: GuardError) {
        self.comment_pages.lock().unwrap().push_back(Err(error));
    }

    pub fn push_chat_page(&self, page: Page) {
        self.chat_pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_chat_error(&self, error: GuardError) {
        self.chat_pages.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn deleted_comments(&self) -> Vec<String> {
        self.deleted_comments.lock().unwrap().clone()
    }

    pub fn deleted_messages(&self) -> Vec<String> {
        self.deleted_messages.lock().unwrap().clone()
    }

    pub fn comment_requests(&self) -> Vec<Option<String>> {
        self.comment_requests.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<Option<String>> {
        self.chat_requests.lock().unwrap().clone()
    }

    fn record_delete(&self, log: &Mutex<Vec<String>>, id: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(id) {
            return Err(GuardError::Forbidden(format!("cannot delete {}", id)));
        }
        log.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl YouTubeClient for FakeYouTubeClient {
    async fn list_comment_threads(&self, _video_id: &str, page_token: Option<String>) -> Result<Page> {
        self.comment_requests.lock().unwrap().push(page_token);
        self.comment_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn active_live_chat_id(&self) -> Result<String> {
        self.live_chat_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GuardError::NotFound("No active broadcast".to_string()))
    }

    async fn live_chat_id_for_video(&self, video_id: &str) -> Result<String> {
        self.live_chat_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GuardError::NotFound(format!("Video {} has no live chat", video_id)))
    }

    async fn list_live_chat_messages(&self, _live_chat_id: &str, page_token: Option<String>) -> Result<Page> {
        self.chat_requests.lock().unwrap().push(page_token);
        self.chat_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<()> {
        self.record_delete(&self.deleted_comments, comment_id)
    }

    async fn delete_live_chat_message(&self, message_id: &str) -> Result<()> {
        self.record_delete(&self.deleted_messages, message_id)
    }
}

/// Token provider that hands out a fixed token until revoked
#[derive(Default)]
pub struct FakeTokens {
    revoked: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn access_token(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            Err(GuardError::AuthError("Token refresh rejected: invalid_grant".to_string()))
        } else {
            Ok("test-access-token".to_string())
        }
    }
}

/// Wait for the first event matching `predicate`, collecting everything seen
pub async fn collect_until<E, F>(sub: &mut Subscription<E>, mut predicate: F) -> Vec<E>
where
    E: Send + 'static,
    F: FnMut(&E) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = sub.recv().await {
            let done = predicate(&event);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for event");
    seen
}
