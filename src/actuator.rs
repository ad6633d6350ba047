//! Deletion of flagged items
//!
//! Every requested id gets exactly one outcome, in request order. A failed
//! delete never aborts the rest of the batch.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::YouTubeClient;
use crate::models::{ModerationOutcome, OutcomeSummary, SourceMode};

pub struct ModerationActuator {
    client: Arc<dyn YouTubeClient>,
    mode: SourceMode,
    max_concurrent: usize,
}

impl ModerationActuator {
    pub fn new(client: Arc<dyn YouTubeClient>, mode: SourceMode, max_concurrent: usize) -> Self {
        Self {
            client,
            mode,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Delete each id once; the outcome list mirrors `ids`
    pub async fn delete_items(&self, ids: &[String]) -> Vec<ModerationOutcome> {
        if ids.is_empty() {
            return Vec::new();
        }

        let client = Arc::clone(&self.client);
        let mode = self.mode;
        let outcomes: Vec<ModerationOutcome> = stream::iter(ids.to_vec())
            .map(move |id| Self::delete_one(Arc::clone(&client), mode, id))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let summary = OutcomeSummary::from_outcomes(&outcomes);
        if summary.failed > 0 {
            warn!(
                deleted = summary.deleted,
                failed = summary.failed,
                "Some {} deletions failed",
                self.mode
            );
        } else {
            info!(deleted = summary.deleted, "Deleted flagged {} items", self.mode);
        }
        outcomes
    }

    async fn delete_one(client: Arc<dyn YouTubeClient>, mode: SourceMode, id: String) -> ModerationOutcome {
        if id.trim().is_empty() {
            return ModerationOutcome::error(id, "Empty item id");
        }

        let result = match mode {
            SourceMode::Video => client.delete_comment(&id).await,
            SourceMode::Live => client.delete_live_chat_message(&id).await,
        };

        match result {
            Ok(()) => ModerationOutcome::deleted(id),
            Err(e) => {
                warn!(id = %id, "Delete failed: {}", e);
                ModerationOutcome::error(id, e.to_string())
            }
        }
    }
}
