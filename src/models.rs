use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an item came from; selects classifier thresholds and the delete endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Top-level comment on an uploaded video
    Video,
    /// Message in a live broadcast chat
    Live,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Video => write!(f, "video"),
            SourceMode::Live => write!(f, "live"),
        }
    }
}

/// A user-submitted text item fetched from the platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub text: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_mode: SourceMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Safe,
    Possible,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Reason {
    Duplicate,
    HighRiskPhrase,
    EmojiOverload,
    ShortOrGeneric,
    None,
}

impl Reason {
    pub fn describe(&self) -> &'static str {
        match self {
            Reason::Duplicate => "Duplicate comment",
            Reason::HighRiskPhrase => "High-risk phrase",
            Reason::EmojiOverload => "Emoji overload",
            Reason::ShortOrGeneric => "Short or generic response",
            Reason::None => "No spam indicators",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClassificationResult {
    pub category: Category,
    pub reason: Reason,
}

impl ClassificationResult {
    pub const SAFE: ClassificationResult = ClassificationResult {
        category: Category::Safe,
        reason: Reason::None,
    };

    pub fn new(category: Category, reason: Reason) -> Self {
        Self { category, reason }
    }

    pub fn is_flagged(&self) -> bool {
        self.category != Category::Safe
    }
}

/// An item together with the verdict that flagged it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlaggedItem {
    pub item: Item,
    pub reason: Reason,
}

/// Aggregated result of a one-shot video analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub high: Vec<FlaggedItem>,
    pub possible: Vec<FlaggedItem>,
    pub safe_count: usize,
    pub total: usize,
}

impl BatchReport {
    pub fn high_ids(&self) -> Vec<String> {
        self.high.iter().map(|f| f.item.id.clone()).collect()
    }
}

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Deleted,
    Error,
}

/// Result of a single deletion attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModerationOutcome {
    pub id: String,
    pub status: OutcomeStatus,
    pub message: Option<String>,
}

impl ModerationOutcome {
    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Deleted,
            message: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OutcomeStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == OutcomeStatus::Deleted
    }
}

/// Counts over a batch of deletion outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub deleted: usize,
    pub failed: usize,
}

impl OutcomeSummary {
    pub fn from_outcomes(outcomes: &[ModerationOutcome]) -> Self {
        let deleted = outcomes.iter().filter(|o| o.is_deleted()).count();
        Self {
            deleted,
            failed: outcomes.len() - deleted,
        }
    }

    /// True when some, but not all, attempts failed
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.deleted > 0
    }
}
