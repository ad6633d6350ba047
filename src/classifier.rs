//! Rule-based spam classifier for comments and live-chat messages
//!
//! The policy is deterministic: the same text, mode, keyword lists and
//! in-batch history always yield the same verdict. Decision order is
//! Duplicate > HighRiskPhrase > EmojiOverload (video only) > ShortOrGeneric > Safe.

use std::collections::HashSet;

use crate::config::{ClassifierConfig, EmojiRange, KeywordConfig};
use crate::models::{Category, ClassificationResult, Item, Reason, SourceMode};

/// Phrases strongly associated with comment-farm spam
pub const DEFAULT_HIGH_RISK_KEYWORDS: &[&str] = &[
    "been watching",
    "source of inspiration",
    "you always amaze me",
    "thanks for your content",
    "inspiring me daily",
    "positive vibes only",
];

/// Low-effort replies that deserve a manual look
pub const DEFAULT_WEAK_KEYWORDS: &[&str] = &[
    "thanks",
    "amazing",
    "cool",
    "great video",
    "love this",
    "very useful",
];

/// Normalized keyword blacklists
///
/// Entries are trimmed and lowercased so they compare against normalized text.
/// Blank entries are dropped: an empty needle would match every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordLists {
    high_risk: Vec<String>,
    weak: Vec<String>,
}

impl KeywordLists {
    pub fn new<H, W>(high_risk: H, weak: W) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        Self {
            high_risk: normalize_list(high_risk),
            weak: normalize_list(weak),
        }
    }

    pub fn from_config(config: &KeywordConfig) -> Self {
        Self::new(&config.high_risk, &config.weak)
    }

    pub fn high_risk(&self) -> &[String] {
        &self.high_risk
    }

    pub fn weak(&self) -> &[String] {
        &self.weak
    }
}

impl Default for KeywordLists {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_RISK_KEYWORDS, DEFAULT_WEAK_KEYWORDS)
    }
}

fn normalize_list<I>(entries: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    entries
        .into_iter()
        .map(|k| normalize(k.as_ref()))
        .filter(|k| !k.is_empty())
        .collect()
}

/// Trim surrounding whitespace and lowercase
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub struct SpamClassifier {
    config: ClassifierConfig,
}

impl SpamClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify an item using the mode it was fetched in
    pub fn classify_item(
        &self,
        item: &Item,
        keywords: &KeywordLists,
        seen_in_batch: &mut HashSet<String>,
    ) -> ClassificationResult {
        self.classify(&item.text, item.source_mode, keywords, seen_in_batch)
    }

    /// Classify raw text.
    ///
    /// `seen_in_batch` holds the normalized texts already classified in the
    /// current run; the caller owns it and resets it per run.
    pub fn classify(
        &self,
        text: &str,
        mode: SourceMode,
        keywords: &KeywordLists,
        seen_in_batch: &mut HashSet<String>,
    ) -> ClassificationResult {
        let normalized = normalize(text);

        if seen_in_batch.contains(&normalized) {
            return ClassificationResult::new(Category::High, Reason::Duplicate);
        }
        seen_in_batch.insert(normalized.clone());

        let emoji_count = self.count_emoji(&normalized, mode);
        let has_high_risk = keywords
            .high_risk
            .iter()
            .any(|k| normalized.contains(k.as_str()));
        let has_weak_reply = keywords
            .weak
            .iter()
            .any(|k| normalized == *k || normalized.contains(k.as_str()));
        let is_too_short = normalized.chars().count() < self.config.min_length;

        if has_high_risk
            && !self.hype_exemption_applies(mode, emoji_count, has_high_risk)
        {
            return ClassificationResult::new(Category::High, Reason::HighRiskPhrase);
        }

        if mode == SourceMode::Video
            && !has_high_risk
            && emoji_count >= self.config.emoji_overload_threshold
        {
            return ClassificationResult::new(Category::High, Reason::EmojiOverload);
        }

        if has_weak_reply || is_too_short {
            return ClassificationResult::new(Category::Possible, Reason::ShortOrGeneric);
        }

        ClassificationResult::SAFE
    }

    /// Live-chat exemption for emoji-heavy reactions.
    ///
    /// Requires the absence of a high-risk match, so it can never downgrade a
    /// keyword hit: a high-risk phrase is High regardless of emoji count.
    pub fn hype_exemption_applies(
        &self,
        mode: SourceMode,
        emoji_count: usize,
        has_high_risk: bool,
    ) -> bool {
        mode == SourceMode::Live
            && !has_high_risk
            && emoji_count >= self.config.hype_emote_threshold
    }

    /// Count glyphs falling in the emoji range configured for `mode`
    pub fn count_emoji(&self, text: &str, mode: SourceMode) -> usize {
        let range = self.emoji_range(mode);
        text.chars().filter(|c| range.contains(*c)).count()
    }

    fn emoji_range(&self, mode: SourceMode) -> EmojiRange {
        match mode {
            SourceMode::Video => self.config.video_emoji_range,
            SourceMode::Live => self.config.live_emoji_range,
        }
    }
}

impl Default for SpamClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify_all(texts: &[&str], mode: SourceMode) -> Vec<ClassificationResult> {
        let classifier = SpamClassifier::default();
        let keywords = KeywordLists::default();
        let mut seen = HashSet::new();
        texts
            .iter()
            .map(|t| classifier.classify(t, mode, &keywords, &mut seen))
            .collect()
    }

    #[test]
    fn test_reference_batch() {
        let results = classify_all(
            &["Thanks!", "Thanks!", "love this", "been watching you for years"],
            SourceMode::Video,
        );

        // "thanks!" is seven characters and contains a weak keyword
        assert_eq!(results[0], ClassificationResult::new(Category::Possible, Reason::ShortOrGeneric));
        assert_eq!(results[1], ClassificationResult::new(Category::High, Reason::Duplicate));
        assert_eq!(results[2], ClassificationResult::new(Category::Possible, Reason::ShortOrGeneric));
        assert_eq!(results[3], ClassificationResult::new(Category::High, Reason::HighRiskPhrase));
    }

    #[test]
    fn test_duplicate_uses_normalized_text() {
        let results = classify_all(
            &["What a great breakdown of the topic", "  WHAT A GREAT BREAKDOWN OF THE TOPIC  "],
            SourceMode::Video,
        );
        assert_eq!(results[0], ClassificationResult::SAFE);
        assert_eq!(results[1].reason, Reason::Duplicate);
    }

    #[test]
    fn test_emoji_overload_threshold() {
        let results = classify_all(&["nice upload 😀😀😀😀😀😀"], SourceMode::Video);
        assert_eq!(results[0], ClassificationResult::new(Category::High, Reason::EmojiOverload));

        let results = classify_all(&["nice upload 😀😀😀😀😀"], SourceMode::Video);
        assert_ne!(results[0].reason, Reason::EmojiOverload);
        assert_eq!(results[0], ClassificationResult::SAFE);
    }

    #[test]
    fn test_emoji_outside_video_range_not_counted() {
        // 🔥 is U+1F525, outside the default video range
        let results = classify_all(&["nice upload 🔥🔥🔥🔥🔥🔥🔥"], SourceMode::Video);
        assert_eq!(results[0], ClassificationResult::SAFE);
    }

    #[test]
    fn test_short_comment_is_possible() {
        let results = classify_all(&["first!!"], SourceMode::Video);
        assert_eq!(results[0], ClassificationResult::new(Category::Possible, Reason::ShortOrGeneric));
    }

    #[test]
    fn test_weak_keyword_in_long_comment() {
        let results = classify_all(&["honestly a great video about compilers"], SourceMode::Video);
        assert_eq!(results[0].category, Category::Possible);
    }

    #[test]
    fn test_high_risk_beats_emoji_overload() {
        let results = classify_all(
            &["positive vibes only 😀😀😀😀😀😀😀😀"],
            SourceMode::Video,
        );
        assert_eq!(results[0].reason, Reason::HighRiskPhrase);
    }

    #[test]
    fn test_live_high_risk_with_hype_emotes_is_high() {
        let results = classify_all(
            &["been watching since day one 🔥🔥🔥🎉🎉🎉"],
            SourceMode::Live,
        );
        assert_eq!(results[0], ClassificationResult::new(Category::High, Reason::HighRiskPhrase));
    }

    #[test]
    fn test_live_mode_has_no_emoji_overload() {
        let results = classify_all(&["LETS GOOOO 🔥🔥🔥🔥🔥🔥🔥🔥"], SourceMode::Live);
        assert_eq!(results[0], ClassificationResult::SAFE);
    }

    #[test]
    fn test_hype_exemption_gate() {
        let classifier = SpamClassifier::default();
        assert!(classifier.hype_exemption_applies(SourceMode::Live, 3, false));
        assert!(!classifier.hype_exemption_applies(SourceMode::Live, 10, true));
        assert!(!classifier.hype_exemption_applies(SourceMode::Video, 10, false));
        assert!(!classifier.hype_exemption_applies(SourceMode::Live, 2, false));
    }

    #[test]
    fn test_live_range_counts_fire() {
        let classifier = SpamClassifier::default();
        assert_eq!(classifier.count_emoji("🔥🎉😀", SourceMode::Live), 3);
        assert_eq!(classifier.count_emoji("🔥🎉😀", SourceMode::Video), 1);
    }

    #[test]
    fn test_keyword_lists_normalized() {
        let keywords = KeywordLists::new(["  Free GIFT  ", ""], ["   "]);
        assert_eq!(keywords.high_risk(), &["free gift".to_string()]);
        assert!(keywords.weak().is_empty());

        let classifier = SpamClassifier::default();
        let mut seen = HashSet::new();
        let result = classifier.classify(
            "claim your FREE gift at my channel",
            SourceMode::Video,
            &keywords,
            &mut seen,
        );
        assert_eq!(result.reason, Reason::HighRiskPhrase);
    }

    #[test]
    fn test_seen_set_records_normalized_text() {
        let classifier = SpamClassifier::default();
        let keywords = KeywordLists::default();
        let mut seen = HashSet::new();
        classifier.classify("  Hello There Friend  ", SourceMode::Video, &keywords, &mut seen);
        assert!(seen.contains("hello there friend"));
    }

    proptest! {
        #[test]
        fn prop_classify_is_deterministic(text in ".{0,40}", live in any::<bool>()) {
            let mode = if live { SourceMode::Live } else { SourceMode::Video };
            let classifier = SpamClassifier::default();
            let keywords = KeywordLists::default();

            let first = classifier.classify(&text, mode, &keywords, &mut HashSet::new());
            let second = classifier.classify(&text, mode, &keywords, &mut HashSet::new());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_second_occurrence_is_duplicate(text in ".{0,40}") {
            let classifier = SpamClassifier::default();
            let keywords = KeywordLists::default();
            let mut seen = HashSet::new();

            classifier.classify(&text, SourceMode::Video, &keywords, &mut seen);
            let again = classifier.classify(&text, SourceMode::Video, &keywords, &mut seen);
            prop_assert_eq!(again, ClassificationResult::new(Category::High, Reason::Duplicate));
        }
    }
}
