//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{
    load_client_secrets_from_env, load_client_secrets_from_file, CredentialManager, FileCredentialStore,
    SystemBrowser,
};
use crate::classifier::KeywordLists;
use crate::client::ProductionYouTubeClient;
use crate::config::Config;
use crate::error::Result;
use crate::events::MonitorEvent;
use crate::models::{BatchReport, Category, ModerationOutcome, OutcomeSummary};
use crate::moderator::Moderator;
use crate::oauth::{ClientSecrets, GoogleTokenEndpoint};

#[derive(Parser, Debug)]
#[command(name = "yt-spam-guard")]
#[command(version)]
#[command(about = "Spam moderation for YouTube comments and live chat", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 client secrets file; falls back to YT_CLIENT_ID / YT_CLIENT_SECRET
    #[arg(long, default_value = "client_secret.json")]
    pub credentials: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize access to your YouTube channel
    Auth {
        /// Discard the stored credential and authorize again
        #[arg(long)]
        force: bool,
    },

    /// Classify every comment on a video
    Analyze {
        /// Video link or 11-character video id
        link: String,

        /// Delete the comments classified as high risk
        #[arg(long)]
        delete_high: bool,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        keywords: KeywordArgs,
    },

    /// Watch a live chat and remove spam as it arrives
    Live {
        /// Video id of the broadcast; defaults to your active broadcast
        #[arg(long)]
        video: Option<String>,

        /// Report spam without deleting it
        #[arg(long)]
        observe_only: bool,

        #[command(flatten)]
        keywords: KeywordArgs,
    },

    /// Delete comments by id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Keyword overrides; when given they replace the configured list
#[derive(clap::Args, Debug, Default, Clone)]
pub struct KeywordArgs {
    /// High-risk phrase (repeatable)
    #[arg(long = "high-risk", value_name = "PHRASE")]
    pub high_risk: Vec<String>,

    /// Weak/generic phrase (repeatable)
    #[arg(long = "weak", value_name = "PHRASE")]
    pub weak: Vec<String>,
}

impl KeywordArgs {
    pub fn resolve(&self, config: &Config) -> KeywordLists {
        let high_risk = if self.high_risk.is_empty() {
            &config.keywords.high_risk
        } else {
            &self.high_risk
        };
        let weak = if self.weak.is_empty() {
            &config.keywords.weak
        } else {
            &self.weak
        };
        KeywordLists::new(high_risk, weak)
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self { multi, spinner_style }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Client secrets from the JSON file when present, otherwise from the environment
pub async fn load_client_secrets(credentials: &Path, redirect_port: u16) -> Result<ClientSecrets> {
    if credentials.exists() {
        info!("Reading client secrets from {:?}", credentials);
        load_client_secrets_from_file(credentials).await
    } else {
        info!("{:?} not found, reading client secrets from the environment", credentials);
        load_client_secrets_from_env(redirect_port)
    }
}

/// Wire the production credential manager, API client and moderator
pub async fn build_moderator(cli: &Cli, config: &Config) -> Result<Moderator> {
    let secrets = load_client_secrets(&cli.credentials, config.oauth.redirect_port).await?;

    let credentials = Arc::new(CredentialManager::new(
        config.oauth.clone(),
        Arc::new(FileCredentialStore::new(&config.oauth.token_path)),
        Arc::new(GoogleTokenEndpoint::new(
            &config.oauth.token_uri,
            config.fetch.request_timeout(),
        )?),
        Arc::new(SystemBrowser),
    ));
    credentials.configure(secrets).await?;

    let client = Arc::new(ProductionYouTubeClient::new(
        credentials.clone(),
        config.fetch.page_size,
        config.fetch.request_timeout(),
    )?);

    Ok(Moderator::new(config, credentials, client))
}

/// Plain-text summary of a batch analysis
pub fn format_batch_report(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str("\n========================================\n");
    out.push_str("Comment Analysis Summary\n");
    out.push_str("========================================\n");
    out.push_str(&format!("Comments analyzed: {}\n", report.total));
    out.push_str(&format!("High risk: {}\n", report.high.len()));
    out.push_str(&format!("Possible spam: {}\n", report.possible.len()));
    out.push_str(&format!("Safe: {}\n", report.safe_count));

    for (title, flagged) in [("High risk", &report.high), ("Possible spam", &report.possible)] {
        if flagged.is_empty() {
            continue;
        }
        out.push_str(&format!("\n--- {} ---\n", title));
        for entry in flagged {
            out.push_str(&format!(
                "  [{}] {} ({}): {}\n",
                entry.item.id,
                entry.reason.describe(),
                entry.item.author,
                truncate_string(&entry.item.text, 80)
            ));
        }
    }
    out.push_str("========================================");
    out
}

/// One line per deletion, then a tally
pub fn format_outcomes(outcomes: &[ModerationOutcome]) -> String {
    let mut lines: Vec<String> = outcomes
        .iter()
        .map(|o| match &o.message {
            None => format!("  ✓ deleted {}", o.id),
            Some(message) => format!("  ✗ {}: {}", o.id, message),
        })
        .collect();

    let summary = OutcomeSummary::from_outcomes(outcomes);
    lines.push(format!("Deleted {}, failed {}", summary.deleted, summary.failed));
    lines.join("\n")
}

/// Console line for a live event; safe messages are not printed
pub fn format_event(event: &MonitorEvent) -> Option<String> {
    match event {
        MonitorEvent::Started { live_chat_id, .. } => {
            Some(format!("Monitoring live chat {}", live_chat_id))
        }
        MonitorEvent::Message { item, verdict } => {
            let label = match verdict.category {
                Category::High => "HIGH",
                Category::Possible => "POSSIBLE",
                Category::Safe => return None,
            };
            Some(format!(
                "[{}] {}: {} ({})",
                label,
                item.author,
                truncate_string(&item.text, 80),
                verdict.reason.describe()
            ))
        }
        MonitorEvent::Deletion(outcome) => Some(match &outcome.message {
            None => format!("Deleted message {}", outcome.id),
            Some(message) => format!("Failed to delete {}: {}", outcome.id, message),
        }),
        MonitorEvent::TickFailed { error } => Some(format!("Poll failed, retrying: {}", error)),
        MonitorEvent::Halted {
            error,
            reauthorization_required,
        } => Some(if *reauthorization_required {
            format!("Monitoring stopped: {}. Run `yt-spam-guard auth` to sign in again.", error)
        } else {
            format!("Monitoring stopped: {}", error)
        }),
        MonitorEvent::Stopped => Some("Monitoring stopped".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationResult, FlaggedItem, Item, Reason, SourceMode};

    fn item(id: &str, text: &str) -> Item {
        Item {
            id: id.to_string(),
            text: text.to_string(),
            author: "@viewer".to_string(),
            published_at: None,
            source_mode: SourceMode::Live,
        }
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::parse_from([
            "yt-spam-guard",
            "analyze",
            "https://youtu.be/dQw4w9WgXcQ",
            "--delete-high",
            "--high-risk",
            "free gift",
            "--high-risk",
            "dm me",
        ]);

        match cli.command {
            Commands::Analyze {
                link,
                delete_high,
                keywords,
                ..
            } => {
                assert_eq!(link, "https://youtu.be/dQw4w9WgXcQ");
                assert!(delete_high);
                assert_eq!(keywords.high_risk, vec!["free gift", "dm me"]);
                assert!(keywords.weak.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_delete_requires_ids() {
        assert!(Cli::try_parse_from(["yt-spam-guard", "delete"]).is_err());
    }

    #[test]
    fn test_keyword_args_fall_back_to_config() {
        let config = Config::default();
        let args = KeywordArgs {
            high_risk: vec![],
            weak: vec!["GG".to_string()],
        };

        let keywords = args.resolve(&config);
        assert_eq!(keywords.weak(), &["gg".to_string()]);
        assert_eq!(keywords.high_risk().len(), config.keywords.high_risk.len());
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a much longer comment", 10), "a much ...");
    }

    #[test]
    fn test_format_batch_report() {
        let report = BatchReport {
            high: vec![FlaggedItem {
                item: item("c1", "been watching forever"),
                reason: Reason::HighRiskPhrase,
            }],
            possible: vec![],
            safe_count: 3,
            total: 4,
        };

        let text = format_batch_report(&report);
        assert!(text.contains("Comments analyzed: 4"));
        assert!(text.contains("[c1] High-risk phrase"));
        assert!(!text.contains("Possible spam ---"));
    }

    #[test]
    fn test_format_outcomes() {
        let text = format_outcomes(&[
            ModerationOutcome::deleted("a"),
            ModerationOutcome::error("b", "Not found: commentNotFound"),
        ]);
        assert!(text.contains("✓ deleted a"));
        assert!(text.contains("✗ b: Not found"));
        assert!(text.ends_with("Deleted 1, failed 1"));
    }

    #[test]
    fn test_format_event_skips_safe_messages() {
        let safe = MonitorEvent::Message {
            item: item("m1", "hello"),
            verdict: ClassificationResult::SAFE,
        };
        assert!(format_event(&safe).is_none());

        let high = MonitorEvent::Message {
            item: item("m2", "positive vibes only"),
            verdict: ClassificationResult::new(Category::High, Reason::HighRiskPhrase),
        };
        assert_eq!(
            format_event(&high).unwrap(),
            "[HIGH] @viewer: positive vibes only (High-risk phrase)"
        );

        let halted = MonitorEvent::Halted {
            error: "Authentication failed: invalid_grant".to_string(),
            reauthorization_required: true,
        };
        assert!(format_event(&halted).unwrap().contains("yt-spam-guard auth"));
    }
}
