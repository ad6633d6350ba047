use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use std::io::Write;
use std::path::Path;
use std::process;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use yt_spam_guard::cli::{self, Cli, Commands, ProgressReporter};
use yt_spam_guard::config::Config;
use yt_spam_guard::error::GuardError;
use yt_spam_guard::events::MonitorEvent;
use yt_spam_guard::fetcher::LiveSource;
use yt_spam_guard::moderator::extract_video_id;
use yt_spam_guard::scheduler::StartStatus;

/// A writer that prints through MultiProgress so log lines land above spinners
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Vec<u8>,
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let msg = String::from_utf8_lossy(&self.buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter {
            multi: self.multi.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Console output through the progress display plus a daily log file
fn init_logging(verbose: bool, log_dir: &Path, multi: &MultiProgress) -> Result<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("yt_spam_guard=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yt_spam_guard=info,warn"))
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "yt-spam-guard.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(MultiProgressMakeWriter { multi: multi.clone() })
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: yt-spam-guard --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Several dependencies pull in rustls; pick one crypto provider up front
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::InitConfig { output, force } = &cli.command {
        if output.exists() && !force {
            return Err(GuardError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }

        Config::create_example(output).await?;

        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - oauth.redirect_port: must match the redirect URI registered for your client");
        println!("  - live.poll_interval_secs: how often live chat is polled");
        println!("  - live.auto_delete: delete high-risk chat messages automatically");
        println!("  - keywords.high_risk / keywords.weak: phrases the classifier looks for");
        return Ok(());
    }

    let mut config = Config::load(&cli.config).await?;

    let multi = MultiProgress::new();
    let _log_guard = init_logging(cli.verbose, &config.logging.directory, &multi)?;
    let reporter = ProgressReporter::with_multi_progress(multi.clone());

    tracing::info!("YouTube spam guard starting...");

    match &cli.command {
        Commands::Auth { force } => {
            let moderator = cli::build_moderator(&cli, &config).await?;
            if *force {
                moderator.credentials().reset().await?;
                tracing::info!("Removed stored credential");
            }

            println!("Authorizing... a browser window will open if consent is needed.");
            let credential = moderator.credentials().authorize().await?;

            if let Some(scope) = &credential.scope {
                println!("Authorized for scope: {}", scope);
            }
            println!("Access token valid until {}", credential.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Credential stored at: {:?}", config.oauth.token_path);
            Ok(())
        }

        Commands::Analyze {
            link,
            delete_high,
            output,
            keywords,
        } => {
            let keywords = keywords.resolve(&config);
            let moderator = cli::build_moderator(&cli, &config).await?;
            moderator.authorize().await?;

            let spinner = reporter.add_spinner("Fetching and classifying comments...");
            let report = match moderator.analyze_batch(link, &keywords).await {
                Ok(report) => report,
                Err(e) => {
                    spinner.finish_and_clear();
                    return Err(e.into());
                }
            };
            reporter.finish_spinner(&spinner, &format!("Classified {} comments", report.total));

            println!("{}", cli::format_batch_report(&report));

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&report)?;
                tokio::fs::write(path, json).await?;
                println!("Report written to {:?}", path);
            }

            if *delete_high {
                let ids = report.high_ids();
                if ids.is_empty() {
                    println!("No high-risk comments to delete.");
                } else {
                    let spinner = reporter.add_spinner(&format!("Deleting {} comments...", ids.len()));
                    let outcomes = moderator.delete_items(&ids).await;
                    spinner.finish_and_clear();
                    println!("{}", cli::format_outcomes(&outcomes));
                }
            }
            Ok(())
        }

        Commands::Live {
            video,
            observe_only,
            keywords,
        } => {
            if *observe_only {
                config.live.auto_delete = false;
            }
            let source = match video {
                Some(link) => LiveSource::Video(extract_video_id(link)?),
                None => LiveSource::ActiveBroadcast,
            };
            let keywords = keywords.resolve(&config);

            let moderator = cli::build_moderator(&cli, &config).await?;
            moderator.authorize().await?;

            let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
            let printer = multi.clone();
            let (status, listener) = moderator
                .start_live_monitor(source, keywords, move |event| {
                    if let Some(line) = cli::format_event(&event) {
                        let _ = printer.println(line);
                    }
                    if matches!(event, MonitorEvent::Halted { .. } | MonitorEvent::Stopped) {
                        let _ = ended_tx.send(event);
                    }
                })
                .await?;

            let listener = match (status, listener) {
                (StartStatus::Started { .. }, Some(listener)) => listener,
                _ => return Ok(()),
            };

            if !config.live.auto_delete {
                println!("Observe-only mode: flagged messages will not be deleted");
            }
            println!("Press Ctrl+C to stop.");

            let halted = tokio::select! {
                _ = tokio::signal::ctrl_c() => None,
                event = ended_rx.recv() => event,
            };

            moderator.stop_live_monitor().await;
            listener.cancel();

            match halted {
                Some(MonitorEvent::Halted { error, reauthorization_required }) => {
                    if reauthorization_required {
                        tracing::warn!("Live monitoring halted: {}", error);
                        Err(GuardError::AuthError("live monitoring lost its authorization".to_string()).into())
                    } else {
                        Err(anyhow::anyhow!("Live monitoring stopped: {}", error))
                    }
                }
                _ => Ok(()),
            }
        }

        Commands::Delete { ids } => {
            let moderator = cli::build_moderator(&cli, &config).await?;
            moderator.authorize().await?;

            let outcomes = moderator.delete_items(ids).await;
            println!("{}", cli::format_outcomes(&outcomes));
            Ok(())
        }

        Commands::InitConfig { .. } => Ok(()),
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(guard_err) = error.downcast_ref::<GuardError>() {
        match guard_err {
            GuardError::AuthError(_) => {
                eprintln!("\nHint: Your authorization is missing or was revoked.");
                eprintln!("      Try running: yt-spam-guard auth --force");
            }
            GuardError::Forbidden(_) => {
                eprintln!("\nHint: The signed-in account cannot moderate this video or chat.");
                eprintln!("      Sign in with the channel owner or a moderator account.");
            }
            GuardError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: You've hit YouTube API quota limits.");
                eprintln!("      Wait a while and try again, or raise live.poll_interval_secs.");
            }
            GuardError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration and client secrets.");
                eprintln!("      Run: yt-spam-guard init-config --force");
            }
            _ => {}
        }
    }
}
