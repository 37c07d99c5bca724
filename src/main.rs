//! # Post Digest
//!
//! Fetches recent posts from a configured list of accounts, summarizes them
//! with a hosted language model and delivers the digest to a chat channel.
//!
//! ## Features
//!
//! - Posts from the X API v2 or a Nitter instance's RSS feeds
//! - Summaries through OpenAI or DeepSeek chat completions
//! - Delivery to a Discord channel, a Discord webhook or a Telegram chat
//! - JSON and Markdown artifacts per run, kept even when delivery fails
//! - An always-on Telegram bot with on-demand `/summary` and a daily schedule
//!
//! ## Usage
//!
//! ```sh
//! AUTHORS=alice,bob post_digest run -o ./out
//! post_digest bot
//! ```
//!
//! ## Architecture
//!
//! Every run is a linear pipeline:
//! 1. **Fetching**: posts per author inside the lookback window (concurrent, isolated failures)
//! 2. **Organizing**: group by author, oldest first
//! 3. **Formatting**: render under the prompt budget, dropping oldest posts first
//! 4. **Summarizing**: one chat-completions call to the configured provider
//! 5. **Delivering**: artifacts on disk, then the chat message(s)

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod bot;
mod cli;
mod config;
mod delivery;
mod error;
mod formatter;
mod models;
mod organizer;
mod outputs;
mod pipeline;
mod retry;
mod scrapers;
mod summarizer;
#[cfg(test)]
mod testing;
mod utils;

use cli::{Cli, Command};
use config::Config;
use pipeline::RunStatus;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "post_digest starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, "Parsed CLI arguments");

    let config = match Config::from_settings(&args.settings) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let code = match args.command {
        Command::Run { hours, no_deliver } => run_once(config, hours, !no_deliver).await,
        Command::Bot => match bot::run(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Bot stopped with an error");
                ExitCode::FAILURE
            }
        },
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    code
}

async fn run_once(config: Config, hours: Option<u32>, deliver: bool) -> ExitCode {
    let config = match hours.map(|h| config.with_lookback(h)).transpose() {
        Ok(Some(config)) => config,
        Ok(None) => config,
        Err(e) => {
            error!(error = %e, "Invalid --hours");
            return ExitCode::FAILURE;
        }
    };

    // Early check: output dir must be writable before anything is fetched
    if let Some(dir) = config.output_dir() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return ExitCode::FAILURE;
        }
    }

    match pipeline::run_configured(&config, deliver).await {
        Ok(report) => {
            for failure in &report.authors_failed {
                warn!(author = %failure.author, error = %failure.error, "Author skipped");
            }
            info!(
                provider = %report.summary.provider,
                model = %report.summary.model,
                chars = report.summary.text.chars().count(),
                generated_at = %report.summary.generated_at,
                "Summary generated"
            );
            match report.status {
                RunStatus::Complete => info!(
                    posts = report.posts,
                    artifacts = report.artifacts.len(),
                    messages = report.messages_sent,
                    "Digest complete"
                ),
                RunStatus::Degraded => warn!(
                    posts = report.posts,
                    artifacts = report.artifacts.len(),
                    error = report.delivery_error.as_deref().unwrap_or("unknown"),
                    "Digest produced but not delivered"
                ),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}
