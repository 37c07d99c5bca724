//! Command-line interface definitions for Post Digest.
//!
//! Every setting can be given as a flag or through the environment (a `.env`
//! file is loaded first), so the scheduled job only needs secrets exported
//! by the CI runner.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::{DeliveryKind, ProviderKind, SourceKind};

/// Command-line arguments for Post Digest.
///
/// # Examples
///
/// ```sh
/// # Scheduled job: fetch, summarize, deliver, keep artifacts
/// AUTHORS=alice,bob post_digest run -o ./out
///
/// # Only the last 6 hours, no chat delivery
/// post_digest run --hours 6 --no-deliver
///
/// # Interactive command bot
/// TELEGRAM_BOT_TOKEN=... post_digest bot
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the fetch → summarize → deliver pipeline once
    Run {
        /// Lookback window in hours (overrides LOOKBACK_HOURS)
        #[arg(long)]
        hours: Option<u32>,

        /// Skip chat delivery; only write artifacts
        #[arg(long)]
        no_deliver: bool,
    },
    /// Run the always-on chat command bot
    Bot,
}

#[derive(clap::Args, Debug, Clone)]
pub struct Settings {
    /// Where posts are fetched from
    #[arg(long, env = "POST_SOURCE", value_enum, default_value = "x-api", global = true)]
    pub source: SourceKind,

    /// Bearer token for the X API
    #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true, global = true)]
    pub x_bearer_token: Option<String>,

    /// Base URL of the X API
    #[arg(long, env = "X_API_BASE", default_value = "https://api.x.com", global = true)]
    pub x_api_base: String,

    /// Nitter instance serving RSS feeds, e.g. https://nitter.net
    #[arg(long, env = "NITTER_INSTANCE", global = true)]
    pub nitter_instance: Option<String>,

    /// Comma-separated account handles to follow
    #[arg(long, env = "AUTHORS", value_delimiter = ',', global = true)]
    pub authors: Vec<String>,

    /// Default lookback window in hours
    #[arg(long, env = "LOOKBACK_HOURS", default_value_t = 24, global = true)]
    pub lookback_hours: u32,

    /// Language-model provider
    #[arg(long, env = "AI_PROVIDER", value_enum, default_value = "openai", global = true)]
    pub provider: ProviderKind,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo", global = true)]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1", global = true)]
    pub openai_base_url: String,

    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true, global = true)]
    pub deepseek_api_key: Option<String>,

    #[arg(long, env = "DEEPSEEK_MODEL", default_value = "deepseek-chat", global = true)]
    pub deepseek_model: String,

    #[arg(long, env = "DEEPSEEK_BASE_URL", default_value = "https://api.deepseek.com", global = true)]
    pub deepseek_base_url: String,

    /// Sampling temperature (defaults per provider)
    #[arg(long, env = "AI_TEMPERATURE", global = true)]
    pub temperature: Option<f32>,

    /// Language the summary is written in
    #[arg(long, env = "SUMMARY_LANGUAGE", default_value = "English", global = true)]
    pub summary_language: String,

    /// Topics the summary should emphasise
    #[arg(long, env = "SUMMARY_FOCUS", global = true)]
    pub summary_focus: Option<String>,

    /// YAML prompt template overriding the built-in one
    #[arg(long, env = "PROMPT_FILE", global = true)]
    pub prompt_file: Option<PathBuf>,

    /// Maximum characters of post text sent to the model
    #[arg(long, env = "PROMPT_BUDGET_CHARS", default_value_t = 12_000, global = true)]
    pub prompt_budget_chars: usize,

    /// Chat transport for the finished digest
    #[arg(long, env = "DELIVERY", value_enum, default_value = "none", global = true)]
    pub delivery: DeliveryKind,

    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true, global = true)]
    pub discord_token: Option<String>,

    #[arg(long, env = "DISCORD_CHANNEL_ID", global = true)]
    pub discord_channel_id: Option<String>,

    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true, global = true)]
    pub discord_webhook_url: Option<String>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true, global = true)]
    pub telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID", global = true)]
    pub telegram_chat_id: Option<i64>,

    /// Send the per-author post links after the summary
    #[arg(long, env = "DELIVER_LINKS", default_value_t = true, action = ArgAction::Set, global = true)]
    pub deliver_links: bool,

    /// Output directory for artifact files
    #[arg(short, long, env = "OUTPUT_DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Timeout for each outbound HTTP request
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub http_timeout_secs: u64,

    /// Extra attempts per author after a transient fetch failure
    #[arg(long, env = "FETCH_RETRIES", default_value_t = 2, global = true)]
    pub fetch_retries: u32,

    /// Authors fetched in parallel
    #[arg(long, env = "FETCH_CONCURRENCY", default_value_t = 3, global = true)]
    pub fetch_concurrency: usize,

    /// Time limit for one interactive command
    #[arg(long, env = "COMMAND_TIMEOUT_SECS", default_value_t = 300, global = true)]
    pub command_timeout_secs: u64,

    /// Daily run time (UTC, HH:MM) for the bot's built-in schedule
    #[arg(long, env = "SUMMARY_SCHEDULE_UTC", global = true)]
    pub summary_schedule_utc: Option<String>,
}
