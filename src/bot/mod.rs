//! Always-on Telegram command bot.
//!
//! | Command | Reply |
//! |---------|-------|
//! | `/summary [hours]` | digest of the last `hours` (default `LOOKBACK_HOURS`) |
//! | `/list_authors` | configured handles |
//! | `/provider` | active provider and model |
//! | `/help` | command list |
//!
//! With `SUMMARY_SCHEDULE_UTC` set, a background task also runs the batch
//! pipeline once a day.

mod command;
mod handler;
mod rate_limit;
mod schedule;

use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;

use crate::config::Config;
use crate::delivery::ChatTransport;
use crate::error::{BotError, ConfigError};
use crate::scrapers::Source;
use crate::summarizer::LanguageModel;
use command::Command;
use rate_limit::RateLimiters;

/// State shared by every command handler and the daily schedule.
pub(crate) struct BotContext {
    pub config: Config,
    pub source: Source,
    pub model: LanguageModel,
    pub limiters: RateLimiters,
}

/// Start the bot and block until Ctrl-C.
pub async fn run(config: Config) -> Result<(), BotError> {
    let token = config
        .telegram_bot_token
        .clone()
        .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN", "bot mode"))?;
    let bot = Bot::new(token.expose());

    let source = Source::from_config(&config)?;
    let model = LanguageModel::from_config(&config)?;
    let transport = ChatTransport::from_config(&config)?;
    let schedule_at = config.schedule_utc;

    let ctx = Arc::new(BotContext {
        config,
        source,
        model,
        limiters: RateLimiters::new(),
    });

    info!(
        authors = ctx.config.authors.len(),
        provider = %ctx.config.provider.kind,
        schedule = ?schedule_at,
        "Starting Telegram bot..."
    );
    bot.set_my_commands(Command::bot_commands()).await?;

    let scheduled = schedule_at.map(|at| tokio::spawn(schedule::run_daily(ctx.clone(), transport, at)));

    let handler = Update::filter_message().endpoint(handler::handle_command);
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if let Some(task) = scheduled {
        task.abort();
    }
    info!("Bot stopped");
    Ok(())
}
