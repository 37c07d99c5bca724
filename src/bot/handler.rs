use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, instrument, warn};

use super::BotContext;
use super::command::{Command, parse_hours};
use crate::config::{Config, MAX_LOOKBACK_HOURS};
use crate::delivery::ChatSink;
use crate::delivery::telegram::TelegramChat;
use crate::pipeline::{self, RunStatus};
use crate::scrapers::PostSource;
use crate::summarizer::Summarizer;

pub(crate) async fn handle_command(
    bot: Bot,
    msg: Message,
    me: Me,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    let command = match Command::parse(text, me.username()) {
        Ok(command) => command,
        Err(_) => {
            if text.starts_with('/') {
                bot.send_message(chat_id, "❌ Unknown command. Use /help to see available commands.")
                    .await?;
            }
            return Ok(());
        }
    };

    if ctx.limiters.commands.check_key(&chat_id.0).is_err() {
        warn!(chat_id = chat_id.0, "Command rate limit hit");
        return Ok(());
    }

    match command {
        Command::Help => {
            bot.send_message(chat_id, Command::descriptions().to_string())
                .await?;
        }
        Command::ListAuthors => {
            bot.send_message(chat_id, format_authors(&ctx.config.authors))
                .await?;
        }
        Command::Provider => {
            bot.send_message(chat_id, format_provider(&ctx.model)).await?;
        }
        Command::Summary(arg) => {
            let Some(hours) = parse_hours(&arg, ctx.config.lookback_hours) else {
                bot.send_message(
                    chat_id,
                    format!("❌ Hours must be a whole number from 1 to {MAX_LOOKBACK_HOURS}."),
                )
                .await?;
                return Ok(());
            };

            if ctx.limiters.summary.check_key(&chat_id.0).is_err() {
                bot.send_message(
                    chat_id,
                    "⏳ A summary was requested recently. Try again in a few minutes.",
                )
                .await?;
                return Ok(());
            }

            bot.send_message(chat_id, format!("⏳ Summarizing the last {hours} hours…"))
                .await?;

            let sink = TelegramChat::new(bot.clone(), chat_id.0);
            if let Err(reply) = run_summary(&ctx.config, &ctx.source, &ctx.model, &sink, hours).await
            {
                bot.send_message(chat_id, reply).await?;
            }
        }
    }

    Ok(())
}

/// Reply text for `/list_authors`.
pub(crate) fn format_authors(authors: &[String]) -> String {
    if authors.is_empty() {
        return "No accounts are configured.".to_string();
    }
    let mut out = format!("Following {} accounts:\n", authors.len());
    for author in authors {
        out.push_str(&format!("\n• @{author}"));
    }
    out
}

/// Reply text for `/provider`.
pub(crate) fn format_provider<M: Summarizer>(model: &M) -> String {
    format!("🤖 Provider: {}\nModel: {}", model.provider(), model.model())
}

/// Run one on-demand summary into `sink`.
///
/// The whole run is bounded by `config.command_timeout` and writes no
/// artifacts. On failure the returned text is safe to show in chat.
#[instrument(level = "info", skip_all, fields(hours = hours))]
pub(crate) async fn run_summary<S, M, C>(
    config: &Config,
    source: &S,
    model: &M,
    sink: &C,
    hours: u32,
) -> Result<(), String>
where
    S: PostSource,
    M: Summarizer,
    C: ChatSink,
{
    let config = config.with_lookback(hours).map_err(|e| {
        warn!(error = %e, "Rejected lookback");
        format!("❌ Hours must be a whole number from 1 to {MAX_LOOKBACK_HOURS}.")
    })?;

    let run = pipeline::run(&config, source, model, Some(sink), None);
    match tokio::time::timeout(config.command_timeout, run).await {
        Err(_) => {
            warn!(timeout_secs = config.command_timeout.as_secs(), "Summary command timed out");
            Err("⌛ The summary took too long. Try a shorter window.".to_string())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Summary command failed");
            Err(e.user_message().to_string())
        }
        Ok(Ok(report)) if report.status == RunStatus::Degraded => {
            Err("❌ The summary was generated but could not be sent.".to_string())
        }
        Ok(Ok(report)) => {
            info!(posts = report.posts, messages = report.messages_sent, "Summary command done");
            Ok(())
        }
    }
}
