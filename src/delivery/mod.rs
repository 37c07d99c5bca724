//! Chat delivery of a finished digest.
//!
//! A digest goes out as a header plus the summary text, optionally followed
//! by a post digest. Texts longer than the transport's limit are split on
//! paragraph, then line, then character boundaries; nothing is dropped.
//!
//! # Transports
//!
//! | Transport | Module | Limit | Emphasis | Post digest |
//! |-----------|--------|-------|----------|-------------|
//! | Discord channel (bot REST API) | [`discord`] | 1900 | `**bold**` | embeds per author |
//! | Discord webhook | [`discord`] | 1900 | `**bold**` | embeds per author |
//! | Telegram chat | [`telegram`] | 4000 | none | link list |
//!
//! The first failed send stops delivery for the run.

pub mod discord;
pub mod telegram;

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::config::{Config, Secret};
use crate::error::DeliveryError;
use crate::models::{ChatTarget, GroupedPosts, SummaryResult};

/// A chat destination that accepts plain text messages.
pub trait ChatSink: Sync {
    fn name(&self) -> &'static str;

    /// Longest message, in characters, the transport accepts.
    fn max_message_chars(&self) -> usize;

    /// `text` marked up as emphasized. Sent verbatim unless the transport
    /// renders markup.
    fn emphasis(&self, text: &str) -> String {
        text.to_string()
    }

    fn send(&self, text: &str) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Send the per-author post digest and return the number of messages.
    ///
    /// Defaults to the [`link_digest`], split to the message limit.
    fn send_post_digest(
        &self,
        grouped: &GroupedPosts,
    ) -> impl Future<Output = Result<usize, DeliveryError>> + Send {
        async move {
            let messages = split_message(&link_digest(self, grouped), self.max_message_chars());
            for message in &messages {
                self.send(message).await?;
            }
            Ok(messages.len())
        }
    }
}

/// First line of a delivered digest.
pub fn summary_header<C: ChatSink + ?Sized>(sink: &C, at: DateTime<Utc>, hours: u32) -> String {
    sink.emphasis(&format!("{} — last {hours} hours summary", at.format("%m/%d")))
}

/// `@handle` followed by its post URLs, one paragraph per author.
pub fn link_digest<C: ChatSink + ?Sized>(sink: &C, grouped: &GroupedPosts) -> String {
    let mut out = sink.emphasis("Post links:");
    for group in grouped.groups.iter().filter(|g| !g.posts.is_empty()) {
        out.push_str("\n\n");
        out.push_str(&sink.emphasis(&format!("@{}", group.author)));
        for post in &group.posts {
            out.push('\n');
            out.push_str(&post.url);
        }
    }
    out
}

/// Split `text` into messages of at most `limit` characters.
///
/// Paragraphs (`\n\n`) are packed together while they fit; an oversized
/// paragraph is split by lines, and an oversized line by characters.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    pack(text.trim(), limit.max(1), &["\n\n", "\n"], &mut out);
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn pack(text: &str, limit: usize, separators: &[&str], out: &mut Vec<String>) {
    if char_len(text) <= limit {
        if !text.trim().is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    let Some((sep, finer)) = separators.split_first() else {
        let chars: Vec<char> = text.chars().collect();
        out.extend(chars.chunks(limit).map(|c| c.iter().collect::<String>()));
        return;
    };

    let mut current = String::new();
    for unit in text.split(sep).filter(|u| !u.trim().is_empty()) {
        let joined_len = if current.is_empty() {
            char_len(unit)
        } else {
            char_len(&current) + char_len(sep) + char_len(unit)
        };
        if joined_len <= limit {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(unit);
            continue;
        }

        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if char_len(unit) <= limit {
            current.push_str(unit);
        } else {
            pack(unit, limit, finer, out);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// Send `summary` (and optionally the post digest) through `sink`.
///
/// # Returns
///
/// The number of messages sent.
#[instrument(level = "info", skip_all, fields(transport = sink.name()))]
pub async fn deliver_summary<C: ChatSink>(
    sink: &C,
    summary: &SummaryResult,
    hours: u32,
    links: Option<&GroupedPosts>,
) -> Result<usize, DeliveryError> {
    let body = format!(
        "{}\n\n{}",
        summary_header(sink, summary.generated_at, hours),
        summary.text
    );

    let messages = split_message(&body, sink.max_message_chars());
    for (i, message) in messages.iter().enumerate() {
        sink.send(message).await?;
        info!(part = i + 1, of = messages.len(), chars = char_len(message), "Sent message");
    }

    let mut sent = messages.len();
    if let Some(grouped) = links.filter(|g| !g.is_empty()) {
        let digest = sink.send_post_digest(grouped).await?;
        info!(messages = digest, "Sent post digest");
        sent += digest;
    }
    Ok(sent)
}

/// The configured chat transport.
pub enum ChatTransport {
    DiscordChannel(discord::DiscordChannel),
    DiscordWebhook(discord::DiscordWebhook),
    Telegram(telegram::TelegramChat),
}

impl ChatTransport {
    /// Build the transport for the configured chat target, if any.
    pub fn from_config(config: &Config) -> Result<Option<Self>, DeliveryError> {
        let Some(target) = &config.delivery.chat else {
            return Ok(None);
        };

        let http = || {
            reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()
                .map_err(|source| DeliveryError::Request {
                    transport: "discord",
                    source,
                })
        };
        let secret = |s: &Option<Secret>| s.clone().unwrap_or_else(|| Secret::new(""));

        let transport = match target {
            ChatTarget::DiscordChannel { channel_id } => {
                ChatTransport::DiscordChannel(discord::DiscordChannel::new(
                    http()?,
                    channel_id.clone(),
                    secret(&config.discord_token),
                ))
            }
            ChatTarget::DiscordWebhook { url } => {
                ChatTransport::DiscordWebhook(discord::DiscordWebhook::new(http()?, url.clone()))
            }
            ChatTarget::TelegramChat { chat_id } => ChatTransport::Telegram(
                telegram::TelegramChat::new(
                    teloxide::Bot::new(secret(&config.telegram_bot_token).expose()),
                    *chat_id,
                ),
            ),
        };
        Ok(Some(transport))
    }
}

impl ChatSink for ChatTransport {
    fn name(&self) -> &'static str {
        match self {
            ChatTransport::DiscordChannel(s) => s.name(),
            ChatTransport::DiscordWebhook(s) => s.name(),
            ChatTransport::Telegram(s) => s.name(),
        }
    }

    fn max_message_chars(&self) -> usize {
        match self {
            ChatTransport::DiscordChannel(s) => s.max_message_chars(),
            ChatTransport::DiscordWebhook(s) => s.max_message_chars(),
            ChatTransport::Telegram(s) => s.max_message_chars(),
        }
    }

    fn emphasis(&self, text: &str) -> String {
        match self {
            ChatTransport::DiscordChannel(s) => s.emphasis(text),
            ChatTransport::DiscordWebhook(s) => s.emphasis(text),
            ChatTransport::Telegram(s) => s.emphasis(text),
        }
    }

    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        match self {
            ChatTransport::DiscordChannel(s) => s.send(text).await,
            ChatTransport::DiscordWebhook(s) => s.send(text).await,
            ChatTransport::Telegram(s) => s.send(text).await,
        }
    }

    async fn send_post_digest(&self, grouped: &GroupedPosts) -> Result<usize, DeliveryError> {
        match self {
            ChatTransport::DiscordChannel(s) => s.send_post_digest(grouped).await,
            ChatTransport::DiscordWebhook(s) => s.send_post_digest(grouped).await,
            ChatTransport::Telegram(s) => s.send_post_digest(grouped).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! Recording sink for pipeline and bot tests.

    use super::*;
    use std::sync::Mutex;

    pub struct RecordingSink {
        pub limit: usize,
        pub unreachable: bool,
        /// Render emphasis as `**bold**`, like Discord.
        pub markdown: bool,
        pub sent: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn new(limit: usize) -> Self {
            Self {
                limit,
                unreachable: false,
                markdown: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn markdown(limit: usize) -> Self {
            Self {
                markdown: true,
                ..Self::new(limit)
            }
        }

        pub fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Self::new(1900)
            }
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    impl ChatSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn max_message_chars(&self) -> usize {
            self.limit
        }

        fn emphasis(&self, text: &str) -> String {
            if self.markdown {
                format!("**{text}**")
            } else {
                text.to_string()
            }
        }

        async fn send(&self, text: &str) -> Result<(), DeliveryError> {
            if self.unreachable {
                return Err(DeliveryError::Http {
                    transport: "recording",
                    status: 503,
                    body: "unreachable".into(),
                });
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(text.to_string());
            }
            Ok(())
        }
    }
}
