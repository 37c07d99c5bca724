//! Telegram chat transport.
//!
//! Messages are sent without a parse mode, so text arrives exactly as
//! written and emphasis stays plain.

use teloxide::Bot;
use teloxide::prelude::Requester;
use teloxide::types::ChatId;
use tracing::instrument;

use super::ChatSink;
use crate::error::DeliveryError;

/// Telegram allows 4096; leave room for formatting.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

impl ChatSink for TelegramChat {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn max_message_chars(&self) -> usize {
        TELEGRAM_MESSAGE_LIMIT
    }

    #[instrument(level = "debug", skip_all, fields(chat_id = self.chat_id.0))]
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{link_digest, summary_header};
    use crate::models::fixtures::post;
    use crate::models::{AuthorGroup, GroupedPosts};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_header_and_links_are_plain_text() {
        let chat = TelegramChat::new(Bot::new("123:abc"), 42);
        let at = Utc.with_ymd_and_hms(2025, 5, 6, 9, 0, 0).unwrap();
        assert_eq!(summary_header(&chat, at, 12), "05/06 — last 12 hours summary");

        let grouped = GroupedPosts {
            groups: vec![AuthorGroup {
                author: "alice".into(),
                posts: vec![post("1", "alice", 0, "a")],
            }],
        };
        let links = link_digest(&chat, &grouped);
        assert!(!links.contains('*'), "{links}");
        assert!(links.contains("@alice\nhttps://x.com/alice/status/1"));
        assert_eq!(chat.max_message_chars(), TELEGRAM_MESSAGE_LIMIT);
    }
}
