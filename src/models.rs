//! Data models shared by every stage of the digest pipeline.
//!
//! - [`Post`]: a single fetched post, immutable once created by a source
//! - [`AuthorGroup`] / [`GroupedPosts`]: posts partitioned by author
//! - [`SummaryRequest`] / [`SummaryResult`]: the language-model exchange
//! - [`DeliveryTarget`] / [`ChatTarget`]: where a finished digest goes

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::ProviderKind;

/// A post fetched from one of the configured accounts.
///
/// `author` is always the normalized handle the post was fetched for
/// (lowercase, no leading `@`). Reposts keep the fetching account as
/// `author` and record the original account in `repost_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Stable identifier used for deduplication.
    pub id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    /// Canonical link to the post.
    pub url: String,
    /// Image or video URLs attached to the post.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_of: Option<String>,
}

impl Post {
    pub fn is_repost(&self) -> bool {
        self.repost_of.is_some()
    }
}

/// All posts of one author, ascending by `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorGroup {
    pub author: String,
    pub posts: Vec<Post>,
}

/// Author groups in deterministic (configured) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedPosts {
    pub groups: Vec<AuthorGroup>,
}

impl GroupedPosts {
    pub fn total_posts(&self) -> usize {
        self.groups.iter().map(|g| g.posts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_posts() == 0
    }
}

#[cfg(test)]
impl GroupedPosts {
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.groups.iter().flat_map(|g| g.posts.iter())
    }

    pub fn authors(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.author.as_str())
    }
}

/// Serialized as an `author -> [post]` map that keeps group order.
impl Serialize for GroupedPosts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.author, &group.posts)?;
        }
        map.end()
    }
}

/// Input to a language-model provider.
///
/// `text` is already bounded by the formatter's budget.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub text: String,
    pub provider: ProviderKind,
    pub model: String,
    /// Lookback window the posts cover, used in the prompt.
    pub hours: u32,
}

/// A generated summary together with the configuration that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub provider: ProviderKind,
    pub model: String,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Chat destination for a finished digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    /// Discord channel, posted through the bot REST API.
    DiscordChannel { channel_id: String },
    /// Discord incoming webhook.
    DiscordWebhook { url: String },
    /// Telegram chat, posted through the bot API.
    TelegramChat { chat_id: i64 },
}

/// Where a run's output goes: chat and/or artifact files.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTarget {
    pub chat: Option<ChatTarget>,
    pub output_dir: Option<PathBuf>,
}
