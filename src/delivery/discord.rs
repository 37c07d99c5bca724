//! Discord transports: a channel through the bot REST API, or a webhook.
//!
//! Both post JSON messages with mentions disabled and retry transport
//! errors, 429 and 5xx. Text goes out as `content`; the post digest goes out
//! as one message per author with an embed per recent post:
//!
//! | Embed field | Value |
//! |-------------|-------|
//! | `title` | `Post:` or `Repost:` plus the first 100 characters |
//! | `description` | text, at most 500 characters |
//! | `color` | blue for posts, orange for reposts |
//! | `author` | original account of a repost |
//! | `image` | first media URL; further URLs get image-only embeds |
//! | `footer` | timestamp and post id |

use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument};

use super::ChatSink;
use crate::config::Secret;
use crate::error::DeliveryError;
use crate::models::{AuthorGroup, GroupedPosts, Post};
use crate::retry::RetryPolicy;
use crate::utils::truncate_for_log;

const DISCORD_API: &str = "https://discord.com/api/v10";

/// Discord allows 2000; leave room for formatting.
pub const DISCORD_MESSAGE_LIMIT: usize = 1900;

/// Posts per author shown as embeds, newest first.
const EMBED_POSTS: usize = 5;
/// Discord rejects messages with more embeds than this.
const MAX_EMBEDS: usize = 10;
const TITLE_CHARS: usize = 100;
const DESCRIPTION_CHARS: usize = 500;
const POST_COLOR: u32 = 1_942_002;
const REPOST_COLOR: u32 = 15_844_367;

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    allowed_mentions: AllowedMentions,
}

impl MessagePayload {
    fn text(content: &str) -> Self {
        Self::with_embeds(content.to_string(), Vec::new())
    }

    fn with_embeds(content: String, embeds: Vec<Embed>) -> Self {
        Self {
            content,
            embeds,
            allowed_mentions: AllowedMentions { parse: [] },
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: String,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

/// Cut `text` to `max` characters, marking the cut with `...`.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// The embed for one post, plus one image-only embed per extra media URL.
fn post_embeds(post: &Post) -> Vec<Embed> {
    let kind = if post.is_repost() { "Repost" } else { "Post" };
    let single_line = post.text.replace('\n', " ");

    let mut media = post.media.iter();
    let main = Embed {
        title: Some(format!("{kind}: {}", clip(&single_line, TITLE_CHARS))),
        description: Some(clip(&post.text, DESCRIPTION_CHARS)),
        url: post.url.clone(),
        color: Some(if post.is_repost() { REPOST_COLOR } else { POST_COLOR }),
        author: post.repost_of.as_ref().map(|original| EmbedAuthor {
            name: format!("Original: @{original}"),
        }),
        image: media.next().map(|url| EmbedImage { url: url.clone() }),
        footer: Some(EmbedFooter {
            text: format!(
                "🕒 {} | ID: {}",
                post.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                post.id
            ),
        }),
    };

    let mut embeds = vec![main];
    embeds.extend(media.map(|url| Embed {
        url: post.url.clone(),
        image: Some(EmbedImage { url: url.clone() }),
        ..Default::default()
    }));
    embeds
}

/// Messages for one author: a headline plus embeds for the newest posts,
/// spread over as many messages as the embed cap requires.
fn author_payloads(group: &AuthorGroup) -> Vec<MessagePayload> {
    let embeds: Vec<Embed> = group
        .posts
        .iter()
        .rev()
        .take(EMBED_POSTS)
        .flat_map(post_embeds)
        .collect();

    let mut payloads = Vec::new();
    let mut content = format!(
        "📢 @{}: recent posts ({} total)",
        group.author,
        group.posts.len()
    );
    let mut embeds = embeds.into_iter().peekable();
    while embeds.peek().is_some() {
        let batch: Vec<Embed> = embeds.by_ref().take(MAX_EMBEDS).collect();
        payloads.push(MessagePayload::with_embeds(std::mem::take(&mut content), batch));
    }
    payloads
}

fn digest_payloads(grouped: &GroupedPosts) -> Vec<MessagePayload> {
    grouped
        .groups
        .iter()
        .filter(|g| !g.posts.is_empty())
        .flat_map(author_payloads)
        .collect()
}

fn retry_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(500))
        .with_max_jitter(Duration::from_millis(100))
}

async fn post_message(
    transport: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<(), DeliveryError> {
    let resp = request
        .send()
        .await
        .map_err(|source| DeliveryError::Request { transport, source })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DeliveryError::Http {
            transport,
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        });
    }
    Ok(())
}

/// A Discord channel, posted to as a bot.
pub struct DiscordChannel {
    http: reqwest::Client,
    api_base: String,
    channel_id: String,
    token: Secret,
}

impl DiscordChannel {
    pub fn new(http: reqwest::Client, channel_id: String, token: Secret) -> Self {
        Self {
            http,
            api_base: DISCORD_API.to_string(),
            channel_id,
            token,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/channels/{}/messages", self.api_base, self.channel_id)
    }

    async fn post(&self, payload: &MessagePayload) -> Result<(), DeliveryError> {
        let endpoint = self.endpoint();
        retry_policy()
            .run(
                "discord",
                || {
                    let request = self
                        .http
                        .post(&endpoint)
                        .header("Authorization", format!("Bot {}", self.token.expose()))
                        .json(payload);
                    post_message("discord", request)
                },
                DeliveryError::is_transient,
            )
            .await
    }
}

impl ChatSink for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn max_message_chars(&self) -> usize {
        DISCORD_MESSAGE_LIMIT
    }

    fn emphasis(&self, text: &str) -> String {
        format!("**{text}**")
    }

    #[instrument(level = "debug", skip_all, fields(channel_id = %self.channel_id))]
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.post(&MessagePayload::text(text)).await
    }

    #[instrument(level = "debug", skip_all, fields(channel_id = %self.channel_id))]
    async fn send_post_digest(&self, grouped: &GroupedPosts) -> Result<usize, DeliveryError> {
        let payloads = digest_payloads(grouped);
        for payload in &payloads {
            self.post(payload).await?;
        }
        info!(messages = payloads.len(), "Sent post embeds");
        Ok(payloads.len())
    }
}

/// A Discord incoming webhook.
pub struct DiscordWebhook {
    http: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    async fn post(&self, payload: &MessagePayload) -> Result<(), DeliveryError> {
        retry_policy()
            .run(
                "discord-webhook",
                || post_message("discord-webhook", self.http.post(&self.url).json(payload)),
                DeliveryError::is_transient,
            )
            .await
    }
}

impl ChatSink for DiscordWebhook {
    fn name(&self) -> &'static str {
        "discord-webhook"
    }

    fn max_message_chars(&self) -> usize {
        DISCORD_MESSAGE_LIMIT
    }

    fn emphasis(&self, text: &str) -> String {
        format!("**{text}**")
    }

    #[instrument(level = "debug", skip_all)]
    async fn send(&self, text: &str) -> Result<(), DeliveryError> {
        self.post(&MessagePayload::text(text)).await
    }

    #[instrument(level = "debug", skip_all)]
    async fn send_post_digest(&self, grouped: &GroupedPosts) -> Result<usize, DeliveryError> {
        let payloads = digest_payloads(grouped);
        for payload in &payloads {
            self.post(payload).await?;
        }
        info!(messages = payloads.len(), "Sent post embeds");
        Ok(payloads.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::post;
    use crate::testing::serve;
    use std::sync::{Arc, Mutex};

    fn group(author: &str, posts: Vec<Post>) -> AuthorGroup {
        AuthorGroup {
            author: author.into(),
            posts,
        }
    }

    #[test]
    fn test_payload_disables_mentions() {
        let json = serde_json::to_value(MessagePayload::text("@everyone hi")).unwrap();
        assert_eq!(json["content"], "@everyone hi");
        assert_eq!(json["allowed_mentions"]["parse"], serde_json::json!([]));
        assert!(json.get("embeds").is_none());
    }

    #[test]
    fn test_channel_endpoint() {
        let channel = DiscordChannel::new(reqwest::Client::new(), "123".into(), Secret::new("t"));
        assert_eq!(
            channel.endpoint(),
            "https://discord.com/api/v10/channels/123/messages"
        );
        assert_eq!(channel.max_message_chars(), 1900);
        assert_eq!(channel.emphasis("x"), "**x**");
    }

    #[test]
    fn test_post_embed_fields() {
        let mut p = post("42", "alice", 90, &"word ".repeat(150));
        p.media = vec!["https://img/1.jpg".into(), "https://img/2.jpg".into()];

        let embeds = post_embeds(&p);
        assert_eq!(embeds.len(), 2, "extra image gets its own embed");

        let json = serde_json::to_value(&embeds[0]).unwrap();
        let title = json["title"].as_str().unwrap();
        assert!(title.starts_with("Post: word word"));
        assert_eq!(title.chars().count(), "Post: ".len() + TITLE_CHARS);
        assert_eq!(json["description"].as_str().unwrap().chars().count(), DESCRIPTION_CHARS);
        assert_eq!(json["color"], POST_COLOR);
        assert_eq!(json["image"]["url"], "https://img/1.jpg");
        assert_eq!(json["footer"]["text"], "🕒 2025-05-06 01:30:00 UTC | ID: 42");
        assert!(json.get("author").is_none());

        let extra = serde_json::to_value(&embeds[1]).unwrap();
        assert_eq!(extra["image"]["url"], "https://img/2.jpg");
        assert_eq!(extra["url"], "https://x.com/alice/status/42");
        assert!(extra.get("title").is_none());
    }

    #[test]
    fn test_repost_embed() {
        let mut p = post("7", "alice", 0, "big news");
        p.repost_of = Some("bob".into());

        let json = serde_json::to_value(&post_embeds(&p)[0]).unwrap();
        assert_eq!(json["title"], "Repost: big news");
        assert_eq!(json["color"], REPOST_COLOR);
        assert_eq!(json["author"]["name"], "Original: @bob");
    }

    #[test]
    fn test_author_payload_takes_newest_five() {
        let posts = (0..7)
            .map(|i| post(&i.to_string(), "alice", i, &format!("post {i}")))
            .collect();
        let payloads = author_payloads(&group("alice", posts));

        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].content, "📢 @alice: recent posts (7 total)");
        let ids: Vec<_> = payloads[0]
            .embeds
            .iter()
            .map(|e| e.url.rsplit('/').next().unwrap_or_default())
            .collect();
        assert_eq!(ids, vec!["6", "5", "4", "3", "2"]);
    }

    #[test]
    fn test_embed_cap_spills_into_next_message() {
        let posts = (0..5)
            .map(|i| {
                let mut p = post(&i.to_string(), "alice", i, "pics");
                p.media = (0..3).map(|n| format!("https://img/{i}-{n}.jpg")).collect();
                p
            })
            .collect();
        let payloads = author_payloads(&group("alice", posts));

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].embeds.len(), MAX_EMBEDS);
        assert_eq!(payloads[1].embeds.len(), 5);
        assert!(payloads[1].content.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_sends_embeds_per_author() {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&bodies);
        let base = serve(move |req| {
            seen.lock().unwrap().push(req.body.clone());
            (204, String::new())
        })
        .await;

        let grouped = GroupedPosts {
            groups: vec![
                group("alice", vec![post("1", "alice", 0, "hello")]),
                group("bob", vec![]),
                group("carol", vec![post("2", "carol", 5, "hi")]),
            ],
        };
        let hook = DiscordWebhook::new(reqwest::Client::new(), format!("{base}/hook"));
        let sent = hook.send_post_digest(&grouped).await.unwrap();

        assert_eq!(sent, 2);
        let bodies = bodies.lock().unwrap().clone();
        let first: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(first["content"], "📢 @alice: recent posts (1 total)");
        assert_eq!(first["embeds"][0]["url"], "https://x.com/alice/status/1");
        assert_eq!(first["allowed_mentions"]["parse"], serde_json::json!([]));
        assert!(bodies[1].contains("@carol"));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_delivery_error() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let hook = DiscordWebhook::new(http, "http://127.0.0.1:9/hook".into());
        let err = hook.send("hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Request { .. }));
    }
}
