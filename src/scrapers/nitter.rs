//! Nitter RSS post source.
//!
//! Nitter mirrors an account's timeline at `{instance}/{handle}/rss`. The
//! feed items carry HTML descriptions, so the text and image URLs are pulled
//! out with `scraper`. Status ids come from the item link.
//!
//! # Feed Conventions
//!
//! - Reposts are titled `RT by @handle: ...` and `dc:creator` names the
//!   original author.
//! - `pubDate` is RFC 2822 (`Tue, 06 May 2025 10:00:00 GMT`).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{FetchSession, PostSource};
use crate::error::{FetchError, SessionError};
use crate::models::Post;
use crate::utils::truncate_for_log;

static STATUS_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/status/(\d+)").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

pub struct NitterSource {
    http: reqwest::Client,
    instance: Url,
}

impl NitterSource {
    pub fn new(http: reqwest::Client, instance: Url) -> Self {
        Self { http, instance }
    }
}

pub struct NitterSession {
    http: reqwest::Client,
    instance: Url,
}

impl PostSource for NitterSource {
    type Session = NitterSession;

    fn name(&self) -> &'static str {
        "nitter"
    }

    /// The instance must answer at all; otherwise nothing can be fetched.
    #[instrument(level = "info", skip_all, fields(instance = %self.instance))]
    async fn open(&self, _authors: &[String]) -> Result<NitterSession, SessionError> {
        let response = self.http.get(self.instance.clone()).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(SessionError::Setup(format!(
                "nitter instance returned HTTP {status}"
            )));
        }
        info!(%status, "Nitter instance reachable");
        Ok(NitterSession {
            http: self.http.clone(),
            instance: self.instance.clone(),
        })
    }
}

impl FetchSession for NitterSession {
    #[instrument(level = "info", skip_all, fields(%handle))]
    async fn fetch_recent_posts(
        &self,
        handle: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Post>, FetchError> {
        let feed_url = self
            .instance
            .join(&format!("{}/rss", urlencoding::encode(handle)))
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let response = self.http.get(feed_url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::UnknownAuthor(handle.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Unauthorized);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Http {
                    status: s.as_u16(),
                    body: truncate_for_log(&body, 300),
                });
            }
            _ => {}
        }

        let xml = response.text().await?;
        let posts = parse_feed(handle, &xml, &self.instance)?;
        debug!(total = posts.len(), "Parsed feed");
        Ok(posts
            .into_iter()
            .filter(|p| p.created_at >= since)
            .collect())
    }

    async fn close(self) {
        info!(instance = %self.instance, "Nitter session closed");
    }
}

/// Parse a Nitter RSS document into posts attributed to `handle`.
///
/// Items without a status id or a parseable date are skipped.
pub fn parse_feed(handle: &str, xml: &str, instance: &Url) -> Result<Vec<Post>, FetchError> {
    let rss: Rss = quick_xml::de::from_str(xml).map_err(|e| FetchError::Parse(e.to_string()))?;

    let posts = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let link = item.link.as_deref().unwrap_or_default();
            let Some(id) = STATUS_ID.captures(link).map(|c| c[1].to_string()) else {
                warn!(%link, "Feed item without status id; skipping");
                return None;
            };

            let created_at = match item
                .pub_date
                .as_deref()
                .map(DateTime::parse_from_rfc2822)
            {
                Some(Ok(dt)) => dt.with_timezone(&Utc),
                _ => {
                    warn!(%id, pub_date = ?item.pub_date, "Feed item without valid pubDate; skipping");
                    return None;
                }
            };

            let creator = item
                .creator
                .as_deref()
                .map(|c| c.trim().trim_start_matches('@').to_lowercase())
                .filter(|c| !c.is_empty());
            let title = item.title.unwrap_or_default();
            let repost_of = if title.starts_with("RT by @") {
                creator.clone().filter(|c| c != handle)
            } else {
                None
            };

            let (text, media) = match item.description.as_deref() {
                Some(html) => html_to_text_and_media(html, instance),
                None => (title.clone(), Vec::new()),
            };
            let url_author = repost_of.as_deref().unwrap_or(handle);

            Some(Post {
                url: format!("https://x.com/{url_author}/status/{id}"),
                id,
                author: handle.to_string(),
                created_at,
                text,
                media,
                repost_of,
            })
        })
        .collect();

    Ok(posts)
}

/// Reduce an item description to plain text plus absolute image URLs.
fn html_to_text_and_media(html: &str, instance: &Url) -> (String, Vec<String>) {
    let html = LINE_BREAK.replace_all(html, "\n");
    let fragment = Html::parse_fragment(&html);

    let raw = fragment.root_element().text().collect::<String>();
    let text = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let media = fragment
        .select(&IMG)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| instance.join(src).ok())
        .map(|u| u.to_string())
        .collect();

    (text, media)
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "dc:creator", alias = "creator", default)]
    creator: Option<String>,
}
