//! X API v2 post source.
//!
//! Opening a session checks the bearer token and resolves every handle to a
//! user id in one `GET /2/users/by` call (100 handles per request). Fetching
//! an author then pages through `GET /2/users/:id/tweets` from `start_time`.
//!
//! The lookup endpoint rejects the whole batch with HTTP 400 when any
//! username is malformed, so handles that X would never accept are left out
//! of it and fail on their own as [`FetchError::InvalidHandle`].

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{FetchSession, PostSource};
use crate::config::Secret;
use crate::error::{FetchError, SessionError};
use crate::models::Post;
use crate::utils::truncate_for_log;

const LOOKUP_BATCH: usize = 100;
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 3;

static HANDLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").unwrap());

/// Whether X accepts `handle` as a username.
pub fn is_valid_handle(handle: &str) -> bool {
    HANDLE.is_match(handle)
}

pub struct XApiSource {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Secret,
}

impl XApiSource {
    pub fn new(http: reqwest::Client, base_url: String, bearer_token: Secret) -> Self {
        Self {
            http,
            base_url,
            bearer_token,
        }
    }
}

pub struct XApiSession {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Secret,
    /// Lowercase handle → user id.
    user_ids: HashMap<String, String>,
}

impl PostSource for XApiSource {
    type Session = XApiSession;

    fn name(&self) -> &'static str {
        "x-api"
    }

    #[instrument(level = "info", skip_all, fields(authors = authors.len()))]
    async fn open(&self, authors: &[String]) -> Result<XApiSession, SessionError> {
        let mut user_ids = HashMap::new();

        let (valid, invalid): (Vec<&String>, Vec<&String>) =
            authors.iter().partition(|h| is_valid_handle(h));
        for handle in &invalid {
            warn!(%handle, "Not a valid X username; left out of lookup");
        }

        for chunk in valid.chunks(LOOKUP_BATCH) {
            let usernames = chunk.iter().join(",");
            let response = self
                .http
                .get(format!("{}/2/users/by", self.base_url))
                .bearer_auth(self.bearer_token.expose())
                .query(&[("usernames", usernames.as_str())])
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(SessionError::Unauthorized("x-api".into()));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SessionError::Setup(format!(
                    "user lookup returned HTTP {status}: {}",
                    truncate_for_log(&body, 300)
                )));
            }

            let lookup: UserLookup = response.json().await?;
            for user in lookup.data {
                user_ids.insert(user.username.to_lowercase(), user.id);
            }
            for problem in lookup.errors {
                warn!(value = ?problem.value, detail = %problem.detail, "User lookup problem");
            }
        }

        info!(resolved = user_ids.len(), "X API session opened");
        Ok(XApiSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            bearer_token: self.bearer_token.clone(),
            user_ids,
        })
    }
}

impl FetchSession for XApiSession {
    #[instrument(level = "info", skip_all, fields(%handle))]
    async fn fetch_recent_posts(
        &self,
        handle: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Post>, FetchError> {
        if !is_valid_handle(handle) {
            return Err(FetchError::InvalidHandle(handle.to_string()));
        }
        let user_id = self
            .user_ids
            .get(handle)
            .ok_or_else(|| FetchError::UnknownAuthor(handle.to_string()))?;

        let url = format!("{}/2/users/{}/tweets", self.base_url, user_id);
        let start_time = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let page_size = PAGE_SIZE.to_string();

        let mut posts = Vec::new();
        let mut next_token: Option<String> = None;

        for page_no in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![
                ("max_results", page_size.as_str()),
                ("start_time", start_time.as_str()),
                ("tweet.fields", "created_at,attachments,referenced_tweets"),
                (
                    "expansions",
                    "attachments.media_keys,referenced_tweets.id.author_id",
                ),
                ("media.fields", "url,preview_image_url"),
                ("user.fields", "username"),
            ];
            if let Some(token) = next_token.as_deref() {
                query.push(("pagination_token", token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(self.bearer_token.expose())
                .query(&query)
                .send()
                .await?;

            let status = response.status();
            match status {
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

            let page: TimelinePage = response.json().await?;
            next_token = page.meta.next_token.clone();
            let page_posts = page_to_posts(handle, page);
            debug!(page_no, count = page_posts.len(), "Fetched timeline page");
            posts.extend(page_posts);

            if next_token.is_none() {
                break;
            }
        }

        Ok(posts
            .into_iter()
            .filter(|p| p.created_at >= since)
            .collect())
    }

    async fn close(self) {
        // Bearer sessions hold no server-side state; dropping the client
        // releases pooled connections.
        info!(authors = self.user_ids.len(), "X API session closed");
    }
}

/// Convert one timeline page into posts attributed to `handle`.
fn page_to_posts(handle: &str, page: TimelinePage) -> Vec<Post> {
    let media_urls: HashMap<&str, &str> = page
        .includes
        .media
        .iter()
        .filter_map(|m| {
            m.url
                .as_deref()
                .or(m.preview_image_url.as_deref())
                .map(|u| (m.media_key.as_str(), u))
        })
        .collect();
    let usernames: HashMap<&str, &str> = page
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();
    let tweet_authors: HashMap<&str, &str> = page
        .includes
        .tweets
        .iter()
        .filter_map(|t| t.author_id.as_deref().map(|a| (t.id.as_str(), a)))
        .collect();

    page.data
        .iter()
        .filter_map(|tweet| {
            let Some(created_at) = tweet.created_at else {
                warn!(id = %tweet.id, "Tweet without created_at; skipping");
                return None;
            };

            let repost_of = tweet
                .referenced_tweets
                .iter()
                .find(|r| r.kind == "retweeted")
                .and_then(|r| tweet_authors.get(r.id.as_str()))
                .and_then(|author_id| usernames.get(author_id))
                .map(|name| name.to_lowercase());

            let media = tweet
                .attachments
                .as_ref()
                .map(|a| {
                    a.media_keys
                        .iter()
                        .filter_map(|k| media_urls.get(k.as_str()).map(|u| u.to_string()))
                        .collect()
                })
                .unwrap_or_default();

            Some(Post {
                id: tweet.id.clone(),
                author: handle.to_string(),
                created_at,
                text: tweet.text.clone(),
                url: format!("https://x.com/{handle}/status/{}", tweet.id),
                media,
                repost_of,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    #[serde(default)]
    data: Vec<ApiUser>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiProblem {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Default, Deserialize)]
struct TimelinePage {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attachments: Option<Attachments>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<ApiMedia>,
    #[serde(default)]
    users: Vec<ApiUser>,
    #[serde(default)]
    tweets: Vec<IncludedTweet>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    media_key: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    preview_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncludedTweet {
    id: String,
    #[serde(default)]
    author_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    next_token: Option<String>,
}
