//! Post sources for fetching recent posts per account.
//!
//! A source hands out a scoped [`FetchSession`]; [`fetch_posts`] opens one
//! session per run, fetches every author through it and always closes it,
//! whether the fetch succeeded or not.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | X API v2 | [`x_api`] | REST + bearer token | Handles resolved to ids when the session opens |
//! | Nitter | [`nitter`] | RSS scraping | No credentials; instance must be reachable |
//!
//! # Failure Isolation
//!
//! - Opening the session is all-or-nothing: a [`SessionError`] aborts the run.
//! - Each author is fetched independently with bounded retries; a failure is
//!   logged, recorded in [`FetchOutcome::failures`] and the author is skipped.
//! - A per-author `Unauthorized` means the shared credentials are bad, so it
//!   is promoted to a [`SessionError`].

pub mod nitter;
pub mod x_api;

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{error, info, instrument};

use crate::config::{Config, SourceConfig};
use crate::error::{FetchError, SessionError};
use crate::models::Post;
use crate::retry::RetryPolicy;

/// Something that can authenticate and hand out a fetch session.
pub trait PostSource: Sync {
    type Session: FetchSession;

    fn name(&self) -> &'static str;

    /// Acquire a session for `authors`. Failure here is fatal for the run.
    fn open(
        &self,
        authors: &[String],
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// An authenticated session, valid for a single run.
pub trait FetchSession: Send + Sync {
    /// Posts by `handle` created at or after `since`.
    fn fetch_recent_posts(
        &self,
        handle: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Post>, FetchError>> + Send;

    /// Release the session. Called exactly once, on every exit path.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// An author whose posts could not be fetched this run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AuthorFailure {
    pub author: String,
    pub error: String,
}

/// Merged result of fetching every configured author.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Posts inside the window, unique per `(author, id)`, unordered.
    ///
    /// A repost carries the original's status id, so the same id may appear
    /// once under the reposter and once under the original author.
    pub posts: Vec<Post>,
    pub failures: Vec<AuthorFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.fetch_concurrency.max(1),
            retry: RetryPolicy::new(config.fetch_retries, Duration::from_secs(1)),
        }
    }
}

/// Open a session, fetch all `authors` within `window` ending now, close
/// the session.
#[instrument(level = "info", skip_all, fields(source = source.name(), authors = authors.len()))]
pub async fn fetch_posts<S: PostSource>(
    source: &S,
    authors: &[String],
    window: chrono::Duration,
    options: FetchOptions,
) -> Result<FetchOutcome, SessionError> {
    let t0 = Instant::now();
    let now = Utc::now();
    let since = now - window;
    info!(%since, "Opening fetch session");

    let session = source.open(authors).await?;
    let result = fetch_with_session(&session, source.name(), authors, since, now, options).await;
    session.close().await;

    if let Ok(outcome) = &result {
        info!(
            posts = outcome.posts.len(),
            failed_authors = outcome.failures.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched posts"
        );
    }
    result
}

async fn fetch_with_session<F: FetchSession>(
    session: &F,
    source_name: &'static str,
    authors: &[String],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    options: FetchOptions,
) -> Result<FetchOutcome, SessionError> {
    let retry = options.retry;

    let mut results: Vec<(usize, String, Result<Vec<Post>, FetchError>)> =
        stream::iter(authors.iter().cloned().enumerate())
            .map(|(index, author)| async move {
                let result = retry
                    .run(
                        &author,
                        || session.fetch_recent_posts(&author, since),
                        FetchError::is_transient,
                    )
                    .await;
                (index, author, result)
            })
            .buffer_unordered(options.concurrency)
            .collect()
            .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut outcome = FetchOutcome::default();
    let mut fetched = Vec::new();
    for (_, author, result) in results {
        match result {
            Ok(posts) => {
                info!(%author, count = posts.len(), "Fetched author posts");
                fetched.extend(posts);
            }
            Err(FetchError::Unauthorized) => {
                error!(%author, "Credentials rejected while fetching; aborting run");
                return Err(SessionError::Unauthorized(source_name.to_string()));
            }
            Err(e) => {
                error!(%author, error = %e, "Fetch failed for author; skipping");
                outcome.failures.push(AuthorFailure {
                    author,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome.posts = fetched
        .into_iter()
        .filter(|p| p.created_at >= since && p.created_at <= now)
        .unique_by(|p| (p.author.clone(), p.id.clone()))
        .collect();
    Ok(outcome)
}

/// The configured post source.
pub enum Source {
    XApi(x_api::XApiSource),
    Nitter(nitter::NitterSource),
}

pub enum SourceSession {
    XApi(x_api::XApiSession),
    Nitter(nitter::NitterSession),
}

impl Source {
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("post_digest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(match &config.source {
            SourceConfig::XApi {
                bearer_token,
                base_url,
            } => Source::XApi(x_api::XApiSource::new(
                http,
                base_url.clone(),
                bearer_token.clone(),
            )),
            SourceConfig::Nitter { instance } => {
                Source::Nitter(nitter::NitterSource::new(http, instance.clone()))
            }
        })
    }
}

impl PostSource for Source {
    type Session = SourceSession;

    fn name(&self) -> &'static str {
        match self {
            Source::XApi(s) => s.name(),
            Source::Nitter(s) => s.name(),
        }
    }

    async fn open(&self, authors: &[String]) -> Result<SourceSession, SessionError> {
        match self {
            Source::XApi(s) => s.open(authors).await.map(SourceSession::XApi),
            Source::Nitter(s) => s.open(authors).await.map(SourceSession::Nitter),
        }
    }
}

impl FetchSession for SourceSession {
    async fn fetch_recent_posts(
        &self,
        handle: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Post>, FetchError> {
        match self {
            SourceSession::XApi(s) => s.fetch_recent_posts(handle, since).await,
            SourceSession::Nitter(s) => s.fetch_recent_posts(handle, since).await,
        }
    }

    async fn close(self) {
        match self {
            SourceSession::XApi(s) => s.close().await,
            SourceSession::Nitter(s) => s.close().await,
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! In-memory source used by pipeline and bot tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, Clone, Copy)]
    pub enum StubFailure {
        Transient,
        Unauthorized,
    }

    #[derive(Default)]
    pub struct StubSource {
        pub posts: HashMap<String, Vec<Post>>,
        pub failing: HashMap<String, StubFailure>,
        pub refuse_session: bool,
        /// Delay before every fetch answers.
        pub delay: Option<Duration>,
        pub closed: Arc<AtomicBool>,
        pub calls: Arc<AtomicU32>,
    }

    pub struct StubSession {
        posts: HashMap<String, Vec<Post>>,
        failing: HashMap<String, StubFailure>,
        delay: Option<Duration>,
        closed: Arc<AtomicBool>,
        calls: Arc<AtomicU32>,
    }

    impl PostSource for StubSource {
        type Session = StubSession;

        fn name(&self) -> &'static str {
            "stub"
        }

        async fn open(&self, _authors: &[String]) -> Result<StubSession, SessionError> {
            if self.refuse_session {
                return Err(SessionError::Unauthorized("stub".into()));
            }
            Ok(StubSession {
                posts: self.posts.clone(),
                failing: self.failing.clone(),
                delay: self.delay,
                closed: Arc::clone(&self.closed),
                calls: Arc::clone(&self.calls),
            })
        }
    }

    impl FetchSession for StubSession {
        async fn fetch_recent_posts(
            &self,
            handle: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<Post>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.failing.get(handle) {
                Some(StubFailure::Transient) => Err(FetchError::Http {
                    status: 503,
                    body: "unavailable".into(),
                }),
                Some(StubFailure::Unauthorized) => Err(FetchError::Unauthorized),
                None => Ok(self
                    .posts
                    .get(handle)
                    .map(|posts| {
                        posts
                            .iter()
                            .filter(|p| p.created_at >= since)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()),
            }
        }

        async fn close(self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
