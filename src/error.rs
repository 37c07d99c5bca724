//! Error taxonomy for a digest run.
//!
//! Each stage of the pipeline owns one error type. Only [`PipelineError`]
//! aborts a run; per-author fetch failures and delivery failures are
//! recovered by the pipeline and show up in the run report instead.

use std::path::PathBuf;

/// Invalid or missing configuration, detected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one author handle is required (AUTHORS)")]
    NoAuthors,

    #[error("{0} is required for the selected {1}")]
    Missing(&'static str, &'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load prompt template {path}: {reason}")]
    Prompt { path: PathBuf, reason: String },
}

/// The fetch session could not be established or was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("credentials rejected by {0}")]
    Unauthorized(String),

    #[error("session request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("session setup failed: {0}")]
    Setup(String),
}

/// A single author's fetch failed. Isolated from the other authors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("unknown account @{0}")]
    UnknownAuthor(String),

    #[error("invalid handle @{0}")]
    InvalidHandle(String),

    #[error("request rejected: unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unparseable feed: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RateLimited | FetchError::Request(_) => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// The language-model call failed or returned nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} rejected the API key")]
    Unauthorized { provider: &'static str },

    #[error("{provider} rate limited the request")]
    RateLimited { provider: &'static str },

    #[error("{provider} returned HTTP {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned a malformed response: {reason}")]
    MalformedResponse {
        provider: &'static str,
        reason: String,
    },

    #[error("request to {provider} failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Request { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// The summary exists but could not be sent to chat.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{transport} returned HTTP {status}: {body}")]
    Http {
        transport: &'static str,
        status: u16,
        body: String,
    },

    #[error("request to {transport} failed: {source}")]
    Request {
        transport: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Request { .. } => true,
            DeliveryError::Http { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Telegram(_) => false,
        }
    }
}

/// Writing an artifact file failed.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize posts: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl PipelineError {
    /// Short, detail-free text for chat replies.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::Session(_) => "❌ Could not sign in to the post source. Try again later.",
            PipelineError::Provider(_) => "❌ The summary service failed. Try again later.",
            PipelineError::Artifact(_) => "❌ Internal error while saving the digest.",
        }
    }
}

/// The command bot could not start or stopped with an error.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_transience() {
        assert!(FetchError::RateLimited.is_transient());
        assert!(
            FetchError::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !FetchError::Http {
                status: 404,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!FetchError::Unauthorized.is_transient());
        assert!(!FetchError::UnknownAuthor("ghost".into()).is_transient());
    }

    #[test]
    fn test_provider_error_transience() {
        assert!(ProviderError::RateLimited { provider: "openai" }.is_transient());
        assert!(!ProviderError::Unauthorized { provider: "openai" }.is_transient());
        assert!(
            !ProviderError::MalformedResponse {
                provider: "deepseek",
                reason: "no choices".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = PipelineError::Provider(ProviderError::Api {
            provider: "openai",
            status: 500,
            body: "stack trace at line 42".into(),
        });
        assert!(!err.user_message().contains("stack"));
        assert!(!err.user_message().contains("500"));
    }
}
