//! Language-model summarization.
//!
//! The provider is chosen once from configuration and wrapped in a
//! [`LanguageModel`]. The pipeline only sees the [`Summarizer`] capability:
//! formatted text in, [`SummaryResult`] out.
//!
//! # Providers
//!
//! | Provider | Default model | Temperature |
//! |----------|---------------|-------------|
//! | OpenAI | `gpt-3.5-turbo` | 1.0 |
//! | DeepSeek | `deepseek-chat` | 1.3 |
//!
//! There is no failover between providers. A failed call is a
//! [`ProviderError`] and aborts the run.

pub mod chat;
pub mod prompt;

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument};

use crate::config::{Config, ProviderKind};
use crate::error::ProviderError;
use crate::formatter::FormattedText;
use crate::models::{SummaryRequest, SummaryResult};
use crate::retry::RetryPolicy;
use chat::ChatCompletionsClient;
use prompt::{PromptTemplate, PromptVars};

/// Extra attempts for a provider call after a transient failure.
const PROVIDER_RETRIES: u32 = 2;

/// Turns formatted post text into a summary.
pub trait Summarizer: Sync {
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &str;

    fn summarize(
        &self,
        request: &SummaryRequest,
    ) -> impl Future<Output = Result<SummaryResult, ProviderError>> + Send;
}

/// Prompt settings shared by both providers.
#[derive(Debug, Clone)]
pub struct PromptSettings {
    template: PromptTemplate,
    language: String,
    focus: Option<String>,
}

/// The configured language-model backend.
#[derive(Debug, Clone)]
pub enum LanguageModel {
    OpenAi {
        client: ChatCompletionsClient,
        model: String,
        prompt: PromptSettings,
    },
    DeepSeek {
        client: ChatCompletionsClient,
        model: String,
        prompt: PromptSettings,
    },
}

impl LanguageModel {
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider = &config.provider;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|source| ProviderError::Request {
                provider: provider.kind.as_str(),
                source,
            })?;

        let client = ChatCompletionsClient::new(
            http,
            provider,
            RetryPolicy::new(PROVIDER_RETRIES, Duration::from_secs(2)),
        );
        let model = provider.model.clone();
        let prompt = PromptSettings {
            template: config.prompt.clone(),
            language: config.language.clone(),
            focus: config.focus.clone(),
        };

        Ok(match provider.kind {
            ProviderKind::OpenAi => LanguageModel::OpenAi {
                client,
                model,
                prompt,
            },
            ProviderKind::DeepSeek => LanguageModel::DeepSeek {
                client,
                model,
                prompt,
            },
        })
    }

    fn parts(&self) -> (&ChatCompletionsClient, &str, &PromptSettings) {
        match self {
            LanguageModel::OpenAi {
                client,
                model,
                prompt,
            }
            | LanguageModel::DeepSeek {
                client,
                model,
                prompt,
            } => (client, model.as_str(), prompt),
        }
    }
}

impl Summarizer for LanguageModel {
    fn provider(&self) -> ProviderKind {
        match self {
            LanguageModel::OpenAi { .. } => ProviderKind::OpenAi,
            LanguageModel::DeepSeek { .. } => ProviderKind::DeepSeek,
        }
    }

    fn model(&self) -> &str {
        self.parts().1
    }

    #[instrument(level = "info", skip_all, fields(provider = %request.provider, model = %request.model, hours = request.hours))]
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResult, ProviderError> {
        let t0 = Instant::now();
        let (client, _, settings) = self.parts();

        let rendered = settings.template.render(PromptVars {
            hours: request.hours,
            language: &settings.language,
            focus: settings.focus.as_deref(),
            posts: &request.text,
        });
        let text = client.complete(&request.model, &rendered).await?;

        info!(
            chars = text.chars().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Summary generated"
        );
        Ok(SummaryResult {
            provider: request.provider,
            model: request.model.clone(),
            text,
            generated_at: Utc::now(),
        })
    }
}

/// Build the request for `summarizer` from formatted text.
pub fn build_request<S: Summarizer>(summarizer: &S, formatted: &FormattedText, hours: u32) -> SummaryRequest {
    SummaryRequest {
        text: formatted.text.clone(),
        provider: summarizer.provider(),
        model: summarizer.model().to_string(),
        hours,
    }
}

/// Summarize `formatted`, skipping the provider call when there are no posts.
pub async fn summarize_posts<S: Summarizer>(
    summarizer: &S,
    formatted: &FormattedText,
    hours: u32,
) -> Result<SummaryResult, ProviderError> {
    if formatted.retained.is_empty() {
        info!(hours, "No posts in window; skipping provider call");
        return Ok(SummaryResult {
            provider: summarizer.provider(),
            model: summarizer.model().to_string(),
            text: no_posts_text(hours),
            generated_at: Utc::now(),
        });
    }

    let request = build_request(summarizer, formatted, hours);
    summarizer.summarize(&request).await
}

pub fn no_posts_text(hours: u32) -> String {
    format!("No posts from the followed accounts in the last {hours} hours.")
}
