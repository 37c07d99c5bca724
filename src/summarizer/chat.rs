//! Minimal chat-completions client.
//!
//! OpenAI and DeepSeek both accept `POST {base_url}/chat/completions` with a
//! bearer key and return `choices[0].message.content`, so one client serves
//! both providers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::prompt::RenderedPrompt;
use crate::config::{ProviderConfig, Secret};
use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::utils::truncate_for_log;

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    provider: &'static str,
    endpoint: String,
    api_key: Secret,
    temperature: f32,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            provider: config.kind.as_str(),
            endpoint: format!("{}/chat/completions", config.base_url),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            retry,
        }
    }

    /// Send the prompt, retrying transport errors, 429 and 5xx.
    pub async fn complete(&self, model: &str, prompt: &RenderedPrompt) -> Result<String, ProviderError> {
        self.retry
            .run(
                self.provider,
                || self.complete_once(model, prompt),
                ProviderError::is_transient,
            )
            .await
    }

    #[instrument(level = "info", skip_all, fields(provider = self.provider, %model, prompt_chars = prompt.user.chars().count()))]
    async fn complete_once(&self, model: &str, prompt: &RenderedPrompt) -> Result<String, ProviderError> {
        let provider = self.provider;
        let req = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&req)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider, source })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|source| ProviderError::Request { provider, source })?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unauthorized { provider });
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited { provider }),
            s if !s.is_success() => {
                return Err(ProviderError::Api {
                    provider,
                    status: s.as_u16(),
                    body: truncate_for_log(&body, 300),
                });
            }
            _ => {}
        }

        let content = parse_content(provider, &body)?;
        debug!(chars = content.chars().count(), "Received completion");
        Ok(content)
    }
}

/// Extract the first choice's text from a successful response body.
fn parse_content(provider: &'static str, body: &str) -> Result<String, ProviderError> {
    let malformed = |reason: String| ProviderError::MalformedResponse { provider, reason };

    let resp: Resp = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no choices".into()))?;
    let content = choice
        .message
        .content
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(malformed("empty content".into()));
    }
    Ok(content)
}
