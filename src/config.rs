//! Immutable run configuration.
//!
//! [`Config`] is built once from the parsed [`Settings`] at start-up and then
//! passed by reference to every stage. Nothing downstream reads the process
//! environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use itertools::Itertools;
use serde::Serialize;
use tracing::info;

use crate::cli::Settings;
use crate::error::ConfigError;
use crate::models::{ChatTarget, DeliveryTarget};
use crate::summarizer::prompt::PromptTemplate;

pub const MAX_LOOKBACK_HOURS: u32 = 168;
pub const MIN_PROMPT_BUDGET: usize = 500;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// X API v2 with a bearer token
    XApi,
    /// RSS feeds of a Nitter instance
    Nitter,
}

#[derive(clap::ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[value(name = "openai")]
    OpenAi,
    #[value(name = "deepseek")]
    DeepSeek,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
        }
    }

    fn default_temperature(&self) -> f32 {
        match self {
            ProviderKind::OpenAi => 1.0,
            ProviderKind::DeepSeek => 1.3,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Discord,
    DiscordWebhook,
    Telegram,
    None,
}

/// A credential that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    XApi { bearer_token: Secret, base_url: String },
    Nitter { instance: url::Url },
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Secret,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    /// Normalized handles, in configured order.
    pub authors: Vec<String>,
    pub lookback_hours: u32,
    pub provider: ProviderConfig,
    pub prompt: PromptTemplate,
    pub language: String,
    pub focus: Option<String>,
    pub prompt_budget_chars: usize,
    pub delivery: DeliveryTarget,
    pub deliver_links: bool,
    pub discord_token: Option<Secret>,
    pub telegram_bot_token: Option<Secret>,
    pub http_timeout: Duration,
    pub fetch_retries: u32,
    pub fetch_concurrency: usize,
    pub command_timeout: Duration,
    pub schedule_utc: Option<NaiveTime>,
}

impl Config {
    /// Validate the parsed settings and build the run configuration.
    pub fn from_settings(s: &Settings) -> Result<Self, ConfigError> {
        let authors = normalize_handles(&s.authors);
        if authors.is_empty() {
            return Err(ConfigError::NoAuthors);
        }

        validate_hours("LOOKBACK_HOURS", s.lookback_hours)?;

        if s.prompt_budget_chars < MIN_PROMPT_BUDGET {
            return Err(ConfigError::Invalid {
                key: "PROMPT_BUDGET_CHARS",
                reason: format!("must be at least {MIN_PROMPT_BUDGET}"),
            });
        }
        if s.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_CONCURRENCY",
                reason: "must be at least 1".into(),
            });
        }

        let source = match s.source {
            SourceKind::XApi => SourceConfig::XApi {
                bearer_token: required(&s.x_bearer_token, "X_BEARER_TOKEN", "x-api source")?,
                base_url: s.x_api_base.trim_end_matches('/').to_string(),
            },
            SourceKind::Nitter => {
                let raw = s
                    .nitter_instance
                    .as_deref()
                    .ok_or(ConfigError::Missing("NITTER_INSTANCE", "nitter source"))?;
                let instance = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
                    key: "NITTER_INSTANCE",
                    reason: e.to_string(),
                })?;
                SourceConfig::Nitter { instance }
            }
        };

        let provider = match s.provider {
            ProviderKind::OpenAi => ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: required(&s.openai_api_key, "OPENAI_API_KEY", "openai provider")?,
                model: s.openai_model.clone(),
                base_url: s.openai_base_url.trim_end_matches('/').to_string(),
                temperature: s
                    .temperature
                    .unwrap_or(ProviderKind::OpenAi.default_temperature()),
            },
            ProviderKind::DeepSeek => ProviderConfig {
                kind: ProviderKind::DeepSeek,
                api_key: required(&s.deepseek_api_key, "DEEPSEEK_API_KEY", "deepseek provider")?,
                model: s.deepseek_model.clone(),
                base_url: s.deepseek_base_url.trim_end_matches('/').to_string(),
                temperature: s
                    .temperature
                    .unwrap_or(ProviderKind::DeepSeek.default_temperature()),
            },
        };

        let prompt = match &s.prompt_file {
            Some(path) => PromptTemplate::load(path)?,
            None => PromptTemplate::default(),
        };

        let discord_token = s.discord_token.clone().map(Secret::new);
        let telegram_bot_token = s.telegram_bot_token.clone().map(Secret::new);

        let chat = match s.delivery {
            DeliveryKind::Discord => {
                if discord_token.is_none() {
                    return Err(ConfigError::Missing("DISCORD_TOKEN", "discord delivery"));
                }
                let channel_id = s
                    .discord_channel_id
                    .clone()
                    .ok_or(ConfigError::Missing("DISCORD_CHANNEL_ID", "discord delivery"))?;
                Some(ChatTarget::DiscordChannel { channel_id })
            }
            DeliveryKind::DiscordWebhook => {
                let url = s.discord_webhook_url.clone().ok_or(ConfigError::Missing(
                    "DISCORD_WEBHOOK_URL",
                    "discord-webhook delivery",
                ))?;
                Some(ChatTarget::DiscordWebhook { url })
            }
            DeliveryKind::Telegram => {
                if telegram_bot_token.is_none() {
                    return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN", "telegram delivery"));
                }
                let chat_id = s
                    .telegram_chat_id
                    .ok_or(ConfigError::Missing("TELEGRAM_CHAT_ID", "telegram delivery"))?;
                Some(ChatTarget::TelegramChat { chat_id })
            }
            DeliveryKind::None => None,
        };

        let schedule_utc = s
            .summary_schedule_utc
            .as_deref()
            .map(|raw| {
                NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
                    key: "SUMMARY_SCHEDULE_UTC",
                    reason: format!("expected HH:MM ({e})"),
                })
            })
            .transpose()?;

        let config = Config {
            source,
            authors,
            lookback_hours: s.lookback_hours,
            provider,
            prompt,
            language: s.summary_language.clone(),
            focus: s.summary_focus.clone().filter(|f| !f.trim().is_empty()),
            prompt_budget_chars: s.prompt_budget_chars,
            delivery: DeliveryTarget {
                chat,
                output_dir: s.output_dir.clone(),
            },
            deliver_links: s.deliver_links,
            discord_token,
            telegram_bot_token,
            http_timeout: Duration::from_secs(s.http_timeout_secs),
            fetch_retries: s.fetch_retries,
            fetch_concurrency: s.fetch_concurrency,
            command_timeout: Duration::from_secs(s.command_timeout_secs),
            schedule_utc,
        };

        info!(
            authors = ?config.authors,
            provider = %config.provider.kind,
            model = %config.provider.model,
            lookback_hours = config.lookback_hours,
            chat = ?config.delivery.chat,
            output_dir = ?config.delivery.output_dir,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Copy of this configuration with a different lookback window.
    pub fn with_lookback(&self, hours: u32) -> Result<Self, ConfigError> {
        validate_hours("hours", hours)?;
        Ok(Self {
            lookback_hours: hours,
            ..self.clone()
        })
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.delivery.output_dir.as_ref()
    }
}

/// Trim, strip `@`, lowercase and de-duplicate handles, keeping first-seen order.
pub fn normalize_handles(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|h| h.trim().trim_start_matches('@').to_lowercase())
        .filter(|h| !h.is_empty())
        .unique()
        .collect()
}

fn validate_hours(key: &'static str, hours: u32) -> Result<(), ConfigError> {
    if hours == 0 || hours > MAX_LOOKBACK_HOURS {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must be between 1 and {MAX_LOOKBACK_HOURS}"),
        });
    }
    Ok(())
}

fn required(
    value: &Option<String>,
    key: &'static str,
    what: &'static str,
) -> Result<Secret, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Secret::new)
        .ok_or(ConfigError::Missing(key, what))
}

#[cfg(test)]
impl Config {
    /// Small valid configuration for unit tests; no delivery, no artifacts.
    pub(crate) fn for_tests(authors: &[&str]) -> Self {
        Config {
            source: SourceConfig::XApi {
                bearer_token: Secret::new("test-token"),
                base_url: "http://127.0.0.1:9".into(),
            },
            authors: authors.iter().map(|a| a.to_string()).collect(),
            lookback_hours: 24,
            provider: ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: Secret::new("sk-test"),
                model: "gpt-test".into(),
                base_url: "http://127.0.0.1:9".into(),
                temperature: 1.0,
            },
            prompt: PromptTemplate::default(),
            language: "English".into(),
            focus: None,
            prompt_budget_chars: 12_000,
            delivery: DeliveryTarget::default(),
            deliver_links: false,
            discord_token: None,
            telegram_bot_token: None,
            http_timeout: Duration::from_secs(5),
            fetch_retries: 0,
            fetch_concurrency: 3,
            command_timeout: Duration::from_secs(5),
            schedule_utc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["post_digest", "run"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).settings
    }

    #[test]
    fn test_normalize_handles() {
        let raw = vec![
            " @Alice ".to_string(),
            "bob".to_string(),
            "".to_string(),
            "ALICE".to_string(),
            "@".to_string(),
        ];
        assert_eq!(normalize_handles(&raw), vec!["alice", "bob"]);
    }

    #[test]
    fn test_valid_config_openai() {
        let s = settings(&[
            "--authors",
            "alice,bob",
            "--x-bearer-token",
            "t",
            "--openai-api-key",
            "k",
        ]);
        let config = Config::from_settings(&s).unwrap();
        assert_eq!(config.authors, vec!["alice", "bob"]);
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.provider.temperature, 1.0);
        assert!(config.delivery.chat.is_none());
    }

    #[test]
    fn test_deepseek_requires_its_own_key() {
        let s = settings(&[
            "--authors",
            "alice",
            "--x-bearer-token",
            "t",
            "--provider",
            "deepseek",
            "--openai-api-key",
            "k",
        ]);
        let err = Config::from_settings(&s).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DEEPSEEK_API_KEY", _)));
    }

    #[test]
    fn test_deepseek_default_temperature() {
        let s = settings(&[
            "--authors",
            "alice",
            "--x-bearer-token",
            "t",
            "--provider",
            "deepseek",
            "--deepseek-api-key",
            "k",
        ]);
        let config = Config::from_settings(&s).unwrap();
        assert_eq!(config.provider.temperature, 1.3);
        assert_eq!(config.provider.model, "deepseek-chat");
    }

    #[test]
    fn test_missing_authors_rejected() {
        let s = settings(&["--authors", " ,@", "--x-bearer-token", "t", "--openai-api-key", "k"]);
        assert!(matches!(
            Config::from_settings(&s),
            Err(ConfigError::NoAuthors)
        ));
    }

    #[test]
    fn test_discord_delivery_requires_channel() {
        let s = settings(&[
            "--authors",
            "alice",
            "--x-bearer-token",
            "t",
            "--openai-api-key",
            "k",
            "--delivery",
            "discord",
            "--discord-token",
            "d",
        ]);
        assert!(matches!(
            Config::from_settings(&s),
            Err(ConfigError::Missing("DISCORD_CHANNEL_ID", _))
        ));
    }

    #[test]
    fn test_schedule_parsing() {
        let s = settings(&[
            "--authors",
            "alice",
            "--x-bearer-token",
            "t",
            "--openai-api-key",
            "k",
            "--summary-schedule-utc",
            "07:30",
        ]);
        let config = Config::from_settings(&s).unwrap();
        assert_eq!(config.schedule_utc, NaiveTime::from_hms_opt(7, 30, 0));

        let bad = settings(&[
            "--authors",
            "alice",
            "--x-bearer-token",
            "t",
            "--openai-api-key",
            "k",
            "--summary-schedule-utc",
            "7pm",
        ]);
        assert!(Config::from_settings(&bad).is_err());
    }

    #[test]
    fn test_with_lookback_bounds() {
        let config = Config::for_tests(&["alice"]);
        assert_eq!(config.with_lookback(6).unwrap().lookback_hours, 6);
        assert!(config.with_lookback(0).is_err());
        assert!(config.with_lookback(MAX_LOOKBACK_HOURS + 1).is_err());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let s = Secret::new("sk-very-secret");
        assert!(!format!("{s:?}").contains("very"));
    }
}
