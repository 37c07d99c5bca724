//! The fetch → organize → format → summarize → deliver run.
//!
//! # Failure Handling
//!
//! | Stage | Error | Effect |
//! |-------|-------|--------|
//! | Fetch session | `SessionError` | run aborts |
//! | Single author | `FetchError` | author skipped, listed in the report |
//! | Formatting | none | overflow is truncated |
//! | Provider | `ProviderError` | run aborts; posts artifacts already written |
//! | Artifacts | `ArtifactError` | run aborts |
//! | Chat | `DeliveryError` | run is [`RunStatus::Degraded`] |

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::delivery::{ChatSink, ChatTransport, deliver_summary};
use crate::error::PipelineError;
use crate::formatter::format_for_prompt;
use crate::models::SummaryResult;
use crate::organizer::organize;
use crate::outputs::{ArtifactWriter, RunMeta};
use crate::scrapers::{AuthorFailure, FetchOptions, PostSource, Source, fetch_posts};
use crate::summarizer::{LanguageModel, Summarizer, summarize_posts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// Summary produced but chat delivery failed.
    Degraded,
}

/// Outcome of a run that produced a summary.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Posts fetched inside the window.
    pub posts: usize,
    pub authors_failed: Vec<AuthorFailure>,
    /// Posts left out of the prompt to fit the budget.
    pub dropped_posts: usize,
    /// Posts whose text was shortened to fit the budget.
    pub truncated_posts: usize,
    pub summary: SummaryResult,
    pub artifacts: Vec<PathBuf>,
    pub messages_sent: usize,
    pub delivery_error: Option<String>,
}

/// Run the whole pipeline once.
///
/// # Arguments
///
/// * `config` - Run configuration; `lookback_hours` sets the window
/// * `source` - Post source, opened once and always closed
/// * `summarizer` - Configured language model
/// * `sink` - Chat destination, or `None` to skip delivery
/// * `output_dir` - Artifact directory, or `None` to write no files
#[instrument(level = "info", skip_all, fields(hours = config.lookback_hours, authors = config.authors.len()))]
pub async fn run<S, M, C>(
    config: &Config,
    source: &S,
    summarizer: &M,
    sink: Option<&C>,
    output_dir: Option<&Path>,
) -> Result<RunReport, PipelineError>
where
    S: PostSource,
    M: Summarizer,
    C: ChatSink,
{
    let t0 = Instant::now();
    let started_at = Utc::now();
    let hours = config.lookback_hours;
    let window = chrono::Duration::hours(i64::from(hours));

    // Fetching
    let outcome = fetch_posts(
        source,
        &config.authors,
        window,
        FetchOptions::from_config(config),
    )
    .await?;
    let posts = outcome.posts.len();
    let authors_failed = outcome.failures;

    // Organizing
    let grouped = organize(outcome.posts, &config.authors);

    let writer = output_dir.map(|dir| ArtifactWriter::new(dir, started_at));
    let mut artifacts = Vec::new();
    if let Some(writer) = &writer {
        let meta = RunMeta {
            generated_at: started_at,
            window_start: started_at - window,
            window_end: started_at,
            hours,
            failed_authors: authors_failed.clone(),
        };
        artifacts.extend(writer.write_posts(&grouped, &meta).await?);
    }

    // Formatting
    let formatted = format_for_prompt(&grouped, config.prompt_budget_chars);
    info!(
        chars = formatted.char_len(),
        budget = config.prompt_budget_chars,
        truncated = formatted.was_truncated(),
        dropped_posts = formatted.dropped_posts,
        shortened_posts = formatted.truncated_posts,
        "Formatted prompt text"
    );

    // Summarizing
    let summary = match summarize_posts(summarizer, &formatted, hours).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(
                provider = %summarizer.provider(),
                model = summarizer.model(),
                error = %e,
                artifacts = ?artifacts,
                "Summary generation failed; aborting run"
            );
            return Err(e.into());
        }
    };
    if let Some(writer) = &writer {
        artifacts.push(writer.write_summary(&summary, hours).await?);
    }

    // Delivering
    let mut status = RunStatus::Complete;
    let mut messages_sent = 0;
    let mut delivery_error = None;
    if let Some(sink) = sink {
        let links = config.deliver_links.then_some(&grouped);
        match deliver_summary(sink, &summary, hours, links).await {
            Ok(sent) => messages_sent = sent,
            Err(e) => {
                error!(transport = sink.name(), error = %e, "Delivery failed; run degraded");
                status = RunStatus::Degraded;
                delivery_error = Some(e.to_string());
            }
        }
    }

    let report = RunReport {
        status,
        posts,
        authors_failed,
        dropped_posts: formatted.dropped_posts,
        truncated_posts: formatted.truncated_posts,
        summary,
        artifacts,
        messages_sent,
        delivery_error,
    };
    info!(
        status = ?report.status,
        posts = report.posts,
        failed_authors = report.authors_failed.len(),
        dropped_posts = report.dropped_posts,
        truncated_posts = report.truncated_posts,
        messages = report.messages_sent,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Run finished"
    );
    Ok(report)
}

/// Build the configured source, model and transport, then [`run`].
///
/// `deliver = false` skips chat delivery even when a target is configured.
pub async fn run_configured(config: &Config, deliver: bool) -> Result<RunReport, PipelineError> {
    let source = Source::from_config(config)?;
    let model = LanguageModel::from_config(config)?;

    let mut setup_error = None;
    let transport = if deliver {
        ChatTransport::from_config(config).unwrap_or_else(|e| {
            error!(error = %e, "Could not set up chat transport");
            setup_error = Some(e.to_string());
            None
        })
    } else {
        info!("Chat delivery disabled for this run");
        None
    };

    let mut report = run(
        config,
        &source,
        &model,
        transport.as_ref(),
        config.output_dir().map(PathBuf::as_path),
    )
    .await?;

    if let Some(e) = setup_error {
        warn!("Run degraded: chat transport unavailable");
        report.status = RunStatus::Degraded;
        report.delivery_error = Some(e);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::stub::RecordingSink;
    use crate::error::ProviderError;
    use crate::models::Post;
    use crate::scrapers::stub::{StubFailure, StubSource};
    use crate::summarizer::stub::StubSummarizer;

    fn recent(id: &str, author: &str, minutes_ago: i64, text: &str) -> Post {
        Post {
            id: id.into(),
            author: author.into(),
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            text: text.into(),
            url: format!("https://x.com/{author}/status/{id}"),
            media: vec![],
            repost_of: None,
        }
    }

    fn source_abc() -> StubSource {
        let mut source = StubSource::default();
        source
            .posts
            .insert("a".into(), vec![recent("1", "a", 30, "from a")]);
        source
            .posts
            .insert("b".into(), vec![recent("2", "b", 20, "from b")]);
        source
            .posts
            .insert("c".into(), vec![recent("3", "c", 10, "from c")]);
        source
    }

    fn files_ending(dir: &Path, suffix: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for day in std::fs::read_dir(dir).unwrap().flatten() {
            for file in std::fs::read_dir(day.path()).unwrap().flatten() {
                if file.file_name().to_string_lossy().ends_with(suffix) {
                    found.push(file.path());
                }
            }
        }
        found
    }

    #[tokio::test]
    async fn test_failing_author_is_reported_and_excluded() {
        let config = Config::for_tests(&["a", "b", "c"]);
        let mut source = source_abc();
        source.failing.insert("c".into(), StubFailure::Transient);
        let summarizer = StubSummarizer::replying("- summary");
        let sink = RecordingSink::new(1900);

        let report = run(&config, &source, &summarizer, Some(&sink), None)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.posts, 2);
        assert_eq!(report.authors_failed.len(), 1);
        assert_eq!(report.authors_failed[0].author, "c");

        let request = summarizer.last_request.lock().unwrap().clone().unwrap();
        assert!(request.text.contains("from a"));
        assert!(request.text.contains("from b"));
        assert!(!request.text.contains("from c"));
        assert!(!sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_provider_response_keeps_raw_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::for_tests(&["a", "b"]);
        let summarizer = StubSummarizer::malformed();
        let sink = RecordingSink::new(1900);

        let err = run(&config, &source_abc(), &summarizer, Some(&sink), Some(tmp.path()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Provider(ProviderError::MalformedResponse { .. })
        ));
        let json = files_ending(tmp.path(), "_posts.json");
        assert_eq!(json.len(), 1);
        let body = std::fs::read_to_string(&json[0]).unwrap();
        assert!(body.contains("from a"));
        assert_eq!(files_ending(tmp.path(), "_posts.md").len(), 1);
        assert!(files_ending(tmp.path(), "_summary.md").is_empty());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_chat_degrades_but_keeps_summary_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::for_tests(&["a", "b", "c"]);
        let summarizer = StubSummarizer::replying("- all good");
        let sink = RecordingSink::unreachable();

        let report = run(&config, &source_abc(), &summarizer, Some(&sink), Some(tmp.path()))
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Degraded);
        assert!(report.delivery_error.is_some());
        assert_eq!(report.artifacts.len(), 3);

        let summary = files_ending(tmp.path(), "_summary.md");
        assert_eq!(summary.len(), 1);
        assert!(std::fs::read_to_string(&summary[0]).unwrap().contains("- all good"));
    }

    #[tokio::test]
    async fn test_session_failure_aborts_before_anything_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::for_tests(&["a"]);
        let source = StubSource {
            refuse_session: true,
            ..Default::default()
        };
        let summarizer = StubSummarizer::replying("unused");

        let err = run(
            &config,
            &source,
            &summarizer,
            None::<&RecordingSink>,
            Some(tmp.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Session(_)));
        assert_eq!(summarizer.calls(), 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_links_follow_summary_when_enabled() {
        let mut config = Config::for_tests(&["a", "b"]);
        config.deliver_links = true;
        let summarizer = StubSummarizer::replying("- summary");
        let sink = RecordingSink::new(1900);

        let report = run(&config, &source_abc(), &summarizer, Some(&sink), None)
            .await
            .unwrap();

        let sent = sink.sent();
        assert_eq!(report.messages_sent, sent.len());
        assert!(sent[0].contains("- summary"));
        assert!(sent.last().unwrap().contains("https://x.com/b/status/2"));
    }

    #[tokio::test]
    async fn test_empty_window_still_reports() {
        let config = Config::for_tests(&["a"]);
        let summarizer = StubSummarizer::malformed();

        let report = run(
            &config,
            &StubSource::default(),
            &summarizer,
            None::<&RecordingSink>,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.posts, 0);
        assert_eq!(summarizer.calls(), 0);
        assert_eq!(report.status, RunStatus::Complete);
    }
}
