//! Artifact files written by a run.
//!
//! # Submodules
//!
//! - [`json`]: grouped raw posts plus run metadata
//! - [`markdown`]: human-readable posts report and the summary
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── morning_posts.json
//!     ├── morning_posts.md
//!     └── morning_summary.md
//! ```
//!
//! The edition (`morning`, `afternoon`, `evening`) comes from the UTC time
//! the run started. Posts files are written before the provider call, the
//! summary file before chat delivery.

pub mod json;
pub mod markdown;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::ArtifactError;
use crate::models::{GroupedPosts, SummaryResult};
use crate::scrapers::AuthorFailure;
use crate::utils::time_of_day;

/// Metadata describing the fetch a posts artifact came from.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub hours: u32,
    pub failed_authors: Vec<AuthorFailure>,
}

/// File locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub posts_json: PathBuf,
    pub posts_md: PathBuf,
    pub summary_md: PathBuf,
}

impl ArtifactPaths {
    /// `{base}/{YYYY-MM-DD}/{edition}_*` for a run started at `at`.
    pub fn for_run(base: &Path, at: DateTime<Utc>) -> Self {
        let dir = base.join(at.date_naive().to_string());
        let edition = time_of_day(at.time());
        Self {
            posts_json: dir.join(format!("{edition}_posts.json")),
            posts_md: dir.join(format!("{edition}_posts.md")),
            summary_md: dir.join(format!("{edition}_summary.md")),
        }
    }
}

/// Writes the artifacts of a single run.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    paths: ArtifactPaths,
}

impl ArtifactWriter {
    pub fn new(base: &Path, at: DateTime<Utc>) -> Self {
        Self {
            paths: ArtifactPaths::for_run(base, at),
        }
    }

    /// Write the posts JSON and Markdown files.
    ///
    /// # Returns
    ///
    /// The paths written, in order.
    pub async fn write_posts(
        &self,
        grouped: &GroupedPosts,
        meta: &RunMeta,
    ) -> Result<Vec<PathBuf>, ArtifactError> {
        let json = json::render_posts(grouped, meta)?;
        write_file(&self.paths.posts_json, &json).await?;

        let md = markdown::render_posts(grouped, meta);
        write_file(&self.paths.posts_md, &md).await?;

        Ok(vec![self.paths.posts_json.clone(), self.paths.posts_md.clone()])
    }

    pub async fn write_summary(
        &self,
        summary: &SummaryResult,
        hours: u32,
    ) -> Result<PathBuf, ArtifactError> {
        let md = markdown::render_summary(summary, hours);
        write_file(&self.paths.summary_md, &md).await?;
        Ok(self.paths.summary_md.clone())
    }
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
async fn write_file(path: &Path, contents: &str) -> Result<(), ArtifactError> {
    let io_error = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await.map_err(io_error)?;
    }
    fs::write(path, contents).await.map_err(io_error)?;
    info!(bytes = contents.len(), "Wrote artifact");
    Ok(())
}
