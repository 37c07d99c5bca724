//! Prompt template for the summary request.
//!
//! The built-in template can be replaced by a YAML file:
//!
//! ```yaml
//! system: |
//!   You summarize social media posts.
//! user: |
//!   Summarize the last {hours} hours in {language}.
//!   {focus}
//!
//!   {posts}
//! ```
//!
//! Placeholders: `{hours}`, `{language}`, `{focus}` (an instruction line, or
//! nothing when no focus is configured) and `{posts}` (required).

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

const DEFAULT_SYSTEM: &str = "You are a professional social media digest assistant. \
Your job is to analyse every post published during the requested period and \
produce one comprehensive, well-organised summary.";

const DEFAULT_USER: &str = "Write a comprehensive summary report of the posts \
below, published during the past {hours} hours:

{posts}

Requirements:
1. Give one overall summary across all accounts for the past {hours} hours
2. List the important information and trends as bullet points
3. Answer in {language}
4. Tell reposts apart from original posts
{focus}";

/// Values substituted into the template.
#[derive(Debug, Clone, Copy)]
pub struct PromptVars<'a> {
    pub hours: u32,
    pub language: &'a str,
    pub focus: Option<&'a str>,
    pub posts: &'a str,
}

/// A rendered system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptTemplate {
    #[serde(default = "default_system")]
    pub system: String,
    pub user: String,
}

fn default_system() -> String {
    DEFAULT_SYSTEM.to_string()
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            user: DEFAULT_USER.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Load a YAML template from `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Prompt`] if the file cannot be read or parsed, or the
    /// user prompt has no `{posts}` placeholder.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let prompt_error = |reason: String| ConfigError::Prompt {
            path: path.to_path_buf(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| prompt_error(e.to_string()))?;
        let template: PromptTemplate =
            serde_yaml::from_str(&raw).map_err(|e| prompt_error(e.to_string()))?;
        if !template.user.contains("{posts}") {
            return Err(prompt_error("user prompt must contain {posts}".into()));
        }

        info!(path = %path.display(), "Loaded prompt template");
        Ok(template)
    }

    pub fn render(&self, vars: PromptVars<'_>) -> RenderedPrompt {
        RenderedPrompt {
            system: substitute(&self.system, vars).trim().to_string(),
            user: substitute(&self.user, vars).trim_end().to_string(),
        }
    }
}

/// `{posts}` goes last so post text is never itself substituted.
fn substitute(template: &str, vars: PromptVars<'_>) -> String {
    let focus_line = vars
        .focus
        .map(|f| format!("5. Pay particular attention to content about: {f}"))
        .unwrap_or_default();

    template
        .replace("{hours}", &vars.hours.to_string())
        .replace("{language}", vars.language)
        .replace("{focus}", &focus_line)
        .replace("{posts}", vars.posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars<'a>(posts: &'a str, focus: Option<&'a str>) -> PromptVars<'a> {
        PromptVars {
            hours: 12,
            language: "Traditional Chinese",
            focus,
            posts,
        }
    }

    #[test]
    fn test_default_template_renders_all_placeholders() {
        let rendered = PromptTemplate::default().render(vars("## @alice (1 posts)", Some("card games")));

        assert!(rendered.user.contains("past 12 hours"));
        assert!(rendered.user.contains("Answer in Traditional Chinese"));
        assert!(rendered.user.contains("## @alice (1 posts)"));
        assert!(rendered.user.ends_with("content about: card games"));
        assert!(!rendered.user.contains('{'));
        assert!(!rendered.system.is_empty());
    }

    #[test]
    fn test_no_focus_leaves_no_dangling_line() {
        let rendered = PromptTemplate::default().render(vars("posts", None));
        assert!(rendered.user.ends_with("original posts"));
    }

    #[test]
    fn test_post_text_is_not_substituted() {
        let rendered = PromptTemplate::default().render(vars("literal {hours} in a post", None));
        assert!(rendered.user.contains("literal {hours} in a post"));
    }

    #[test]
    fn test_load_yaml_template() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user: |\n  Digest for {{hours}}h:\n  {{posts}}").unwrap();

        let template = PromptTemplate::load(file.path()).unwrap();
        assert_eq!(template.system, DEFAULT_SYSTEM);
        let rendered = template.render(vars("P", None));
        assert_eq!(rendered.user, "Digest for 12h:\nP");
    }

    #[test]
    fn test_load_rejects_template_without_posts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user: nothing to see").unwrap();
        assert!(matches!(
            PromptTemplate::load(file.path()),
            Err(ConfigError::Prompt { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PromptTemplate::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("here.yaml"));
    }
}
