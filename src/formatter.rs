//! Prompt text rendering under a character budget.
//!
//! Grouped posts are rendered into one plain-text block for the language
//! model:
//!
//! ```text
//! ## @alice (2 posts)
//! - [2025-05-06 10:00:00 UTC] Big card reveal today
//!   https://x.com/alice/status/1001
//!
//! - [2025-05-06 12:30:00 UTC] Tournament results are in (repost of @bob)
//!   https://x.com/bob/status/1002
//!
//! ----------------------------------------
//!
//! ```
//!
//! # Truncation
//!
//! The budget is counted in Unicode scalar values. While the rendering is
//! over budget, the globally oldest post (ties: later-listed author first) is
//! shortened with a trailing `…` by exactly the overflow when its text can
//! absorb it, and removed otherwise. The newest post overall is never
//! removed, only shortened. If even that cannot fit, the output is hard-cut.
//!
//! The retained groups are returned alongside the text, and formatting them
//! again yields the same text.

use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{AuthorGroup, GroupedPosts, Post};

const SEPARATOR_WIDTH: usize = 40;
const ELLIPSIS: char = '…';

/// Formatter output: the prompt text plus what survived truncation.
#[derive(Debug, Clone)]
pub struct FormattedText {
    pub text: String,
    /// The posts the text was rendered from, with any shortened texts.
    pub retained: GroupedPosts,
    pub dropped_posts: usize,
    pub truncated_posts: usize,
}

impl FormattedText {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn was_truncated(&self) -> bool {
        self.dropped_posts > 0 || self.truncated_posts > 0
    }
}

/// Render `grouped` into at most `budget` characters.
pub fn format_for_prompt(grouped: &GroupedPosts, budget: usize) -> FormattedText {
    let mut groups: Vec<AuthorGroup> = grouped
        .groups
        .iter()
        .filter(|g| !g.posts.is_empty())
        .cloned()
        .collect();
    let mut dropped_posts = 0usize;
    let mut truncated: HashSet<(String, String)> = HashSet::new();

    loop {
        let text = render(&groups);
        let len = text.chars().count();
        if len <= budget {
            if dropped_posts > 0 || !truncated.is_empty() {
                info!(
                    budget,
                    len,
                    dropped_posts,
                    truncated_posts = truncated.len(),
                    "Prompt text truncated to budget"
                );
            }
            return FormattedText {
                text,
                retained: GroupedPosts { groups },
                dropped_posts,
                truncated_posts: truncated.len(),
            };
        }
        let overflow = len - budget;

        let newest = newest_position(&groups);
        match oldest_position(&groups, newest) {
            Some((gi, pi)) => {
                let post = &mut groups[gi].posts[pi];
                if shorten(&mut post.text, overflow) {
                    truncated.insert((post.author.clone(), post.id.clone()));
                } else {
                    debug!(author = %post.author, id = %post.id, "Dropping post to fit budget");
                    let removed = groups[gi].posts.remove(pi);
                    truncated.remove(&(removed.author, removed.id));
                    dropped_posts += 1;
                    if groups[gi].posts.is_empty() {
                        groups.remove(gi);
                    }
                }
            }
            None => {
                let absorbs = newest
                    .filter(|&(gi, pi)| groups[gi].posts[pi].text.chars().count() > overflow + 1);
                match absorbs {
                    Some((gi, pi)) => {
                        let post = &mut groups[gi].posts[pi];
                        shorten(&mut post.text, overflow);
                        truncated.insert((post.author.clone(), post.id.clone()));
                    }
                    None => {
                        info!(budget, len, "Headers alone exceed budget; hard-cutting output");
                        return FormattedText {
                            text: hard_cut(&text, budget),
                            retained: GroupedPosts { groups },
                            dropped_posts,
                            truncated_posts: truncated.len(),
                        };
                    }
                }
            }
        }
    }
}

/// Plain rendering without any budget.
pub fn render(groups: &[AuthorGroup]) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let mut lines: Vec<String> = Vec::new();

    for group in groups.iter().filter(|g| !g.posts.is_empty()) {
        lines.push(format!("## @{} ({} posts)", group.author, group.posts.len()));
        for post in &group.posts {
            lines.push(post_line(post));
            lines.push(format!("  {}", post.url));
            lines.push(String::new());
        }
        lines.push(separator.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn post_line(post: &Post) -> String {
    let timestamp = post.created_at.format("%Y-%m-%d %H:%M:%S UTC");
    match &post.repost_of {
        Some(original) => format!("- [{timestamp}] {} (repost of @{original})", post.text),
        None => format!("- [{timestamp}] {}", post.text),
    }
}

/// Order key: older first, then later-listed author, then earlier in group.
fn age_key(groups: &[AuthorGroup], gi: usize, pi: usize) -> (DateTime<Utc>, Reverse<usize>, usize) {
    (groups[gi].posts[pi].created_at, Reverse(gi), pi)
}

fn positions(groups: &[AuthorGroup]) -> impl Iterator<Item = (usize, usize)> + '_ {
    groups
        .iter()
        .enumerate()
        .flat_map(|(gi, g)| (0..g.posts.len()).map(move |pi| (gi, pi)))
}

fn newest_position(groups: &[AuthorGroup]) -> Option<(usize, usize)> {
    positions(groups).max_by_key(|&(gi, pi)| age_key(groups, gi, pi))
}

fn oldest_position(
    groups: &[AuthorGroup],
    newest: Option<(usize, usize)>,
) -> Option<(usize, usize)> {
    positions(groups)
        .filter(|&pos| Some(pos) != newest)
        .min_by_key(|&(gi, pi)| age_key(groups, gi, pi))
}

/// Shorten `text` by exactly `overflow` characters, ending it with `…`.
///
/// Returns `false` (leaving `text` untouched) when at least one original
/// character could not be kept.
fn shorten(text: &mut String, overflow: usize) -> bool {
    let chars = text.chars().count();
    if chars <= overflow + 1 {
        return false;
    }
    let keep = chars - overflow - 1;
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push(ELLIPSIS);
    *text = shortened;
    true
}

fn hard_cut(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(budget - 1).collect();
    cut.push(ELLIPSIS);
    cut
}
