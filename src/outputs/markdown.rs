//! Markdown artifacts: the posts report and the summary.

use std::fmt::Write;

use super::RunMeta;
use crate::models::{GroupedPosts, SummaryResult};
use crate::utils::{time_of_day, upcase};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Human-readable report of every fetched post, never truncated.
pub fn render_posts(grouped: &GroupedPosts, meta: &RunMeta) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Posts (last {} hours)\n", meta.hours);
    let _ = writeln!(
        md,
        "{} edition, generated {}\n",
        upcase(time_of_day(meta.generated_at.time())),
        meta.generated_at.format(TIME_FORMAT)
    );
    let _ = writeln!(
        md,
        "Window: {} to {}\n",
        meta.window_start.format(TIME_FORMAT),
        meta.window_end.format(TIME_FORMAT)
    );

    if !meta.failed_authors.is_empty() {
        md.push_str("Failed authors:\n\n");
        for failure in &meta.failed_authors {
            let _ = writeln!(md, "- @{}: {}", failure.author, failure.error);
        }
        md.push('\n');
    }

    if grouped.is_empty() {
        md.push_str("_No posts in this window._\n");
        return md;
    }

    for group in &grouped.groups {
        let _ = writeln!(md, "## @{}\n", group.author);
        let _ = writeln!(md, "{} posts\n", group.posts.len());

        for (i, post) in group.posts.iter().enumerate() {
            let _ = writeln!(md, "### Post {}\n", i + 1);
            match &post.repost_of {
                Some(original) => {
                    md.push_str("- **Type**: repost\n");
                    let _ = writeln!(md, "- **Original author**: @{original}");
                }
                None => md.push_str("- **Type**: original\n"),
            }
            let _ = writeln!(md, "- **ID**: {}", post.id);
            let _ = writeln!(md, "- **Time**: {}", post.created_at.format(TIME_FORMAT));
            let _ = writeln!(md, "- **Text**: {}", post.text);
            let _ = writeln!(md, "- **Link**: {}", post.url);

            if !post.media.is_empty() {
                let _ = writeln!(md, "\n#### Images ({})\n", post.media.len());
                for (j, url) in post.media.iter().enumerate() {
                    let _ = writeln!(md, "![Image {}]({url})\n", j + 1);
                }
            }
            md.push_str("\n---\n\n");
        }
    }
    md
}

/// Summary file: header, provider line, summary text.
pub fn render_summary(summary: &SummaryResult, hours: u32) -> String {
    format!(
        "# Summary (last {hours} hours)\n\n_Generated {} by {} / {}_\n\n{}\n",
        summary.generated_at.format(TIME_FORMAT),
        summary.provider,
        summary.model,
        summary.text.trim_end()
    )
}
