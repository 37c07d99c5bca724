//! Posts JSON artifact.
//!
//! ```json
//! {
//!   "generated_at": "2025-05-06T17:30:00Z",
//!   "window_start": "2025-05-05T17:30:00Z",
//!   "window_end": "2025-05-06T17:30:00Z",
//!   "hours": 24,
//!   "failed_authors": [{"author": "carol", "error": "rate limited"}],
//!   "posts": {"alice": [{"id": "1", "author": "alice", ...}]}
//! }
//! ```
//!
//! `posts` keeps the configured author order.

use serde::Serialize;

use super::RunMeta;
use crate::error::ArtifactError;
use crate::models::GroupedPosts;

#[derive(Serialize)]
struct PostsDocument<'a> {
    #[serde(flatten)]
    meta: &'a RunMeta,
    posts: &'a GroupedPosts,
}

/// Pretty-printed posts document.
pub fn render_posts(grouped: &GroupedPosts, meta: &RunMeta) -> Result<String, ArtifactError> {
    let doc = PostsDocument {
        meta,
        posts: grouped,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::post;
    use crate::models::{AuthorGroup, Post};
    use crate::scrapers::AuthorFailure;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_document_shape() {
        let end = Utc.with_ymd_and_hms(2025, 5, 6, 17, 30, 0).unwrap();
        let meta = RunMeta {
            generated_at: end,
            window_start: end - chrono::Duration::hours(24),
            window_end: end,
            hours: 24,
            failed_authors: vec![AuthorFailure {
                author: "carol".into(),
                error: "rate limited".into(),
            }],
        };
        let mut rt = post("2", "alice", 5, "rt");
        rt.repost_of = Some("bob".into());
        let grouped = GroupedPosts {
            groups: vec![AuthorGroup {
                author: "alice".into(),
                posts: vec![post("1", "alice", 0, "hello"), rt],
            }],
        };

        let json = render_posts(&grouped, &meta).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["hours"], 24);
        assert_eq!(value["failed_authors"][0]["author"], "carol");
        assert_eq!(value["posts"]["alice"][1]["repost_of"], "bob");

        let posts: Vec<Post> = serde_json::from_value(value["posts"]["alice"].clone()).unwrap();
        assert_eq!(posts, grouped.groups[0].posts);
    }
}
