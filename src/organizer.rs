//! Grouping of fetched posts by author.
//!
//! A pure function over the merged fetch result. Groups follow the configured
//! author order so output is deterministic run to run; within a group posts
//! ascend by `(created_at, id)`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{AuthorGroup, GroupedPosts, Post};

/// Partition `posts` into per-author groups.
///
/// # Arguments
///
/// * `posts` - Flat, deduplicated posts from the fetch stage, in any order
/// * `authors` - Normalized handles in configured order
///
/// # Returns
///
/// One group per author that has at least one post. Posts attributed to an
/// author missing from `authors` are kept in trailing groups, in the order
/// those authors were first seen.
pub fn organize(posts: Vec<Post>, authors: &[String]) -> GroupedPosts {
    let mut by_author: HashMap<String, Vec<Post>> = HashMap::new();
    let mut extra_order: Vec<String> = Vec::new();

    for post in posts {
        if !authors.contains(&post.author) && !by_author.contains_key(&post.author) {
            warn!(author = %post.author, id = %post.id, "Post from unlisted author");
            extra_order.push(post.author.clone());
        }
        by_author.entry(post.author.clone()).or_default().push(post);
    }

    let groups: Vec<AuthorGroup> = authors
        .iter()
        .chain(extra_order.iter())
        .filter_map(|author| {
            let mut posts = by_author.remove(author)?;
            posts.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Some(AuthorGroup {
                author: author.clone(),
                posts,
            })
        })
        .collect();

    debug!(
        groups = groups.len(),
        posts = groups.iter().map(|g| g.posts.len()).sum::<usize>(),
        "Organized posts"
    );
    GroupedPosts { groups }
}
