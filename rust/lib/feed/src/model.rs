//! Feed entities and their canonical JSON shape.
//!
//! Authors are embedded snapshots, not references: a post keeps the author's
//! identity as it was when the post was written.

use serde::{Deserialize, Serialize};

use crate::clock::relative_label;
use crate::error::CacheError;

/// A user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub avatar_url: String,
}

/// How a post's `image_data` is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Remote URL, fetched and cached by the rendering layer.
    #[default]
    Url,
    /// Base64 bytes stored in the entity itself.
    Inline,
}

/// A comment on a post. Owned by its parent post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub text: String,
    pub created_at: i64,
}

/// A feed post.
///
/// `like_count` is unsigned, so a stored negative count is a decode error.
/// `image_kind` is the only field with a decode default (`url`), for blobs
/// written before inline images existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author: User,
    pub image_data: String,
    #[serde(default)]
    pub image_kind: ImageKind,
    pub caption: String,
    pub like_count: u64,
    pub liked_by_current_user: bool,
    pub saved_by_current_user: bool,
    pub comments: Vec<Comment>,
    pub created_at: i64,
}

impl Post {
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(self).map_err(|e| CacheError::Storage(format!("serialize: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(format!("post: {e}")))
    }
}

/// Encode a posts collection as the JSON array stored under `community_posts`.
pub fn encode_posts(posts: &[Post]) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(posts).map_err(|e| CacheError::Storage(format!("serialize: {e}")))
}

/// Decode a stored posts collection.
pub fn decode_posts(bytes: &[u8]) -> Result<Vec<Post>, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Decode(format!("posts: {e}")))
}

/// Feed display order: newest first, ties by id ascending.
pub fn feed_order(a: &Post, b: &Post) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// A post as rendered in the feed, with relative-time labels.
///
/// Labels are computed on demand and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub post: Post,
    pub time_ago: String,
    /// One label per entry of `post.comments`, same order.
    pub comment_times: Vec<String>,
}

impl FeedItem {
    pub fn project(post: Post, now: i64) -> Self {
        let time_ago = relative_label(now, post.created_at);
        let comment_times = post
            .comments
            .iter()
            .map(|c| relative_label(now, c.created_at))
            .collect();
        Self {
            post,
            time_ago,
            comment_times,
        }
    }

    /// Comments paired with their labels.
    pub fn comments(&self) -> impl Iterator<Item = (&Comment, &str)> {
        self.post
            .comments
            .iter()
            .zip(self.comment_times.iter().map(String::as_str))
    }
}
