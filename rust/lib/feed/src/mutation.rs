//! Optimistic feed mutations.
//!
//! Each operation validates, then under the repository's write gate reads the
//! current post, computes the new value, applies it in memory and writes the
//! whole feed through. A failed write is returned as `CacheError::Storage`
//! but the in-memory change is kept: visible now, maybe not after restart.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::error::CacheError;
use crate::ids::new_unique_id;
use crate::model::{Comment, ImageKind, Post, User};
use crate::profile::IdentityProvider;
use crate::repo::CacheRepository;

/// Applies user actions to the feed.
pub struct MutationEngine {
    repo: Arc<CacheRepository>,
    identity: Arc<dyn IdentityProvider>,
}

impl MutationEngine {
    pub fn new(repo: Arc<CacheRepository>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { repo, identity }
    }

    pub fn repo(&self) -> &Arc<CacheRepository> {
        &self.repo
    }

    /// Read-modify-write one post under the write gate.
    async fn mutate<F>(&self, post_id: &str, op: &str, f: F) -> Result<Vec<Post>, CacheError>
    where
        F: FnOnce(&mut Post),
    {
        let _gate = self.repo.lock_writes().await;
        let mut post = self
            .repo
            .get(post_id)
            .ok_or_else(|| CacheError::NotFound(format!("post '{post_id}' not found")))?;
        f(&mut post);
        debug!("{} on post '{}'", op, post_id);
        self.repo.commit_local(post).await
    }

    // ====================================================================
    // Toggles
    // ====================================================================

    /// Flip the current user's like; the count moves by exactly one.
    ///
    /// Two toggles cancel out. Callers retrying after an error must know
    /// whether their first call applied.
    pub async fn toggle_like(
        &self,
        post_id: &str,
        current_user_id: &str,
    ) -> Result<Vec<Post>, CacheError> {
        debug!("user '{}' toggles like", current_user_id);
        self.mutate(post_id, "toggle_like", |post| {
            post.liked_by_current_user = !post.liked_by_current_user;
            if post.liked_by_current_user {
                post.like_count += 1;
            } else {
                post.like_count = post.like_count.saturating_sub(1);
            }
        })
        .await
    }

    /// `toggle_like` as the current identity.
    pub async fn toggle_like_as_current(&self, post_id: &str) -> Result<Vec<Post>, CacheError> {
        let me = self.identity.current_user();
        self.toggle_like(post_id, &me.id).await
    }

    /// Flip the current user's save. No count changes.
    pub async fn toggle_save(&self, post_id: &str) -> Result<Vec<Post>, CacheError> {
        self.mutate(post_id, "toggle_save", |post| {
            post.saved_by_current_user = !post.saved_by_current_user;
        })
        .await
    }

    // ====================================================================
    // Comments
    // ====================================================================

    /// Append a comment. Existing comments are never touched.
    pub async fn add_comment(
        &self,
        post_id: &str,
        text: &str,
        author: &User,
    ) -> Result<Vec<Post>, CacheError> {
        self.validate_comment(text)?;
        let now = self.repo.now_millis();
        self.mutate(post_id, "add_comment", |post| {
            let id = new_unique_id(now, |id| post.comments.iter().any(|c| c.id == id));
            post.comments.push(Comment {
                id,
                author_id: author.id.clone(),
                author_username: author.username.clone(),
                text: text.to_string(),
                created_at: now,
            });
        })
        .await
    }

    /// `add_comment` as the current identity.
    pub async fn add_comment_as_current(
        &self,
        post_id: &str,
        text: &str,
    ) -> Result<Vec<Post>, CacheError> {
        let me = self.identity.current_user();
        self.add_comment(post_id, text, &me).await
    }

    fn validate_comment(&self, text: &str) -> Result<(), CacheError> {
        if text.trim().is_empty() {
            return Err(CacheError::Validation("write a comment first".into()));
        }
        let max = self.repo.config().max_comment_len;
        if text.chars().count() > max {
            return Err(CacheError::Validation(format!(
                "comments can be at most {max} characters"
            )));
        }
        Ok(())
    }

    // ====================================================================
    // Posts
    // ====================================================================

    /// Create a post that sorts first (`created_at = now`).
    ///
    /// `image` is a URL for `ImageKind::Url` or base64 (optionally a
    /// `data:<mime>;base64,` URI) for `ImageKind::Inline`. It is stored as
    /// given; only its validity is checked.
    pub async fn create_post(
        &self,
        caption: &str,
        image: Option<&str>,
        image_kind: ImageKind,
        author: &User,
    ) -> Result<Vec<Post>, CacheError> {
        self.validate_caption(caption)?;
        let image = validate_image(image, image_kind)?;

        let _gate = self.repo.lock_writes().await;
        let now = self.repo.now_millis();
        let id = new_unique_id(now, |id| self.repo.contains(id));
        debug!("create_post '{}' by '{}' ({:?} image)", id, author.id, image_kind);
        let post = Post {
            id,
            author: author.clone(),
            image_data: image.to_string(),
            image_kind,
            caption: caption.to_string(),
            like_count: 0,
            liked_by_current_user: false,
            saved_by_current_user: false,
            comments: Vec::new(),
            created_at: now,
        };
        self.repo.commit_local(post).await
    }

    /// `create_post` as the current identity.
    pub async fn create_post_as_current(
        &self,
        caption: &str,
        image: Option<&str>,
        image_kind: ImageKind,
    ) -> Result<Vec<Post>, CacheError> {
        let me = self.identity.current_user();
        self.create_post(caption, image, image_kind, &me).await
    }

    fn validate_caption(&self, caption: &str) -> Result<(), CacheError> {
        if caption.trim().is_empty() {
            return Err(CacheError::Validation("add a caption first".into()));
        }
        let max = self.repo.config().max_caption_len;
        if caption.chars().count() > max {
            return Err(CacheError::Validation(format!(
                "captions can be at most {max} characters"
            )));
        }
        Ok(())
    }
}

fn validate_image(image: Option<&str>, kind: ImageKind) -> Result<&str, CacheError> {
    let image = match image {
        Some(image) if !image.trim().is_empty() => image,
        _ => return Err(CacheError::Validation("add a photo first".into())),
    };
    if kind == ImageKind::Inline {
        let payload = inline_payload(image)
            .ok_or_else(|| CacheError::Validation("the photo could not be read".into()))?;
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.is_empty() || STANDARD.decode(compact.as_bytes()).is_err() {
            return Err(CacheError::Validation("the photo could not be read".into()));
        }
    }
    Ok(image)
}

/// The base64 part of an inline image, with any `data:` URI header removed.
fn inline_payload(image: &str) -> Option<&str> {
    match image.strip_prefix("data:") {
        Some(uri) => uri.split_once(";base64,").map(|(_, payload)| payload),
        None => Some(image),
    }
}
