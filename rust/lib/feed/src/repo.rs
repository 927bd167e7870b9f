//! CacheRepository — owner of the in-memory feed and its persisted copy.
//!
//! The whole posts collection is one JSON array under `community_posts`.
//! Every in-memory change is written through before the call returns.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use feedcache_kv::KVStore;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::{decode_posts, encode_posts, feed_order, Comment, FeedItem, Post};
use crate::observer::{Observers, SubscriptionId};
use crate::seed::seed_posts;

#[derive(Default)]
struct FeedState {
    posts: BTreeMap<String, Post>,
    /// Posts with local mutations a sync has not acknowledged yet.
    pending: BTreeSet<String>,
}

/// The canonical in-memory feed.
///
/// Reads (`snapshot`, `feed`, `get`) never suspend and always return copies.
/// Writes are serialized by an async gate held across the in-memory change
/// and the store write, so writes land in the store in issue order.
pub struct CacheRepository {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    state: RwLock<FeedState>,
    write_gate: Mutex<()>,
    observers: Observers,
}

fn sorted(posts: &BTreeMap<String, Post>) -> Vec<Post> {
    let mut out: Vec<Post> = posts.values().cloned().collect();
    out.sort_by(feed_order);
    out
}

impl CacheRepository {
    pub fn new(kv: Arc<dyn KVStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            kv,
            clock,
            config,
            state: RwLock::new(FeedState::default()),
            write_gate: Mutex::new(()),
            observers: Observers::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, FeedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FeedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ====================================================================
    // Load
    // ====================================================================

    /// Load the feed from the store.
    ///
    /// - absent key: seed, then persist the seed.
    /// - undecodable blob: log, seed, persist (the corrupt blob is replaced).
    /// - store read failure: returned as `Storage`, in-memory state untouched
    ///   and nothing written, so a later retry can still see the stored blob.
    ///
    /// A persist failure after seeding is returned as `Storage`; the seeded
    /// feed stays in memory.
    pub async fn load(&self) -> Result<Vec<Post>, CacheError> {
        let _gate = self.write_gate.lock().await;
        let key = self.config.posts_key.as_str();

        let stored = match self.kv.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("reading cached posts under '{}' failed: {}", key, e);
                return Err(e.into());
            }
        };

        let (posts, reseeded) = match stored {
            None => {
                info!("no cached posts under '{}', seeding", key);
                (self.fallback_posts(), true)
            }
            Some(bytes) => match decode_posts(&bytes) {
                Ok(posts) => {
                    debug!("loaded {} posts from '{}'", posts.len(), key);
                    (posts, false)
                }
                Err(e) => {
                    warn!("cached posts under '{}' are corrupt ({}), reseeding", key, e);
                    (self.fallback_posts(), true)
                }
            },
        };

        let snapshot = self.replace_all(posts);
        if reseeded {
            self.flush().await?;
        }
        Ok(snapshot)
    }

    fn fallback_posts(&self) -> Vec<Post> {
        if self.config.seed_on_empty {
            seed_posts(self.clock.now_millis())
        } else {
            Vec::new()
        }
    }

    fn replace_all(&self, posts: Vec<Post>) -> Vec<Post> {
        let snapshot = {
            let mut state = self.write_state();
            state.posts.clear();
            state.pending.clear();
            for post in posts {
                if let Some(prev) = state.posts.insert(post.id.clone(), post) {
                    debug!("duplicate post id '{}' in stored feed, keeping the later entry", prev.id);
                }
            }
            sorted(&state.posts)
        };
        self.observers.notify(&snapshot);
        snapshot
    }

    // ====================================================================
    // Reads
    // ====================================================================

    /// All posts, newest first (ties by id). A copy; never live state.
    pub fn snapshot(&self) -> Vec<Post> {
        sorted(&self.read_state().posts)
    }

    /// The snapshot with relative-time labels computed against now.
    pub fn feed(&self) -> Vec<FeedItem> {
        let now = self.clock.now_millis();
        self.snapshot()
            .into_iter()
            .map(|post| FeedItem::project(post, now))
            .collect()
    }

    /// Posts the current user has saved, in feed order.
    pub fn saved(&self) -> Vec<Post> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.saved_by_current_user)
            .collect()
    }

    pub fn get(&self, post_id: &str) -> Option<Post> {
        self.read_state().posts.get(post_id).cloned()
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.read_state().posts.contains_key(post_id)
    }

    pub fn len(&self) -> usize {
        self.read_state().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ====================================================================
    // Writes
    // ====================================================================

    /// Insert or replace a post by id, then persist.
    ///
    /// The in-memory change stands even if the persist fails.
    pub async fn upsert(&self, post: Post) -> Result<Vec<Post>, CacheError> {
        let _gate = self.write_gate.lock().await;
        self.commit(post, false).await
    }

    /// Write the full collection to the store.
    pub async fn persist(&self) -> Result<(), CacheError> {
        let _gate = self.write_gate.lock().await;
        self.flush().await
    }

    /// Acquire the write gate. Mutations hold it across read-modify-write.
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Apply a locally-originated change. Caller holds the write gate.
    pub(crate) async fn commit_local(&self, post: Post) -> Result<Vec<Post>, CacheError> {
        self.commit(post, true).await
    }

    async fn commit(&self, post: Post, local: bool) -> Result<Vec<Post>, CacheError> {
        let snapshot = {
            let mut state = self.write_state();
            if local {
                state.pending.insert(post.id.clone());
            }
            state.posts.insert(post.id.clone(), post);
            sorted(&state.posts)
        };
        self.observers.notify(&snapshot);
        self.flush().await?;
        Ok(snapshot)
    }

    /// Serialize the current collection and write it. Caller holds the gate.
    async fn flush(&self) -> Result<(), CacheError> {
        let key = self.config.posts_key.as_str();
        let (count, bytes) = {
            let state = self.read_state();
            let posts = sorted(&state.posts);
            (posts.len(), encode_posts(&posts)?)
        };
        match self.kv.set(key, &bytes).await {
            Ok(()) => {
                debug!("persisted {} posts ({} bytes) to '{}'", count, bytes.len(), key);
                Ok(())
            }
            Err(e) => {
                warn!("persisting {} posts to '{}' failed: {}", count, key, e);
                Err(e.into())
            }
        }
    }

    // ====================================================================
    // Sync reconciliation
    // ====================================================================

    /// Reconcile freshly-fetched server posts into the local feed.
    ///
    /// New ids are inserted; local-only posts are kept. For a post on both
    /// sides, the server copy wins except that `created_at` never changes and,
    /// while the post has unacknowledged local edits, the local like/save
    /// state and like count win. Comments are unioned by id, server order
    /// first, then local-only comments in local order.
    pub async fn merge_remote(&self, remote: Vec<Post>) -> Result<Vec<Post>, CacheError> {
        let _gate = self.write_gate.lock().await;
        let incoming = remote.len();
        let snapshot = {
            let mut state = self.write_state();
            for theirs in remote {
                let merged = match state.posts.get(&theirs.id) {
                    Some(ours) => merge_post(ours, theirs, state.pending.contains(&ours.id)),
                    None => theirs,
                };
                state.posts.insert(merged.id.clone(), merged);
            }
            sorted(&state.posts)
        };
        debug!("merged {} remote posts, feed now has {}", incoming, snapshot.len());
        self.observers.notify(&snapshot);
        self.flush().await?;
        Ok(snapshot)
    }

    /// Ids of posts with local edits not yet acknowledged by a sync.
    pub fn pending_ids(&self) -> Vec<String> {
        self.read_state().pending.iter().cloned().collect()
    }

    /// Mark posts as synced; later merges take the server's like/save state.
    pub fn acknowledge<I, S>(&self, post_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.write_state();
        for id in post_ids {
            state.pending.remove(id.as_ref());
        }
    }

    // ====================================================================
    // Observers
    // ====================================================================

    /// Register a handler called with the ordered snapshot after every change.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[Post]) + Send + Sync + 'static,
    {
        self.observers.subscribe(handler)
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}

fn merge_post(ours: &Post, theirs: Post, pending: bool) -> Post {
    let mut merged = theirs;
    merged.created_at = ours.created_at;
    if pending {
        merged.liked_by_current_user = ours.liked_by_current_user;
        merged.saved_by_current_user = ours.saved_by_current_user;
        merged.like_count = ours.like_count;
    }
    merged.comments = merge_comments(&ours.comments, std::mem::take(&mut merged.comments));
    merged
}

fn merge_comments(ours: &[Comment], theirs: Vec<Comment>) -> Vec<Comment> {
    let mut seen = HashSet::with_capacity(ours.len() + theirs.len());
    let mut out = Vec::with_capacity(ours.len() + theirs.len());
    for c in theirs {
        if seen.insert(c.id.clone()) {
            out.push(c);
        }
    }
    for c in ours {
        if seen.insert(c.id.clone()) {
            out.push(c.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{ImageKind, User};
    use feedcache_kv::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: i64 = 1_760_000_000_000;

    fn make_repo() -> (CacheRepository, Arc<MemoryStore>, Arc<FixedClock>) {
        make_repo_with(CacheConfig::default())
    }

    fn make_repo_with(config: CacheConfig) -> (CacheRepository, Arc<MemoryStore>, Arc<FixedClock>) {
        let mem = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(NOW));
        let repo = CacheRepository::new(mem.clone(), clock.clone(), config);
        (repo, mem, clock)
    }

    fn stored_posts(mem: &MemoryStore) -> Vec<Post> {
        decode_posts(&mem.get_raw("community_posts").unwrap()).unwrap()
    }

    fn post(id: &str, created_at: i64) -> Post {
        Post {
            id: id.into(),
            author: User {
                id: "u9".into(),
                name: "Test".into(),
                username: "tester".into(),
                avatar_url: String::new(),
            },
            image_data: "https://example.com/p.jpg".into(),
            image_kind: ImageKind::Url,
            caption: format!("post {id}"),
            like_count: 10,
            liked_by_current_user: false,
            saved_by_current_user: false,
            comments: Vec::new(),
            created_at,
        }
    }

    fn comment(id: &str, text: &str) -> Comment {
        Comment {
            id: id.into(),
            author_id: "u9".into(),
            author_username: "tester".into(),
            text: text.into(),
            created_at: NOW,
        }
    }

    // ========================================================================
    // load
    // ========================================================================

    #[tokio::test]
    async fn load_absent_seeds_and_persists() {
        let (repo, mem, _clock) = make_repo();
        let loaded = repo.load().await.unwrap();

        assert_eq!(loaded, seed_posts(NOW));
        assert_eq!(repo.snapshot(), loaded);
        assert_eq!(stored_posts(&mem), loaded);
    }

    #[tokio::test]
    async fn load_reads_existing_blob() {
        let (repo, mem, _clock) = make_repo();
        let posts = vec![post("a", NOW - 10), post("b", NOW - 5)];
        mem.insert_raw("community_posts", &encode_posts(&posts).unwrap());

        let loaded = repo.load().await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        // Clean load does not rewrite the blob.
        assert_eq!(mem.write_count(), 0);
    }

    #[tokio::test]
    async fn load_present_but_empty_is_not_seeded() {
        let (repo, mem, _clock) = make_repo();
        mem.insert_raw("community_posts", b"[]");
        assert!(repo.load().await.unwrap().is_empty());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_blob_reseeds() {
        let (repo, mem, _clock) = make_repo();
        mem.insert_raw("community_posts", b"[{\"id\": 1}]");

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(stored_posts(&mem), loaded);
    }

    #[tokio::test]
    async fn load_read_failure_leaves_store_alone() {
        let (repo, mem, _clock) = make_repo();
        mem.insert_raw("community_posts", &encode_posts(&[post("a", 1)]).unwrap());
        mem.fail_reads(true);

        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, CacheError::Storage(_)));
        assert!(repo.is_empty());
        assert_eq!(mem.write_count(), 0);

        mem.fail_reads(false);
        assert_eq!(repo.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_seed_persist_failure_keeps_seed_in_memory() {
        let (repo, mem, _clock) = make_repo();
        mem.fail_writes(true);

        let err = repo.load().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(repo.len(), 3);
    }

    #[tokio::test]
    async fn load_without_seeding_starts_empty() {
        let config = CacheConfig {
            seed_on_empty: false,
            ..CacheConfig::default()
        };
        let (repo, mem, _clock) = make_repo_with(config);
        assert!(repo.load().await.unwrap().is_empty());
        assert_eq!(mem.get_raw("community_posts"), Some(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn load_uses_configured_key() {
        let config = CacheConfig {
            posts_key: "feed_v2".into(),
            ..CacheConfig::default()
        };
        let (repo, mem, _clock) = make_repo_with(config);
        repo.load().await.unwrap();
        assert!(mem.get_raw("feed_v2").is_some());
        assert!(mem.get_raw("community_posts").is_none());
    }

    #[tokio::test]
    async fn load_legacy_blob_without_image_kind() {
        let (repo, mem, _clock) = make_repo();
        let legacy = serde_json::json!([{
            "id": "old",
            "author": {"id": "u1", "name": "A", "username": "a", "avatarUrl": ""},
            "imageData": "https://example.com/x.jpg",
            "caption": "from before inline images",
            "likeCount": 0,
            "likedByCurrentUser": false,
            "savedByCurrentUser": false,
            "comments": [],
            "createdAt": 5
        }]);
        mem.insert_raw("community_posts", &serde_json::to_vec(&legacy).unwrap());

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].image_kind, ImageKind::Url);
    }

    #[tokio::test]
    async fn load_replaces_previous_state() {
        let (repo, mem, _clock) = make_repo();
        repo.load().await.unwrap();
        mem.insert_raw("community_posts", &encode_posts(&[post("only", 1)]).unwrap());
        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(repo.get("1").is_none());
    }

    // ========================================================================
    // reads
    // ========================================================================

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let (repo, _mem, _clock) = make_repo();
        repo.load().await.unwrap();

        let mut snap = repo.snapshot();
        snap[0].like_count = 0;
        snap.clear();

        assert_eq!(repo.snapshot().len(), 3);
        assert_eq!(repo.get("1").unwrap().like_count, 1247);
    }

    #[tokio::test]
    async fn snapshot_ties_break_on_id() {
        let (repo, _mem, _clock) = make_repo();
        repo.upsert(post("b", 100)).await.unwrap();
        repo.upsert(post("a", 100)).await.unwrap();
        repo.upsert(post("c", 50)).await.unwrap();
        let ids: Vec<String> = repo.snapshot().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn feed_labels_follow_the_clock() {
        let (repo, _mem, clock) = make_repo();
        repo.load().await.unwrap();

        let labels: Vec<String> = repo.feed().into_iter().map(|i| i.time_ago).collect();
        assert_eq!(labels, ["2h", "4h", "6h"]);

        clock.advance(86_400_000);
        let labels: Vec<String> = repo.feed().into_iter().map(|i| i.time_ago).collect();
        assert_eq!(labels, ["1d", "1d", "1d"]);
    }

    #[tokio::test]
    async fn feed_survives_extreme_stored_timestamps() {
        let (repo, mem, _clock) = make_repo();
        let mut old = post("old", i64::MIN);
        old.comments.push(comment("c1", "first"));
        old.comments[0].created_at = i64::MIN;
        mem.insert_raw(
            "community_posts",
            &encode_posts(&[old, post("future", i64::MAX)]).unwrap(),
        );
        assert_eq!(repo.load().await.unwrap().len(), 2);

        let feed = repo.feed();
        assert_eq!(feed[0].post.id, "future");
        assert_eq!(feed[0].time_ago, "now");
        assert!(feed[1].time_ago.ends_with('d'));
        assert!(feed[1].comment_times[0].ends_with('d'));
    }

    #[tokio::test]
    async fn saved_filters_in_feed_order() {
        let (repo, _mem, _clock) = make_repo();
        repo.load().await.unwrap();
        let saved: Vec<String> = repo.saved().into_iter().map(|p| p.id).collect();
        assert_eq!(saved, ["2"]);
    }

    // ========================================================================
    // upsert / persist
    // ========================================================================

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let (repo, mem, _clock) = make_repo();
        repo.upsert(post("x", 1)).await.unwrap();

        let mut changed = post("x", 1);
        changed.caption = "edited".into();
        let snap = repo.upsert(changed).await.unwrap();

        assert_eq!(snap.len(), 1);
        assert_eq!(repo.get("x").unwrap().caption, "edited");
        assert_eq!(stored_posts(&mem)[0].caption, "edited");
        assert_eq!(mem.write_count(), 2);
    }

    #[tokio::test]
    async fn upsert_persist_failure_keeps_memory() {
        let (repo, mem, _clock) = make_repo();
        mem.fail_writes(true);

        let err = repo.upsert(post("x", 1)).await.unwrap_err();
        assert!(matches!(err, CacheError::Storage(_)));
        assert!(repo.contains("x"));
        assert!(mem.get_raw("community_posts").is_none());

        mem.fail_writes(false);
        repo.persist().await.unwrap();
        assert_eq!(stored_posts(&mem).len(), 1);
    }

    #[tokio::test]
    async fn upsert_is_not_a_pending_local_edit() {
        let (repo, _mem, _clock) = make_repo();
        repo.upsert(post("x", 1)).await.unwrap();
        assert!(repo.pending_ids().is_empty());
    }

    // ========================================================================
    // merge_remote
    // ========================================================================

    #[tokio::test]
    async fn merge_inserts_new_and_keeps_local_only() {
        let (repo, mem, _clock) = make_repo();
        repo.upsert(post("local", 10)).await.unwrap();

        let snap = repo.merge_remote(vec![post("remote", 20)]).await.unwrap();
        let ids: Vec<&str> = snap.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["remote", "local"]);
        assert_eq!(stored_posts(&mem).len(), 2);
    }

    #[tokio::test]
    async fn merge_remote_wins_without_pending_edits() {
        let (repo, _mem, _clock) = make_repo();
        repo.upsert(post("p", 10)).await.unwrap();

        let mut theirs = post("p", 999);
        theirs.like_count = 42;
        theirs.liked_by_current_user = true;
        theirs.caption = "server caption".into();
        repo.merge_remote(vec![theirs]).await.unwrap();

        let merged = repo.get("p").unwrap();
        assert_eq!(merged.like_count, 42);
        assert!(merged.liked_by_current_user);
        assert_eq!(merged.caption, "server caption");
        assert_eq!(merged.created_at, 10);
    }

    #[tokio::test]
    async fn merge_keeps_pending_local_toggles() {
        let (repo, _mem, _clock) = make_repo();
        let mut ours = post("p", 10);
        ours.like_count = 11;
        ours.liked_by_current_user = true;
        ours.saved_by_current_user = true;
        {
            let _gate = repo.lock_writes().await;
            repo.commit_local(ours).await.unwrap();
        }
        assert_eq!(repo.pending_ids(), ["p"]);

        let mut theirs = post("p", 10);
        theirs.caption = "server caption".into();
        repo.merge_remote(vec![theirs.clone()]).await.unwrap();

        let merged = repo.get("p").unwrap();
        assert_eq!(merged.like_count, 11);
        assert!(merged.liked_by_current_user);
        assert!(merged.saved_by_current_user);
        assert_eq!(merged.caption, "server caption");

        repo.acknowledge(["p"]);
        assert!(repo.pending_ids().is_empty());
        repo.merge_remote(vec![theirs]).await.unwrap();
        let merged = repo.get("p").unwrap();
        assert_eq!(merged.like_count, 10);
        assert!(!merged.liked_by_current_user);
    }

    #[tokio::test]
    async fn merge_unions_comments_without_duplicates() {
        let (repo, _mem, _clock) = make_repo();
        let mut ours = post("p", 10);
        ours.comments = vec![comment("c1", "first"), comment("local", "mine")];
        repo.upsert(ours).await.unwrap();

        let mut theirs = post("p", 10);
        theirs.comments = vec![comment("c1", "first"), comment("c2", "second")];
        repo.merge_remote(vec![theirs.clone(), theirs]).await.unwrap();

        let ids: Vec<String> = repo.get("p").unwrap().comments.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["c1", "c2", "local"]);
    }

    #[tokio::test]
    async fn merge_persist_failure_keeps_merged_state() {
        let (repo, mem, _clock) = make_repo();
        mem.fail_writes(true);
        assert!(repo.merge_remote(vec![post("r", 1)]).await.is_err());
        assert!(repo.contains("r"));
    }

    // ========================================================================
    // observers
    // ========================================================================

    #[tokio::test]
    async fn observers_see_every_change() {
        let (repo, mem, _clock) = make_repo();
        let calls = Arc::new(AtomicUsize::new(0));
        let last_len = Arc::new(AtomicUsize::new(0));
        let (c, l) = (calls.clone(), last_len.clone());
        let id = repo.subscribe(move |snap| {
            c.fetch_add(1, Ordering::SeqCst);
            l.store(snap.len(), Ordering::SeqCst);
        });

        repo.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(last_len.load(Ordering::SeqCst), 3);

        // Notified even when the write fails: the change is visible.
        mem.fail_writes(true);
        let _ = repo.upsert(post("x", 1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(last_len.load(Ordering::SeqCst), 4);

        assert!(repo.unsubscribe(id));
        mem.fail_writes(false);
        repo.upsert(post("y", 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
