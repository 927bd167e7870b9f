//! Local-first cache for the community feed.
//!
//! The feed (posts, each owning its comments) lives in memory and is written
//! through to an on-device key-value store after every change. Reads are
//! served from memory; user actions apply optimistically; server results are
//! merged in without losing unacknowledged local edits.
//!
//! ```ignore
//! let kv: Arc<dyn KVStore> = Arc::new(open_redb(&config)?);
//! let me = ProfileStore::new(kv.clone(), &config).load().await?;
//! let repo = Arc::new(CacheRepository::new(kv, Arc::new(SystemClock), config));
//! repo.load().await?;
//!
//! let engine = MutationEngine::new(repo.clone(), Arc::new(me));
//! match engine.toggle_like_as_current("1").await {
//!     Ok(feed) => render(&feed),
//!     // Visible now, may not survive a restart.
//!     Err(e) if e.is_recoverable() => { warn_user(&e); render(&repo.snapshot()) }
//!     Err(e) => show_message(&e.to_string()),
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod mutation;
pub mod observer;
pub mod profile;
pub mod repo;
pub mod seed;

pub use clock::{relative_label, Clock, FixedClock, SystemClock};
pub use config::{open_redb, CacheConfig, POSTS_KEY, PROFILE_KEY};
pub use error::CacheError;
pub use ids::new_id;
pub use model::{decode_posts, encode_posts, Comment, FeedItem, ImageKind, Post, User};
pub use mutation::MutationEngine;
pub use observer::{SnapshotHandler, SubscriptionId};
pub use profile::{default_user, IdentityProvider, ProfileStore};
pub use repo::CacheRepository;
pub use seed::seed_posts;

pub use feedcache_kv::{KVError, KVStore, MemoryStore, RedbStore};
