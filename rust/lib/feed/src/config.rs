use std::path::PathBuf;

use feedcache_kv::RedbStore;
use tracing::info;

use crate::error::CacheError;

/// Storage key of the posts collection.
pub const POSTS_KEY: &str = "community_posts";
/// Storage key of the local identity.
pub const PROFILE_KEY: &str = "user_profile";

const DEFAULT_DB_FILE: &str = "feedcache.redb";

/// Feed cache configuration.
///
/// The host app builds this in code; there is no CLI or environment layer.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key under which the posts collection is stored.
    pub posts_key: String,

    /// Key under which the local user profile is stored.
    pub profile_key: String,

    /// Seed the demo dataset when the posts key is absent or corrupt.
    /// When false the cache starts empty (and still persists the empty list).
    pub seed_on_empty: bool,

    /// Maximum caption length, in chars.
    pub max_caption_len: usize,

    /// Maximum comment length, in chars.
    pub max_comment_len: usize,

    /// Path to the redb database file.
    /// Defaults to `feedcache.redb` in the working directory if not specified.
    pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            posts_key: POSTS_KEY.to_string(),
            profile_key: PROFILE_KEY.to_string(),
            seed_on_empty: true,
            max_caption_len: 500,
            max_comment_len: 2200,
            db_path: None,
        }
    }
}

impl CacheConfig {
    /// Defaults with an explicit database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// The configured database path, or the default file name.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }
}

/// Open the on-device redb store the config points at.
pub fn open_redb(config: &CacheConfig) -> Result<RedbStore, CacheError> {
    let path = config.resolved_db_path();
    let store = RedbStore::open(&path)?;
    info!("feed cache storage at {:?}", path);
    Ok(store)
}
