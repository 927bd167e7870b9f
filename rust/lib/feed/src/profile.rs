use std::sync::Arc;

use feedcache_kv::KVStore;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::User;

/// Supplies the identity mutations are attributed to.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> User;
}

impl IdentityProvider for User {
    fn current_user(&self) -> User {
        self.clone()
    }
}

/// The local identity used until a profile has been saved.
pub fn default_user() -> User {
    User {
        id: "current_user".into(),
        name: "You".into(),
        username: "your_username".into(),
        avatar_url: "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?w=150&h=150&fit=crop&crop=face".into(),
    }
}

/// Reads and writes the local user profile under `user_profile`.
pub struct ProfileStore {
    kv: Arc<dyn KVStore>,
    key: String,
}

impl ProfileStore {
    pub fn new(kv: Arc<dyn KVStore>, config: &CacheConfig) -> Self {
        Self {
            kv,
            key: config.profile_key.clone(),
        }
    }

    /// Load the stored profile.
    ///
    /// An absent or undecodable profile yields `default_user()`; only a
    /// failing store read is an error.
    pub async fn load(&self) -> Result<User, CacheError> {
        let Some(bytes) = self.kv.get(&self.key).await? else {
            debug!("no stored profile under '{}', using default identity", self.key);
            return Ok(default_user());
        };
        match serde_json::from_slice::<User>(&bytes) {
            Ok(user) => Ok(user),
            Err(e) => {
                warn!("stored profile under '{}' is corrupt ({}), using default identity", self.key, e);
                Ok(default_user())
            }
        }
    }

    pub async fn save(&self, user: &User) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(user)
            .map_err(|e| CacheError::Storage(format!("serialize: {e}")))?;
        self.kv.set(&self.key, &bytes).await?;
        debug!("saved profile '{}'", user.id);
        Ok(())
    }
}
