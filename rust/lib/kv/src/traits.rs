use crate::error::KVError;

/// KVStore is the persistent store adapter the cache writes through.
///
/// Keys name whole collections (`community_posts`, `user_profile`); values are
/// opaque bytes (JSON in practice). Both operations may suspend. A missing key
/// is `Ok(None)`, which callers must keep distinct from a present-but-empty
/// value. Write failures are reported, never retried here.
#[async_trait::async_trait]
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Replace the value for a key. The whole value is written or nothing is.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KVError>;
}
