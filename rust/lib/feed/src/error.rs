use feedcache_kv::KVError;
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. The presentation layer matches on
// these, never on the human-readable message string.

pub mod error_code {
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

// ── CacheError ──────────────────────────────────────────────────────

/// Errors surfaced by the feed cache.
///
/// `Storage` returned from a mutation means the change IS visible in memory
/// but may not survive a restart. `Validation` and `NotFound` mean nothing
/// changed. `Decode` is recovered internally by `load()` and only reaches
/// callers through the explicit `decode_*` functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Persistent store read/write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored JSON does not match the entity shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Caller input failed a precondition. The message is user-facing.
    #[error("{0}")]
    Validation(String),

    /// Referenced id is not in the in-memory collection.
    #[error("{0}")]
    NotFound(String),
}

impl CacheError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            CacheError::Storage(_) => error_code::STORAGE_ERROR,
            CacheError::Decode(_) => error_code::DECODE_ERROR,
            CacheError::Validation(_) => error_code::VALIDATION_FAILED,
            CacheError::NotFound(_) => error_code::NOT_FOUND,
        }
    }

    /// True when the in-memory change went through and only durability is in
    /// doubt. The UI should warn, not block.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::Storage(_))
    }
}

impl From<KVError> for CacheError {
    fn from(e: KVError) -> Self {
        CacheError::Storage(e.to_string())
    }
}
