//! On-device key-value storage for the feed cache.
//!
//! Each top-level collection lives under its own key as one opaque blob.
//! There is no transactionality across keys.

pub mod error;
pub mod memory;
pub mod redb;
pub mod traits;

pub use error::KVError;
pub use memory::MemoryStore;
pub use redb::RedbStore;
pub use traits::KVStore;
