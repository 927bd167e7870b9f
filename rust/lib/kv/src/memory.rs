use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::KVError;
use crate::traits::KVStore;

/// MemoryStore is a volatile KVStore for tests and previews.
///
/// Reads and writes can be made to fail on demand to exercise the cache's
/// storage-error paths. Failed writes leave the stored value untouched.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get` calls fail with `KVError::Storage`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `set`/`delete` calls fail with `KVError::Storage`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Insert a raw value, bypassing failure injection. Used to plant corrupt
    /// or legacy blobs in tests.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_vec());
    }

    /// Read a raw value, bypassing failure injection.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl KVStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(KVError::Storage(format!("injected read failure for '{key}'")));
        }
        Ok(self.get_raw(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KVError::Storage(format!("injected write failure for '{key}'")));
        }
        self.insert_raw(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KVError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KVError::Storage(format!("injected write failure for '{key}'")));
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
