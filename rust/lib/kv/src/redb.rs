use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};
use tracing::debug;

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// RedbStore is a KVStore implementation backed by redb — a pure-Rust embedded
/// key-value database. Every `set` is its own committed write transaction, so
/// a blob is either fully replaced or left untouched.
///
/// redb is synchronous; each call runs on the blocking thread pool so the
/// async caller never stalls the runtime. A write that has been started runs
/// to completion even if the awaiting future is dropped.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

fn storage_err(e: impl std::fmt::Display) -> KVError {
    KVError::Storage(e.to_string())
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(storage_err)?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        debug!("RedbStore: opened {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }

    fn get_blocking(db: &Database, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TABLE).map_err(storage_err)?;

        match table.get(key) {
            Ok(Some(val)) => Ok(Some(val.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    fn set_blocking(db: &Database, key: &str, value: &[u8]) -> Result<(), KVError> {
        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            table.insert(key, value).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn delete_blocking(db: &Database, key: &str) -> Result<(), KVError> {
        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage_err)?;
            table.remove(key).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl KVStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&db, &key))
            .await
            .map_err(storage_err)?
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || Self::set_blocking(&db, &key, &value))
            .await
            .map_err(storage_err)?
    }

    async fn delete(&self, key: &str) -> Result<(), KVError> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::delete_blocking(&db, &key))
            .await
            .map_err(storage_err)?
    }
}
