//! RedbKv - A local key-value store backed by redb.

use bytes::Bytes;
use hotpin_core::kv::{KvResult, KvStore};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::{path::Path, sync::Arc};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");
const DB_FILE_NAME: &str = "hotpin.redb";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RedbKvConfig {
    /// Directory holding the database file.
    pub path: String,
}

/// `KvStore` implementation backed by a Redb database.
///
/// Every `put` and `delete` is its own committed write transaction.
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let db = Database::create(path.join(DB_FILE_NAME))?;

        // Create the table up front so a first `scan` on a fresh database
        // does not fail with a missing table.
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TABLE)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    pub fn create(config: &RedbKvConfig) -> anyhow::Result<Self> {
        Self::open(&config.path)
    }
}

impl std::fmt::Debug for RedbKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKv").finish()
    }
}

#[async_trait::async_trait]
impl KvStore for RedbKv {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        let db = self.db.clone();
        let key = key.to_owned();

        tokio::task::spawn_blocking(move || -> KvResult<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.insert(key.as_str(), value.as_ref())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb write task failed: {}", e))?
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let db = self.db.clone();
        let key = key.to_owned();

        tokio::task::spawn_blocking(move || -> KvResult<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb delete task failed: {}", e))?
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        let db = self.db.clone();
        let prefix = prefix.to_owned();

        tokio::task::spawn_blocking(move || -> KvResult<Vec<(String, Bytes)>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;

            let mut out = Vec::new();
            for item in table.range(prefix.as_str()..)? {
                let (key, value) = item?;
                let key = key.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                out.push((key.to_owned(), Bytes::copy_from_slice(value.value())));
            }
            Ok(out)
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb scan task failed: {}", e))?
    }
}
