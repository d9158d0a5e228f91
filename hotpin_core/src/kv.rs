//! The transactional key-value store the pin ledger persists into.

use async_trait::async_trait;
use bytes::Bytes;

pub type KvResult<T> = anyhow::Result<T>;

/// Minimal key-value interface the ledger needs.
///
/// # Semantics
///
/// - `put` replaces the whole value of a key atomically. A reader never sees
///   a half-written value.
/// - `delete` of a missing key succeeds.
/// - `scan` returns every `(key, value)` whose key starts with `prefix`, in
///   ascending key order.
///
/// Multi-key transactions are not required; the ledger writes one key per
/// content id.
#[async_trait]
pub trait KvStore: std::fmt::Debug + Send + Sync + 'static {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>>;
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for std::sync::Arc<T> {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        (**self).delete(key).await
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        (**self).scan(prefix).await
    }
}

#[async_trait]
impl<T: KvStore + ?Sized> KvStore for Box<T> {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        (**self).delete(key).await
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        (**self).scan(prefix).await
    }
}

/// Confines another store to the keys below `<namespace>/`.
///
/// Keys passed in and returned from `scan` are relative to the namespace,
/// so several components can share one database without seeing each other.
#[derive(Debug, Clone)]
pub struct Namespaced<K> {
    inner: K,
    prefix: String,
}

impl<K: KvStore> Namespaced<K> {
    pub fn new(inner: K, namespace: &str) -> Self {
        Self {
            inner,
            prefix: format!("{}/", namespace.trim_end_matches('/')),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl<K: KvStore> KvStore for Namespaced<K> {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        self.inner.put(&self.full_key(key), value).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        let entries = self.inner.scan(&self.full_key(prefix)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.prefix)
                    .map(|rel| (rel.to_owned(), value))
            })
            .collect())
    }
}
