//! Test utilities for `KvStore` implementations and time-dependent code.
//!
//! # Usage
//!
//! In your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! hotpin_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use hotpin_core::testutil::KvStoreTests;
//!
//! #[tokio::test]
//! async fn test_my_kv() {
//!     let kv = MyKv::new(...);
//!     KvStoreTests::new(&kv).run_all().await.unwrap();
//! }
//! ```

use crate::Clock;
use crate::kv::{KvResult, KvStore};
use bytes::Bytes;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};

/// Test suite for `KvStore` implementations.
///
/// Every key it writes lives under a random prefix, so it can run against a
/// store that already holds data.
pub struct KvStoreTests<'a, K> {
    kv: &'a K,
    prefix: String,
}

impl<'a, K: KvStore> KvStoreTests<'a, K> {
    pub fn new(kv: &'a K) -> Self {
        let prefix = format!("_test_{}/", rand::rng().random::<u32>());
        Self { kv, prefix }
    }

    pub fn with_prefix(kv: &'a K, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        Ok(self
            .kv
            .scan(key)
            .await?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v))
    }

    pub async fn run_all(&self) -> KvResult<()> {
        self.test_put_scan().await?;
        self.test_overwrite().await?;
        self.test_delete().await?;
        self.test_delete_missing().await?;
        self.test_scan_prefix_isolation().await?;
        self.test_scan_order().await?;

        self.cleanup().await?;
        Ok(())
    }

    pub async fn test_put_scan(&self) -> KvResult<()> {
        let key = self.key("put_scan");
        let value = Bytes::from_static(b"hello, ledger");
        self.kv.put(&key, value.clone()).await?;

        assert_eq!(
            self.get(&key).await?,
            Some(value),
            "scan should return the stored value"
        );
        Ok(())
    }

    pub async fn test_overwrite(&self) -> KvResult<()> {
        let key = self.key("overwrite");
        self.kv.put(&key, Bytes::from_static(b"original")).await?;
        self.kv.put(&key, Bytes::from_static(b"replacement")).await?;

        let matches: Vec<_> = self
            .kv
            .scan(&key)
            .await?
            .into_iter()
            .filter(|(k, _)| k == &key)
            .collect();
        assert_eq!(matches.len(), 1, "overwrite must not duplicate the key");
        assert_eq!(matches[0].1.as_ref(), b"replacement");
        Ok(())
    }

    pub async fn test_delete(&self) -> KvResult<()> {
        let key = self.key("delete");
        self.kv.put(&key, Bytes::from_static(b"doomed")).await?;
        self.kv.delete(&key).await?;

        assert_eq!(self.get(&key).await?, None, "deleted key should be gone");
        Ok(())
    }

    pub async fn test_delete_missing(&self) -> KvResult<()> {
        self.kv.delete(&self.key("never_written")).await?;
        Ok(())
    }

    pub async fn test_scan_prefix_isolation(&self) -> KvResult<()> {
        self.kv
            .put(&self.key("iso/a"), Bytes::from_static(b"a"))
            .await?;
        self.kv
            .put(&self.key("iso/b"), Bytes::from_static(b"b"))
            .await?;
        self.kv
            .put(&self.key("isolated"), Bytes::from_static(b"other"))
            .await?;

        let found = self.kv.scan(&self.key("iso/")).await?;
        let keys: Vec<_> = found.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![self.key("iso/a"), self.key("iso/b")]);
        Ok(())
    }

    pub async fn test_scan_order(&self) -> KvResult<()> {
        for name in ["order/c", "order/a", "order/b"] {
            self.kv
                .put(&self.key(name), Bytes::copy_from_slice(name.as_bytes()))
                .await?;
        }
        let keys: Vec<_> = self
            .kv
            .scan(&self.key("order/"))
            .await?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "scan should return keys in ascending order");
        Ok(())
    }

    pub async fn cleanup(&self) -> KvResult<()> {
        for (key, _) in self.kv.scan(&self.prefix).await? {
            self.kv.delete(&key).await?;
        }
        Ok(())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Generate random bytes for testing.
pub fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    Bytes::from(data)
}
