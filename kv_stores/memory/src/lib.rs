use bytes::Bytes;
use hotpin_core::kv::{KvResult, KvStore};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory `KvStore`.
///
/// Keys are kept ordered so `scan` is a range walk. Writes can be made to
/// fail on demand to exercise persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: RwLock<BTreeMap<String, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `put` and `delete` return an error and change nothing.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes a raw value, bypassing the failure switch. Lets tests plant
    /// corrupt records.
    pub fn insert_raw(&self, key: &str, value: Bytes) {
        self.data.write().unwrap().insert(key.to_owned(), value);
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> KvResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("memory kv: writes disabled");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        self.check_writable()?;
        self.data.write().unwrap().insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.check_writable()?;
        self.data.write().unwrap().remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        let data = self.data.read().unwrap();
        Ok(data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotpin_core::Namespaced;
    use hotpin_core::testutil::KvStoreTests;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_kv() {
        let kv = MemoryKv::new();
        KvStoreTests::new(&kv).run_all().await.unwrap();
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_namespaced_memory_kv() {
        let kv = Arc::new(MemoryKv::new());
        let ns = Namespaced::new(kv.clone(), "pinstore");
        KvStoreTests::new(&ns).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn namespaces_do_not_see_each_other() {
        let kv = Arc::new(MemoryKv::new());
        let a = Namespaced::new(kv.clone(), "a");
        let b = Namespaced::new(kv.clone(), "b/");

        a.put("pins/x", Bytes::from_static(b"1")).await.unwrap();
        b.put("pins/x", Bytes::from_static(b"2")).await.unwrap();

        let seen = a.scan("pins/").await.unwrap();
        assert_eq!(seen, vec![("pins/x".to_string(), Bytes::from_static(b"1"))]);

        let raw: Vec<_> = kv.scan("").await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(raw, vec!["a/pins/x".to_string(), "b/pins/x".to_string()]);
    }

    #[tokio::test]
    async fn failing_writes_leave_data_untouched() {
        let kv = MemoryKv::new();
        kv.put("k", Bytes::from_static(b"v")).await.unwrap();
        kv.set_fail_writes(true);
        assert!(kv.put("k", Bytes::from_static(b"w")).await.is_err());
        assert!(kv.delete("k").await.is_err());
        kv.set_fail_writes(false);
        assert_eq!(kv.scan("k").await.unwrap()[0].1.as_ref(), b"v");
    }
}
