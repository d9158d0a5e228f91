//! Persisted, cached pin reference counts.
//!
//! Every tracked content id is one [`PinnedEntry`] stored under
//! `pins/<content id>` in the key-value store. The full set is loaded into
//! memory on [`PinLedger::open`] and every read after that is served from the
//! cache. Writes go to the store first; the cache only changes once the store
//! accepted the new state.

use anyhow::anyhow;
use hotpin_core::{
    Clock, ContentId, KvStore, PinError, PinRecord, PinResult, PinnedEntry, SystemClock, TenantId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Key prefix of every persisted pin entry.
pub const PIN_KEY_PREFIX: &str = "pins/";

type Cache = HashMap<ContentId, PinnedEntry>;

/// What a mutation leaves behind for one content id.
enum Commit {
    Put(PinnedEntry),
    Purge(ContentId),
}

/// Per-tenant pin records for every content id the adapter manages.
///
/// Cloning is cheap and every clone shares the same cache and store.
#[derive(Clone, Debug)]
pub struct PinLedger {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    /// Serializes `lookup -> mutate -> persist -> cache update`.
    cache: Arc<Mutex<Cache>>,
}

pub fn entry_key(c: &ContentId) -> String {
    format!("{PIN_KEY_PREFIX}{c}")
}

impl PinLedger {
    pub async fn open(kv: Arc<dyn KvStore>) -> PinResult<Self> {
        Self::open_with_clock(kv, Arc::new(SystemClock)).await
    }

    /// Loads every persisted entry. Any unreadable record fails the whole
    /// open; nothing is skipped.
    pub async fn open_with_clock(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> PinResult<Self> {
        let records = kv
            .scan(PIN_KEY_PREFIX)
            .await
            .map_err(|e| PinError::persistence("scan pin entries", e))?;

        let mut cache = Cache::with_capacity(records.len());
        for (key, bytes) in records {
            let entry = PinnedEntry::decode(&bytes).map_err(|e| {
                PinError::persistence(format!("decode {key}"), anyhow::Error::new(e))
            })?;
            if key != entry_key(&entry.content) {
                return Err(PinError::persistence(
                    format!("load {key}"),
                    anyhow!("record belongs to {}", entry.content),
                ));
            }
            if entry.pins.is_empty() {
                return Err(PinError::persistence(
                    format!("load {key}"),
                    anyhow!("entry has no pin records"),
                ));
            }
            cache.insert(entry.content, entry);
        }
        debug!("pin ledger: loaded {} entries", cache.len());

        Ok(Self {
            kv,
            clock,
            cache: Arc::new(Mutex::new(cache)),
        })
    }

    /// Records a provisional pin. A durable pin held by the same tenant is
    /// left as is; an existing staged pin gets a fresh timestamp.
    pub async fn add_staged(&self, tenant: &TenantId, c: &ContentId) -> PinResult<()> {
        let cache = self.lock().await;
        let now = self.clock.now();
        let mut entry = cache.get(c).cloned().unwrap_or_else(|| PinnedEntry::new(*c));

        match entry.pin_of_mut(tenant) {
            Some(record) if !record.staged => {
                debug!("pin ledger: {tenant} already pins {} durably", c.fmt_short());
                return Ok(());
            }
            Some(record) => record.created_at = now,
            None => entry.pins.push(PinRecord {
                tenant: tenant.clone(),
                staged: true,
                created_at: now,
            }),
        }

        debug!("pin ledger: staged {} for {tenant}", c.fmt_short());
        self.commit(cache, Commit::Put(entry)).await
    }

    /// Records a durable pin, upgrading a staged one.
    pub async fn add(&self, tenant: &TenantId, c: &ContentId) -> PinResult<()> {
        let cache = self.lock().await;
        let now = self.clock.now();
        let mut entry = cache.get(c).cloned().unwrap_or_else(|| PinnedEntry::new(*c));

        let record = PinRecord {
            tenant: tenant.clone(),
            staged: false,
            created_at: now,
        };
        match entry.pin_of_mut(tenant) {
            Some(existing) => *existing = record,
            None => entry.pins.push(record),
        }

        debug!("pin ledger: pinned {} for {tenant}", c.fmt_short());
        self.commit(cache, Commit::Put(entry)).await
    }

    /// `(total, staged)`; `(0, 0)` for unknown content.
    pub async fn ref_count(&self, c: &ContentId) -> (usize, usize) {
        self.cache
            .lock()
            .await
            .get(c)
            .map(PinnedEntry::ref_count)
            .unwrap_or((0, 0))
    }

    pub async fn is_pinned_by(&self, tenant: &TenantId, c: &ContentId) -> bool {
        self.cache
            .lock()
            .await
            .get(c)
            .is_some_and(|e| e.pin_of(tenant).is_some())
    }

    /// Whether anyone holds `c`, staged or durable.
    pub async fn is_pinned_in_node(&self, c: &ContentId) -> bool {
        self.cache.lock().await.contains_key(c)
    }

    /// Drops the tenant's record for `c`. Removing the last record purges the
    /// entry.
    pub async fn remove(&self, tenant: &TenantId, c: &ContentId) -> PinResult<()> {
        let cache = self.lock().await;
        let Some(entry) = cache.get(c) else {
            return Err(PinError::NotFound(*c));
        };

        let mut entry = entry.clone();
        let before = entry.pins.len();
        entry.pins.retain(|p| &p.tenant != tenant);
        if entry.pins.len() == before {
            return Ok(());
        }

        debug!("pin ledger: removed {tenant} from {}", c.fmt_short());
        let commit = if entry.pins.is_empty() {
            Commit::Purge(*c)
        } else {
            Commit::Put(entry)
        };
        self.commit(cache, commit).await
    }

    /// Purges an entry nobody holds durably.
    pub async fn remove_staged(&self, c: &ContentId) -> PinResult<()> {
        let cache = self.lock().await;
        let Some(entry) = cache.get(c) else {
            return Err(PinError::NotFound(*c));
        };
        if let Some(durable) = entry.pins.iter().find(|p| !p.staged) {
            return Err(PinError::InvariantViolation(format!(
                "cannot purge staged pins of {c}: {} holds it durably",
                durable.tenant
            )));
        }

        debug!("pin ledger: purged staged {}", c.fmt_short());
        self.commit(cache, Commit::Purge(*c)).await
    }

    /// Every entry without a durable record.
    pub async fn all_only_staged(&self) -> Vec<PinnedEntry> {
        self.cache
            .lock()
            .await
            .values()
            .filter(|e| e.is_only_staged())
            .cloned()
            .collect()
    }

    pub async fn entry(&self, c: &ContentId) -> Option<PinnedEntry> {
        self.cache.lock().await.get(c).cloned()
    }

    /// Snapshot of the whole ledger, ordered by content id.
    pub async fn entries(&self) -> Vec<PinnedEntry> {
        let mut entries: Vec<_> = self.cache.lock().await.values().cloned().collect();
        entries.sort_by(|a, b| a.content.cmp(&b.content));
        entries
    }

    /// The records one tenant holds, ordered by content id.
    pub async fn pins_of(&self, tenant: &TenantId) -> Vec<(ContentId, PinRecord)> {
        let mut out: Vec<_> = self
            .cache
            .lock()
            .await
            .values()
            .filter_map(|e| e.pin_of(tenant).map(|p| (e.content, p.clone())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // --- Helpers ---

    async fn lock(&self) -> OwnedMutexGuard<Cache> {
        self.cache.clone().lock_owned().await
    }

    /// Writes the new state and updates the cache in a task that owns the
    /// lock, so a caller dropping its future cannot split the two.
    async fn commit(&self, cache: OwnedMutexGuard<Cache>, commit: Commit) -> PinResult<()> {
        let kv = self.kv.clone();
        let task = tokio::spawn(async move {
            let mut cache = cache;
            match commit {
                Commit::Put(entry) => {
                    let key = entry_key(&entry.content);
                    let bytes = entry.encode().map_err(|e| {
                        PinError::persistence(format!("encode {key}"), anyhow::Error::new(e))
                    })?;
                    kv.put(&key, bytes)
                        .await
                        .map_err(|e| PinError::persistence(format!("put {key}"), e))?;
                    cache.insert(entry.content, entry);
                }
                Commit::Purge(c) => {
                    let key = entry_key(&c);
                    kv.delete(&key)
                        .await
                        .map_err(|e| PinError::persistence(format!("delete {key}"), e))?;
                    cache.remove(&c);
                }
            }
            Ok::<_, PinError>(())
        });

        task.await
            .map_err(|e| PinError::persistence("pin ledger commit task failed", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hotpin_core::PinErrorKind;
    use hotpin_core::testutil::ManualClock;
    use hotpin_kv_memory::MemoryKv;

    struct Fixture {
        kv: Arc<MemoryKv>,
        clock: Arc<ManualClock>,
        ledger: PinLedger,
    }

    async fn fixture() -> Fixture {
        let kv = Arc::new(MemoryKv::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = PinLedger::open_with_clock(kv.clone(), clock.clone())
            .await
            .unwrap();
        Fixture { kv, clock, ledger }
    }

    fn cid(data: &str) -> ContentId {
        ContentId::for_raw_bytes(data.as_bytes())
    }

    #[tokio::test]
    async fn empty_ledger() {
        let f = fixture().await;
        let c = cid("nothing");
        assert_eq!(f.ledger.ref_count(&c).await, (0, 0));
        assert!(!f.ledger.is_pinned_in_node(&c).await);
        assert!(f.ledger.entries().await.is_empty());
        assert!(f.ledger.all_only_staged().await.is_empty());
    }

    #[tokio::test]
    async fn staging_twice_refreshes_the_timestamp() {
        let f = fixture().await;
        let t = TenantId::new("t1");
        let c = cid("a");

        f.ledger.add_staged(&t, &c).await.unwrap();
        f.clock.advance(60);
        f.ledger.add_staged(&t, &c).await.unwrap();

        let entry = f.ledger.entry(&c).await.unwrap();
        assert_eq!(entry.pins.len(), 1);
        assert_eq!(entry.pins[0].created_at, 1_060);
        assert_eq!(f.ledger.ref_count(&c).await, (1, 1));
    }

    #[tokio::test]
    async fn durable_pin_is_never_downgraded() {
        let f = fixture().await;
        let t = TenantId::new("t1");
        let c = cid("a");

        f.ledger.add(&t, &c).await.unwrap();
        f.clock.advance(5);
        f.ledger.add_staged(&t, &c).await.unwrap();

        let entry = f.ledger.entry(&c).await.unwrap();
        assert_eq!(entry.ref_count(), (1, 0));
        assert_eq!(entry.pins[0].created_at, 1_000);
    }

    #[tokio::test]
    async fn add_upgrades_staged_record() {
        let f = fixture().await;
        let t = TenantId::new("t1");
        let c = cid("a");

        f.ledger.add_staged(&t, &c).await.unwrap();
        f.clock.advance(10);
        f.ledger.add(&t, &c).await.unwrap();

        let entry = f.ledger.entry(&c).await.unwrap();
        assert_eq!(
            entry.pins,
            vec![PinRecord {
                tenant: t.clone(),
                staged: false,
                created_at: 1_010
            }]
        );
        assert!(f.ledger.is_pinned_by(&t, &c).await);
        assert!(!f.ledger.is_pinned_by(&TenantId::new("t2"), &c).await);
    }

    #[tokio::test]
    async fn add_then_remove_clears_everything() {
        let f = fixture().await;
        let t = TenantId::new("t1");
        let c = cid("a");

        f.ledger.add(&t, &c).await.unwrap();
        assert_eq!(f.kv.len(), 1);
        f.ledger.remove(&t, &c).await.unwrap();

        assert_eq!(f.ledger.ref_count(&c).await, (0, 0));
        assert!(!f.ledger.is_pinned_in_node(&c).await);
        assert!(f.kv.is_empty());
    }

    #[tokio::test]
    async fn remove_keeps_other_holders() {
        let f = fixture().await;
        let (t1, t2) = (TenantId::new("t1"), TenantId::new("t2"));
        let c = cid("shared");

        f.ledger.add(&t1, &c).await.unwrap();
        f.ledger.add_staged(&t2, &c).await.unwrap();
        assert_eq!(f.ledger.ref_count(&c).await, (2, 1));

        f.ledger.remove(&t1, &c).await.unwrap();
        assert_eq!(f.ledger.ref_count(&c).await, (1, 1));
        assert_eq!(f.ledger.all_only_staged().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_of_unknown_content_is_not_found() {
        let f = fixture().await;
        let err = f
            .ledger
            .remove(&TenantId::new("t1"), &cid("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::NotFound);
    }

    #[tokio::test]
    async fn remove_without_own_record_is_a_no_op() {
        let f = fixture().await;
        let c = cid("a");
        f.ledger.add(&TenantId::new("t1"), &c).await.unwrap();
        f.ledger.remove(&TenantId::new("t2"), &c).await.unwrap();
        assert_eq!(f.ledger.ref_count(&c).await, (1, 0));
    }

    #[tokio::test]
    async fn remove_staged_refuses_durable_entries() {
        let f = fixture().await;
        let c = cid("a");
        f.ledger.add_staged(&TenantId::new("t1"), &c).await.unwrap();
        f.ledger.add(&TenantId::new("t2"), &c).await.unwrap();

        let err = f.ledger.remove_staged(&c).await.unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::InvariantViolation);
        assert_eq!(f.ledger.ref_count(&c).await, (2, 1));
    }

    #[tokio::test]
    async fn remove_staged_purges_store_and_cache() {
        let f = fixture().await;
        let c = cid("a");
        f.ledger.add_staged(&TenantId::new("t1"), &c).await.unwrap();
        f.ledger.add_staged(&TenantId::new("t2"), &c).await.unwrap();

        f.ledger.remove_staged(&c).await.unwrap();
        assert!(f.ledger.entry(&c).await.is_none());
        assert!(f.kv.is_empty());

        let err = f.ledger.remove_staged(&c).await.unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let f = fixture().await;
        let t = TenantId::new("t1");
        let c = cid("a");
        f.ledger.add_staged(&t, &c).await.unwrap();

        f.kv.set_fail_writes(true);
        let err = f.ledger.add(&t, &c).await.unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::Persistence);
        assert!(f.ledger.remove(&t, &c).await.is_err());
        f.kv.set_fail_writes(false);

        assert_eq!(f.ledger.ref_count(&c).await, (1, 1));
    }

    #[tokio::test]
    async fn reopen_restores_the_same_entries() {
        let f = fixture().await;
        let (t1, t2) = (TenantId::new("t1"), TenantId::new("t2"));
        f.ledger.add(&t1, &cid("a")).await.unwrap();
        f.ledger.add_staged(&t2, &cid("a")).await.unwrap();
        f.ledger.add_staged(&t2, &cid("b")).await.unwrap();
        f.ledger.add(&t1, &cid("c")).await.unwrap();
        f.ledger.remove(&t1, &cid("c")).await.unwrap();

        let reopened = PinLedger::open(f.kv.clone()).await.unwrap();
        assert_eq!(reopened.entries().await, f.ledger.entries().await);
        assert_eq!(reopened.entries().await.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_record_fails_open() {
        let kv = Arc::new(MemoryKv::new());
        kv.insert_raw(&entry_key(&cid("a")), Bytes::from_static(b"\xffgarbage"));
        let err = PinLedger::open(kv).await.unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::Persistence);
        let PinError::Persistence { source, .. } = err else {
            unreachable!()
        };
        assert!(source.downcast_ref::<minicbor::decode::Error>().is_some());
    }

    #[tokio::test]
    async fn misplaced_record_fails_open() {
        let kv = Arc::new(MemoryKv::new());
        let mut entry = PinnedEntry::new(cid("a"));
        entry.pins.push(PinRecord {
            tenant: TenantId::new("t1"),
            staged: false,
            created_at: 0,
        });
        kv.insert_raw(&entry_key(&cid("b")), entry.encode().unwrap());

        let err = PinLedger::open(kv).await.unwrap_err();
        assert_eq!(err.kind(), PinErrorKind::Persistence);
    }

    #[tokio::test]
    async fn pins_of_lists_only_the_tenant() {
        let f = fixture().await;
        let (t1, t2) = (TenantId::new("t1"), TenantId::new("t2"));
        f.ledger.add(&t1, &cid("a")).await.unwrap();
        f.ledger.add_staged(&t1, &cid("b")).await.unwrap();
        f.ledger.add(&t2, &cid("c")).await.unwrap();

        let mine = f.ledger.pins_of(&t1).await;
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|(_, p)| p.tenant == t1));
        assert!(mine.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn concurrent_stages_keep_one_record_per_tenant() {
        let f = fixture().await;
        let c = cid("hot");
        let mut tasks = Vec::new();
        for i in 0..16 {
            let ledger = f.ledger.clone();
            let tenant = TenantId::new(format!("t{}", i % 4));
            tasks.push(tokio::spawn(async move {
                ledger.add_staged(&tenant, &c).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(f.ledger.ref_count(&c).await, (4, 4));
    }
}
