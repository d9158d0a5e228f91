use anyhow::anyhow;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, TryStreamExt};
use hotpin_core::node::{ByteStream, NodeResult, PinNode};
use hotpin_core::ContentId;
use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One call the node received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Add { cid: ContentId, pin: bool },
    Get(ContentId),
    PinAdd(ContentId),
    PinRm(ContentId),
    PinUpdate { from: ContentId, to: ContentId },
    Stat(ContentId),
    Pins,
}

/// In-memory storage node.
///
/// Content ids are raw BLAKE3 ids of the added bytes. Every call is
/// recorded so tests can assert on exactly which node operations were
/// issued, and failures or latency can be injected.
#[derive(Debug, Default)]
pub struct MemoryNode {
    blobs: DashMap<ContentId, Bytes>,
    pinned: Mutex<BTreeSet<ContentId>>,
    calls: Mutex<Vec<NodeCall>>,
    fail_pin_rm: Mutex<HashSet<ContentId>>,
    unreachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryNode {
    /// Creates a new, empty `MemoryNode`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores bytes without pinning them and without recording a call.
    pub fn insert_blob(&self, bytes: impl Into<Bytes>) -> ContentId {
        let bytes = bytes.into();
        let cid = ContentId::for_raw_bytes(&bytes);
        self.blobs.insert(cid, bytes);
        cid
    }

    pub fn is_pinned(&self, cid: &ContentId) -> bool {
        self.pinned.lock().unwrap().contains(cid)
    }

    pub fn pinned(&self) -> Vec<ContentId> {
        self.pinned.lock().unwrap().iter().copied().collect()
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Makes every later `pin_rm` of `cid` fail.
    pub fn fail_pin_rm(&self, cid: ContentId) {
        self.fail_pin_rm.lock().unwrap().insert(cid);
    }

    /// While set, every call fails as if the node were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn enter(&self, call: NodeCall) -> NodeResult<()> {
        self.calls.lock().unwrap().push(call);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(anyhow!("memory node: connection refused"));
        }
        Ok(())
    }

    fn require(&self, cid: &ContentId) -> NodeResult<Bytes> {
        self.blobs
            .get(cid)
            .map(|b| b.value().clone())
            .ok_or_else(|| anyhow!("memory node: {cid} not found"))
    }
}

#[async_trait::async_trait]
impl PinNode for MemoryNode {
    async fn add(&self, stream: ByteStream, pin: bool) -> NodeResult<ContentId> {
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        let bytes = Bytes::from(chunks.concat());
        let cid = ContentId::for_raw_bytes(&bytes);
        self.enter(NodeCall::Add { cid, pin }).await?;

        self.blobs.insert(cid, bytes);
        if pin {
            self.pinned.lock().unwrap().insert(cid);
        }
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> NodeResult<ByteStream> {
        self.enter(NodeCall::Get(*cid)).await?;
        let bytes = self.require(cid)?;
        Ok(Box::new(stream::iter(vec![Ok(bytes)])))
    }

    async fn pin_add(&self, cid: &ContentId) -> NodeResult<()> {
        self.enter(NodeCall::PinAdd(*cid)).await?;
        self.require(cid)?;
        self.pinned.lock().unwrap().insert(*cid);
        Ok(())
    }

    async fn pin_rm(&self, cid: &ContentId) -> NodeResult<()> {
        self.enter(NodeCall::PinRm(*cid)).await?;
        if self.fail_pin_rm.lock().unwrap().contains(cid) {
            return Err(anyhow!("memory node: injected pin_rm failure for {cid}"));
        }
        self.pinned.lock().unwrap().remove(cid);
        Ok(())
    }

    async fn pin_update(&self, from: &ContentId, to: &ContentId) -> NodeResult<()> {
        self.enter(NodeCall::PinUpdate {
            from: *from,
            to: *to,
        })
        .await?;
        self.require(to)?;
        let mut pinned = self.pinned.lock().unwrap();
        pinned.remove(from);
        pinned.insert(*to);
        Ok(())
    }

    async fn stat(&self, cid: &ContentId) -> NodeResult<u64> {
        self.enter(NodeCall::Stat(*cid)).await?;
        Ok(self.require(cid)?.len() as u64)
    }

    async fn pins(&self) -> NodeResult<Vec<ContentId>> {
        self.enter(NodeCall::Pins).await?;
        Ok(self.pinned())
    }
}
