use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::ContentId;

pub type NodeResult<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Byte stream going into or coming out of the storage node.
pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static>;

/// The content-addressed storage node the pinning adapter drives.
///
/// Pins are recursive: pinning a DAG root keeps all of its children. The
/// adapter relies on `pin_add` and `pin_rm` being safe to repeat when the
/// node is already in the requested state.
#[async_trait]
pub trait PinNode: std::fmt::Debug + Send + Sync + 'static {
    /// Stores a byte stream and returns its content id, pinning it when
    /// `pin` is set.
    async fn add(&self, stream: ByteStream, pin: bool) -> NodeResult<ContentId>;

    /// Streams back the bytes behind `cid`.
    async fn get(&self, cid: &ContentId) -> NodeResult<ByteStream>;

    async fn pin_add(&self, cid: &ContentId) -> NodeResult<()>;

    async fn pin_rm(&self, cid: &ContentId) -> NodeResult<()>;

    /// Moves a pin from `from` to `to` in one step, so content shared by
    /// both is never left unpinned in between.
    async fn pin_update(&self, from: &ContentId, to: &ContentId) -> NodeResult<()>;

    /// Cumulative size in bytes of everything reachable from `cid`.
    async fn stat(&self, cid: &ContentId) -> NodeResult<u64>;

    /// Every recursively pinned content id, for re-deriving node state.
    async fn pins(&self) -> NodeResult<Vec<ContentId>>;
}

#[async_trait]
impl<T: PinNode + ?Sized> PinNode for std::sync::Arc<T> {
    async fn add(&self, stream: ByteStream, pin: bool) -> NodeResult<ContentId> {
        (**self).add(stream, pin).await
    }

    async fn get(&self, cid: &ContentId) -> NodeResult<ByteStream> {
        (**self).get(cid).await
    }

    async fn pin_add(&self, cid: &ContentId) -> NodeResult<()> {
        (**self).pin_add(cid).await
    }

    async fn pin_rm(&self, cid: &ContentId) -> NodeResult<()> {
        (**self).pin_rm(cid).await
    }

    async fn pin_update(&self, from: &ContentId, to: &ContentId) -> NodeResult<()> {
        (**self).pin_update(from, to).await
    }

    async fn stat(&self, cid: &ContentId) -> NodeResult<u64> {
        (**self).stat(cid).await
    }

    async fn pins(&self) -> NodeResult<Vec<ContentId>> {
        (**self).pins().await
    }
}
