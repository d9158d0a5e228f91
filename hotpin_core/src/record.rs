//! Pin records as persisted by the ledger.
//!
//! Every tracked content id is stored as one [`PinnedEntry`] under its own
//! key, CBOR-encoded with integer map keys so fields can be added later
//! without breaking existing stores.

use crate::{ContentId, TenantId};
use bytes::Bytes;
use minicbor::{Decode, Encode};

/// One tenant's interest in a content id.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[cbor(map)]
pub struct PinRecord {
    #[n(0)]
    pub tenant: TenantId,
    /// Provisional interest, reclaimable by the staged GC.
    #[n(1)]
    pub staged: bool,
    /// Unix seconds of the last `stage`/`pin` that touched this record.
    #[n(2)]
    pub created_at: i64,
}

/// All pin records held against one content id.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[cbor(map)]
pub struct PinnedEntry {
    #[n(0)]
    pub content: ContentId,
    #[n(1)]
    pub pins: Vec<PinRecord>,
}

impl PinnedEntry {
    pub fn new(content: ContentId) -> Self {
        Self {
            content,
            pins: Vec::new(),
        }
    }

    /// `(total, staged)` reference counts.
    pub fn ref_count(&self) -> (usize, usize) {
        let staged = self.pins.iter().filter(|p| p.staged).count();
        (self.pins.len(), staged)
    }

    pub fn pin_of(&self, tenant: &TenantId) -> Option<&PinRecord> {
        self.pins.iter().find(|p| &p.tenant == tenant)
    }

    pub fn pin_of_mut(&mut self, tenant: &TenantId) -> Option<&mut PinRecord> {
        self.pins.iter_mut().find(|p| &p.tenant == tenant)
    }

    /// True when there is at least one record and none of them is durable.
    pub fn is_only_staged(&self) -> bool {
        !self.pins.is_empty() && self.pins.iter().all(|p| p.staged)
    }

    /// True when any staged record was touched after `cutoff`.
    pub fn staged_newer_than(&self, cutoff: i64) -> bool {
        self.pins.iter().any(|p| p.staged && p.created_at > cutoff)
    }

    /// Whether the staged GC may reclaim this entry for the given cutoff.
    pub fn is_gc_candidate(&self, cutoff: i64) -> bool {
        self.is_only_staged() && !self.staged_newer_than(cutoff)
    }

    pub fn encode(&self) -> Result<Bytes, minicbor::encode::Error<std::convert::Infallible>> {
        Ok(minicbor::to_vec(self)?.into())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, minicbor::decode::Error> {
        minicbor::decode(bytes)
    }
}
