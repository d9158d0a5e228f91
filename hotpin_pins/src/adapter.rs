//! Orchestrates storage node calls and ledger updates.
//!
//! The node keeps one recursive pin per content id no matter how many
//! tenants hold it; the ledger tracks who holds what. The adapter keeps the
//! node's pin state equal to "the ledger has at least one record" and issues
//! the fewest node calls that get there.

use crate::gc::{GcReport, select_candidates};
use crate::ledger::PinLedger;
use bytes::Bytes;
use hotpin_core::{
    ByteStream, ContentId, NodeResult, PinError, PinErrorKind, PinNode, PinResult, TenantId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PinningAdapter {
    node: Arc<dyn PinNode>,
    ledger: PinLedger,
    node_timeout: Option<Duration>,
}

impl PinningAdapter {
    pub fn new(node: Arc<dyn PinNode>, ledger: PinLedger) -> Self {
        Self {
            node,
            ledger,
            node_timeout: None,
        }
    }

    /// Bounds every node call; an expired call fails with
    /// [`PinError::Upstream`].
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn ledger(&self) -> &PinLedger {
        &self.ledger
    }

    /// Uploads content and holds it provisionally for `tenant`.
    ///
    /// A tenant that already holds the resulting content id, staged or
    /// durably, keeps its record as is.
    pub async fn stage(&self, tenant: &TenantId, stream: ByteStream) -> PinResult<ContentId> {
        let c = self
            .call("add".to_string(), self.node.add(stream, true))
            .await?;

        if self.ledger.is_pinned_by(tenant, &c).await {
            debug!("stage: {tenant} already holds {}", c.fmt_short());
            return Ok(c);
        }
        self.ledger.add_staged(tenant, &c).await?;
        Ok(c)
    }

    pub async fn stage_bytes(&self, tenant: &TenantId, bytes: Bytes) -> PinResult<ContentId> {
        let stream: ByteStream = Box::new(futures::stream::iter(vec![Ok(bytes)]));
        self.stage(tenant, stream).await
    }

    /// Durably pins `c` for `tenant` and returns its size.
    pub async fn pin(&self, tenant: &TenantId, c: &ContentId) -> PinResult<u64> {
        if !self.ledger.is_pinned_in_node(c).await {
            self.call(format!("pin {c}"), self.node.pin_add(c)).await?;
        }
        let size = self.call(format!("stat {c}"), self.node.stat(c)).await?;
        self.ledger.add(tenant, c).await?;
        debug!("pin: {tenant} pinned {} ({size} bytes)", c.fmt_short());
        Ok(size)
    }

    /// Drops the tenant's hold on `c`, unpinning at the node when it was the
    /// last one.
    pub async fn unpin(&self, tenant: &TenantId, c: &ContentId) -> PinResult<()> {
        let Some(entry) = self.ledger.entry(c).await else {
            return Err(PinError::NotFound(*c));
        };

        if entry.pins.len() == 1 && entry.pin_of(tenant).is_some() {
            self.call(format!("unpin {c}"), self.node.pin_rm(c)).await?;
        }
        self.ledger.remove(tenant, c).await
    }

    /// Moves the tenant's pin from `c1` to `c2` and returns the size of
    /// `c2`.
    pub async fn replace(&self, tenant: &TenantId, c1: &ContentId, c2: &ContentId) -> PinResult<u64> {
        if c1 == c2 {
            return self.pin(tenant, c2).await;
        }

        let Some(from) = self.ledger.entry(c1).await else {
            return Err(PinError::NotFound(*c1));
        };
        let sole_holder = from.pins.len() == 1 && from.pin_of(tenant).is_some();
        let target_held = self.ledger.is_pinned_in_node(c2).await;

        match (sole_holder, target_held) {
            (true, false) => {
                self.call(
                    format!("update pin {c1} -> {c2}"),
                    self.node.pin_update(c1, c2),
                )
                .await?
            }
            (true, true) => self.call(format!("unpin {c1}"), self.node.pin_rm(c1)).await?,
            (false, false) => self.call(format!("pin {c2}"), self.node.pin_add(c2)).await?,
            (false, true) => {}
        }

        let size = self.call(format!("stat {c2}"), self.node.stat(c2)).await?;
        self.ledger.remove(tenant, c1).await?;
        self.ledger.add(tenant, c2).await?;
        debug!(
            "replace: {tenant} moved {} -> {}",
            c1.fmt_short(),
            c2.fmt_short()
        );
        Ok(size)
    }

    /// Content ids the staged GC would reclaim right now, in processing
    /// order.
    pub async fn gc_candidates(&self, exclude: &HashSet<ContentId>, older_than: i64) -> Vec<ContentId> {
        select_candidates(self.ledger.all_only_staged().await, exclude, older_than)
    }

    /// Unpins and forgets content nobody holds durably.
    ///
    /// Only entries whose staged records are all at or before `older_than`
    /// qualify. Each candidate is re-checked right before it is reclaimed,
    /// and the run stops at the first failure.
    pub async fn garbage_collect_staged(
        &self,
        exclude: &HashSet<ContentId>,
        older_than: i64,
    ) -> GcReport {
        let mut report = GcReport::default();
        for c in self.gc_candidates(exclude, older_than).await {
            match self.collect_one(&c, older_than).await {
                Ok(true) => report.collected.push(c),
                Ok(false) => {}
                Err(err) => {
                    warn!("gc: stopping at {}: {err}", c.fmt_short());
                    report.error = Some(err);
                    break;
                }
            }
        }
        info!("gc: reclaimed {} staged entries", report.collected.len());
        report
    }

    async fn collect_one(&self, c: &ContentId, older_than: i64) -> PinResult<bool> {
        match self.ledger.entry(c).await {
            Some(entry) if entry.is_gc_candidate(older_than) => {}
            _ => {
                debug!("gc: {} no longer qualifies, skipping", c.fmt_short());
                return Ok(false);
            }
        }

        self.call(format!("unpin {c}"), self.node.pin_rm(c)).await?;
        if let Err(err) = self.ledger.remove_staged(c).await {
            if err.kind() == PinErrorKind::InvariantViolation {
                // Someone pinned it durably in between; put the node pin back.
                warn!("gc: {} became durable, re-pinning", c.fmt_short());
                if let Err(repin) = self.call(format!("pin {c}"), self.node.pin_add(c)).await {
                    warn!("gc: failed to re-pin {}: {repin}", c.fmt_short());
                }
            }
            return Err(err);
        }
        info!("gc: reclaimed {}", c.fmt_short());
        Ok(true)
    }

    pub async fn get(&self, c: &ContentId) -> PinResult<ByteStream> {
        self.call(format!("get {c}"), self.node.get(c)).await
    }

    pub async fn is_pinned(&self, tenant: &TenantId, c: &ContentId) -> bool {
        self.ledger.is_pinned_by(tenant, c).await
    }

    pub async fn is_pinned_in_node(&self, c: &ContentId) -> bool {
        self.ledger.is_pinned_in_node(c).await
    }

    pub async fn ref_count(&self, c: &ContentId) -> (usize, usize) {
        self.ledger.ref_count(c).await
    }

    async fn call<T>(
        &self,
        context: String,
        fut: impl Future<Output = NodeResult<T>>,
    ) -> PinResult<T> {
        let result = match self.node_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(elapsed) => {
                    return Err(PinError::upstream(
                        format!("{context}: no answer within {limit:?}"),
                        elapsed,
                    ));
                }
            },
            None => fut.await,
        };
        result.map_err(|e| PinError::upstream(context, e))
    }
}
