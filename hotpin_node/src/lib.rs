use crate::config::{HotpinConfig, NodeConfigGc, NodeConfigKv, NodeConfigNode};
use anyhow::Context;
use hotpin_core::{Clock, ContentId, KvStore, Namespaced, PinNode, SystemClock, TenantId};
use hotpin_kv_memory::MemoryKv;
use hotpin_kv_redb::RedbKv;
use hotpin_node_local::LocalNode;
use hotpin_node_memory::MemoryNode;
use hotpin_pins::{GcReport, PinLedger, PinningAdapter};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod config;

pub fn create_kv(config: &NodeConfigKv) -> anyhow::Result<Arc<dyn KvStore>> {
    let kv: Arc<dyn KvStore> = match config {
        NodeConfigKv::Memory => Arc::new(MemoryKv::new()),
        NodeConfigKv::Redb(config) => Arc::new(
            RedbKv::create(config)
                .with_context(|| format!("failed to open redb store at {}", config.path))?,
        ),
    };
    Ok(kv)
}

pub fn create_node(config: &NodeConfigNode) -> Arc<dyn PinNode> {
    let node: Arc<dyn PinNode> = match config {
        NodeConfigNode::Memory { .. } => Arc::new(MemoryNode::new()),
        NodeConfigNode::Local { config, .. } => Arc::new(LocalNode::create(config.clone())),
    };
    node
}

/// Opens the pin ledger inside its namespace of the configured kv store.
pub async fn open_ledger(
    config: &HotpinConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<PinLedger> {
    let kv = create_kv(&config.kv)?;
    let kv = Arc::new(Namespaced::new(kv, &config.ledger.namespace));
    let ledger = PinLedger::open_with_clock(kv, clock)
        .await
        .context("failed to load pin ledger")?;
    Ok(ledger)
}

pub async fn open_adapter(
    config: &HotpinConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<PinningAdapter> {
    let ledger = open_ledger(config, clock).await?;
    let mut adapter = PinningAdapter::new(create_node(&config.node), ledger);
    if let Some(secs) = config.node.timeout_secs() {
        adapter = adapter.with_node_timeout(Duration::from_secs(secs));
    }
    Ok(adapter)
}

/// Operator entry point: the pinning adapter plus a staged GC that uses
/// "now minus the grace period" as its cutoff.
#[derive(Debug, Clone)]
pub struct AdminService {
    adapter: PinningAdapter,
    gc: NodeConfigGc,
    tenant: TenantId,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    pub async fn open(config: &HotpinConfig) -> anyhow::Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Like [`AdminService::open`], with `clock` stamping pin records and
    /// computing the GC cutoff.
    pub async fn open_with_clock(
        config: &HotpinConfig,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let tenant: TenantId = config
            .tenant
            .id
            .parse()
            .context("invalid tenant id in config")?;
        let adapter = open_adapter(config, clock.clone()).await?;
        Ok(Self::new(adapter, config.gc.clone(), tenant, clock))
    }

    /// `clock` should be the one the adapter's ledger was opened with.
    pub fn new(
        adapter: PinningAdapter,
        gc: NodeConfigGc,
        tenant: TenantId,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapter,
            gc,
            tenant,
            clock,
        }
    }

    pub fn adapter(&self) -> &PinningAdapter {
        &self.adapter
    }

    /// The tenant this node acts as by default.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn cutoff(&self) -> i64 {
        let grace = i64::try_from(self.gc.grace_period_secs).unwrap_or(i64::MAX);
        self.clock.now().saturating_sub(grace)
    }

    fn exclusions(&self, exclude: Option<Vec<ContentId>>) -> HashSet<ContentId> {
        self.gc
            .exclude
            .iter()
            .copied()
            .chain(exclude.unwrap_or_default())
            .collect()
    }

    /// Runs the staged GC and reports what it reclaimed.
    pub async fn gc_staged(&self, exclude: Option<Vec<ContentId>>) -> GcReport {
        let exclude = self.exclusions(exclude);
        let cutoff = self.cutoff();
        info!(
            "running staged gc (cutoff {cutoff}, {} exclusions)",
            exclude.len()
        );
        self.adapter.garbage_collect_staged(&exclude, cutoff).await
    }

    /// What `gc_staged` would reclaim right now.
    pub async fn gc_staged_dry_run(&self, exclude: Option<Vec<ContentId>>) -> Vec<ContentId> {
        let exclude = self.exclusions(exclude);
        self.adapter.gc_candidates(&exclude, self.cutoff()).await
    }
}
