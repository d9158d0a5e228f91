use bytes::Bytes;
use hotpin_core::testutil::ManualClock;
use hotpin_core::{Clock, TenantId};
use hotpin_kv_redb::RedbKvConfig;
use hotpin_node::AdminService;
use hotpin_node::config::{
    HotpinConfig, NodeConfigGc, NodeConfigKv, NodeConfigLedger, NodeConfigNode, NodeConfigTenant,
};
use hotpin_node_local::LocalNodeConfig;
use std::path::Path;
use std::sync::Arc;

const START: i64 = 1_700_000_000;

fn on_disk_config(root: &Path, grace_period_secs: u64) -> HotpinConfig {
    HotpinConfig {
        tenant: NodeConfigTenant {
            id: "operator".into(),
        },
        kv: NodeConfigKv::Redb(RedbKvConfig {
            path: root.join("ledger").to_string_lossy().into(),
        }),
        node: NodeConfigNode::Local {
            config: LocalNodeConfig {
                base_path: root.join("node").to_string_lossy().into(),
            },
            timeout_secs: Some(10),
        },
        ledger: NodeConfigLedger::default(),
        gc: NodeConfigGc {
            grace_period_secs,
            exclude: Vec::new(),
        },
    }
}

async fn open(config: &HotpinConfig, clock: &Arc<ManualClock>) -> AdminService {
    AdminService::open_with_clock(config, clock.clone())
        .await
        .unwrap()
}

#[tokio::test]
async fn gc_uses_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk_config(dir.path(), 3_600);
    let clock = Arc::new(ManualClock::new(START));
    let admin = open(&config, &clock).await;
    let tenant = admin.tenant().clone();

    let c = admin
        .adapter()
        .stage_bytes(&tenant, Bytes::from_static(b"staged upload"))
        .await
        .unwrap();
    let entry = admin.adapter().ledger().entry(&c).await.unwrap();
    assert_eq!(entry.pins[0].created_at, START);

    clock.set(START + 60);
    assert!(admin.gc_staged_dry_run(None).await.is_empty());
    assert!(admin.gc_staged(None).await.collected.is_empty());

    clock.set(START + 3_600);
    assert_eq!(admin.cutoff(), START);
    assert_eq!(admin.gc_staged_dry_run(None).await, vec![c]);
    let report = admin.gc_staged(None).await;
    assert!(report.is_complete());
    assert_eq!(report.collected, vec![c]);
    assert_eq!(admin.adapter().ref_count(&c).await, (0, 0));
}

#[tokio::test]
async fn gc_merges_configured_and_requested_exclusions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = on_disk_config(dir.path(), 0);
    let clock = Arc::new(ManualClock::new(START));

    let staged = {
        let admin = open(&config, &clock).await;
        let tenant = TenantId::new("t1");
        let mut staged = Vec::new();
        for data in [b"one".as_slice(), b"two".as_slice(), b"three".as_slice()] {
            staged.push(
                admin
                    .adapter()
                    .stage_bytes(&tenant, Bytes::from_static(data))
                    .await
                    .unwrap(),
            );
        }
        staged
    };

    config.gc.exclude = vec![staged[0]];
    let admin = open(&config, &clock).await;
    clock.set(i64::MAX / 2);

    let report = admin.gc_staged(Some(vec![staged[1]])).await;
    assert!(report.is_complete());
    assert_eq!(report.collected, vec![staged[2]]);
    assert_eq!(admin.adapter().ref_count(&staged[0]).await, (1, 1));
    assert_eq!(admin.adapter().ref_count(&staged[1]).await, (1, 1));
}

#[tokio::test]
async fn ledger_and_node_persist_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = on_disk_config(dir.path(), 3_600);
    let clock = Arc::new(ManualClock::new(START));
    let tenant = TenantId::new("t1");

    let (c, size) = {
        let admin = open(&config, &clock).await;
        let c = admin
            .adapter()
            .stage_bytes(&tenant, Bytes::from_static(b"durable bytes"))
            .await
            .unwrap();
        let size = admin.adapter().pin(&tenant, &c).await.unwrap();
        (c, size)
    };
    assert_eq!(size, 13);

    let admin = open(&config, &clock).await;
    assert_eq!(admin.adapter().ref_count(&c).await, (1, 0));
    assert!(admin.adapter().is_pinned(&tenant, &c).await);

    admin.adapter().unpin(&tenant, &c).await.unwrap();
    drop(admin);
    let admin = open(&config, &clock).await;
    assert!(admin.adapter().ledger().entries().await.is_empty());
}

#[tokio::test]
async fn memory_backends_open() {
    let config: HotpinConfig = HotpinConfig {
        tenant: NodeConfigTenant { id: "t".into() },
        kv: NodeConfigKv::Memory,
        node: NodeConfigNode::Memory { timeout_secs: None },
        ledger: NodeConfigLedger::default(),
        gc: NodeConfigGc::default(),
    };
    let admin = AdminService::open(&config).await.unwrap();
    let cutoff = admin.cutoff();
    let now = hotpin_core::SystemClock.now();
    assert!(cutoff <= now - 3_600);
}

#[tokio::test]
async fn empty_tenant_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = on_disk_config(dir.path(), 0);
    config.tenant.id = "  ".into();
    assert!(AdminService::open(&config).await.is_err());
}
