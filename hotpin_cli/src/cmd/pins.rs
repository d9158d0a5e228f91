use anyhow::{Context, Result, bail};
use hotpin_core::{ByteStream, PinRecord, TenantId};
use hotpin_node::AdminService;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::Commands;
use crate::helpers::parse_content_id;

fn state(record: &PinRecord) -> &'static str {
    if record.staged { "staged" } else { "pinned" }
}

pub async fn run_pins(cmd: Commands, admin: &AdminService, tenant: &TenantId) -> Result<()> {
    let adapter = admin.adapter();
    match cmd {
        Commands::Stage { path } => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            let stream: ByteStream = Box::new(ReaderStream::new(file));
            let c = adapter
                .stage(tenant, stream)
                .await
                .context("failed to stage content")?;
            println!("staged {c}");
        }
        Commands::Pin { cid } => {
            let c = parse_content_id(&cid)?;
            let size = adapter.pin(tenant, &c).await.context("failed to pin")?;
            println!("pinned {c} ({size} bytes)");
        }
        Commands::Unpin { cid } => {
            let c = parse_content_id(&cid)?;
            adapter.unpin(tenant, &c).await.context("failed to unpin")?;
            let (total, _) = adapter.ref_count(&c).await;
            if total == 0 {
                println!("unpinned {c}: no holders left, removed from the node");
            } else {
                println!("unpinned {c} for {tenant}; {total} other holders remain");
            }
        }
        Commands::Replace { from, to } => {
            let from = parse_content_id(&from)?;
            let to = parse_content_id(&to)?;
            let size = adapter
                .replace(tenant, &from, &to)
                .await
                .context("failed to replace pin")?;
            println!("replaced {from} with {to} ({size} bytes)");
        }
        Commands::Get { cid, out } => {
            let c = parse_content_id(&cid)?;
            let stream = adapter.get(&c).await.context("failed to fetch content")?;
            let mut reader = StreamReader::new(stream);
            let mut file = tokio::fs::File::create(&out)
                .await
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = tokio::io::copy(&mut reader, &mut file)
                .await
                .with_context(|| format!("failed to write to {}", out.display()))?;
            println!("downloaded {written} bytes to {}", out.display());
        }
        Commands::Status { cid } => {
            let c = parse_content_id(&cid)?;
            let Some(entry) = adapter.ledger().entry(&c).await else {
                println!("{c}: not tracked");
                return Ok(());
            };
            let (total, staged) = entry.ref_count();
            println!("{c}: total={total} staged={staged}");
            for record in &entry.pins {
                println!(
                    "  {} {} created_at={}",
                    record.tenant,
                    state(record),
                    record.created_at
                );
            }
        }
        Commands::Ls { all } => {
            if all {
                for entry in adapter.ledger().entries().await {
                    let (total, staged) = entry.ref_count();
                    println!("{}\ttotal={total}\tstaged={staged}", entry.content);
                }
            } else {
                for (c, record) in adapter.ledger().pins_of(tenant).await {
                    println!("{c}\t{}\t{}", state(&record), record.created_at);
                }
            }
        }
        Commands::Config { .. } | Commands::GcStaged { .. } => {
            bail!("not a pin command")
        }
    }
    Ok(())
}
