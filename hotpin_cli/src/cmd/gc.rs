use anyhow::{Result, anyhow};
use hotpin_node::AdminService;

use crate::helpers::parse_content_ids;

pub async fn run_gc_staged(admin: &AdminService, exclude: &[String], dry_run: bool) -> Result<()> {
    let exclude = parse_content_ids(exclude)?;
    let exclude = (!exclude.is_empty()).then_some(exclude);

    if dry_run {
        let candidates = admin.gc_staged_dry_run(exclude).await;
        println!("[dry-run] {} staged content ids would be unpinned", candidates.len());
        for c in candidates {
            println!("  {c}");
        }
        return Ok(());
    }

    let report = admin.gc_staged(exclude).await;
    println!("unpinned {} staged content ids", report.collected.len());
    for c in &report.collected {
        println!("  {c}");
    }
    match report.error {
        Some(err) => Err(anyhow!(err).context("staged gc stopped early")),
        None => Ok(()),
    }
}
