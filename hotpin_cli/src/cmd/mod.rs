use std::path::{Path, PathBuf};

use anyhow::Result;
use hotpin_node::AdminService;

use crate::helpers::{load_config, parse_tenant};

mod gc;
mod pins;

pub use gc::run_gc_staged;
pub use pins::run_pins;

pub async fn run_command(
    node_config_file: PathBuf,
    local_data_dir: &Path,
    tenant: Option<String>,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => {
            cmd.run(node_config_file, local_data_dir)?;
            Ok(())
        }
        _ => {
            let config = load_config(&node_config_file)?;
            let admin = AdminService::open(&config).await?;
            let tenant = match tenant {
                Some(t) => parse_tenant(&t)?,
                None => admin.tenant().clone(),
            };

            match cmd {
                crate::Commands::GcStaged { exclude, dry_run } => {
                    run_gc_staged(&admin, &exclude, dry_run).await
                }
                cmd => run_pins(cmd, &admin, &tenant).await,
            }
        }
    }
}
