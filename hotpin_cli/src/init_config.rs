use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Subcommand;
use hotpin_core::TenantId;
use hotpin_node::config::{DEFAULT_GC_GRACE_PERIOD_SECS, DEFAULT_LEDGER_NAMESPACE};
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the node config file if it doesn't exist and generates a tenant id
    Init,
}

fn table<'a>(doc: &'a mut DocumentMut, name: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(name)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("`{name}` in node config is not a table"))
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .with_context(|| format!("path {} is not valid UTF-8", path.display()))
}

impl CmdConfig {
    pub fn run(self, node_config_file: PathBuf, local_data_dir: &Path) -> anyhow::Result<()> {
        let mut doc = if node_config_file.exists() {
            fs::read_to_string(&node_config_file)?
        } else {
            if let Some(parent) = node_config_file.parent() {
                fs::create_dir_all(parent)?;
            }
            "".to_owned()
        }
        .parse::<DocumentMut>()
        .context("could not parse node config file")?;

        match self {
            Self::Init => {
                let tenant = table(&mut doc, "tenant")?;
                if !tenant.contains_key("id") {
                    let id = TenantId::generate();
                    info!("generating tenant id {id}");
                    tenant.insert("id", id.as_str().into());
                }

                let kv = table(&mut doc, "kv")?;
                if !kv.contains_key("type") {
                    let ledger_path = local_data_dir.join("ledger");
                    kv.insert("type", "redb".into());
                    kv.insert("path", path_str(&ledger_path)?.into());
                }

                let node = table(&mut doc, "node")?;
                if !node.contains_key("type") {
                    let node_path = local_data_dir.join("node");
                    node.insert("type", "local".into());
                    node.insert("base_path", path_str(&node_path)?.into());
                }

                table(&mut doc, "ledger")?
                    .entry("namespace")
                    .or_insert(DEFAULT_LEDGER_NAMESPACE.into());

                table(&mut doc, "gc")?
                    .entry("grace_period_secs")
                    .or_insert((DEFAULT_GC_GRACE_PERIOD_SECS as i64).into());
            }
        }

        info!("writing to config file {node_config_file:?}");

        let tmp_path = node_config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, node_config_file)?;
        Ok(())
    }
}
