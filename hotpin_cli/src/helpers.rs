use anyhow::{Context, Result};
use hotpin_core::{ContentId, TenantId};
use hotpin_node::config::HotpinConfig;
use std::path::Path;

pub fn load_config(node_config_file: &Path) -> Result<HotpinConfig> {
    let toml_content = std::fs::read_to_string(node_config_file).with_context(|| {
        format!(
            "failed to read {} (run `hotpin config init` first)",
            node_config_file.display()
        )
    })?;
    toml::from_str(&toml_content)
        .with_context(|| format!("invalid node config {}", node_config_file.display()))
}

pub fn parse_content_id(s: &str) -> Result<ContentId> {
    ContentId::parse(s.trim()).with_context(|| format!("invalid content id '{s}'"))
}

pub fn parse_content_ids(ids: &[String]) -> Result<Vec<ContentId>> {
    ids.iter().map(|s| parse_content_id(s)).collect()
}

pub fn parse_tenant(s: &str) -> Result<TenantId> {
    s.parse()
        .with_context(|| format!("invalid tenant id '{s}'"))
}
