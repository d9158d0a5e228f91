use hotpin_core::ContentId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LEDGER_NAMESPACE: &str = "pinstore";
pub const DEFAULT_GC_GRACE_PERIOD_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct HotpinConfig {
    pub tenant: NodeConfigTenant,
    pub kv: NodeConfigKv,
    pub node: NodeConfigNode,
    #[serde(default)]
    pub ledger: NodeConfigLedger,
    #[serde(default)]
    pub gc: NodeConfigGc,
}

/// Tenant the CLI acts as unless told otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeConfigTenant {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum NodeConfigKv {
    Memory,
    Redb(hotpin_kv_redb::RedbKvConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum NodeConfigNode {
    Memory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    Local {
        #[serde(flatten)]
        config: hotpin_node_local::LocalNodeConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
}

impl NodeConfigNode {
    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            NodeConfigNode::Memory { timeout_secs } => *timeout_secs,
            NodeConfigNode::Local { timeout_secs, .. } => *timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeConfigLedger {
    /// Key prefix the ledger's records live under in the kv store.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for NodeConfigLedger {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeConfigGc {
    /// Staged content younger than this is never collected.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Content ids the staged GC always skips.
    #[serde(default)]
    pub exclude: Vec<ContentId>,
}

impl Default for NodeConfigGc {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            exclude: Vec::new(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_LEDGER_NAMESPACE.to_string()
}

fn default_grace_period() -> u64 {
    DEFAULT_GC_GRACE_PERIOD_SECS
}
