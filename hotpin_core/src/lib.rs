//! Core hotpin types and traits.
//!
//! This crate defines the shared types and traits used by all hotpin crates.
//!
//! ## Persisted types (format-stable)
//!
//! The following types end up in the pin ledger's key-value store and are
//! decoded again on every restart, so their CBOR encoding is treated as a
//! stable format:
//!
//! - Content hashes (`hash::Hash`)
//! - Content identifiers (`cid::ContentId`)
//! - Tenant identifiers (`tenant::TenantId`)
//! - Pin records (`record::PinRecord`, `record::PinnedEntry`)
//!
//! ## Collaborator interfaces
//!
//! - [`PinNode`]: the content-addressed storage node (add, get, recursive
//!   pin/unpin, pin move, size). Implementations live in `hotpin_node_memory`
//!   and `hotpin_node_local`.
//! - [`KvStore`]: the transactional key-value store the ledger persists into.
//!   Implementations live in `hotpin_kv_memory` and `hotpin_kv_redb`.
//!
//! The ledger and adapter built on top of these live in `hotpin_pins`.

pub mod cid;
pub mod clock;
pub mod error;
pub mod hash;
pub mod kv;
pub mod node;
pub mod record;
pub mod tenant;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use cid::{Codec, ContentId, ContentIdError};
pub use clock::{Clock, SystemClock};
pub use error::{PinError, PinErrorKind, PinResult};
pub use hash::Hash;
pub use kv::{KvResult, KvStore, Namespaced};
pub use node::{ByteStream, NodeResult, PinNode};
pub use record::{PinRecord, PinnedEntry};
pub use tenant::{EmptyTenantId, TenantId};
