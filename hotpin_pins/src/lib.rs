//! Pin ledger and pinning adapter.
//!
//! [`PinLedger`] persists which tenant holds which content id, staged or
//! durably, and serves reference counts from an in-memory cache.
//! [`PinningAdapter`] drives a [`hotpin_core::PinNode`] so that the node's
//! recursive pins mirror the ledger, and runs the staged garbage collector.

pub mod adapter;
pub mod gc;
pub mod ledger;

pub use adapter::PinningAdapter;
pub use gc::GcReport;
pub use ledger::{PIN_KEY_PREFIX, PinLedger};
