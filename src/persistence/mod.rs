//! Best-effort state persistence
//!
//! Features:
//! - Single JSON object per storage key
//! - Shallow-merge partial updates (read-modify-write)
//! - Missing storage and corrupt data degrade to an empty state
//! - Failed writes leave the previous value intact
//! - Change listeners for writes made through a store

pub mod store;

pub use store::{PersistedStateStore, SubscriptionId};
