//! Persisted State - best-effort JSON state in browser LocalStorage
//!
//! Core modules:
//! - `state`: The persisted object and partial-update patches
//! - `persistence`: Read/merge/write store over a single key
//! - `platform`: Storage backends (LocalStorage on web, in-memory elsewhere)
//! - `error`: Recoverable storage errors
//! - `bindings`: JavaScript exports (WASM only)

#[cfg(target_arch = "wasm32")]
pub mod bindings;
pub mod error;
pub mod persistence;
pub mod platform;
pub mod state;

pub use error::StoreError;
pub use persistence::{PersistedStateStore, SubscriptionId};
#[cfg(target_arch = "wasm32")]
pub use platform::LocalStorage;
pub use platform::{MemoryStorage, StorageBackend};
pub use state::{PersistedState, StatePatch};

/// Storage configuration constants
pub mod consts {
    /// Key the state object lives under
    pub const DEFAULT_STORAGE_KEY: &str = "data";
    /// What an absent key reads as
    pub const EMPTY_STATE_JSON: &str = "{}";
    /// Typical per-origin LocalStorage limit (5 MiB)
    pub const BROWSER_QUOTA_BYTES: usize = 5 * 1024 * 1024;
    /// Largest integer a JS number holds exactly (`Number.MAX_SAFE_INTEGER`)
    pub const JS_MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;
}
