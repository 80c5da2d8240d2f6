//! Persisted state accessor
//!
//! Updates are read-modify-write with no compare-and-swap. Two stores
//! sharing a slot (two tabs on one origin) can interleave, and the last
//! writer wins.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::consts::{DEFAULT_STORAGE_KEY, EMPTY_STATE_JSON};
use crate::error::StoreError;
use crate::platform::StorageBackend;
use crate::state::{PersistedState, StatePatch};

type Listener = Rc<dyn Fn(&PersistedState)>;

/// Handle returned by [`PersistedStateStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

impl From<SubscriptionId> for u32 {
    fn from(id: SubscriptionId) -> Self {
        id.0
    }
}

impl From<u32> for SubscriptionId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Owns one key in a storage backend that may not exist
pub struct PersistedStateStore<B> {
    backend: Option<B>,
    key: String,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_id: Cell<u32>,
}

impl<B: StorageBackend> PersistedStateStore<B> {
    /// Store under the default key
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, DEFAULT_STORAGE_KEY)
    }

    /// Store under a custom key
    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self::build(Some(backend), key.into())
    }

    /// Store for an environment with no storage facility
    pub fn unavailable() -> Self {
        Self::build(None, DEFAULT_STORAGE_KEY.to_string())
    }

    pub fn from_optional(backend: Option<B>) -> Self {
        Self::build(backend, DEFAULT_STORAGE_KEY.to_string())
    }

    fn build(backend: Option<B>, key: String) -> Self {
        Self {
            backend,
            key,
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&B, StoreError> {
        self.backend.as_ref().ok_or(StoreError::Unavailable)
    }

    /// Stored text as-is, `None` if the key was never written
    pub fn try_raw(&self) -> Result<Option<String>, StoreError> {
        self.backend()?.get_item(&self.key)
    }

    /// Read and decode the stored state; an absent key is an empty state
    pub fn try_get(&self) -> Result<PersistedState, StoreError> {
        let raw = self.try_raw()?;
        let json = raw.as_deref().unwrap_or(EMPTY_STATE_JSON);
        serde_json::from_str(json).map_err(StoreError::Malformed)
    }

    /// Current state, or an empty one if it can't be read
    pub fn get(&self) -> PersistedState {
        self.try_get().unwrap_or_else(|err| {
            log::debug!("Using empty state for '{}': {}", self.key, err);
            PersistedState::new()
        })
    }

    /// Merge `patch` over the current state and write it back.
    ///
    /// Unreadable current state counts as empty and is overwritten. Returns
    /// the state that was written.
    pub fn try_update(&self, patch: StatePatch) -> Result<PersistedState, StoreError> {
        let backend = self.backend()?;
        let state = self.get().merged(patch);
        let json = serde_json::to_string(&state).map_err(StoreError::Serialize)?;
        backend.set_item(&self.key, &json)?;

        let unsafe_numbers = state.unsafe_numbers();
        if !unsafe_numbers.is_empty() {
            log::warn!(
                "{:?} in '{}' exceed the JS safe integer range; browsers will round them",
                unsafe_numbers,
                self.key
            );
        }
        self.notify(&state);
        Ok(state)
    }

    /// Fire-and-forget update; failures are dropped
    pub fn update(&self, patch: StatePatch) {
        self.settle(self.try_update(patch));
    }

    /// Update from any serializable partial object (a map, a caller struct)
    pub fn try_update_from<T: Serialize + ?Sized>(
        &self,
        partial: &T,
    ) -> Result<PersistedState, StoreError> {
        self.backend()?;
        let value = serde_json::to_value(partial).map_err(StoreError::Serialize)?;
        let patch: StatePatch = serde_json::from_value(value).map_err(StoreError::InvalidPatch)?;
        self.try_update(patch)
    }

    pub fn update_from<T: Serialize + ?Sized>(&self, partial: &T) {
        self.settle(self.try_update_from(partial));
    }

    fn settle(&self, result: Result<PersistedState, StoreError>) {
        match result {
            Ok(_) => log::debug!("State saved to '{}'", self.key),
            Err(StoreError::Unavailable) => log::debug!("No storage, update skipped"),
            Err(err) if err.is_write_failure() => {
                log::warn!("Dropped update to '{}': {}", self.key, err)
            }
            Err(err) => log::debug!("Ignored update to '{}': {}", self.key, err),
        }
    }

    /// Remove the stored state entirely
    pub fn try_clear(&self) -> Result<(), StoreError> {
        self.backend()?.remove_item(&self.key)?;
        self.notify(&PersistedState::new());
        Ok(())
    }

    pub fn clear(&self) {
        match self.try_clear() {
            Ok(()) => log::info!("Persisted state cleared"),
            Err(StoreError::Unavailable) => {}
            Err(err) => log::warn!("Failed to clear '{}': {}", self.key, err),
        }
    }

    /// Call `listener` with the current state now and after every successful
    /// write through this store.
    ///
    /// Writes from other stores on the same slot are not observed.
    pub fn subscribe(&self, listener: impl Fn(&PersistedState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));

        let listener: Listener = Rc::new(listener);
        listener(&self.get());
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(other, _)| *other != id);
        listeners.len() != before
    }

    // Snapshot first so listeners may (un)subscribe or update re-entrantly.
    fn notify(&self, state: &PersistedState) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl PersistedStateStore<crate::platform::LocalStorage> {
    /// Store over `window.localStorage`, unavailable if the browser has none
    pub fn from_window() -> Self {
        Self::from_optional(crate::platform::LocalStorage::from_window())
    }
}
