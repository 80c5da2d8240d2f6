//! Browser LocalStorage backend (WASM only)

use wasm_bindgen::{JsCast, JsValue};

use super::StorageBackend;
use crate::error::StoreError;

/// `window.localStorage`
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    pub fn new(storage: web_sys::Storage) -> Self {
        Self { storage }
    }

    /// Look up `window.localStorage`.
    ///
    /// `None` when there is no window (workers), when access throws (storage
    /// disabled, sandboxed iframes) or when the browser reports `null`.
    pub fn from_window() -> Option<Self> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten()
            .map(Self::new)
    }
}

/// Best-effort text for a thrown JS value (usually a DOMException)
fn describe(err: JsValue) -> String {
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

impl StorageBackend for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage
            .get_item(key)
            .map_err(|e| StoreError::Read(describe(e)))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StoreError::Write(describe(e)))
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.storage
            .remove_item(key)
            .map_err(|e| StoreError::Write(describe(e)))
    }
}
