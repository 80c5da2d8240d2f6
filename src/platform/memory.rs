//! In-memory storage backend
//!
//! Behaves like a single origin's LocalStorage, including an optional quota
//! so write failures can be reproduced off the browser.

use std::cell::RefCell;
use std::collections::HashMap;

use super::StorageBackend;
use crate::error::StoreError;

/// HashMap-backed storage with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Unlimited storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once keys plus values exceed `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: RefCell::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Bytes in use (keys + values)
    pub fn used_bytes(&self) -> usize {
        self.items
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    // Usage if `key` were removed, i.e. the baseline for replacing it.
    fn used_bytes_without(&self, key: &str) -> usize {
        let current = self
            .items
            .borrow()
            .get(key)
            .map(|v| key.len() + v.len())
            .unwrap_or(0);
        self.used_bytes() - current
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota {
            let needed = self.used_bytes_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        storage.set_item("data", "{}").unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.used_bytes(), 6);
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("data", "{}").unwrap();

        let err = storage.set_item("data", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { needed: 14, quota: 10 }));

        // Rejected write leaves the old value in place
        assert_eq!(storage.get_item("data").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_quota_counts_replacement_not_sum() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("data", "123456").unwrap();
        // Replacing the same key only needs room for the new value
        storage.set_item("data", "654321").unwrap();
        assert_eq!(storage.used_bytes(), 10);
    }

    #[test]
    fn test_browser_sized_quota_fits_large_payload() {
        let storage = MemoryStorage::with_quota(crate::consts::BROWSER_QUOTA_BYTES);
        let payload = "x".repeat(1024 * 1024);
        assert!(storage.set_item("data", &payload).is_ok());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.remove_item("nope").is_ok());
    }
}
