//! Platform abstraction layer
//!
//! The host key-value facility behind a small synchronous trait:
//! - LocalStorage on web
//! - In-memory map everywhere else (and in tests)

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use memory::MemoryStorage;
#[cfg(target_arch = "wasm32")]
pub use web::LocalStorage;

use std::rc::Rc;

use crate::error::StoreError;

/// String-keyed durable storage, shaped after the Web Storage API.
///
/// Any call may fail; writes in particular can hit a quota.
pub trait StorageBackend {
    /// Read the value at `key`, `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` at `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`; removing an absent key is not an error
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for &B {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove_item(key)
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Rc<B> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove_item(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(backend: impl StorageBackend) {
        backend.set_item("k", "v").unwrap();
        assert_eq!(backend.get_item("k").unwrap().as_deref(), Some("v"));
        backend.remove_item("k").unwrap();
        assert_eq!(backend.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_reference_and_rc_delegate() {
        let storage = MemoryStorage::new();
        roundtrip(&storage);

        let shared = Rc::new(MemoryStorage::new());
        roundtrip(Rc::clone(&shared));
        assert!(shared.is_empty());
    }

    #[test]
    fn test_trait_object() {
        let storage: Box<dyn StorageBackend> = Box::new(MemoryStorage::new());
        roundtrip(&*storage);
    }
}
