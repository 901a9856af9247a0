//! Persistent key-value slot abstraction.
//!
//! Models the localStorage-style surface the cache store persists to:
//! synchronous get/set/remove on string values, where a write may fail
//! because the slot's byte budget is exhausted. Quota failures are a
//! recoverable signal (the store runs its eviction ladder); anything
//! else means the slot is unusable and the store degrades to no-cache.

use std::cell::RefCell;
use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotError {
    /// The write would exceed the slot's byte budget. Recoverable.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The slot cannot be read or written at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type SlotResult<T> = Result<T, SlotError>;

/// A synchronous string key-value slot with a byte budget.
pub trait KvSlot {
    fn get(&self, key: &str) -> SlotResult<Option<String>>;

    /// Store `value` under `key`, replacing any prior value.
    /// Returns `Err(SlotError::QuotaExceeded)` when the write would
    /// push total stored bytes past the slot's budget.
    fn set(&self, key: &str, value: &str) -> SlotResult<()>;

    fn remove(&self, key: &str) -> SlotResult<()>;
}

/// In-memory slot, optionally byte-bounded. Used in tests and as the
/// no-persistence fallback.
#[derive(Debug, Default)]
pub struct MemorySlot {
    entries: RefCell<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that rejects writes once total stored value bytes would
    /// exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum()
    }
}

impl KvSlot for MemorySlot {
    fn get(&self, key: &str) -> SlotResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SlotResult<()> {
        if let Some(quota) = self.quota_bytes {
            if self.used_bytes_excluding(key) + value.len() > quota {
                return Err(SlotError::QuotaExceeded);
            }
        }
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SlotResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slot_roundtrip() {
        let slot = MemorySlot::new();
        slot.set("a", "hello").unwrap();
        assert_eq!(slot.get("a").unwrap().as_deref(), Some("hello"));
        slot.remove("a").unwrap();
        assert_eq!(slot.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_slot_quota_rejects_oversized_write() {
        let slot = MemorySlot::with_quota(8);
        slot.set("a", "1234").unwrap();
        let err = slot.set("b", "12345").unwrap_err();
        assert!(matches!(err, SlotError::QuotaExceeded));
        // Replacing the existing key counts the old value as freed.
        slot.set("a", "12345678").unwrap();
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let slot = MemorySlot::new();
        slot.remove("missing").unwrap();
    }
}
