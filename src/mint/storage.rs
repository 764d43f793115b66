use async_trait::async_trait;

use crate::MintError;

/// Abstract key-value storage backend for durable state.
///
/// This trait defines the interface the backend uses to persist key rings,
/// claim sets and configuration. Keys are stable string paths; values are
/// opaque byte blobs. The store offers no transactions and no atomic
/// compare-and-swap, so callers serialize their own read-modify-write cycles.
///
/// # Thread Safety
///
/// All methods are async and must be thread-safe. Implementations should
/// handle concurrent access properly.
///
/// # Error Handling
///
/// All methods return `Result<T, MintError>` and should map backend-specific
/// errors to `MintError::Storage`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MintError>;

    /// Stores `value` under `key`, replacing any existing value.
    ///
    /// Each put must be atomic for its entry: a concurrent `get` on the same
    /// key observes either the old value or the new one, never a partial
    /// write. Readers rely on this for lock-free snapshot reads.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), MintError>;

    /// Removes the entry under `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), MintError>;

    /// Lists all keys beginning with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, MintError>;
}

/// A simple in-memory storage implementation for testing and demonstration.
///
/// This implementation uses a `HashMap` wrapped in `Arc<RwLock<>>` for
/// thread-safe access. It doesn't persist data across restarts.
///
/// # Usage
///
/// ```rust
/// use jwt_mint::storage::{MemoryStorage, StorageBackend};
///
/// # async fn example() -> Result<(), jwt_mint::MintError> {
/// let storage = MemoryStorage::new();
///
/// storage.put("keys/tenant-a", b"blob").await?;
/// assert!(storage.get("keys/tenant-a").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: std::sync::Arc<tokio::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Creates a new in-memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MintError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), MintError> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MintError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, MintError> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_basic_operations() -> Result<(), MintError> {
        let storage = MemoryStorage::new();

        storage.put("keys/a", b"one").await?;
        assert_eq!(storage.get("keys/a").await?, Some(b"one".to_vec()));

        // Overwrite is last-write-wins
        storage.put("keys/a", b"two").await?;
        assert_eq!(storage.get("keys/a").await?, Some(b"two".to_vec()));

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_delete() -> Result<(), MintError> {
        let storage = MemoryStorage::new();

        storage.put("keys/a", b"one").await?;
        storage.delete("keys/a").await?;
        assert!(storage.get("keys/a").await?.is_none());

        // Deleting an absent key is not an error
        storage.delete("keys/missing").await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_list_by_prefix() -> Result<(), MintError> {
        let storage = MemoryStorage::new();

        storage.put("keys/a", b"1").await?;
        storage.put("keys/b", b"2").await?;
        storage.put("claims/a", b"3").await?;

        let keys = storage.list("keys/").await?;
        assert_eq!(keys, vec!["keys/a".to_string(), "keys/b".to_string()]);

        let all = storage.list("").await?;
        assert_eq!(all.len(), 3);

        Ok(())
    }
}
