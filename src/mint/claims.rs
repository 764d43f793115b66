//! Named, reusable claim-set templates.
//!
//! Claim sets are independent of the key lifecycle; writes replace the whole
//! map, last write wins. No locking beyond what the storage backend
//! provides, since there is no cross-field invariant to protect.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::MintError;
use crate::mint::storage::StorageBackend;

/// CRUD access to stored claim sets.
pub struct ClaimSetStore {
    storage: Arc<dyn StorageBackend>,
}

impl ClaimSetStore {
    pub(crate) fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    fn claims_key(name: &str) -> String {
        format!("claims/{name}")
    }

    /// Replaces (or creates) the claim set under `name` and echoes it back.
    pub async fn write(
        &self,
        name: &str,
        claims: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, MintError> {
        let raw = serde_json::to_vec(&claims)
            .map_err(|e| MintError::Storage(format!("encoding claim set '{name}': {e}")))?;
        self.storage.put(&Self::claims_key(name), &raw).await?;
        Ok(claims)
    }

    /// Returns the claim set under `name`, or `None` if never written.
    pub async fn read(&self, name: &str) -> Result<Option<BTreeMap<String, String>>, MintError> {
        match self.storage.get(&Self::claims_key(name)).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| MintError::Corrupt(format!("claim set '{name}': {e}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::storage::MemoryStorage;

    fn store() -> ClaimSetStore {
        ClaimSetStore::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let store = store();
        let mut claims = BTreeMap::new();
        claims.insert("dept".to_string(), "engineering".to_string());
        claims.insert("team".to_string(), "platform".to_string());

        let echoed = store.write("set-a", claims.clone()).await.unwrap();
        assert_eq!(echoed, claims);

        let read = store.read("set-a").await.unwrap();
        assert_eq!(read, Some(claims));
    }

    #[tokio::test]
    async fn test_read_unwritten_name_is_absent_not_error() {
        let store = store();
        assert!(store.read("never-written").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = store();
        let mut first = BTreeMap::new();
        first.insert("dept".to_string(), "engineering".to_string());
        store.write("set-a", first).await.unwrap();

        let mut second = BTreeMap::new();
        second.insert("dept".to_string(), "sales".to_string());
        store.write("set-a", second.clone()).await.unwrap();

        assert_eq!(store.read("set-a").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_claim_sets_are_isolated_by_name() {
        let store = store();
        let mut a = BTreeMap::new();
        a.insert("k".to_string(), "a".to_string());
        let mut b = BTreeMap::new();
        b.insert("k".to_string(), "b".to_string());

        store.write("set-a", a.clone()).await.unwrap();
        store.write("set-b", b.clone()).await.unwrap();

        assert_eq!(store.read("set-a").await.unwrap(), Some(a));
        assert_eq!(store.read("set-b").await.unwrap(), Some(b));
    }
}
