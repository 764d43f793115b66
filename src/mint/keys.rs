//! Signing-key lifecycle management.
//!
//! Each path owns an independent key ring: a map of signing keys plus a
//! lease index tracking outstanding token issuances. Rotation is lazy: a key
//! past its rotation deadline is discovered and replaced on the next signing
//! request, never by a background timer. Retired keys stay in the ring while
//! their usage count is above zero so already-issued tokens keep verifying;
//! once drained they are deleted, either by the revoke that drained them or
//! by the next rotation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::MintError;
use crate::mint::config::MintConfig;
use crate::mint::generator::{IdGeneratorFn, TimeProviderFn};
use crate::mint::keypair::{self, Jwks, KeyAlgorithm};
use crate::mint::storage::StorageBackend;

/// A signing key with a rotation deadline and usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKey {
    /// Globally unique key identifier, published as the token `kid` header.
    pub id: String,
    /// Algorithm the key pair was generated for.
    pub algorithm: KeyAlgorithm,
    /// PKCS#8 PEM encoding of the private key.
    pub private_pem: String,
    /// Unix timestamp after which the key no longer signs new tokens.
    /// It remains valid for verification until its leases drain.
    pub use_until: i64,
    /// Number of outstanding leases referencing this key.
    pub usage_count: u64,
}

impl SigningKey {
    fn is_active(&self, now: i64) -> bool {
        self.use_until > now
    }
}

/// The per-path key ring: signing keys plus the lease index.
///
/// Persisted as a single storage entry so one put commits a whole mutation.
/// Every lease points at an existing key until its revoke completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRing {
    #[serde(default)]
    pub keys: BTreeMap<String, SigningKey>,
    #[serde(default)]
    pub leases: HashMap<String, String>,
}

/// Lock-guarded service object owning all key-ring state.
///
/// All mutations (`active_key` on the create path, `record_usage`, `revoke`,
/// `delete_all`) run under one exclusive lock spanning the full
/// read-modify-write cycle, since the storage backend offers no atomic
/// compare-and-swap. In-memory changes are discarded unless the final
/// persist succeeds. `public_jwks` is a pure single read and takes no lock.
pub struct KeyStore {
    storage: Arc<dyn StorageBackend>,
    write_lock: Mutex<()>,
    time_provider: TimeProviderFn,
    id_generator: IdGeneratorFn,
}

impl KeyStore {
    pub(crate) fn new(
        storage: Arc<dyn StorageBackend>,
        time_provider: TimeProviderFn,
        id_generator: IdGeneratorFn,
    ) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
            time_provider,
            id_generator,
        }
    }

    fn ring_key(path: &str) -> String {
        format!("keys/{path}")
    }

    async fn load_ring(&self, path: &str) -> Result<KeyRing, MintError> {
        match self.storage.get(&Self::ring_key(path)).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| MintError::Corrupt(format!("key ring for '{path}': {e}"))),
            None => Ok(KeyRing::default()),
        }
    }

    async fn store_ring(&self, path: &str, ring: &KeyRing) -> Result<(), MintError> {
        let raw = serde_json::to_vec(ring)
            .map_err(|e| MintError::Storage(format!("encoding key ring for '{path}': {e}")))?;
        self.storage.put(&Self::ring_key(path), &raw).await
    }

    /// Returns the active signing key for `path`, creating one if needed.
    ///
    /// Scans the ring for a key whose rotation deadline is still in the
    /// future; otherwise generates a fresh key pair with
    /// `use_until = now + rotation period` and persists the ring before
    /// returning. The whole sequence is one atomic unit under the exclusive
    /// lock, so two concurrent callers cannot both conclude a new key is
    /// needed and persist competing keys.
    pub async fn active_key(
        &self,
        path: &str,
        config: &MintConfig,
    ) -> Result<SigningKey, MintError> {
        let _guard = self.write_lock.lock().await;

        let mut ring = self.load_ring(path).await?;
        let now = (self.time_provider)()?;

        if let Some(key) = ring.keys.values().find(|k| k.is_active(now)) {
            return Ok(key.clone());
        }

        // Rotation point. No key in the ring is active anymore, so anything
        // without outstanding leases is eligible for deletion and gets
        // dropped with the same write that commits the replacement key.
        ring.keys.retain(|_, k| k.usage_count > 0);

        let private_pem = keypair::generate_key_pem(config.algorithm, config.rsa_key_bits)?;
        let key = SigningKey {
            id: (self.id_generator)(),
            algorithm: config.algorithm,
            private_pem,
            use_until: now + config.key_rotation_period.as_secs() as i64,
            usage_count: 0,
        };
        ring.keys.insert(key.id.clone(), key.clone());
        self.store_ring(path, &ring).await?;

        Ok(key)
    }

    /// Records an outstanding lease against `key_id`.
    ///
    /// Called once per successful signing, after the token exists. If the
    /// key vanished in the meantime (the path was wiped concurrently) the
    /// lease is dropped; the token stays valid until its own expiry.
    pub async fn record_usage(
        &self,
        path: &str,
        lease_id: &str,
        key_id: &str,
    ) -> Result<(), MintError> {
        let _guard = self.write_lock.lock().await;

        let mut ring = self.load_ring(path).await?;
        let Some(key) = ring.keys.get_mut(key_id) else {
            warn!(path, key_id, "usage recorded against a deleted key, dropping lease");
            return Ok(());
        };
        key.usage_count += 1;
        ring.leases.insert(lease_id.to_string(), key_id.to_string());
        self.store_ring(path, &ring).await
    }

    /// Releases a lease, deleting the key once fully drained and retired.
    ///
    /// Returns the affected key id, or `None` for an unknown lease. Unknown
    /// leases are tolerated as already-revoked so duplicate or stale revoke
    /// calls stay non-fatal.
    pub async fn revoke(&self, path: &str, lease_id: &str) -> Result<Option<String>, MintError> {
        let _guard = self.write_lock.lock().await;

        let mut ring = self.load_ring(path).await?;
        let Some(key_id) = ring.leases.remove(lease_id) else {
            warn!(path, lease_id, "revoke for unknown lease, treating as already revoked");
            return Ok(None);
        };

        let now = (self.time_provider)()?;
        if let Some(key) = ring.keys.get_mut(&key_id) {
            key.usage_count = key.usage_count.saturating_sub(1);
            if key.usage_count == 0 && !key.is_active(now) {
                ring.keys.remove(&key_id);
            }
        }
        self.store_ring(path, &ring).await?;

        Ok(Some(key_id))
    }

    /// Administrative hard wipe of every key and lease for `path`.
    pub async fn delete_all(&self, path: &str) -> Result<(), MintError> {
        let _guard = self.write_lock.lock().await;
        self.storage.delete(&Self::ring_key(path)).await
    }

    /// Returns the public key set for `path`.
    ///
    /// Includes every retained key, expired-but-still-leased ones included,
    /// so verifiers can check tokens issued before a rotation. Returns an
    /// empty set for paths with no keys. Single uncached read.
    pub async fn public_jwks(&self, path: &str) -> Result<Jwks, MintError> {
        let ring = self.load_ring(path).await?;
        let mut jwks = Jwks::default();
        for key in ring.keys.values() {
            jwks.keys
                .push(keypair::public_jwk(key.algorithm, &key.private_pem, &key.id)?);
        }
        Ok(jwks)
    }
}
