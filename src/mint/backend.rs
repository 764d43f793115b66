use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::error;

use crate::MintError;
use crate::mint::claims::ClaimSetStore;
use crate::mint::config::{ConfigUpdate, ConfigView, MintConfig};
use crate::mint::generator::{
    IdGeneratorFn, TimeProviderFn, system_time_provider, uuid_id_generator,
};
use crate::mint::issuer::{SignedToken, TokenIssuer};
use crate::mint::keypair::Jwks;
use crate::mint::keys::KeyStore;
use crate::mint::storage::StorageBackend;

const CONFIG_STORAGE_KEY: &str = "config";

/// An exported private key together with its revocable lease handle.
///
/// Administrative/debug surface: the host wraps this in a revocable secret
/// whose internal metadata carries `(lease_id, path)` for later revocation.
#[derive(Debug, Clone)]
pub struct KeyExport {
    /// PKCS#8 PEM encoding of the private key.
    pub pem: String,
    /// The key id, matching the `kid` of tokens signed with this key.
    pub id: String,
    /// Unix timestamp at which the key stops signing new tokens.
    pub rotate_at: i64,
    /// Lease identifier for later revocation of this export.
    pub lease_id: String,
    /// Maximum lease TTL the host should attach to the secret.
    pub max_ttl: Duration,
}

/// The backend facade exposed to the host.
///
/// One instance serves concurrent requests from independent tasks. The
/// configuration sits behind a read-write lock; key-ring mutations are
/// serialized inside the [`KeyStore`]. There are no background tasks: every
/// lifecycle transition happens synchronously inside request handling.
///
/// To create an instance, use [`MintBackend::builder`].
///
/// # Example
///
/// ```rust
/// use jwt_mint::{MintBackend, storage::MemoryStorage};
/// use serde_json::{Map, json};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), jwt_mint::MintError> {
/// let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
///     .build_and_init()
///     .await?;
///
/// let mut claims = Map::new();
/// claims.insert("aud".to_string(), json!("svc-billing"));
///
/// let signed = backend.sign_claims("tenant-a", claims).await?;
/// let jwks = backend.jwks("tenant-a").await?;
/// assert_eq!(jwks.keys.len(), 1);
///
/// // Later, the host revokes the issuance via its lease
/// backend.revoke("tenant-a", &signed.lease_id).await?;
/// # Ok(())
/// # }
/// ```
pub struct MintBackend {
    storage: Arc<dyn StorageBackend>,
    config: RwLock<MintConfig>,
    keys: KeyStore,
    issuer: TokenIssuer,
    claim_sets: ClaimSetStore,
    id_generator: IdGeneratorFn,
}

impl MintBackend {
    /// Creates a new [`MintBackendBuilder`] over the given storage backend.
    pub fn builder(storage: Arc<dyn StorageBackend>) -> MintBackendBuilder {
        MintBackendBuilder::new(storage)
    }

    /// Returns the current configuration, durations rendered as strings.
    pub async fn read_config(&self) -> ConfigView {
        self.config.read().await.view()
    }

    /// Applies a partial configuration update and returns the result.
    ///
    /// The update is validated and persisted before the in-memory
    /// configuration is replaced, so concurrent readers never observe a
    /// partially-written or unpersisted config.
    pub async fn write_config(&self, update: ConfigUpdate) -> Result<ConfigView, MintError> {
        let mut guard = self.config.write().await;

        let mut next = guard.clone();
        next.apply(&update)?;

        let raw = serde_json::to_vec(&next)
            .map_err(|e| MintError::Storage(format!("encoding config: {e}")))?;
        self.storage.put(CONFIG_STORAGE_KEY, &raw).await?;

        *guard = next;
        Ok(guard.view())
    }

    /// Stores a named claim set, replacing any previous contents.
    pub async fn write_claims(
        &self,
        name: &str,
        claims: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, MintError> {
        self.claim_sets.write(name, claims).await
    }

    /// Reads a named claim set; `None` when never written.
    pub async fn read_claims(
        &self,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, MintError> {
        self.claim_sets.read(name).await
    }

    /// Signs an ad hoc claim set for `path`.
    pub async fn sign_claims(
        &self,
        path: &str,
        claims: Map<String, Value>,
    ) -> Result<SignedToken, MintError> {
        let config = self.config.read().await.clone();
        self.issuer.issue(&self.keys, path, claims, &config).await
    }

    /// Signs the pre-stored claim set named `name` for the path of the same
    /// name.
    pub async fn sign_named(&self, name: &str) -> Result<SignedToken, MintError> {
        let Some(stored) = self.claim_sets.read(name).await? else {
            return Err(MintError::InvalidClaims(format!(
                "no claim set stored under '{name}'"
            )));
        };

        let claims: Map<String, Value> = stored
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        let config = self.config.read().await.clone();
        self.issuer.issue(&self.keys, name, claims, &config).await
    }

    /// Exports the active private key for `path` and records a lease.
    pub async fn read_keys(&self, path: &str) -> Result<KeyExport, MintError> {
        let config = self.config.read().await.clone();
        let key = self.keys.active_key(path, &config).await?;

        let lease_id = (self.id_generator)();
        self.keys.record_usage(path, &lease_id, &key.id).await?;

        Ok(KeyExport {
            pem: key.private_pem,
            id: key.id,
            rotate_at: key.use_until,
            lease_id,
            max_ttl: config.max_ttl,
        })
    }

    /// Returns the public key set for `path`; empty for unknown paths.
    pub async fn jwks(&self, path: &str) -> Result<Jwks, MintError> {
        self.keys.public_jwks(path).await
    }

    /// Hard-wipes every key and lease for `path`.
    pub async fn delete_keys(&self, path: &str) -> Result<(), MintError> {
        self.keys.delete_all(path).await
    }

    /// Revocation callback: releases the lease behind an issued secret.
    ///
    /// Returns the affected key id, or `None` when the lease was already
    /// revoked or never existed; both are non-fatal.
    pub async fn revoke(&self, path: &str, lease_id: &str) -> Result<Option<String>, MintError> {
        self.keys.revoke(path, lease_id).await
    }
}

/// Builder for [`MintBackend`], mirroring the injectable collaborators:
/// storage, clock and id generation.
pub struct MintBackendBuilder {
    storage: Arc<dyn StorageBackend>,
    config: Option<MintConfig>,
    time_provider: Option<TimeProviderFn>,
    id_generator: Option<IdGeneratorFn>,
}

impl MintBackendBuilder {
    fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            config: None,
            time_provider: None,
            id_generator: None,
        }
    }

    /// Sets the configuration used when storage holds no persisted config.
    pub fn with_config(mut self, config: MintConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a custom time provider, e.g. a fixed clock in tests.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.time_provider = Some(provider);
        self
    }

    /// Sets a custom id generator, e.g. a sequential generator in tests.
    pub fn with_id_generator(mut self, generator: IdGeneratorFn) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Builds the backend, loading any persisted configuration.
    ///
    /// A configuration entry already in storage takes precedence over
    /// [`with_config`](Self::with_config), which only seeds fresh instances.
    pub async fn build_and_init(self) -> Result<MintBackend, MintError> {
        let config = match self.storage.get(CONFIG_STORAGE_KEY).await? {
            Some(raw) => serde_json::from_slice(&raw).map_err(|e| {
                error!("failed to decode persisted configuration: {e}");
                MintError::Corrupt(format!("persisted config: {e}"))
            })?,
            None => self.config.unwrap_or_default(),
        };

        let time_provider = self.time_provider.unwrap_or_else(system_time_provider);
        let id_generator = self.id_generator.unwrap_or_else(uuid_id_generator);

        Ok(MintBackend {
            keys: KeyStore::new(
                Arc::clone(&self.storage),
                Arc::clone(&time_provider),
                Arc::clone(&id_generator),
            ),
            issuer: TokenIssuer::new(Arc::clone(&time_provider), Arc::clone(&id_generator)),
            claim_sets: ClaimSetStore::new(Arc::clone(&self.storage)),
            config: RwLock::new(config),
            storage: self.storage,
            id_generator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::keypair::KeyAlgorithm;
    use crate::mint::storage::MemoryStorage;

    fn es256_config() -> MintConfig {
        MintConfig {
            algorithm: KeyAlgorithm::Es256,
            ..MintConfig::default()
        }
    }

    #[tokio::test]
    async fn test_config_read_reflects_defaults() {
        let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
            .build_and_init()
            .await
            .unwrap();

        let view = backend.read_config().await;
        assert_eq!(view.key_ttl, "6h0m0s");
        assert_eq!(view.jwt_ttl, "5m0s");
        assert!(view.set_iat && view.set_jti && view.set_nbf);
    }

    #[tokio::test]
    async fn test_config_write_persists_across_instances() {
        let storage = Arc::new(MemoryStorage::new());

        let backend = MintBackend::builder(Arc::clone(&storage) as Arc<dyn StorageBackend>)
            .build_and_init()
            .await
            .unwrap();
        backend
            .write_config(ConfigUpdate {
                issuer: Some("https://issuer.example".to_string()),
                jwt_ttl: Some("10m".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        // A new instance over the same storage picks up the persisted config
        let reopened = MintBackend::builder(storage)
            .build_and_init()
            .await
            .unwrap();
        let view = reopened.read_config().await;
        assert_eq!(view.issuer, "https://issuer.example");
        assert_eq!(view.jwt_ttl, "10m0s");
    }

    #[tokio::test]
    async fn test_config_write_rejects_malformed_duration() {
        let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
            .build_and_init()
            .await
            .unwrap();

        let result = backend
            .write_config(ConfigUpdate {
                key_ttl: Some("sideways".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(MintError::InvalidConfig(_))));

        // The failed write left the config untouched
        assert_eq!(backend.read_config().await.key_ttl, "6h0m0s");
    }

    #[tokio::test]
    async fn test_read_keys_exports_private_pem_with_lease() {
        let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
            .with_config(es256_config())
            .build_and_init()
            .await
            .unwrap();

        let export = backend.read_keys("tenant-a").await.unwrap();
        assert!(export.pem.contains("PRIVATE KEY"));
        assert!(!export.lease_id.is_empty());
        assert_eq!(export.max_ttl, Duration::from_secs(24 * 3600));

        // The export holds a lease on the key; the JWKS publishes its id
        let jwks = backend.jwks("tenant-a").await.unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, export.id);

        // Revoking the export's lease releases it
        let revoked = backend.revoke("tenant-a", &export.lease_id).await.unwrap();
        assert_eq!(revoked, Some(export.id));
    }

    #[tokio::test]
    async fn test_corrupt_persisted_config_fails_init() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put(CONFIG_STORAGE_KEY, b"{oops").await.unwrap();

        let result = MintBackend::builder(storage).build_and_init().await;
        assert!(matches!(result, Err(MintError::Corrupt(_))));
    }
}
