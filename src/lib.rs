//! # JWT Mint
//!
//! A Rust library for issuing short-lived, asymmetrically signed JWTs with
//! automatic key rotation and lease-based revocation.
//!
//! This library provides the storage-backed core of a token-issuance service.
//! Each signing path (a tenant, a service, an environment) owns an
//! independent ring of signing keys; tokens are signed with the path's
//! currently active key, keys rotate on a configurable period, and retired
//! keys stay published in the path's JWKS for exactly as long as unexpired
//! tokens may still reference them.
//!
//! ## Features
//!
//! - **Asymmetric Signing**: RS256 and ES256, with the key id embedded in
//!   every token header
//! - **Automatic Rotation**: A fresh key is generated lazily once the active
//!   key's rotation deadline passes
//! - **Usage-Counted Retention**: Retired keys are kept only while issued
//!   tokens still hold leases on them
//! - **Lease Revocation**: Every issuance returns a lease id that can later
//!   be revoked, releasing its hold on the key
//! - **JWKS Publication**: Per-path public key sets ready to serve to
//!   verifiers
//! - **Claim Policy**: Reserved-claim protection, allowlists, and audience
//!   and subject pattern enforcement
//! - **Pluggable Storage**: Any key-value store behind the
//!   [`StorageBackend`](storage::StorageBackend) trait
//! - **Async Support**: Fully asynchronous API design
//!
//! ## Quick Start
//!
//! ```rust
//! use jwt_mint::{MintBackend, storage::MemoryStorage};
//! use serde_json::{Map, json};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), jwt_mint::MintError> {
//! let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
//!     .build_and_init()
//!     .await?;
//!
//! // Sign an ad hoc claim set for a path
//! let mut claims = Map::new();
//! claims.insert("aud".to_string(), json!("svc-billing"));
//! let signed = backend.sign_claims("tenant-a", claims).await?;
//!
//! // Publish the path's public keys to verifiers
//! let jwks = backend.jwks("tenant-a").await?;
//! assert_eq!(jwks.keys.len(), 1);
//!
//! // Revoke the issuance when its secret lease ends
//! backend.revoke("tenant-a", &signed.lease_id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stored Claim Sets
//!
//! Frequently used claim sets can be stored under a name and signed without
//! restating them:
//!
//! ```rust
//! use jwt_mint::{MintBackend, storage::MemoryStorage};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), jwt_mint::MintError> {
//! let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
//!     .build_and_init()
//!     .await?;
//!
//! let mut claims = BTreeMap::new();
//! claims.insert("aud".to_string(), "svc-billing".to_string());
//! backend.write_claims("billing", claims).await?;
//!
//! let signed = backend.sign_named("billing").await?;
//! assert!(!signed.token.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`MintBackend`]**: The facade serving configuration, claim-set,
//!   signing, JWKS and revocation operations
//! - **[`MintConfig`]** / **[`ConfigUpdate`]**: Validated, persisted
//!   configuration with partial updates
//! - **[`SignedToken`]**: A compact JWT plus the lease id that revokes it
//! - **[`storage::StorageBackend`]**: The key-value persistence seam
//! - **[`MintError`]**: Comprehensive error handling for all failure modes

pub mod mint;

// Re-export commonly used types
pub use mint::storage;
pub use mint::{
    ConfigUpdate, ConfigView, IdGeneratorFn, Jwk, Jwks, KeyAlgorithm, KeyExport, MintBackend,
    MintBackendBuilder, MintConfig, MintError, SignedToken, TimeProviderFn,
};
