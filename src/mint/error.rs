use thiserror::Error;

/// Error types that can occur during token issuance and key management.
///
/// # Error Categories
///
/// - **User errors**: `InvalidClaims` and `InvalidConfig`. The request was
///   malformed or violated policy; no state has been mutated.
/// - **System errors**: `Storage`, `Corrupt`, `Crypto` and `Internal`. The
///   request failed internally; any in-flight key-ring mutation is
///   discarded, and nothing is considered committed unless the final
///   persist succeeded.
///
/// # Example
///
/// ```rust
/// use jwt_mint::{MintBackend, MintError, storage::MemoryStorage};
/// use serde_json::{Map, json};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MintBackend::builder(Arc::new(MemoryStorage::new()))
///     .build_and_init()
///     .await?;
///
/// let mut claims = Map::new();
/// claims.insert("exp".to_string(), json!(0));
///
/// match backend.sign_claims("tenant-a", claims).await {
///     Ok(signed) => println!("token: {}", signed.token),
///     Err(MintError::InvalidClaims(msg)) => println!("rejected: {msg}"),
///     Err(e) => println!("other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum MintError {
    /// The caller-supplied claim set violated policy.
    ///
    /// Covers non-flat claim maps, reserved claim names, claims outside the
    /// configured allowlist, audience or subject pattern mismatches, and
    /// audience counts above the configured maximum. No state is mutated.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// A configuration write contained a malformed field.
    ///
    /// Covers unparseable duration strings, invalid regex patterns and
    /// out-of-range numeric fields. The previous configuration stays active.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A storage backend operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted state could not be decoded.
    ///
    /// Raised when a stored key ring, claim set or configuration entry fails
    /// JSON decoding. The entry is left untouched for inspection.
    #[error("corrupt storage entry: {0}")]
    Corrupt(String),

    /// A cryptographic operation failed.
    ///
    /// Covers key pair generation, PEM encoding and token signing failures.
    /// No usage is ever recorded for a key that failed to sign.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// An internal invariant failed.
    ///
    /// Covers conditions that should never occur in a healthy process, such
    /// as the system clock reading before the Unix epoch.
    #[error("internal error: {0}")]
    Internal(String),
}
