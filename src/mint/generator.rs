//! Injectable time and identifier strategies.
//!
//! The backend never reads the system clock or a process-wide RNG directly.
//! Both are modeled as injectable functions so tests can replay issuance
//! deterministically with a fixed clock and a sequential id generator.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::MintError;

/// A function that provides the current Unix timestamp in seconds.
pub type TimeProviderFn = Arc<dyn Fn() -> Result<i64, MintError> + Send + Sync>;

/// A function that generates unique, collision-resistant identifiers.
///
/// Used for key ids, lease ids and the `jti` claim.
pub type IdGeneratorFn = Arc<dyn Fn() -> String + Send + Sync>;

/// The default time provider, backed by the system clock.
///
/// In the extremely rare case where system time is before the Unix epoch,
/// it returns an error instead of panicking.
pub fn system_time_provider() -> TimeProviderFn {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .map_err(|_| MintError::Internal("system time is before the Unix epoch".to_string()))
    })
}

/// The default identifier generator, backed by UUID v4.
pub fn uuid_id_generator() -> IdGeneratorFn {
    Arc::new(|| uuid::Uuid::new_v4().to_string())
}
