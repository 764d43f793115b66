// Core architecture components
mod backend;
mod claims;
mod config;
mod error;
mod generator;
mod issuer;
mod keypair;
mod keys;

// Pluggable persistence
pub mod storage;

// Core components exports
pub use backend::{KeyExport, MintBackend, MintBackendBuilder};
pub use config::{ConfigUpdate, ConfigView, MintConfig, format_duration, parse_duration};
pub use error::MintError;
pub use generator::{IdGeneratorFn, TimeProviderFn, system_time_provider, uuid_id_generator};
pub use issuer::{RESERVED_CLAIMS, SignedToken};
pub use keypair::{Jwk, Jwks, KeyAlgorithm};
