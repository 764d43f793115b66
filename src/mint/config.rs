use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::MintError;
use crate::mint::keypair::KeyAlgorithm;

/// Default values for configuration options.
pub const DEFAULT_KEY_ROTATION_PERIOD: &str = "6h0m0s";
pub const DEFAULT_TOKEN_TTL: &str = "5m0s";
pub const DEFAULT_MAX_TTL: &str = "24h0m0s";
pub const DEFAULT_RSA_KEY_BITS: usize = 2048;

/// Configuration for a backend instance.
///
/// Shared across concurrent requests behind a read-write lock: readers take
/// the shared side and never observe a partially-written update; writers take
/// the exclusive side, validate every field, persist, then release.
///
/// Durations cross the external interface as Go-style strings (`"6h0m0s"`)
/// and are parsed with [`parse_duration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    /// Signing algorithm for newly generated keys.
    pub algorithm: KeyAlgorithm,

    /// Modulus size for generated RSA keys. Ignored for EC algorithms.
    pub rsa_key_bits: usize,

    /// How long a key signs new tokens before rotation. Zero means every
    /// signing request creates a brand-new key.
    #[serde(with = "duration_ms")]
    pub key_rotation_period: Duration,

    /// How long an issued token is valid for.
    #[serde(with = "duration_ms")]
    pub token_ttl: Duration,

    /// Maximum lease TTL attached to exported private keys.
    #[serde(with = "duration_ms")]
    pub max_ttl: Duration,

    /// Whether the backend sets the 'iat' claim.
    pub set_iat: bool,

    /// Whether the backend generates and sets the 'jti' claim.
    pub set_jti: bool,

    /// Whether the backend sets the 'nbf' claim. When set it always equals
    /// the 'iat' timestamp.
    pub set_nbf: bool,

    /// Value for the 'iss' claim. Omitted from tokens when empty.
    pub issuer: String,

    /// Pattern every audience value must match, when configured.
    #[serde(with = "opt_regex")]
    pub audience_pattern: Option<Regex>,

    /// Pattern a caller-supplied 'sub' claim must match. With no pattern
    /// configured, 'sub' is rejected like the other reserved claims.
    #[serde(with = "opt_regex")]
    pub subject_pattern: Option<Regex>,

    /// Maximum number of audience values per token. Negative means unlimited.
    pub max_audiences: i64,

    /// When configured, every caller-supplied claim key must appear here.
    pub allowed_claims: Option<Vec<String>>,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Rs256,
            rsa_key_bits: DEFAULT_RSA_KEY_BITS,
            // Defaults are well-formed constants
            key_rotation_period: parse_duration(DEFAULT_KEY_ROTATION_PERIOD)
                .unwrap_or(Duration::from_secs(6 * 3600)),
            token_ttl: parse_duration(DEFAULT_TOKEN_TTL).unwrap_or(Duration::from_secs(300)),
            max_ttl: parse_duration(DEFAULT_MAX_TTL).unwrap_or(Duration::from_secs(24 * 3600)),
            set_iat: true,
            set_jti: true,
            set_nbf: true,
            issuer: String::new(),
            audience_pattern: None,
            subject_pattern: None,
            max_audiences: -1,
            allowed_claims: None,
        }
    }
}

impl MintConfig {
    /// Applies a partial update, validating every present field.
    ///
    /// On error the configuration is left unchanged; the caller holds the
    /// exclusive config lock for the whole apply-persist cycle.
    pub fn apply(&mut self, update: &ConfigUpdate) -> Result<(), MintError> {
        let mut next = self.clone();

        if let Some(algorithm) = &update.algorithm {
            next.algorithm = KeyAlgorithm::parse(algorithm)?;
        }
        if let Some(bits) = update.rsa_key_bits {
            if bits < 2048 {
                return Err(MintError::InvalidConfig(format!(
                    "rsa_key_bits must be at least 2048, got {bits}"
                )));
            }
            next.rsa_key_bits = bits;
        }
        if let Some(period) = &update.key_ttl {
            next.key_rotation_period = parse_duration(period)?;
        }
        if let Some(ttl) = &update.jwt_ttl {
            next.token_ttl = parse_duration(ttl)?;
        }
        if let Some(max_ttl) = &update.max_ttl {
            next.max_ttl = parse_duration(max_ttl)?;
        }
        if let Some(set_iat) = update.set_iat {
            next.set_iat = set_iat;
        }
        if let Some(set_jti) = update.set_jti {
            next.set_jti = set_jti;
        }
        if let Some(set_nbf) = update.set_nbf {
            next.set_nbf = set_nbf;
        }
        if let Some(issuer) = &update.issuer {
            next.issuer = issuer.clone();
        }
        if let Some(pattern) = &update.audience_pattern {
            next.audience_pattern = compile_pattern(pattern, "audience_pattern")?;
        }
        if let Some(pattern) = &update.subject_pattern {
            next.subject_pattern = compile_pattern(pattern, "subject_pattern")?;
        }
        if let Some(max_audiences) = update.max_audiences {
            next.max_audiences = max_audiences;
        }
        if let Some(allowed) = &update.allowed_claims {
            // An empty list clears the allowlist
            next.allowed_claims = if allowed.is_empty() {
                None
            } else {
                Some(allowed.clone())
            };
        }

        *self = next;
        Ok(())
    }

    /// Renders the configuration for the external read interface.
    pub fn view(&self) -> ConfigView {
        ConfigView {
            algorithm: self.algorithm.name().to_string(),
            rsa_key_bits: self.rsa_key_bits,
            key_ttl: format_duration(self.key_rotation_period),
            jwt_ttl: format_duration(self.token_ttl),
            max_ttl: format_duration(self.max_ttl),
            set_iat: self.set_iat,
            set_jti: self.set_jti,
            set_nbf: self.set_nbf,
            issuer: self.issuer.clone(),
            audience_pattern: self.audience_pattern.as_ref().map(|r| r.as_str().to_string()),
            subject_pattern: self.subject_pattern.as_ref().map(|r| r.as_str().to_string()),
            max_audiences: self.max_audiences,
            allowed_claims: self.allowed_claims.clone(),
        }
    }
}

/// An empty pattern string clears the pattern.
fn compile_pattern(pattern: &str, field: &str) -> Result<Option<Regex>, MintError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| MintError::InvalidConfig(format!("invalid {field}: {e}")))
}

/// A partial configuration update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub algorithm: Option<String>,
    pub rsa_key_bits: Option<usize>,
    /// Duration before a key stops signing new tokens, e.g. `"6h"`.
    pub key_ttl: Option<String>,
    /// Duration a token is valid for, e.g. `"5m"`.
    pub jwt_ttl: Option<String>,
    /// Maximum lease TTL for exported keys.
    pub max_ttl: Option<String>,
    pub set_iat: Option<bool>,
    pub set_jti: Option<bool>,
    pub set_nbf: Option<bool>,
    pub issuer: Option<String>,
    pub audience_pattern: Option<String>,
    pub subject_pattern: Option<String>,
    pub max_audiences: Option<i64>,
    pub allowed_claims: Option<Vec<String>>,
}

/// Configuration values as rendered to the host, durations as strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigView {
    pub algorithm: String,
    pub rsa_key_bits: usize,
    pub key_ttl: String,
    pub jwt_ttl: String,
    pub max_ttl: String,
    pub set_iat: bool,
    pub set_jti: bool,
    pub set_nbf: bool,
    pub issuer: String,
    pub audience_pattern: Option<String>,
    pub subject_pattern: Option<String>,
    pub max_audiences: i64,
    pub allowed_claims: Option<Vec<String>>,
}

static DURATION_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    // Unwrap is fine for a literal pattern
    Regex::new(r"^(?:(\d+(?:\.\d+)?)(h|ms|m|s))").unwrap()
});

/// Parses a Go-style duration string such as `"6h0m0s"`, `"90s"` or `"1.5s"`.
///
/// Supported units are `h`, `m`, `s` and `ms`. The bare string `"0"` is
/// accepted as the zero duration.
pub fn parse_duration(input: &str) -> Result<Duration, MintError> {
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(MintError::InvalidConfig("empty duration".to_string()));
    }

    let mut rest = input;
    let mut total_ms: f64 = 0.0;
    while !rest.is_empty() {
        let caps = DURATION_SEGMENT.captures(rest).ok_or_else(|| {
            MintError::InvalidConfig(format!("malformed duration '{input}'"))
        })?;
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| MintError::InvalidConfig(format!("malformed duration '{input}'")))?;
        total_ms += match &caps[2] {
            "h" => value * 3_600_000.0,
            "m" => value * 60_000.0,
            "s" => value * 1_000.0,
            "ms" => value,
            _ => unreachable!(),
        };
        rest = &rest[caps[0].len()..];
    }

    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Renders a duration as a Go-style string, e.g. `"6h0m0s"` or `"1m30s"`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if millis == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let fraction = format!("{millis:03}");
        out.push_str(&format!("{seconds}.{}s", fraction.trim_end_matches('0')));
    }
    out
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_regex {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Regex>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(regex) => serializer.serialize_some(regex.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Regex>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(pattern) => Regex::new(&pattern)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
