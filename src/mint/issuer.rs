//! Claim validation and token issuance.
//!
//! The issuer validates caller claims against policy, augments them with the
//! computed registered claims, obtains the active signing key for the path
//! and produces a compact JWT. A lease is recorded only after signing
//! succeeds, so a failed signature never leaves usage accounting behind.

use serde_json::{Map, Value, json};

use crate::MintError;
use crate::mint::config::MintConfig;
use crate::mint::generator::{IdGeneratorFn, TimeProviderFn};
use crate::mint::keypair::{self, KeyAlgorithm};
use crate::mint::keys::KeyStore;

/// Claim names computed by the backend; callers can never set them directly.
pub const RESERVED_CLAIMS: [&str; 5] = ["exp", "nbf", "iat", "jti", "iss"];

/// A signed token together with its revocable lease handle.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The compact serialized JWT.
    pub token: String,
    /// Lease identifier for later revocation of this issuance.
    pub lease_id: String,
}

/// Builds and signs tokens on top of a [`KeyStore`].
pub struct TokenIssuer {
    time_provider: TimeProviderFn,
    id_generator: IdGeneratorFn,
}

impl TokenIssuer {
    pub(crate) fn new(time_provider: TimeProviderFn, id_generator: IdGeneratorFn) -> Self {
        Self {
            time_provider,
            id_generator,
        }
    }

    /// Issues a signed token for `path` with the given caller claims.
    ///
    /// Validation happens before any state is touched; validation failures
    /// are user errors with no mutation. Key generation or signing failures
    /// abort the request before the lease is recorded.
    pub async fn issue(
        &self,
        store: &KeyStore,
        path: &str,
        caller_claims: Map<String, Value>,
        config: &MintConfig,
    ) -> Result<SignedToken, MintError> {
        validate_claims(&caller_claims, config)?;

        let now = (self.time_provider)()?;
        let claims = self.augment_claims(caller_claims, config, now)?;

        let key = store.active_key(path, config).await?;
        let token = sign_token(&key.id, key.algorithm, &key.private_pem, &claims)?;

        let lease_id = (self.id_generator)();
        store.record_usage(path, &lease_id, &key.id).await?;

        Ok(SignedToken { token, lease_id })
    }

    /// Merges the computed registered claims over the caller's claim set.
    fn augment_claims(
        &self,
        mut claims: Map<String, Value>,
        config: &MintConfig,
        now: i64,
    ) -> Result<Map<String, Value>, MintError> {
        let expiry = now + config.token_ttl.as_secs() as i64;
        claims.insert("exp".to_string(), json!(expiry));

        if config.set_iat {
            claims.insert("iat".to_string(), json!(now));
        }
        if config.set_nbf {
            claims.insert("nbf".to_string(), json!(now));
        }
        if config.set_jti {
            claims.insert("jti".to_string(), json!((self.id_generator)()));
        }
        if !config.issuer.is_empty() {
            claims.insert("iss".to_string(), json!(config.issuer));
        }

        Ok(claims)
    }
}

/// Checks the caller claim set against the configured policy.
fn validate_claims(claims: &Map<String, Value>, config: &MintConfig) -> Result<(), MintError> {
    for (name, value) in claims {
        if RESERVED_CLAIMS.contains(&name.as_str()) {
            return Err(MintError::InvalidClaims(format!(
                "claim '{name}' is reserved"
            )));
        }

        if let Some(allowed) = &config.allowed_claims {
            if !allowed.iter().any(|a| a == name) {
                return Err(MintError::InvalidClaims(format!(
                    "claim '{name}' is not in the allowed claims list"
                )));
            }
        }

        // The claim set must be flat: no nested objects, and lists are only
        // meaningful for the audience claim.
        match value {
            Value::Object(_) => {
                return Err(MintError::InvalidClaims(format!(
                    "claim '{name}' must not be a nested object"
                )));
            }
            Value::Array(_) if name != "aud" => {
                return Err(MintError::InvalidClaims(format!(
                    "claim '{name}' must not be a list"
                )));
            }
            _ => {}
        }
    }

    validate_audiences(claims.get("aud"), config)?;
    validate_subject(claims.get("sub"), config)?;

    Ok(())
}

/// The audience claim may be a single string or a list of strings; every
/// value must match the configured pattern and the count must stay within
/// the configured maximum.
fn validate_audiences(aud: Option<&Value>, config: &MintConfig) -> Result<(), MintError> {
    let Some(aud) = aud else {
        return Ok(());
    };

    let values: Vec<&str> = match aud {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => values.push(s.as_str()),
                    _ => {
                        return Err(MintError::InvalidClaims(
                            "audience values must be strings".to_string(),
                        ));
                    }
                }
            }
            values
        }
        _ => {
            return Err(MintError::InvalidClaims(
                "claim 'aud' must be a string or a list of strings".to_string(),
            ));
        }
    };

    if config.max_audiences >= 0 && values.len() as i64 > config.max_audiences {
        return Err(MintError::InvalidClaims(format!(
            "{} audiences exceeds the configured maximum of {}",
            values.len(),
            config.max_audiences
        )));
    }

    if let Some(pattern) = &config.audience_pattern {
        for value in values {
            if !pattern.is_match(value) {
                return Err(MintError::InvalidClaims(format!(
                    "audience '{value}' does not match the configured pattern"
                )));
            }
        }
    }

    Ok(())
}

/// A caller-supplied subject is accepted only when a subject pattern is
/// configured and the value matches it.
fn validate_subject(sub: Option<&Value>, config: &MintConfig) -> Result<(), MintError> {
    let Some(sub) = sub else {
        return Ok(());
    };

    let Value::String(value) = sub else {
        return Err(MintError::InvalidClaims(
            "claim 'sub' must be a string".to_string(),
        ));
    };

    match &config.subject_pattern {
        Some(pattern) if pattern.is_match(value) => Ok(()),
        Some(_) => Err(MintError::InvalidClaims(format!(
            "subject '{value}' does not match the configured pattern"
        ))),
        None => Err(MintError::InvalidClaims(
            "claim 'sub' is reserved unless a subject pattern is configured".to_string(),
        )),
    }
}

/// Signs the claim set, embedding the key id in the token header.
fn sign_token(
    kid: &str,
    algorithm: KeyAlgorithm,
    private_pem: &str,
    claims: &Map<String, Value>,
) -> Result<String, MintError> {
    let mut header = jsonwebtoken::Header::new(algorithm.jwt_algorithm());
    header.kid = Some(kid.to_string());

    let key = keypair::encoding_key(algorithm, private_pem)?;
    jsonwebtoken::encode(&header, claims, &key)
        .map_err(|e| MintError::Crypto(format!("signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::config::ConfigUpdate;

    fn config_with(update: ConfigUpdate) -> MintConfig {
        let mut config = MintConfig::default();
        config.apply(&update).unwrap();
        config
    }

    fn claims(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_reserved_claims_rejected() {
        let config = MintConfig::default();
        for name in RESERVED_CLAIMS {
            let result = validate_claims(&claims(&[(name, json!("x"))]), &config);
            assert!(
                matches!(result, Err(MintError::InvalidClaims(_))),
                "expected '{name}' to be rejected"
            );
        }
    }

    #[test]
    fn test_nested_claims_rejected() {
        let config = MintConfig::default();

        let result = validate_claims(&claims(&[("meta", json!({"a": 1}))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));

        let result = validate_claims(&claims(&[("roles", json!(["a", "b"]))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));

        // Lists are fine for the audience claim
        validate_claims(&claims(&[("aud", json!(["a", "b"]))]), &config).unwrap();
    }

    #[test]
    fn test_allowlist_enforced() {
        let config = config_with(ConfigUpdate {
            allowed_claims: Some(vec!["aud".to_string(), "dept".to_string()]),
            ..Default::default()
        });

        validate_claims(&claims(&[("dept", json!("eng"))]), &config).unwrap();

        let result = validate_claims(&claims(&[("team", json!("eng"))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));
    }

    #[test]
    fn test_audience_pattern() {
        let config = config_with(ConfigUpdate {
            audience_pattern: Some("^svc-[a-z]+$".to_string()),
            ..Default::default()
        });

        validate_claims(&claims(&[("aud", json!("svc-billing"))]), &config).unwrap();
        validate_claims(&claims(&[("aud", json!(["svc-a", "svc-b"]))]), &config).unwrap();

        let result = validate_claims(&claims(&[("aud", json!("other"))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));

        let result = validate_claims(&claims(&[("aud", json!(["svc-a", "other"]))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));
    }

    #[test]
    fn test_max_audiences() {
        let config = config_with(ConfigUpdate {
            max_audiences: Some(2),
            ..Default::default()
        });

        validate_claims(&claims(&[("aud", json!(["a", "b"]))]), &config).unwrap();

        let result = validate_claims(&claims(&[("aud", json!(["a", "b", "c"]))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));
    }

    #[test]
    fn test_subject_requires_pattern() {
        let config = MintConfig::default();
        let result = validate_claims(&claims(&[("sub", json!("user-1"))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));

        let config = config_with(ConfigUpdate {
            subject_pattern: Some("^user-[0-9]+$".to_string()),
            ..Default::default()
        });
        validate_claims(&claims(&[("sub", json!("user-1"))]), &config).unwrap();

        let result = validate_claims(&claims(&[("sub", json!("admin"))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));
    }

    #[test]
    fn test_non_string_audience_rejected() {
        let config = MintConfig::default();

        let result = validate_claims(&claims(&[("aud", json!([1, 2]))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));

        let result = validate_claims(&claims(&[("aud", json!(42))]), &config);
        assert!(matches!(result, Err(MintError::InvalidClaims(_))));
    }
}
