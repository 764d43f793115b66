//! Key pair generation and public key publication.
//!
//! Supported signing algorithms form a closed enumeration; each variant
//! carries its own key generation path. Private keys are held as PKCS#8 PEM
//! so they round-trip through the serialized key ring unchanged.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};

use crate::MintError;

/// The closed set of supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256 over a generated RSA key pair.
    #[serde(rename = "RS256")]
    Rs256,
    /// ECDSA with SHA-256 over a generated P-256 key pair.
    #[serde(rename = "ES256")]
    Es256,
}

impl KeyAlgorithm {
    /// The JOSE algorithm identifier, as published in JWK and JWT headers.
    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rs256 => "RS256",
            KeyAlgorithm::Es256 => "ES256",
        }
    }

    pub(crate) fn jwt_algorithm(&self) -> Algorithm {
        match self {
            KeyAlgorithm::Rs256 => Algorithm::RS256,
            KeyAlgorithm::Es256 => Algorithm::ES256,
        }
    }

    /// Parses a JOSE algorithm identifier.
    pub fn parse(value: &str) -> Result<Self, MintError> {
        match value {
            "RS256" => Ok(KeyAlgorithm::Rs256),
            "ES256" => Ok(KeyAlgorithm::Es256),
            other => Err(MintError::InvalidConfig(format!(
                "unsupported algorithm '{other}', expected RS256 or ES256"
            ))),
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single JSON Web Key, public components only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub kid: String,
    pub alg: String,
    /// RSA modulus, base64url without padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent, base64url without padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate, base64url without padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate, base64url without padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// A JSON Web Key Set, the publication format for verifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Generates a fresh key pair and returns its PKCS#8 PEM encoding.
pub(crate) fn generate_key_pem(
    algorithm: KeyAlgorithm,
    rsa_key_bits: usize,
) -> Result<String, MintError> {
    match algorithm {
        KeyAlgorithm::Rs256 => {
            let key = RsaPrivateKey::new(&mut rand::thread_rng(), rsa_key_bits)
                .map_err(|e| MintError::Crypto(format!("RSA key generation failed: {e}")))?;
            let pem = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| MintError::Crypto(format!("PEM encoding failed: {e}")))?;
            Ok(pem.to_string())
        }
        KeyAlgorithm::Es256 => {
            let key = p256::SecretKey::random(&mut rand::thread_rng());
            let pem = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| MintError::Crypto(format!("PEM encoding failed: {e}")))?;
            Ok(pem.to_string())
        }
    }
}

/// Builds a `jsonwebtoken` signing key from a stored private key.
pub(crate) fn encoding_key(
    algorithm: KeyAlgorithm,
    private_pem: &str,
) -> Result<EncodingKey, MintError> {
    match algorithm {
        KeyAlgorithm::Rs256 => EncodingKey::from_rsa_pem(private_pem.as_bytes()),
        KeyAlgorithm::Es256 => EncodingKey::from_ec_pem(private_pem.as_bytes()),
    }
    .map_err(|e| MintError::Crypto(format!("invalid private key: {e}")))
}

/// Derives the public JWK for a stored private key.
///
/// Never exposes private components; only the public parameters needed for
/// signature verification are emitted.
pub(crate) fn public_jwk(
    algorithm: KeyAlgorithm,
    private_pem: &str,
    kid: &str,
) -> Result<Jwk, MintError> {
    let mut jwk = Jwk {
        kty: String::new(),
        use_: "sig".to_string(),
        kid: kid.to_string(),
        alg: algorithm.name().to_string(),
        n: None,
        e: None,
        crv: None,
        x: None,
        y: None,
    };

    match algorithm {
        KeyAlgorithm::Rs256 => {
            let key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .map_err(|e| MintError::Crypto(format!("invalid RSA private key: {e}")))?;
            let public = key.to_public_key();
            jwk.kty = "RSA".to_string();
            jwk.n = Some(URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()));
            jwk.e = Some(URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()));
        }
        KeyAlgorithm::Es256 => {
            let key = p256::SecretKey::from_pkcs8_pem(private_pem)
                .map_err(|e| MintError::Crypto(format!("invalid EC private key: {e}")))?;
            let point = key.public_key().to_encoded_point(false);
            let (x, y) = match (point.x(), point.y()) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    return Err(MintError::Crypto(
                        "EC public key has no affine coordinates".to_string(),
                    ));
                }
            };
            jwk.kty = "EC".to_string();
            jwk.crv = Some("P-256".to_string());
            jwk.x = Some(URL_SAFE_NO_PAD.encode(x.as_slice()));
            jwk.y = Some(URL_SAFE_NO_PAD.encode(y.as_slice()));
        }
    }

    Ok(jwk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_round_trip() {
        assert_eq!(KeyAlgorithm::parse("RS256").unwrap(), KeyAlgorithm::Rs256);
        assert_eq!(KeyAlgorithm::parse("ES256").unwrap(), KeyAlgorithm::Es256);
        assert!(matches!(
            KeyAlgorithm::parse("HS256"),
            Err(MintError::InvalidConfig(_))
        ));
        assert_eq!(KeyAlgorithm::Rs256.to_string(), "RS256");
    }

    #[test]
    fn test_ec_jwk_has_public_components_only() {
        let pem = generate_key_pem(KeyAlgorithm::Es256, 0).unwrap();
        let jwk = public_jwk(KeyAlgorithm::Es256, &pem, "kid-1").unwrap();

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert_eq!(jwk.alg, "ES256");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.kid, "kid-1");
        assert!(jwk.x.is_some());
        assert!(jwk.y.is_some());
        assert!(jwk.n.is_none());

        let json = serde_json::to_string(&jwk).unwrap();
        assert!(!json.contains("\"d\""));
        assert!(!json.contains("\"n\""));
    }

    #[test]
    fn test_rsa_jwk_components() {
        let pem = generate_key_pem(KeyAlgorithm::Rs256, 2048).unwrap();
        let jwk = public_jwk(KeyAlgorithm::Rs256, &pem, "kid-rsa").unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert!(jwk.n.is_some());
        // Standard public exponent 65537 is AQAB in base64url
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.crv.is_none());
    }

    #[test]
    fn test_distinct_generations_produce_distinct_keys() {
        let a = generate_key_pem(KeyAlgorithm::Es256, 0).unwrap();
        let b = generate_key_pem(KeyAlgorithm::Es256, 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encoding_key_from_generated_pem() {
        let pem = generate_key_pem(KeyAlgorithm::Es256, 0).unwrap();
        assert!(encoding_key(KeyAlgorithm::Es256, &pem).is_ok());

        let result = encoding_key(KeyAlgorithm::Es256, "not a pem");
        assert!(matches!(result, Err(MintError::Crypto(_))));
    }
}
