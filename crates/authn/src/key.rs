//! Issuer public key parsing.
//!
//! Registry entries store key material as text. Two encodings are accepted:
//!
//! - base64url (unpadded) raw 32-byte Ed25519 public key, verifying `EdDSA`
//! - PEM `PUBLIC KEY` document holding an Ed25519 key (`EdDSA`) or an RSA
//!   key (`RS256`)

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey};
use zeroize::Zeroizing;

use crate::error::{AuthError, Result};

/// A parsed issuer key, ready for signature verification.
#[derive(Clone)]
pub struct IssuerPublicKey {
    algorithm: Algorithm,
    key: DecodingKey,
}

impl std::fmt::Debug for IssuerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerPublicKey").field("algorithm", &self.algorithm).finish_non_exhaustive()
    }
}

impl IssuerPublicKey {
    /// Parses stored key material.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] if the material is neither a
    /// valid raw Ed25519 key nor a supported PEM document.
    pub fn parse(material: &str) -> Result<Self> {
        let material = material.trim();
        if material.starts_with("-----BEGIN") {
            Self::parse_pem(material)
        } else {
            Self::parse_raw_ed25519(material)
        }
    }

    /// The only algorithm this key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The jsonwebtoken decoding key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    fn parse_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = DecodingKey::from_ed_pem(pem.as_bytes()) {
            return Ok(Self { algorithm: Algorithm::EdDSA, key });
        }
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(|key| Self { algorithm: Algorithm::RS256, key })
            .map_err(|e| AuthError::invalid_public_key(format!("unsupported PEM key: {e}")))
    }

    fn parse_raw_ed25519(encoded: &str) -> Result<Self> {
        // Raw key bytes are scrubbed from memory on drop.
        let public_key_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(encoded.as_bytes())
                .map_err(|e| AuthError::invalid_public_key(format!("base64 decode: {e}")))?,
        );

        if public_key_bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(AuthError::invalid_public_key(format!(
                "expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                public_key_bytes.len()
            )));
        }

        let key_bytes: Zeroizing<[u8; PUBLIC_KEY_LENGTH]> = Zeroizing::new(
            public_key_bytes[..PUBLIC_KEY_LENGTH]
                .try_into()
                .map_err(|_| AuthError::invalid_public_key("failed to convert bytes"))?,
        );

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| AuthError::invalid_public_key(format!("invalid Ed25519 key: {e}")))?;

        drop(key_bytes);
        drop(public_key_bytes);

        let key = DecodingKey::from_ed_components(encoded)
            .map_err(|e| AuthError::invalid_public_key(e.to_string()))?;
        Ok(Self { algorithm: Algorithm::EdDSA, key })
    }
}
