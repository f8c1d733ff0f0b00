//! Shared test utilities for authentication testing.
//!
//! Helpers for generating Ed25519 key pairs, signing tokens as a named
//! `EdDSA` or `RS256` issuer, and crafting raw JWT strings for attack testing. Feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! xdb-common-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use chrono::Duration;
//! use xdb_common_authn::testutil::TestIssuer;
//!
//! let issuer = TestIssuer::new("blackbook");
//! let key = issuer.key(Duration::days(1)); // register this
//! let token = issuer.grant_token("alice", "qdb:quantity:v");
//! ```

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand_core::OsRng;
use serde_json::json;
use xdb_common_storage::IssuerKey;
use zeroize::Zeroizing;

/// Generates a test Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)` where:
/// - `pkcs8_der` is the private key in PKCS#8 DER format wrapped in [`Zeroizing`] (suitable for
///   [`EncodingKey::from_ed_der`])
/// - `public_key_base64url` is the 32-byte public key encoded as base64url without padding
///   (suitable for [`IssuerKey::public_key`])
///
/// Each call generates a fresh random key pair.
pub fn generate_test_keypair() -> (Zeroizing<Vec<u8>>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_bytes = signing_key.verifying_key().to_bytes();
    let public_key_b64 = URL_SAFE_NO_PAD.encode(public_key_bytes);

    let private_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());
    let mut pkcs8_der = Zeroizing::new(vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ]);
    pkcs8_der.extend_from_slice(&*private_bytes);

    (pkcs8_der, public_key_b64)
}

/// Wraps a base64url raw Ed25519 public key in a PEM `PUBLIC KEY` document.
///
/// # Panics
///
/// Panics if `public_key_b64` is not valid base64url.
pub fn ed25519_public_pem(public_key_b64: &str) -> String {
    let raw = URL_SAFE_NO_PAD.decode(public_key_b64).expect("base64url public key");
    let mut spki = vec![
        0x30, 0x2a, // SEQUENCE, 42 bytes
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x03, 0x21, 0x00, // BIT STRING, 33 bytes, no unused bits
    ];
    spki.extend_from_slice(&raw);
    format!("-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n", STANDARD.encode(spki))
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. Useful for testing rejection of malformed or
/// attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// PKCS#8 private key of the fixed RS256 test issuer.
pub const RS256_PRIVATE_PEM: &str = include_str!("../testdata/rs256_private.pem");

/// SPKI public key matching [`RS256_PRIVATE_PEM`].
pub const RS256_PUBLIC_PEM: &str = include_str!("../testdata/rs256_public.pem");

/// A named token issuer with its signing key.
///
/// [`TestIssuer::new`] holds a fresh Ed25519 key pair and signs `EdDSA`;
/// [`TestIssuer::rsa`] holds the fixed RSA key and signs `RS256`.
pub struct TestIssuer {
    name: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    public_key: String,
    public_pem: String,
}

impl TestIssuer {
    /// Creates an issuer with a fresh Ed25519 key pair.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let (pkcs8_der, public_key) = generate_test_keypair();
        Self {
            name: name.to_owned(),
            algorithm: Algorithm::EdDSA,
            encoding_key: EncodingKey::from_ed_der(&pkcs8_der),
            public_pem: ed25519_public_pem(&public_key),
            public_key,
        }
    }

    /// Creates an `RS256` issuer with the checked-in RSA key.
    ///
    /// All RSA issuers share one key, so two of them can verify each
    /// other's tokens.
    ///
    /// # Panics
    ///
    /// Panics if the bundled private key cannot be parsed.
    #[must_use]
    pub fn rsa(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            algorithm: Algorithm::RS256,
            encoding_key: EncodingKey::from_rsa_pem(RS256_PRIVATE_PEM.as_bytes())
                .expect("bundled RSA private key"),
            public_key: RS256_PUBLIC_PEM.to_owned(),
            public_pem: RS256_PUBLIC_PEM.to_owned(),
        }
    }

    /// Issuer identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Algorithm this issuer signs with.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Registry key material: base64url raw key for Ed25519, PEM for RSA.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Registry entry with [`public_key`](Self::public_key), expiring
    /// `valid_for` from now.
    #[must_use]
    pub fn key(&self, valid_for: Duration) -> IssuerKey {
        IssuerKey::builder()
            .issuer(self.name.as_str())
            .public_key(self.public_key.as_str())
            .expiry(Utc::now() + valid_for)
            .build()
    }

    /// Registry entry with the public key as PEM.
    #[must_use]
    pub fn pem_key(&self, valid_for: Duration) -> IssuerKey {
        IssuerKey::builder()
            .issuer(self.name.as_str())
            .public_key(self.public_pem.as_str())
            .expiry(Utc::now() + valid_for)
            .build()
    }

    /// Standard claims for `sub`, expiring `expires_in_secs` from now
    /// (negative for an already-expired token).
    #[must_use]
    pub fn claims(
        &self,
        sub: &str,
        grants: serde_json::Value,
        expires_in_secs: i64,
    ) -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": self.name,
            "sub": sub,
            "exp": now + expires_in_secs,
            "iat": now,
            "grants": grants,
        })
    }

    /// Signs arbitrary claims with this issuer's key.
    ///
    /// # Panics
    ///
    /// Panics if JWT encoding fails (should not happen with valid inputs).
    #[must_use]
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let header = Header::new(self.algorithm);
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("Failed to encode test JWT")
    }

    /// Signed one-hour token carrying compact `grants`.
    #[must_use]
    pub fn grant_token(&self, sub: &str, grants: &str) -> String {
        self.sign(&self.claims(sub, json!(grants), 3600))
    }

    /// Signed one-hour command token carrying `command:argument`.
    #[must_use]
    pub fn command_token(&self, sub: &str, command: &str) -> String {
        self.sign(&self.claims(sub, json!(command), 3600))
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// Works with any `AuthError` variant. On failure, prints the expected variant
/// and the actual result for debugging.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use xdb_common_authn::assert_auth_error;
/// use xdb_common_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
///
/// [`AuthError`]: crate::error::AuthError
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    #[test]
    fn test_generate_test_keypair_produces_valid_key() {
        let (pkcs8_der, public_key_b64) = generate_test_keypair();
        // PKCS#8 DER for Ed25519 is 48 bytes (16 header + 32 key)
        assert_eq!(pkcs8_der.len(), 48);
        // Base64url of 32 bytes = 43 characters (no padding)
        assert_eq!(public_key_b64.len(), 43);
    }

    #[test]
    fn test_generate_test_keypair_unique() {
        let (_, pk1) = generate_test_keypair();
        let (_, pk2) = generate_test_keypair();
        assert_ne!(pk1, pk2, "each call should produce a unique key pair");
    }

    #[test]
    fn test_signed_token_has_three_parts() {
        let jwt = TestIssuer::new("blackbook").grant_token("alice", "qdb:quantity");
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3, "JWT should have header.payload.signature");
        assert!(!parts[2].is_empty(), "signature should not be empty");
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let jwt = craft_raw_jwt(&json!({"alg": "none", "typ": "JWT"}), &json!({"sub": "test"}));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
    }

    #[test]
    fn test_pem_armor() {
        let (_, public_key) = generate_test_keypair();
        let pem = ed25519_public_pem(&public_key);
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    }

    #[test]
    fn test_assert_auth_error_with_message() {
        let result: Result<(), AuthError> = Err(AuthError::token_expired());
        assert_auth_error!(result, TokenExpired, "token should be expired");
    }
}
