//! Two-phase JWT parsing.
//!
//! Token handling is split into an untrusted and a trusted phase, and the two
//! are distinct types so no code path can mistake one for the other:
//!
//! 1. [`peek_issuer`] decodes the payload *without* checking the signature
//!    and yields a [`PeekedIssuer`]. It is only good for choosing which
//!    registry key to verify with.
//! 2. [`verify_token`] checks the algorithm policy, the signature and the
//!    expiry against one [`IssuerKey`] and yields [`VerifiedClaims`], the
//!    only type that can produce grants or commands.
//!
//! # Example
//!
//! ```no_run
//! // Requires a signed token and the matching registry entry.
//! use std::time::Duration;
//! use xdb_common_authn::jwt::{peek_issuer, verify_token};
//! use xdb_common_storage::IssuerKey;
//!
//! # fn example(token: &str, key: &IssuerKey) -> Result<(), Box<dyn std::error::Error>> {
//! let peeked = peek_issuer(token)?;
//! assert_eq!(peeked.as_str(), key.issuer);
//!
//! let claims = verify_token(token, key, Duration::from_secs(60))?;
//! println!("{} holds {} grants", claims.subject(), claims.grants()?.len());
//! # Ok(())
//! # }
//! ```

use std::{fmt, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use xdb_common_storage::IssuerKey;

use crate::{
    command::CommandToken,
    error::{AuthError, Result},
    grant::{Grant, GrantsClaim},
    key::IssuerPublicKey,
    validation::{validate_algorithm, validate_key_algorithm},
};

/// Token payload.
///
/// ```json
/// {
///   "iss": "blackbook",
///   "sub": "alice",
///   "exp": 1767225600,
///   "iat": 1767222000,
///   "grants": "lcacommons.uslci:exchange:v qdb:quantity:v"
/// }
/// ```
///
/// Identity claims default to empty so that a missing claim is reported as
/// [`AuthError::MissingClaim`] rather than a decoding failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer, the registry lookup key.
    #[serde(default)]
    pub iss: String,
    /// Subject, the user the grants belong to.
    #[serde(default)]
    pub sub: String,
    /// Expiration time (seconds since epoch).
    #[serde(default)]
    pub exp: u64,
    /// Issued at (optional, seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Grant list, or `command:argument` in command tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<GrantsClaim>,
}

/// Issuer named by an unverified token.
///
/// Carries no trust. It only selects which registry key to verify with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeekedIssuer(String);

impl PeekedIssuer {
    /// The claimed issuer identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeekedIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims whose signature and expiry have been verified.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedClaims {
    claims: TokenClaims,
}

impl VerifiedClaims {
    /// Verified issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    /// Verified subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Token expiry.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.claims.exp).ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Raw verified claims.
    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Grants declared by the issuer, bound to the subject.
    ///
    /// A token without a `grants` claim carries no grants.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidGrant`] if the claim is malformed.
    pub fn grants(&self) -> Result<Vec<Grant>> {
        let Some(claim) = &self.claims.grants else {
            return Ok(Vec::new());
        };
        Ok(claim.specs()?.into_iter().map(|spec| spec.into_grant(&self.claims.sub)).collect())
    }

    /// The `command:argument` pair of a command token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingClaim`] without a `grants` claim and
    /// [`AuthError::InvalidGrant`] if it is not a `command:argument` string.
    pub fn command(&self) -> Result<CommandToken> {
        match &self.claims.grants {
            Some(GrantsClaim::Encoded(encoded)) => CommandToken::parse(&self.claims.sub, encoded),
            Some(GrantsClaim::List(_)) => {
                Err(AuthError::invalid_grant("command token carries a grant list"))
            },
            None => Err(AuthError::missing_claim("grants")),
        }
    }
}

/// Decode JWT header without verification.
///
/// # Errors
///
/// Returns an error if the JWT header cannot be decoded.
pub fn decode_jwt_header(token: &str) -> Result<Header> {
    decode_header(token)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {}", e)))
}

/// Decodes one base64url JSON segment of a three-part token.
fn decode_segment<T: for<'de> Deserialize<'de>>(token: &str, index: usize) -> Result<T> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let bytes = URL_SAFE_NO_PAD.decode(parts[index]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT segment: {}", e))
    })?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT segment: {}", e)))
}

/// Reads the `alg` header field as text and applies the algorithm policy.
///
/// Runs before [`decode_jwt_header`] so that `none` and other algorithms
/// jsonwebtoken cannot represent are reported as policy violations.
fn check_header_algorithm(token: &str) -> Result<()> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: Option<String>,
    }

    let header: RawHeader = decode_segment(token, 0)?;
    let alg = header.alg.ok_or_else(|| AuthError::invalid_token_format("JWT header missing 'alg'"))?;
    validate_algorithm(&alg)
}

/// Extracts the claimed issuer without verifying the signature.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the token is not a
/// three-part JWT with a JSON payload, and [`AuthError::MissingClaim`] if
/// `iss` is absent or empty.
pub fn peek_issuer(token: &str) -> Result<PeekedIssuer> {
    #[derive(Deserialize)]
    struct IssuerOnly {
        #[serde(default)]
        iss: Option<String>,
    }

    let payload: IssuerOnly = decode_segment(token, 1)?;
    match payload.iss {
        Some(iss) if !iss.is_empty() => Ok(PeekedIssuer(iss)),
        _ => Err(AuthError::missing_claim("iss")),
    }
}

/// Verifies a token against one issuer key.
///
/// Checks, in order: the algorithm policy, the issuer key material, that the
/// token algorithm matches the key, the signature, the expiry (with
/// `leeway`), and the presence of `iss` (which must equal the key's issuer)
/// and `sub`. Issuer key expiry is the caller's concern.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`], [`AuthError::IssuerKeyUnusable`],
/// [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`],
/// [`AuthError::InvalidIssuer`] or [`AuthError::MissingClaim`] accordingly.
#[tracing::instrument(skip(token, key), fields(issuer = %key.issuer))]
pub fn verify_token(token: &str, key: &IssuerKey, leeway: Duration) -> Result<VerifiedClaims> {
    check_header_algorithm(token)?;
    let header = decode_jwt_header(token)?;

    let public_key = IssuerPublicKey::parse(&key.public_key)
        .map_err(|e| registered_key_error(&key.issuer, e))?;
    validate_key_algorithm(header.alg, public_key.algorithm())?;

    let mut validation = Validation::new(header.alg);
    validation.leeway = leeway.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation.set_issuer(&[key.issuer.as_str()]);

    let token_data = decode::<TokenClaims>(token, public_key.decoding_key(), &validation)
        .map_err(|e| registered_key_error(&key.issuer, e.into()))?;
    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::missing_claim("sub"));
    }

    tracing::debug!(subject = %claims.sub, "token verified");
    Ok(VerifiedClaims { claims })
}

/// Bad key material found in the registry is a server fault.
fn registered_key_error(issuer: &str, err: AuthError) -> AuthError {
    match err {
        AuthError::InvalidPublicKey(message) => AuthError::issuer_key_unusable(issuer, message),
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    use super::*;
    use crate::{
        assert_auth_error,
        grant::Interface,
        testutil::{TestIssuer, craft_raw_jwt},
    };

    const LEEWAY: Duration = Duration::from_secs(60);

    #[test]
    fn test_peek_issuer() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "qdb:quantity:v");
        assert_eq!(peek_issuer(&token).expect("peek").as_str(), "blackbook");
    }

    #[test]
    fn test_peek_issuer_missing_iss() {
        let token = craft_raw_jwt(&json!({"alg": "EdDSA"}), &json!({"sub": "alice"}));
        assert_auth_error!(peek_issuer(&token), MissingClaim);

        let token = craft_raw_jwt(&json!({"alg": "EdDSA"}), &json!({"iss": "", "sub": "alice"}));
        assert_auth_error!(peek_issuer(&token), MissingClaim);
    }

    #[test]
    fn test_peek_issuer_malformed() {
        assert_auth_error!(peek_issuer("only.two"), InvalidTokenFormat);
        assert_auth_error!(peek_issuer("a.b.c.d"), InvalidTokenFormat);
        assert_auth_error!(peek_issuer("a.!!!.c"), InvalidTokenFormat);
    }

    #[test]
    fn test_verify_token_grants() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "lcacommons.uslci:exchange:v qdb:quantity");

        let claims = verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY)
            .expect("verification should succeed");
        assert_eq!(claims.issuer(), "blackbook");
        assert_eq!(claims.subject(), "alice");
        assert!(claims.expires_at().expect("exp") > Utc::now());

        let grants = claims.grants().expect("grants");
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.user() == "alice"));
        assert_eq!(grants[0].access(), Interface::Exchange);
        assert!(grants[0].values());
        assert!(!grants[1].values());
    }

    #[test]
    fn test_verify_token_grant_list_claim() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.sign(&issuer.claims(
            "alice",
            json!([{"origin": "qdb", "access": "quantity", "values": true, "update": true}]),
            3600,
        ));

        let grants = verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY)
            .expect("verify")
            .grants()
            .expect("grants");
        assert_eq!(grants.len(), 1);
        assert!(grants[0].update());
    }

    #[test]
    fn test_verify_token_with_pem_key() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "qdb:quantity");
        let key = issuer.pem_key(ChronoDuration::days(1));

        assert!(verify_token(&token, &key, LEEWAY).is_ok());
    }

    #[test]
    fn test_verify_token_wrong_key() {
        let issuer = TestIssuer::new("blackbook");
        let impostor = TestIssuer::new("blackbook");
        let token = impostor.grant_token("alice", "qdb:quantity:v");

        let result = verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY);
        assert_auth_error!(result, InvalidSignature);
    }

    #[test]
    fn test_verify_token_expired() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.sign(&issuer.claims("alice", json!("qdb:quantity"), -3600));

        let result = verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY);
        assert_auth_error!(result, TokenExpired);
    }

    #[test]
    fn test_verify_token_within_leeway() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.sign(&issuer.claims("alice", json!("qdb:quantity"), -10));

        assert!(verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY).is_ok());
    }

    #[test]
    fn test_verify_token_issuer_mismatch() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "qdb:quantity");
        let mut key = issuer.key(ChronoDuration::days(1));
        key.issuer = "someone-else".into();

        assert_auth_error!(verify_token(&token, &key, LEEWAY), InvalidIssuer);
    }

    #[test]
    fn test_verify_token_missing_subject() {
        let issuer = TestIssuer::new("blackbook");
        let now = Utc::now().timestamp();
        let token = issuer.sign(&json!({"iss": "blackbook", "exp": now + 3600}));

        assert_auth_error!(
            verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY),
            MissingClaim
        );
    }

    #[test]
    fn test_verify_token_forbidden_algorithms() {
        let issuer = TestIssuer::new("blackbook");
        let key = issuer.key(ChronoDuration::days(1));
        let payload = issuer.claims("alice", json!("qdb:quantity:v"), 3600);

        for alg in ["none", "HS256", "HS384", "HS512"] {
            let token = craft_raw_jwt(&json!({"alg": alg, "typ": "JWT"}), &payload);
            assert_auth_error!(verify_token(&token, &key, LEEWAY), UnsupportedAlgorithm, alg);
        }
    }

    #[test]
    fn test_verify_token_algorithm_confusion() {
        // RS256 header against an Ed25519 issuer key.
        let issuer = TestIssuer::new("blackbook");
        let token = craft_raw_jwt(
            &json!({"alg": "RS256", "typ": "JWT"}),
            &issuer.claims("alice", json!("qdb:quantity:v"), 3600),
        );

        assert_auth_error!(
            verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY),
            UnsupportedAlgorithm
        );
    }

    #[test]
    fn test_verify_token_rs256_grants() {
        let issuer = TestIssuer::rsa("blackbook");
        let token = issuer.grant_token("alice", "lcacommons.uslci:exchange:v");
        assert_eq!(decode_jwt_header(&token).expect("header").alg, Algorithm::RS256);

        let claims = verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY)
            .expect("RS256 token should verify against the RSA PEM key");
        assert_eq!(claims.subject(), "alice");

        let grants = claims.grants().expect("grants");
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].origin(), "lcacommons.uslci");
        assert!(grants[0].values());
    }

    #[test]
    fn test_verify_token_key_family_mismatch() {
        let rsa = TestIssuer::rsa("blackbook");
        let ed = TestIssuer::new("blackbook");

        let rs256_token = rsa.grant_token("alice", "qdb:quantity:v");
        assert_auth_error!(
            verify_token(&rs256_token, &ed.key(ChronoDuration::days(1)), LEEWAY),
            UnsupportedAlgorithm,
            "RS256 token against Ed25519 key"
        );

        let eddsa_token = ed.grant_token("alice", "qdb:quantity:v");
        assert_auth_error!(
            verify_token(&eddsa_token, &rsa.key(ChronoDuration::days(1)), LEEWAY),
            UnsupportedAlgorithm,
            "EdDSA token against RSA key"
        );
    }

    #[test]
    fn test_unusable_registered_key_is_server_fault() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "qdb:quantity:v");
        let mut key = issuer.key(ChronoDuration::days(1));
        key.public_key = "not-a-key".into();

        let err = verify_token(&token, &key, LEEWAY).expect_err("must fail");
        assert!(
            matches!(&err, AuthError::IssuerKeyUnusable { issuer, .. } if issuer == "blackbook"),
            "got {err:?}"
        );
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_missing_grants_claim_is_empty() {
        let issuer = TestIssuer::new("blackbook");
        let now = Utc::now().timestamp();
        let token = issuer.sign(&json!({"iss": "blackbook", "sub": "alice", "exp": now + 60}));

        let claims =
            verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY).expect("verify");
        assert!(claims.grants().expect("grants").is_empty());
        assert_auth_error!(claims.command(), MissingClaim);
    }

    #[test]
    fn test_malformed_grants_claim() {
        let issuer = TestIssuer::new("blackbook");
        let token = issuer.grant_token("alice", "qdb:teleport:v");

        let claims =
            verify_token(&token, &issuer.key(ChronoDuration::days(1)), LEEWAY).expect("verify");
        assert_auth_error!(claims.grants(), InvalidGrant);
    }

    /// Regression inputs that must never panic any parsing entry point.
    mod fuzz_regressions {
        use super::*;

        fn exercise_parsing(token: &str) {
            let _ = decode_jwt_header(token);
            let _ = peek_issuer(token);
            let issuer = TestIssuer::new("blackbook");
            let _ = verify_token(token, &issuer.key(ChronoDuration::days(1)), LEEWAY);
        }

        #[test]
        fn empty_and_dots_no_panic() {
            for token in ["", ".", "..", "...", "not-a-jwt"] {
                exercise_parsing(token);
            }
        }

        #[test]
        fn null_bytes_no_panic() {
            exercise_parsing("\0.\0.\0");
        }

        #[test]
        fn oversized_payload_no_panic() {
            let payload = json!({"iss": "x".repeat(100_000), "grants": "a:index ".repeat(10_000)});
            exercise_parsing(&craft_raw_jwt(&json!({"alg": "EdDSA"}), &payload));
        }

        #[test]
        fn wrong_claim_types_no_panic() {
            let payload = json!({"iss": 42, "sub": [], "exp": "tomorrow", "grants": {"a": 1}});
            exercise_parsing(&craft_raw_jwt(&json!({"alg": "EdDSA"}), &payload));
        }
    }
}
