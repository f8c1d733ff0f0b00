//! JWT algorithm validation.
//!
//! This module provides security checks for JWT algorithms, ensuring only
//! approved asymmetric algorithms are accepted.
//!
//! # Security
//!
//! - Strict algorithm checks to prevent algorithm substitution attacks
//! - Only asymmetric algorithms (EdDSA, RS256) are allowed
//! - Symmetric algorithms and "none" are always rejected
//! - The token algorithm must match the family of the issuer key

use jsonwebtoken::Algorithm;

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted for security reasons.
///
/// - `none`: No signature verification (trivially bypassable)
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret vulnerability)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// EdDSA verifies Ed25519 issuer keys (raw or PEM), RS256 verifies RSA
/// issuer keys (PEM only).
pub const ACCEPTED_ALGORITHMS: &[&str] = &["EdDSA", "RS256"];

/// Validate JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is forbidden
/// or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use xdb_common_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("ES256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not allowed for security reasons",
            alg
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not in accepted list (EdDSA, RS256)",
            alg
        )));
    }

    Ok(())
}

/// Validate that the token algorithm matches the algorithm the issuer key
/// verifies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] on a mismatch, e.g. an RS256
/// token presented for an Ed25519 issuer key.
pub fn validate_key_algorithm(token_alg: Algorithm, key_alg: Algorithm) -> Result<(), AuthError> {
    if token_alg != key_alg {
        return Err(AuthError::UnsupportedAlgorithm(format!(
            "Token algorithm {token_alg:?} does not match issuer key algorithm {key_alg:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_algorithm_accepted() {
        assert!(validate_algorithm("EdDSA").is_ok());
        assert!(validate_algorithm("RS256").is_ok());
    }

    #[test]
    fn test_validate_algorithm_symmetric_rejected() {
        assert!(validate_algorithm("HS256").is_err());
        assert!(validate_algorithm("HS384").is_err());
        assert!(validate_algorithm("HS512").is_err());
    }

    #[test]
    fn test_validate_algorithm_none_rejected() {
        let result = validate_algorithm("none");
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not allowed for security reasons"))
        );
    }

    #[test]
    fn test_validate_algorithm_not_in_list() {
        let result = validate_algorithm("ES256");
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not in accepted list"))
        );
    }

    #[test]
    fn test_forbidden_algorithms_each_rejected_with_security_message() {
        for alg in FORBIDDEN_ALGORITHMS {
            let result = validate_algorithm(alg);
            assert!(
                matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not allowed for security reasons")),
                "Expected security rejection for forbidden algorithm '{alg}'"
            );
        }
    }

    #[test]
    fn test_validate_key_algorithm() {
        assert!(validate_key_algorithm(Algorithm::EdDSA, Algorithm::EdDSA).is_ok());
        assert!(matches!(
            validate_key_algorithm(Algorithm::RS256, Algorithm::EdDSA),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }
}
