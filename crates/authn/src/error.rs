//! Authentication error types.
//!
//! This module defines errors that can occur while decoding bearer tokens,
//! verifying them against the trusted issuer registry, and checking
//! administrative command tokens.

use thiserror::Error;
use xdb_common_storage::StorageError;

/// Authentication errors.
///
/// Every failure is surfaced as a distinct variant. Callers must never treat
/// an error as "no grants": the only anonymous path is an absent token.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed token, cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Required claim is missing or empty.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// The token names an issuer that is not in the registry.
    #[error("Issuer {0} unknown")]
    UnknownIssuer(String),

    /// The issuer is registered but its key has expired.
    #[error("Issuer {0} certificate is expired")]
    IssuerExpired(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Token `exp` is in the past (beyond the configured leeway).
    #[error("Token expired")]
    TokenExpired,

    /// Algorithm not in the accepted list, or not matching the issuer key.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Submitted issuer key material cannot be parsed.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A registered issuer key cannot verify tokens.
    #[error("Issuer {issuer} key is unusable: {message}")]
    IssuerKeyUnusable {
        /// The registered issuer.
        issuer: String,
        /// Why the key material was rejected.
        message: String,
    },

    /// The `grants` claim cannot be decoded into grants.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// An administrative operation was attempted without a token.
    #[error("Missing token")]
    MissingToken,

    /// The token issuer is not allowed for this operation.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// The master issuer is not configured, not registered, or expired.
    #[error("Master issuer unavailable: {0}")]
    MasterIssuerUnavailable(String),

    /// A command token does not match the operation being attempted.
    #[error("Command token is incorrect: expected {expected}, got {actual}")]
    CommandMismatch {
        /// The `command:argument` the operation requires.
        expected: String,
        /// The `command:argument` carried by the token.
        actual: String,
    },

    /// Storage backend error while loading or persisting issuer keys.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Key storage error: {0}")]
    KeyStorageError(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an [`AuthError::MissingClaim`].
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an [`AuthError::UnknownIssuer`].
    #[must_use]
    pub fn unknown_issuer(issuer: impl Into<String>) -> Self {
        Self::UnknownIssuer(issuer.into())
    }

    /// Creates an [`AuthError::IssuerExpired`].
    #[must_use]
    pub fn issuer_expired(issuer: impl Into<String>) -> Self {
        Self::IssuerExpired(issuer.into())
    }

    /// Creates an [`AuthError::InvalidSignature`].
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an [`AuthError::TokenExpired`].
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates an [`AuthError::InvalidPublicKey`].
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates an [`AuthError::IssuerKeyUnusable`].
    #[must_use]
    pub fn issuer_key_unusable(issuer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IssuerKeyUnusable { issuer: issuer.into(), message: message.into() }
    }

    /// Creates an [`AuthError::InvalidGrant`].
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant(message.into())
    }

    /// Creates an [`AuthError::InvalidIssuer`].
    #[must_use]
    pub fn invalid_issuer(issuer: impl Into<String>) -> Self {
        Self::InvalidIssuer(issuer.into())
    }

    /// Creates an [`AuthError::MasterIssuerUnavailable`].
    #[must_use]
    pub fn master_issuer_unavailable(message: impl Into<String>) -> Self {
        Self::MasterIssuerUnavailable(message.into())
    }

    /// Creates an [`AuthError::CommandMismatch`].
    #[must_use]
    pub fn command_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::CommandMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates an [`AuthError::KeyStorageError`].
    #[must_use]
    pub fn key_storage_error(err: StorageError) -> Self {
        Self::KeyStorageError(err)
    }

    /// HTTP status code the transport layer should answer with.
    ///
    /// Authentication failures are 401, malformed administrative requests
    /// 400, an unusable master key 503, and storage faults or unusable
    /// registered keys 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPublicKey(_) | Self::CommandMismatch { .. } => 400,
            Self::MasterIssuerUnavailable(_) => 503,
            Self::KeyStorageError(_) | Self::IssuerKeyUnusable { .. } => 500,
            _ => 401,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => {
                AuthError::InvalidTokenFormat("Invalid JWT structure".into())
            },
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer("Issuer validation failed".into()),
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm("Algorithm not supported".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) => {
                AuthError::InvalidPublicKey(format!("JWT error: {err}"))
            },
            _ => AuthError::InvalidTokenFormat(format!("JWT error: {err}")),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::KeyStorageError(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
