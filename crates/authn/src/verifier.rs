//! Bearer token verification.
//!
//! [`TokenVerifier`] walks one token through the verification states:
//!
//! ```text
//! absent token ─────────────────────────────→ Anonymous
//! peek iss ─→ unknown issuer ───────────────→ UnknownIssuer
//!          ─→ issuer key expired ───────────→ IssuerExpired
//!          ─→ signature / algorithm / exp ──→ InvalidSignature | TokenExpired | ...
//!          ─→ valid, iss == master ─────────→ Master { subject }
//!          ─→ valid ────────────────────────→ Issued(grants)
//! ```
//!
//! Master tokens are not expanded here: the set of (origin, interface)
//! resources belongs to the catalog and is computed fresh on each call.

use std::{sync::Arc, time::Duration};

use crate::{
    command::CommandToken,
    error::{AuthError, Result},
    grant::Grant,
    jwt::{VerifiedClaims, peek_issuer, verify_token},
    registry::IssuerRegistry,
};

/// Default allowance for clock skew when checking token `exp`.
pub const DEFAULT_TOKEN_LEEWAY: Duration = Duration::from_secs(60);

/// Outcome of verifying a (possibly absent) bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenGrants {
    /// No token. Only public interfaces are available.
    Anonymous,
    /// Verified token from the master issuer. Full read access to every
    /// resource the catalog knows.
    Master {
        /// Token subject.
        subject: String,
    },
    /// Verified token carrying issuer-declared grants.
    Issued(Vec<Grant>),
}

impl TokenGrants {
    /// Returns `true` for the anonymous outcome.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, TokenGrants::Anonymous)
    }
}

/// Verifies bearer tokens against an [`IssuerRegistry`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use xdb_common_authn::{IssuerRegistry, TokenGrants, TokenVerifier};
/// use xdb_common_storage::MemoryIssuerKeyStore;
///
/// # async fn example(token: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(IssuerRegistry::load(Arc::new(MemoryIssuerKeyStore::new())).await?);
/// let verifier = TokenVerifier::builder()
///     .registry(registry)
///     .master_issuer("xdb-master")
///     .build();
///
/// match verifier.verify(token)? {
///     TokenGrants::Anonymous => println!("public access only"),
///     TokenGrants::Master { subject } => println!("{subject} is a superuser"),
///     TokenGrants::Issued(grants) => println!("{} grants", grants.len()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, bon::Builder)]
pub struct TokenVerifier {
    registry: Arc<IssuerRegistry>,
    #[builder(into)]
    master_issuer: Option<String>,
    #[builder(default = DEFAULT_TOKEN_LEEWAY)]
    leeway: Duration,
}

impl TokenVerifier {
    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<IssuerRegistry> {
        &self.registry
    }

    /// The configured master issuer, if any.
    #[must_use]
    pub fn master_issuer(&self) -> Option<&str> {
        self.master_issuer.as_deref()
    }

    /// Returns `true` if `issuer` is the master issuer.
    #[must_use]
    pub fn is_master(&self, issuer: &str) -> bool {
        self.master_issuer.as_deref() == Some(issuer)
    }

    /// Resolves a bearer token into grants.
    ///
    /// # Errors
    ///
    /// Every failure is an error: [`AuthError::UnknownIssuer`],
    /// [`AuthError::IssuerExpired`], [`AuthError::InvalidSignature`],
    /// [`AuthError::TokenExpired`] and the format and grant errors.
    #[tracing::instrument(skip(self, token), fields(has_token = token.is_some()))]
    pub fn verify(&self, token: Option<&str>) -> Result<TokenGrants> {
        let Some(token) = token else {
            return Ok(TokenGrants::Anonymous);
        };

        let claims = self.verify_with_registry(token)?;
        if self.is_master(claims.issuer()) {
            tracing::debug!(subject = %claims.subject(), "master issuer token");
            return Ok(TokenGrants::Master { subject: claims.subject().to_owned() });
        }

        let grants = claims.grants()?;
        tracing::debug!(issuer = %claims.issuer(), count = grants.len(), "token grants resolved");
        Ok(TokenGrants::Issued(grants))
    }

    /// Verifies an administrative command token.
    ///
    /// The token must be signed by the master issuer. The caller matches the
    /// returned command against the attempted operation with
    /// [`CommandToken::require`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingToken`] without a token
    /// - [`AuthError::MasterIssuerUnavailable`] if no master issuer is
    ///   configured, registered, or unexpired
    /// - [`AuthError::InvalidIssuer`] if another issuer signed the token
    /// - verification and format errors as for [`verify`](Self::verify)
    #[tracing::instrument(skip(self, token), fields(has_token = token.is_some()))]
    pub fn verify_command(&self, token: Option<&str>) -> Result<CommandToken> {
        let token = token.ok_or(AuthError::MissingToken)?;

        let master = self
            .master_issuer
            .as_deref()
            .ok_or_else(|| AuthError::master_issuer_unavailable("no master issuer configured"))?;
        let key = self.registry.get(master).ok_or_else(|| {
            tracing::warn!(master, issuers = ?self.registry.issuers(), "master issuer key missing");
            AuthError::master_issuer_unavailable("Master Issuer key is missing or invalid")
        })?;
        if key.is_expired() {
            return Err(AuthError::master_issuer_unavailable(
                "Master issuer certificate is expired",
            ));
        }

        let peeked = peek_issuer(token)?;
        if peeked.as_str() != master {
            tracing::warn!(issuer = %peeked, "command token not signed by master issuer");
            return Err(AuthError::invalid_issuer(peeked.as_str()));
        }

        let claims = verify_token(token, &key, self.leeway)?;
        claims.command()
    }

    fn verify_with_registry(&self, token: &str) -> Result<VerifiedClaims> {
        let peeked = peek_issuer(token)?;

        let Some(key) = self.registry.get(peeked.as_str()) else {
            tracing::warn!(issuer = %peeked, "token from unknown issuer");
            return Err(AuthError::unknown_issuer(peeked.as_str()));
        };
        if key.is_expired() {
            tracing::warn!(issuer = %peeked, expiry = %key.expiry, "token from expired issuer");
            return Err(AuthError::issuer_expired(peeked.as_str()));
        }

        verify_token(token, &key, self.leeway).inspect_err(|e| {
            tracing::warn!(issuer = %peeked, error = %e, "token failed verification");
        })
    }
}
