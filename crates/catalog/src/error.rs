//! Catalog error types.
//!
//! Three layers, from narrowest to widest:
//!
//! - [`AccessError`]: a grant check or a meter policy refused the call
//! - [`QueryError`]: an authorized query failed (access, lookup, backend)
//! - [`CatalogError`]: any failure of a [`Catalog`](crate::Catalog) entry point

use std::sync::Arc;

use thiserror::Error;
use xdb_common_authn::{AuthError, Interface};
use xdb_common_storage::BoxError;

/// Authorization failures raised while checking or metering a call.
///
/// All variants are 403-class: the caller is authenticated but not allowed
/// to do what they attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AccessError {
    /// No grant covers the interface for the query origin, and the interface
    /// is not public.
    #[error("interface {interface} is not authorized for origin {origin}")]
    InterfaceNotAuthorized {
        /// Origin the query is bound to.
        origin: String,
        /// Interface the call belongs to.
        interface: Interface,
    },

    /// The grant exists but does not include value access.
    #[error("values access required: {grant}")]
    ValuesAccessDenied {
        /// Display form of the refusing grant.
        grant: String,
    },

    /// The grant exists but does not include update access.
    #[error("update access required: {grant}")]
    UpdateAccessDenied {
        /// Display form of the refusing grant.
        grant: String,
    },
}

impl AccessError {
    /// Creates an [`AccessError::InterfaceNotAuthorized`].
    #[must_use]
    pub fn interface_not_authorized(origin: impl Into<String>, interface: Interface) -> Self {
        Self::InterfaceNotAuthorized { origin: origin.into(), interface }
    }

    /// HTTP status code the transport layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        403
    }
}

/// Errors returned by an [`AuthorizedQuery`](crate::AuthorizedQuery) or a
/// [`QueryBackend`](crate::QueryBackend).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// The call was refused.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// The catalog has no resources for the origin.
    #[error("unknown origin {0}")]
    UnknownOrigin(String),

    /// The entity does not exist in the origin.
    #[error("entity {entity} not found in {origin}")]
    EntityNotFound {
        /// Origin that was searched.
        origin: String,
        /// Requested entity identifier.
        entity: String,
    },

    /// The background engine could not be configured.
    #[error("failed to configure background: {0}")]
    BackgroundSetup(String),

    /// Any other backend failure.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl QueryError {
    /// Creates a [`QueryError::UnknownOrigin`].
    #[must_use]
    pub fn unknown_origin(origin: impl Into<String>) -> Self {
        Self::UnknownOrigin(origin.into())
    }

    /// Creates a [`QueryError::EntityNotFound`].
    #[must_use]
    pub fn entity_not_found(origin: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::EntityNotFound { origin: origin.into(), entity: entity.into() }
    }

    /// Creates a [`QueryError::BackgroundSetup`].
    #[must_use]
    pub fn background_setup(message: impl Into<String>) -> Self {
        Self::BackgroundSetup(message.into())
    }

    /// Creates a [`QueryError::Backend`] without a source.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into(), source: None }
    }

    /// Creates a [`QueryError::Backend`] preserving `source`.
    #[must_use]
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns the access refusal, if this is one.
    #[must_use]
    pub fn as_access(&self) -> Option<&AccessError> {
        match self {
            Self::Access(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status code the transport layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Access(e) => e.status_code(),
            Self::UnknownOrigin(_) | Self::EntityNotFound { .. } => 404,
            Self::BackgroundSetup(_) | Self::Backend { .. } => 500,
        }
    }
}

/// Errors returned by [`Catalog`](crate::Catalog) entry points.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// Token verification or command checking failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A query failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The master issuer's own key cannot be replaced remotely.
    #[error("remote update of master issuer key is not allowed")]
    MasterKeyUpdateForbidden,
}

impl From<AccessError> for CatalogError {
    fn from(err: AccessError) -> Self {
        Self::Query(QueryError::Access(err))
    }
}

impl CatalogError {
    /// HTTP status code the transport layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::Query(e) => e.status_code(),
            Self::MasterKeyUpdateForbidden => 403,
        }
    }
}

/// Result type alias for catalog entry points.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_access_error_display() {
        let err = AccessError::interface_not_authorized("lcacommons.uslci", Interface::Exchange);
        assert_eq!(
            err.to_string(),
            "interface exchange is not authorized for origin lcacommons.uslci"
        );
    }

    #[rstest]
    #[case::not_authorized(
        CatalogError::from(AccessError::interface_not_authorized("o", Interface::Background)),
        403
    )]
    #[case::values(
        CatalogError::from(AccessError::ValuesAccessDenied { grant: "u:o/exchange".into() }),
        403
    )]
    #[case::update(
        CatalogError::from(AccessError::UpdateAccessDenied { grant: "u:o/quantity".into() }),
        403
    )]
    #[case::unknown_origin(CatalogError::from(QueryError::unknown_origin("nowhere")), 404)]
    #[case::entity(CatalogError::from(QueryError::entity_not_found("o", "e")), 404)]
    #[case::background(CatalogError::from(QueryError::background_setup("x")), 500)]
    #[case::backend(CatalogError::from(QueryError::backend("x")), 500)]
    #[case::unknown_issuer(CatalogError::from(AuthError::unknown_issuer("x")), 401)]
    #[case::command(CatalogError::from(AuthError::command_mismatch("a:b", "a:c")), 400)]
    #[case::master_key(CatalogError::MasterKeyUpdateForbidden, 403)]
    fn test_status_codes(#[case] err: CatalogError, #[case] expected: u16) {
        assert_eq!(err.status_code(), expected);
    }

    #[test]
    fn test_backend_source_chain() {
        let io = std::io::Error::other("disk on fire");
        let err = QueryError::backend_with_source("lookup failed", io);
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "disk on fire");
    }

    #[test]
    fn test_as_access() {
        let err = QueryError::from(AccessError::ValuesAccessDenied { grant: "g".into() });
        assert!(err.as_access().is_some());
        assert!(QueryError::unknown_origin("o").as_access().is_none());
    }
}
