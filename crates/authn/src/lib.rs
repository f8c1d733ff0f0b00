//! # xdb Common Authentication
//!
//! Bearer token verification and authorization grants for the xdb catalog.
//!
//! This crate provides:
//! - **Grants**: [`Grant`] records scoped to an origin prefix and an [`Interface`]
//! - **Two-phase JWT parsing**: untrusted [`jwt::peek_issuer`], trusted [`jwt::verify_token`]
//! - **Issuer registry**: [`IssuerRegistry`], snapshot-swapped and persisted through
//!   [`xdb_common_storage::IssuerKeyStore`]
//! - **Token verification**: [`TokenVerifier`] for grant tokens and master-signed command tokens
//! - **Algorithm validation**: security checks for JWT algorithms
//!
//! ## Features
//!
//! - Only asymmetric algorithms (EdDSA, RS256) are supported
//! - Symmetric algorithms (HS256, etc.) and `none` are explicitly rejected
//! - Every verification failure is a distinct [`AuthError`]; only an absent
//!   token yields anonymous access
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xdb_common_authn::{IssuerRegistry, TokenGrants, TokenVerifier};
//! use xdb_common_storage::FileIssuerKeyStore;
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FileIssuerKeyStore::in_root("/srv/xdb/catalog"));
//! let registry = Arc::new(IssuerRegistry::load(store).await?);
//! let verifier = TokenVerifier::builder().registry(registry).master_issuer("xdb-master").build();
//!
//! if let TokenGrants::Issued(grants) = verifier.verify(Some(token))? {
//!     for grant in grants {
//!         println!("{grant}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Administrative command tokens.
pub mod command;
/// Authentication error types.
pub mod error;
/// Grants and interfaces.
pub mod grant;
/// JWT parsing and verification.
pub mod jwt;
/// Issuer public key parsing.
pub mod key;
/// Trusted issuer registry.
pub mod registry;
/// Test helpers.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Algorithm validation.
pub mod validation;
/// Token verification.
pub mod verifier;

pub use command::{Command, CommandToken};
pub use error::{AuthError, Result};
pub use grant::{Grant, GrantSpec, GrantsClaim, Interface};
pub use jwt::{PeekedIssuer, TokenClaims, VerifiedClaims};
pub use registry::{IssuerRegistry, RegistrySnapshot};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::{DEFAULT_TOKEN_LEEWAY, TokenGrants, TokenVerifier};
