//! # xdb Common Catalog
//!
//! Authorized, metered access to the origins of an xdb catalog.
//!
//! Every request resolves its bearer token into grants, then queries an
//! origin through an [`AuthorizedQuery`] that checks each call against those
//! grants and counts it in the shared [`Meter`] before forwarding it to the
//! plain [`QueryBackend`].
//!
//! ```text
//! token ──▶ TokenVerifier ──▶ grants ──┐
//!                                      ▼
//! origin ──▶ QueryProvider ──▶ AuthorizedQuery ──check_and_meter──▶ QueryBackend
//!                                      │
//!                                      ▼
//!                                    Meter ──invoice──▶ UsageReport
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xdb_common_catalog::{Catalog, CatalogConfig, MemoryProvider, QueryArgs};
//!
//! # async fn example(token: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = CatalogConfig::from_env()?;
//! let catalog = Catalog::open(config, Arc::new(MemoryProvider::new())).await?;
//!
//! let query = catalog.authorized_query("lcacommons.uslci", token)?;
//! let exchanges = query.exchanges(QueryArgs::entity("electricity")).await?;
//! println!("{exchanges}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The catalog service object.
pub mod catalog;
/// Configuration.
pub mod config;
/// Catalog error types.
pub mod error;
/// In-memory query provider.
pub mod memory;
/// Usage metering.
pub mod meter;
/// Forwarded operations.
pub mod operation;
/// Query seams and the authorizing wrapper.
pub mod query;
/// Test helpers.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use catalog::{Catalog, OriginMeta};
pub use config::{CatalogConfig, ConfigError};
pub use error::{AccessError, CatalogError, QueryError, Result};
pub use memory::{MemoryProvider, MemoryQuery, RecordedCall};
pub use meter::{CounterKey, DEFAULT_METER_LOG_INTERVAL, Invoice, Meter, UsageCounter, UsageReport};
pub use operation::{Metering, Operation};
pub use query::{AuthorizedQuery, OriginInterface, QueryArgs, QueryBackend, QueryProvider};
