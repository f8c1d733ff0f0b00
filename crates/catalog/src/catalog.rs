//! The catalog service object.
//!
//! One [`Catalog`] is opened at process start and shared by reference with
//! every request. It owns the meter and the token verifier (and through it
//! the issuer registry), and builds a fresh [`AuthorizedQuery`] per request.
//!
//! # Lifecycle
//!
//! - [`Catalog::open`] loads the issuer registry from `<root>/PUBKEYS.json`
//! - requests call [`Catalog::authorized_query`] and the admin entry points
//! - [`Catalog::shutdown`] invoices all outstanding usage

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use xdb_common_authn::{Command, Grant, Interface, IssuerRegistry, TokenGrants, TokenVerifier};
use xdb_common_storage::{FileIssuerKeyStore, IssuerKey, IssuerKeyStore};

use crate::{
    config::CatalogConfig,
    error::{CatalogError, Result},
    meter::{Meter, UsageReport},
    query::{AuthorizedQuery, OriginInterface, QueryProvider},
};

/// Metadata about one origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OriginMeta {
    /// The origin.
    pub origin: String,
    /// Whether the origin is an LCIA engine.
    pub is_lcia_engine: bool,
    /// Interfaces registered for the origin and its sub-origins, sorted.
    pub interfaces: Vec<Interface>,
}

/// Process-wide catalog.
pub struct Catalog {
    config: CatalogConfig,
    provider: Arc<dyn QueryProvider>,
    verifier: TokenVerifier,
    meter: Arc<Meter>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .field("meter", &self.meter)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Opens the catalog, loading issuer keys from the configured file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] if the key file cannot be read.
    #[tracing::instrument(skip(config, provider), fields(root = %config.root.display()))]
    pub async fn open(config: CatalogConfig, provider: Arc<dyn QueryProvider>) -> Result<Self> {
        let store = Arc::new(FileIssuerKeyStore::new(config.pubkeys_path()));
        Self::with_store(config, provider, store).await
    }

    /// Opens the catalog with an explicit issuer key store.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] if the store cannot be read.
    pub async fn with_store(
        config: CatalogConfig,
        provider: Arc<dyn QueryProvider>,
        store: Arc<dyn IssuerKeyStore>,
    ) -> Result<Self> {
        let registry = Arc::new(IssuerRegistry::load(store).await?);
        let verifier = TokenVerifier::builder()
            .registry(registry)
            .maybe_master_issuer(config.master_issuer.clone())
            .leeway(config.token_leeway)
            .build();
        let meter = Arc::new(Meter::new(config.meter_log_interval));

        tracing::info!(
            master_issuer = ?config.master_issuer,
            issuers = verifier.registry().issuers().len(),
            "catalog opened"
        );
        Ok(Self { config, provider, verifier, meter })
    }

    /// Configuration the catalog was opened with.
    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// The shared meter.
    #[must_use]
    pub fn meter(&self) -> &Arc<Meter> {
        &self.meter
    }

    /// The token verifier.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// The issuer registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<IssuerRegistry> {
        self.verifier.registry()
    }

    /// The query provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn QueryProvider> {
        &self.provider
    }

    /// Every registered resource.
    #[must_use]
    pub fn interfaces(&self) -> Vec<OriginInterface> {
        self.provider.interfaces()
    }

    /// Read access to every registered resource for `user`.
    #[must_use]
    pub fn all_grants(&self, user: &str) -> Vec<Grant> {
        self.provider
            .interfaces()
            .into_iter()
            .map(|resource| {
                Grant::builder()
                    .user(user)
                    .origin(resource.origin)
                    .access(resource.interface)
                    .values(true)
                    .update(false)
                    .build()
            })
            .collect()
    }

    /// Resolves a bearer token into grants.
    ///
    /// No token yields no grants. A master issuer token yields
    /// [`all_grants`](Self::all_grants) for its subject, computed now.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] for every verification failure.
    pub fn grants(&self, token: Option<&str>) -> Result<Vec<Grant>> {
        let grants = match self.verifier.verify(token)? {
            TokenGrants::Anonymous => Vec::new(),
            TokenGrants::Master { subject } => self.all_grants(&subject),
            TokenGrants::Issued(grants) => grants,
        };
        Ok(grants)
    }

    /// Builds a request-scoped query for `origin` with `grants`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Query`] if the origin is unknown.
    pub fn query(
        &self,
        origin: &str,
        grants: impl IntoIterator<Item = Grant>,
    ) -> Result<AuthorizedQuery> {
        let backend = self.provider.query(origin)?;
        Ok(AuthorizedQuery::new(backend, Arc::clone(&self.meter), grants))
    }

    /// Verifies `token` and builds a request-scoped query for `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] if the token is rejected and
    /// [`CatalogError::Query`] if the origin is unknown.
    pub fn authorized_query(&self, origin: &str, token: Option<&str>) -> Result<AuthorizedQuery> {
        let grants = self.grants(token)?;
        self.query(origin, grants)
    }

    /// Distinct grant origins known to the catalog, sorted.
    #[must_use]
    pub fn authorized_origins(&self, grants: &[Grant]) -> Vec<String> {
        grants
            .iter()
            .map(Grant::origin)
            .filter(|origin| self.provider.known_origin(origin))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Metadata for every known origin starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] if the token is rejected, or a backend
    /// error.
    pub async fn origin_meta(&self, prefix: &str, token: Option<&str>) -> Result<Vec<OriginMeta>> {
        let grants = self.grants(token)?;
        let resources = self.provider.interfaces();

        let mut metas = Vec::new();
        for origin in self.provider.origins().into_iter().filter(|o| o.starts_with(prefix)) {
            let query = self.query(&origin, grants.iter().cloned())?;
            let is_lcia_engine = query.is_lcia_engine().await?;
            let interfaces: BTreeSet<Interface> = resources
                .iter()
                .filter(|r| r.origin.starts_with(origin.as_str()))
                .map(|r| r.interface)
                .collect();
            metas.push(OriginMeta {
                origin,
                is_lcia_engine,
                interfaces: interfaces.into_iter().collect(),
            });
        }
        Ok(metas)
    }

    /// Registers or replaces the key of `issuer`.
    ///
    /// Requires a master command token for `update_issuer:<issuer>`, and
    /// `key.issuer` must name the same issuer. The full registry is persisted.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Auth`] if the command token is rejected, does not
    ///   match, or the registry cannot be persisted
    /// - [`CatalogError::MasterKeyUpdateForbidden`] for the master issuer
    #[tracing::instrument(skip(self, key, token))]
    pub async fn update_issuer(
        &self,
        issuer: &str,
        key: IssuerKey,
        token: Option<&str>,
    ) -> Result<bool> {
        let command = self.verifier.verify_command(token)?;
        command.require(Command::UpdateIssuer, issuer)?;
        command.require(Command::UpdateIssuer, &key.issuer)?;
        if self.verifier.is_master(issuer) {
            tracing::warn!(issuer, "refusing remote update of master issuer key");
            return Err(CatalogError::MasterKeyUpdateForbidden);
        }

        self.registry().update(key).await?;
        tracing::info!(issuer, subject = %command.subject(), "issuer key updated");
        Ok(true)
    }

    /// Installs the resources of `origin`.
    ///
    /// Requires a master command token for `update_origin:<origin>`. If
    /// `interface` is given and that resource is already registered, nothing
    /// is installed. Otherwise returns, after installing, whether the
    /// requested interface is now registered, or without an interface
    /// whether anything was installed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Auth`] if the command token is rejected or
    /// does not match, and [`CatalogError::Query`] if the origin is unknown.
    #[tracing::instrument(skip(self, token))]
    pub async fn update_origin(
        &self,
        origin: &str,
        interface: Option<Interface>,
        reset: bool,
        token: Option<&str>,
    ) -> Result<bool> {
        let command = self.verifier.verify_command(token)?;
        command.require(Command::UpdateOrigin, origin)?;

        let wanted = interface.map(|i| OriginInterface::new(origin, i));
        if let Some(wanted) = &wanted
            && self.provider.interfaces().contains(wanted)
        {
            return Ok(true);
        }

        let installed = self.provider.install_origin(origin, reset).await?;
        tracing::info!(origin, installed, subject = %command.subject(), "origin updated");

        Ok(match wanted {
            Some(wanted) => self.provider.interfaces().contains(&wanted),
            None => installed,
        })
    }

    /// Invoices every user with counters and returns the final reports,
    /// skipping empty lines.
    pub fn shutdown(&self) -> Vec<UsageReport> {
        let reports: Vec<UsageReport> = self
            .meter
            .users()
            .iter()
            .flat_map(|user| self.meter.invoice(user))
            .filter(|report| !report.usage.is_zero())
            .collect();
        tracing::info!(lines = reports.len(), "catalog shut down, usage invoiced");
        reports
    }
}
