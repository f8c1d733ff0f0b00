//! Query seams and the authorizing, metering query wrapper.
//!
//! A [`QueryProvider`] hands out plain [`QueryBackend`]s per origin. The
//! catalog wraps each one in an [`AuthorizedQuery`] bound to one request's
//! grants. Every forwarded call goes through
//! [`AuthorizedQuery::check_and_meter`] before it reaches the backend:
//!
//! 1. exempt operations pass unconditionally
//! 2. with a grant for the operation's interface, the call is metered (value
//!    operations also require the grant's `values` flag)
//! 3. without a grant, public interfaces pass unmetered and everything else
//!    fails with [`AccessError::InterfaceNotAuthorized`]

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use xdb_common_authn::{Grant, Interface};

use crate::{
    error::{AccessError, QueryError},
    meter::Meter,
    operation::{Metering, Operation},
};

/// Arguments of a forwarded operation.
///
/// The backend interprets them per operation. `entity` is the subject entity
/// for entity-scoped operations; everything else goes in `params`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryArgs {
    /// Subject entity identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Named parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl QueryArgs {
    /// No arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments naming a subject entity.
    #[must_use]
    pub fn entity(entity: impl Into<String>) -> Self {
        Self { entity: Some(entity.into()), params: Map::new() }
    }

    /// Adds a named parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Subject entity identifier, if any.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// A named parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// A named string parameter.
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// A plain, unauthorized query against one origin.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Origin the backend answers for.
    fn origin(&self) -> &str;

    /// Runs `operation` and returns its result record.
    async fn perform(&self, operation: Operation, args: QueryArgs) -> Result<Value, QueryError>;

    /// Prepares the background engine, which issues its own internal calls
    /// through `query`.
    async fn setup_background(&self, query: Arc<dyn QueryBackend>) -> Result<(), QueryError>;
}

/// A resource the catalog knows: one interface of one origin.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginInterface {
    /// Origin of the resource.
    pub origin: String,
    /// Interface it provides.
    pub interface: Interface,
}

impl OriginInterface {
    /// Creates a resource pair.
    #[must_use]
    pub fn new(origin: impl Into<String>, interface: Interface) -> Self {
        Self { origin: origin.into(), interface }
    }
}

impl fmt::Display for OriginInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.interface)
    }
}

impl FromStr for OriginInterface {
    type Err = QueryError;

    /// Parses `origin:interface`, splitting on the last `:`.
    fn from_str(s: &str) -> Result<Self, QueryError> {
        let (origin, interface) = s
            .rsplit_once(':')
            .ok_or_else(|| QueryError::backend(format!("expected origin:interface, got '{s}'")))?;
        let interface =
            interface.parse::<Interface>().map_err(|e| QueryError::backend(e.to_string()))?;
        Ok(Self::new(origin, interface))
    }
}

/// Source of origins, resources and plain queries.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Origins with at least one resource.
    fn origins(&self) -> Vec<String>;

    /// Every registered resource.
    fn interfaces(&self) -> Vec<OriginInterface>;

    /// Returns `true` if some registered origin starts with `origin`.
    fn known_origin(&self, origin: &str) -> bool {
        self.origins().iter().any(|known| known.starts_with(origin))
    }

    /// A plain query for `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOrigin`] if the origin is not known.
    fn query(&self, origin: &str) -> Result<Arc<dyn QueryBackend>, QueryError>;

    /// Installs the resources available for `origin`, first removing the
    /// existing ones if `reset` is set. Returns whether anything was
    /// installed.
    async fn install_origin(&self, origin: &str, reset: bool) -> Result<bool, QueryError>;
}

/// Keeps one grant per interface among those covering `origin`.
///
/// The most specific grant origin wins, then the grant with more
/// capabilities, then the first one seen.
fn collapse_grants(origin: &str, grants: impl IntoIterator<Item = Grant>) -> HashMap<Interface, Grant> {
    let mut kept: HashMap<Interface, Grant> = HashMap::new();
    for grant in grants.into_iter().filter(|g| g.authorizes(origin)) {
        match kept.get(&grant.access()) {
            Some(current)
                if (current.origin().len(), current.privilege())
                    >= (grant.origin().len(), grant.privilege()) => {},
            _ => {
                kept.insert(grant.access(), grant);
            },
        }
    }
    kept
}

/// A request-scoped query bound to one origin and one caller's grants.
pub struct AuthorizedQuery {
    origin: String,
    grants: HashMap<Interface, Grant>,
    backend: Arc<dyn QueryBackend>,
    meter: Arc<Meter>,
}

impl fmt::Debug for AuthorizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedQuery")
            .field("origin", &self.origin)
            .field("grants", &self.authorized_interfaces())
            .finish_non_exhaustive()
    }
}

macro_rules! forward {
    ($($(#[$doc:meta])* $method:ident => $op:ident;)*) => {
        $(
            $(#[$doc])*
            ///
            /// # Errors
            ///
            /// Returns [`QueryError::Access`] if the call is refused, or the
            /// backend error.
            pub async fn $method(&self, args: QueryArgs) -> Result<Value, QueryError> {
                self.perform(Operation::$op, args).await
            }
        )*
    };
}

impl AuthorizedQuery {
    /// Wraps `backend` with the grants that cover its origin.
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        meter: Arc<Meter>,
        grants: impl IntoIterator<Item = Grant>,
    ) -> Self {
        let origin = backend.origin().to_owned();
        let grants = collapse_grants(&origin, grants);
        tracing::debug!(origin = %origin, interfaces = ?grants.keys().collect::<Vec<_>>(), "query authorized");
        Self { origin, grants, backend, meter }
    }

    /// Origin the query is bound to.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The grant kept for `interface`, if any.
    #[must_use]
    pub fn grant(&self, interface: Interface) -> Option<&Grant> {
        self.grants.get(&interface)
    }

    /// Interfaces covered by an explicit grant.
    #[must_use]
    pub fn authorized_interfaces(&self) -> BTreeSet<Interface> {
        self.grants.keys().copied().collect()
    }

    /// Authorizes and meters one call of `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InterfaceNotAuthorized`] if no grant covers a
    /// non-public interface, and [`AccessError::ValuesAccessDenied`] if the
    /// grant lacks value access for a value operation.
    pub fn check_and_meter(&self, operation: Operation) -> Result<(), AccessError> {
        let metering = operation.metering();
        if metering == Metering::Exempt {
            return Ok(());
        }

        let interface = operation.interface();
        let Some(grant) = self.grants.get(&interface) else {
            if interface.is_public() {
                return Ok(());
            }
            tracing::debug!(origin = %self.origin, %operation, "interface not authorized");
            return Err(AccessError::interface_not_authorized(self.origin.as_str(), interface));
        };

        match metering {
            Metering::Values => {
                self.meter.record_values(grant)?;
            },
            Metering::Access | Metering::Exempt => {
                self.meter.record_access(grant);
            },
        }
        Ok(())
    }

    /// Authorizes, meters and forwards `operation`.
    ///
    /// The backend result is returned unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Access`] if the call is refused, or the backend
    /// error.
    #[tracing::instrument(skip(self, args), fields(origin = %self.origin))]
    pub async fn perform(&self, operation: Operation, args: QueryArgs) -> Result<Value, QueryError> {
        self.check_and_meter(operation)?;
        self.backend.perform(operation, args).await
    }

    /// Whether the origin is an LCIA engine. Never metered.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn is_lcia_engine(&self) -> Result<bool, QueryError> {
        let result = self.perform(Operation::IsLciaEngine, QueryArgs::new()).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Whether the background engine is ready. Never metered.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn check_bg(&self) -> Result<bool, QueryError> {
        let result = self.perform(Operation::CheckBg, QueryArgs::new()).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Configures the background engine with the plain backend, so that its
    /// internal calls are neither authorized nor metered again.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BackgroundSetup`] or another backend error.
    pub async fn setup_background(&self) -> Result<(), QueryError> {
        tracing::debug!(origin = %self.origin, "setting up non-metering background interface");
        self.backend.setup_background(Arc::clone(&self.backend)).await
    }

    forward! {
        /// Entity record.
        get => Get;
        /// One property of an entity.
        get_item => GetItem;
        /// Reference of an entity.
        get_reference => GetReference;
        /// Entity UUID.
        get_uuid => GetUuid;
        /// Property names of an entity.
        properties => Properties;
        /// Entity counts.
        count => Count;
        /// Entity search.
        search => Search;
        /// Contexts.
        contexts => Contexts;
        /// One context.
        get_context => GetContext;
        /// Canonical name of a term.
        get_canonical => GetCanonical;
        /// Synonyms of a term.
        synonyms => Synonyms;
        /// Flowables.
        flowables => Flowables;
        /// Exchanges of a process.
        exchanges => Exchanges;
        /// Exchange values.
        exchange_values => ExchangeValues;
        /// Process inventory.
        inventory => Inventory;
        /// Life cycle inventory through the exchange interface.
        exchange_lci => ExchangeLci;
        /// Consumers of a product flow.
        consumers => Consumers;
        /// Foreground of a process.
        foreground => Foreground;
        /// Background dependency column.
        ad => Ad;
        /// Biosphere column.
        bf => Bf;
        /// Background dependencies.
        dependencies => Dependencies;
        /// Emissions.
        emissions => Emissions;
        /// Cutoff flows.
        cutoffs => Cutoffs;
        /// Life cycle inventory.
        lci => Lci;
        /// Inventory of an ad hoc demand.
        sys_lci => SysLci;
        /// Flow characterization profile.
        profile => Profile;
        /// Characterization factors.
        factors => Factors;
        /// Quantity normalization.
        norm => Norm;
        /// One characterization factor.
        cf => Cf;
        /// Impact assessment of an inventory.
        do_lcia => DoLcia;
    }
}
