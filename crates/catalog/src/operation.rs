//! The fixed set of forwarded query operations.
//!
//! Each [`Operation`] belongs to one [`Interface`] and carries its
//! [`Metering`] class: exempt operations bypass authorization entirely,
//! value operations require a grant with `values`, everything else is a plain
//! metered access.

use std::fmt;

use xdb_common_authn::Interface;

/// How a call is authorized and counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metering {
    /// Forwarded without any grant check or metering.
    Exempt,
    /// Counted as an access.
    Access,
    /// Requires value access; counted as access and values.
    Values,
}

/// A query operation the catalog forwards to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    // basic
    /// Entity record lookup.
    Get,
    /// One property of an entity.
    GetItem,
    /// Reference entity (unit, reference exchange).
    GetReference,
    /// Entity UUID.
    GetUuid,
    /// Property names of an entity.
    Properties,
    /// Whether the origin is an LCIA engine.
    IsLciaEngine,

    // index
    /// Entity counts.
    Count,
    /// Entity search.
    Search,
    /// Context listing.
    Contexts,
    /// One context.
    GetContext,
    /// Canonical name of a term.
    GetCanonical,
    /// Synonyms of a term.
    Synonyms,
    /// Flowables.
    Flowables,

    // exchange
    /// Exchanges of a process, without values.
    Exchanges,
    /// Exchange values for a process and flow.
    ExchangeValues,
    /// Process inventory.
    Inventory,
    /// Life cycle inventory of a process, asked of the exchange interface.
    ExchangeLci,

    // background
    /// Whether the background engine is ready.
    CheckBg,
    /// Processes consuming a product flow.
    Consumers,
    /// Foreground of a process.
    Foreground,
    /// Background dependency matrix column.
    Ad,
    /// Biosphere matrix column.
    Bf,
    /// Background dependencies.
    Dependencies,
    /// Emissions.
    Emissions,
    /// Cutoff flows.
    Cutoffs,
    /// Life cycle inventory.
    Lci,
    /// Inventory of an ad hoc demand vector.
    SysLci,

    // quantity
    /// Flow characterization profile.
    Profile,
    /// Characterization factors of a quantity.
    Factors,
    /// Normalization of a quantity.
    Norm,
    /// One characterization factor.
    Cf,
    /// Impact assessment of an inventory.
    DoLcia,
}

impl Operation {
    /// Every operation, grouped by interface.
    pub const ALL: [Operation; 32] = [
        Operation::Get,
        Operation::GetItem,
        Operation::GetReference,
        Operation::GetUuid,
        Operation::Properties,
        Operation::IsLciaEngine,
        Operation::Count,
        Operation::Search,
        Operation::Contexts,
        Operation::GetContext,
        Operation::GetCanonical,
        Operation::Synonyms,
        Operation::Flowables,
        Operation::Exchanges,
        Operation::ExchangeValues,
        Operation::Inventory,
        Operation::ExchangeLci,
        Operation::CheckBg,
        Operation::Consumers,
        Operation::Foreground,
        Operation::Ad,
        Operation::Bf,
        Operation::Dependencies,
        Operation::Emissions,
        Operation::Cutoffs,
        Operation::Lci,
        Operation::SysLci,
        Operation::Profile,
        Operation::Factors,
        Operation::Norm,
        Operation::Cf,
        Operation::DoLcia,
    ];

    /// Interface the operation belongs to.
    #[must_use]
    pub fn interface(self) -> Interface {
        use Operation::*;
        match self {
            Get | GetItem | GetReference | GetUuid | Properties | IsLciaEngine => Interface::Basic,
            Count | Search | Contexts | GetContext | GetCanonical | Synonyms | Flowables => {
                Interface::Index
            },
            Exchanges | ExchangeValues | Inventory | ExchangeLci => Interface::Exchange,
            CheckBg | Consumers | Foreground | Ad | Bf | Dependencies | Emissions | Cutoffs
            | Lci | SysLci => Interface::Background,
            Profile | Factors | Norm | Cf | DoLcia => Interface::Quantity,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        use Operation::*;
        match self {
            Get => "get",
            GetItem => "get_item",
            GetReference => "get_reference",
            GetUuid => "get_uuid",
            Properties => "properties",
            IsLciaEngine => "is_lcia_engine",
            Count => "count",
            Search => "search",
            Contexts => "contexts",
            GetContext => "get_context",
            GetCanonical => "get_canonical",
            Synonyms => "synonyms",
            Flowables => "flowables",
            Exchanges => "exchanges",
            ExchangeValues => "exchange_values",
            Inventory => "inventory",
            ExchangeLci => "lci",
            CheckBg => "check_bg",
            Consumers => "consumers",
            Foreground => "foreground",
            Ad => "ad",
            Bf => "bf",
            Dependencies => "dependencies",
            Emissions => "emissions",
            Cutoffs => "cutoffs",
            Lci => "lci",
            SysLci => "sys_lci",
            Profile => "profile",
            Factors => "factors",
            Norm => "norm",
            Cf => "cf",
            DoLcia => "do_lcia",
        }
    }

    /// Metering class.
    #[must_use]
    pub fn metering(self) -> Metering {
        use Operation::*;
        match self {
            IsLciaEngine | CheckBg => Metering::Exempt,
            ExchangeValues | Inventory | ExchangeLci | Foreground | Ad | Bf | Dependencies
            | Emissions | Cutoffs | Lci | SysLci | Cf | DoLcia => Metering::Values,
            _ => Metering::Access,
        }
    }

    /// Looks up an operation by interface and wire name.
    #[must_use]
    pub fn lookup(interface: Interface, name: &str) -> Option<Operation> {
        Self::ALL.into_iter().find(|op| op.interface() == interface && op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.interface(), self.name())
    }
}
