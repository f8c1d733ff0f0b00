//! Authorization grants and the query interfaces they cover.
//!
//! A [`Grant`] gives one user access to one [`Interface`] of every data
//! origin that starts with the grant's origin string. Grants are decoded from
//! the `grants` claim of a verified token, which comes in two encodings:
//!
//! ```text
//! "lcacommons.uslci:exchange:v qdb:quantity:vu lcacommons:index"
//! [{"origin": "qdb", "access": "quantity", "values": true, "update": false}]
//! ```
//!
//! In the compact string form, entries are whitespace separated and the
//! optional third segment holds capability flags: `v` for values and `u` for
//! update, in any order and case.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Query interface kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Entity discovery and listing.
    Index,
    /// Entity metadata lookup.
    Basic,
    /// Process exchanges and their values.
    Exchange,
    /// Background (matrix) computations.
    Background,
    /// Quantities, characterization factors and LCIA.
    Quantity,
}

impl Interface {
    /// Every interface kind, in declaration order.
    pub const ALL: [Interface; 5] = [
        Interface::Index,
        Interface::Basic,
        Interface::Exchange,
        Interface::Background,
        Interface::Quantity,
    ];

    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Interface::Index => "index",
            Interface::Basic => "basic",
            Interface::Exchange => "exchange",
            Interface::Background => "background",
            Interface::Quantity => "quantity",
        }
    }

    /// Public interfaces are permitted without an explicit grant.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Interface::Index | Interface::Basic)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Interface::ALL
            .into_iter()
            .find(|iface| iface.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AuthError::invalid_grant(format!("unknown interface '{s}'")))
    }
}

/// An immutable authorization record.
///
/// # Example
///
/// ```
/// use xdb_common_authn::{Grant, Interface};
///
/// let grant = Grant::builder()
///     .user("alice")
///     .origin("lcacommons.uslci")
///     .access(Interface::Exchange)
///     .values(true)
///     .build();
///
/// assert!(grant.authorizes("lcacommons.uslci.fy2021.q1"));
/// assert!(!grant.authorizes("lcacommons"));
/// assert_eq!(grant.to_string(), "alice:lcacommons.uslci/exchange");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, bon::Builder)]
pub struct Grant {
    #[builder(into)]
    user: String,
    #[builder(into)]
    origin: String,
    access: Interface,
    #[builder(default)]
    values: bool,
    #[builder(default)]
    update: bool,
}

impl Grant {
    /// The user the grant belongs to.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Origin prefix covered by the grant.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Interface covered by the grant.
    #[must_use]
    pub fn access(&self) -> Interface {
        self.access
    }

    /// Whether value data may be read.
    #[must_use]
    pub fn values(&self) -> bool {
        self.values
    }

    /// Whether data may be updated.
    #[must_use]
    pub fn update(&self) -> bool {
        self.update
    }

    /// Number of capabilities beyond plain access (0 to 2).
    #[must_use]
    pub fn privilege(&self) -> u8 {
        u8::from(self.values) + u8::from(self.update)
    }

    /// Returns `true` if `origin` starts with the grant origin.
    ///
    /// This is an exact string prefix test, not a segment-aware one:
    /// `lcacommons.uslci2` is not covered by `lcacommons.uslci.fy2021`, but
    /// `lcacommons.uslci2` is covered by `lcacommons.uslci`.
    #[must_use]
    pub fn authorizes(&self, origin: &str) -> bool {
        origin.starts_with(self.origin.as_str())
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.user, self.origin, self.access)
    }
}

/// One structured entry of a `grants` claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSpec {
    /// Origin prefix.
    pub origin: String,
    /// Interface kind.
    pub access: Interface,
    /// Values capability.
    #[serde(default)]
    pub values: bool,
    /// Update capability.
    #[serde(default)]
    pub update: bool,
}

impl GrantSpec {
    /// Binds the spec to a user.
    #[must_use]
    pub fn into_grant(self, user: &str) -> Grant {
        Grant::builder()
            .user(user)
            .origin(self.origin)
            .access(self.access)
            .values(self.values)
            .update(self.update)
            .build()
    }
}

impl FromStr for GrantSpec {
    type Err = AuthError;

    /// Parses one `origin:interface[:flags]` entry.
    fn from_str(entry: &str) -> Result<Self> {
        let mut parts = entry.split(':');
        let (Some(origin), Some(access)) = (parts.next(), parts.next()) else {
            return Err(AuthError::invalid_grant(format!(
                "expected origin:interface[:flags], got '{entry}'"
            )));
        };
        let flags = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(AuthError::invalid_grant(format!("too many segments in '{entry}'")));
        }
        if origin.is_empty() {
            return Err(AuthError::invalid_grant(format!("empty origin in '{entry}'")));
        }

        let mut spec =
            GrantSpec { origin: origin.to_owned(), access: access.parse()?, values: false, update: false };
        for flag in flags.chars() {
            match flag.to_ascii_lowercase() {
                'v' => spec.values = true,
                'u' => spec.update = true,
                other => {
                    return Err(AuthError::invalid_grant(format!(
                        "unknown flag '{other}' in '{entry}'"
                    )));
                },
            }
        }
        Ok(spec)
    }
}

/// The `grants` claim as it appears in a token payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantsClaim {
    /// Compact whitespace-separated entries, or a `command:argument` pair
    /// in command tokens.
    Encoded(String),
    /// Structured entries.
    List(Vec<GrantSpec>),
}

impl GrantsClaim {
    /// Decodes the claim into grant specs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidGrant`] if any compact entry is malformed.
    pub fn specs(&self) -> Result<Vec<GrantSpec>> {
        match self {
            GrantsClaim::Encoded(encoded) => encoded.split_whitespace().map(str::parse).collect(),
            GrantsClaim::List(specs) => Ok(specs.clone()),
        }
    }
}
