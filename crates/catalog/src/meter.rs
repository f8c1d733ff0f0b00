//! Usage metering and invoicing.
//!
//! The [`Meter`] owns one usage counter per `(user, origin, interface)`.
//! Counters are created on the first metered call and never evicted.
//!
//! # Concurrency
//!
//! The counter map sits behind a `parking_lot::RwLock` and each counter
//! behind its own `parking_lot::Mutex`. The map lock is only held long enough
//! to find or insert a counter handle, so calls against different counters
//! never contend. Incrementing, and reading the live tallies then advancing
//! the billed snapshot during [`Meter::invoice`], both happen under the
//! counter mutex: every call is billed exactly once.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use xdb_common_authn::{Grant, Interface};

use crate::error::AccessError;

/// Default number of calls between usage log lines for one counter.
pub const DEFAULT_METER_LOG_INTERVAL: u64 = 1000;

/// Identity of a usage counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CounterKey {
    /// User the usage is billed to.
    pub user: String,
    /// Origin of the grant the calls were made under.
    pub origin: String,
    /// Interface of the calls.
    pub interface: Interface,
}

impl CounterKey {
    /// Counter key for calls made under `grant`.
    #[must_use]
    pub fn for_grant(grant: &Grant) -> Self {
        Self {
            user: grant.user().to_owned(),
            origin: grant.origin().to_owned(),
            interface: grant.access(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.user, self.origin, self.interface)
    }
}

/// Call tallies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageCounter {
    /// Every metered call.
    pub access_count: u64,
    /// Calls that read value data.
    pub values_count: u64,
    /// Calls that updated data.
    pub update_count: u64,
}

impl UsageCounter {
    /// Returns `true` if every tally is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn since(&self, billed: &UsageCounter) -> UsageCounter {
        UsageCounter {
            access_count: self.access_count.saturating_sub(billed.access_count),
            values_count: self.values_count.saturating_sub(billed.values_count),
            update_count: self.update_count.saturating_sub(billed.update_count),
        }
    }
}

/// One invoice line: usage of one counter since it was last billed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// Counter the line refers to.
    #[serde(flatten)]
    pub key: CounterKey,
    /// Unbilled usage.
    #[serde(flatten)]
    pub usage: UsageCounter,
}

#[derive(Debug, Default)]
struct MeteredUsage {
    live: UsageCounter,
    billed: UsageCounter,
}

type CounterHandle = Arc<Mutex<MeteredUsage>>;

/// Process-wide usage meter.
pub struct Meter {
    counters: RwLock<HashMap<CounterKey, CounterHandle>>,
    log_interval: u64,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("counters", &self.counters.read().len())
            .field("log_interval", &self.log_interval)
            .finish()
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new(DEFAULT_METER_LOG_INTERVAL)
    }
}

impl Meter {
    /// Creates an empty meter that logs every `log_interval` calls per
    /// counter (`0` disables the log line).
    #[must_use]
    pub fn new(log_interval: u64) -> Self {
        Self { counters: RwLock::new(HashMap::new()), log_interval }
    }

    fn handle(&self, grant: &Grant) -> CounterHandle {
        let key = CounterKey::for_grant(grant);
        if let Some(handle) = self.counters.read().get(&key) {
            return Arc::clone(handle);
        }
        Arc::clone(self.counters.write().entry(key).or_default())
    }

    fn log_milestone(&self, grant: &Grant, count: u64) {
        if self.log_interval > 0 && count % self.log_interval == 0 {
            tracing::info!(grant = %grant, count, "grant passed query milestone");
        }
    }

    /// Counts one call under `grant` and returns the new access count.
    pub fn record_access(&self, grant: &Grant) -> u64 {
        let count = {
            let handle = self.handle(grant);
            let mut usage = handle.lock();
            usage.live.access_count += 1;
            usage.live.access_count
        };
        self.log_milestone(grant, count);
        count
    }

    /// Counts one value-reading call under `grant`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::ValuesAccessDenied`] if the grant lacks value
    /// access. Nothing is counted in that case.
    pub fn record_values(&self, grant: &Grant) -> Result<u64, AccessError> {
        if !grant.values() {
            return Err(AccessError::ValuesAccessDenied { grant: grant.to_string() });
        }
        let count = {
            let handle = self.handle(grant);
            let mut usage = handle.lock();
            usage.live.access_count += 1;
            usage.live.values_count += 1;
            usage.live.access_count
        };
        self.log_milestone(grant, count);
        Ok(count)
    }

    /// Counts one updating call under `grant`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::UpdateAccessDenied`] if the grant lacks update
    /// access. Nothing is counted in that case.
    pub fn record_update(&self, grant: &Grant) -> Result<u64, AccessError> {
        if !grant.update() {
            return Err(AccessError::UpdateAccessDenied { grant: grant.to_string() });
        }
        let count = {
            let handle = self.handle(grant);
            let mut usage = handle.lock();
            usage.live.access_count += 1;
            usage.live.update_count += 1;
            usage.live.access_count
        };
        self.log_milestone(grant, count);
        Ok(count)
    }

    /// Live tallies of one counter, if it exists.
    #[must_use]
    pub fn usage(&self, key: &CounterKey) -> Option<UsageCounter> {
        let handle = self.counters.read().get(key).map(Arc::clone)?;
        let live = handle.lock().live;
        Some(live)
    }

    /// Number of counters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    /// Returns `true` if no call has been metered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }

    /// Users with at least one counter, sorted.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> =
            self.counters.read().keys().map(|key| key.user.clone()).collect();
        users.sort();
        users.dedup();
        users
    }

    /// Bills `user`.
    ///
    /// Returns a lazy iterator with one [`UsageReport`] per counter of the
    /// user, ordered by origin then interface. Each line is computed and its
    /// counter's billed snapshot advanced when the line is yielded. Lines
    /// that are never pulled stay unbilled. Counters created after this call
    /// are not included.
    pub fn invoice(&self, user: &str) -> Invoice {
        let mut pending: Vec<(CounterKey, CounterHandle)> = self
            .counters
            .read()
            .iter()
            .filter(|(key, _)| key.user == user)
            .map(|(key, handle)| (key.clone(), Arc::clone(handle)))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        Invoice { pending: pending.into_iter() }
    }
}

/// Lazy invoice returned by [`Meter::invoice`].
pub struct Invoice {
    pending: std::vec::IntoIter<(CounterKey, CounterHandle)>,
}

impl fmt::Debug for Invoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoice").field("remaining", &self.pending.len()).finish()
    }
}

impl Iterator for Invoice {
    type Item = UsageReport;

    fn next(&mut self) -> Option<UsageReport> {
        let (key, handle) = self.pending.next()?;
        let mut metered = handle.lock();
        let usage = metered.live.since(&metered.billed);
        metered.billed = metered.live;
        Some(UsageReport { key, usage })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}

impl ExactSizeIterator for Invoice {}
