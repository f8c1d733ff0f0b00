//! In-memory query provider.
//!
//! [`MemoryProvider`] holds origins, their interfaces, entity records and
//! canned per-operation results, and logs every call a backend receives. It
//! backs the test suite and local development.
//!
//! Origins can also be *staged*: a staged origin is not visible until
//! [`QueryProvider::install_origin`] installs it, mirroring a data sync.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use xdb_common_authn::Interface;

use crate::{
    error::QueryError,
    operation::Operation,
    query::{OriginInterface, QueryArgs, QueryBackend, QueryProvider},
};

#[derive(Debug, Default, Clone)]
struct OriginData {
    interfaces: BTreeSet<Interface>,
    entities: BTreeMap<String, Value>,
    fixtures: HashMap<Operation, Value>,
    lcia_engine: bool,
}

#[derive(Default)]
struct MemoryState {
    origins: BTreeMap<String, OriginData>,
    staged: BTreeMap<String, OriginData>,
    calls: Vec<RecordedCall>,
    background: HashMap<String, Arc<dyn QueryBackend>>,
}

/// One call received by a [`MemoryQuery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    /// Origin of the backend that received the call.
    pub origin: String,
    /// The operation.
    pub operation: Operation,
}

/// In-memory [`QueryProvider`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    state: Arc<RwLock<MemoryState>>,
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryProvider")
            .field("origins", &state.origins.keys().collect::<Vec<_>>())
            .field("staged", &state.staged.keys().collect::<Vec<_>>())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl MemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `origin` with `interfaces`, merging with existing ones.
    pub fn add_origin(&self, origin: &str, interfaces: impl IntoIterator<Item = Interface>) {
        self.state
            .write()
            .origins
            .entry(origin.to_owned())
            .or_default()
            .interfaces
            .extend(interfaces);
    }

    /// Stores an entity record under `origin`.
    pub fn add_entity(&self, origin: &str, id: &str, record: Value) {
        self.state
            .write()
            .origins
            .entry(origin.to_owned())
            .or_default()
            .entities
            .insert(id.to_owned(), record);
    }

    /// Sets the result `operation` returns for `origin`.
    pub fn set_fixture(&self, origin: &str, operation: Operation, result: Value) {
        self.state
            .write()
            .origins
            .entry(origin.to_owned())
            .or_default()
            .fixtures
            .insert(operation, result);
    }

    /// Marks `origin` as an LCIA engine.
    pub fn set_lcia_engine(&self, origin: &str, lcia_engine: bool) {
        self.state.write().origins.entry(origin.to_owned()).or_default().lcia_engine = lcia_engine;
    }

    /// Makes `origin` with `interfaces` available to the next install.
    pub fn stage_origin(&self, origin: &str, interfaces: impl IntoIterator<Item = Interface>) {
        self.state
            .write()
            .staged
            .entry(origin.to_owned())
            .or_default()
            .interfaces
            .extend(interfaces);
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.read().calls.clone()
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// Simulates the background engine of `origin` recomputing: it runs
    /// `operation` through the query handed to
    /// [`QueryBackend::setup_background`].
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BackgroundSetup`] if the background was never
    /// set up, or the error of the internal call.
    pub async fn run_background(&self, origin: &str, operation: Operation) -> Result<Value, QueryError> {
        let query = self
            .state
            .read()
            .background
            .get(origin)
            .cloned()
            .ok_or_else(|| QueryError::background_setup(format!("no background for {origin}")))?;
        query.perform(operation, QueryArgs::new()).await
    }
}

#[async_trait]
impl QueryProvider for MemoryProvider {
    fn origins(&self) -> Vec<String> {
        self.state.read().origins.keys().cloned().collect()
    }

    fn interfaces(&self) -> Vec<OriginInterface> {
        self.state
            .read()
            .origins
            .iter()
            .flat_map(|(origin, data)| {
                data.interfaces.iter().map(move |&i| OriginInterface::new(origin.as_str(), i))
            })
            .collect()
    }

    fn query(&self, origin: &str) -> Result<Arc<dyn QueryBackend>, QueryError> {
        if !self.known_origin(origin) {
            return Err(QueryError::unknown_origin(origin));
        }
        Ok(Arc::new(MemoryQuery { origin: origin.to_owned(), state: Arc::clone(&self.state) }))
    }

    /// Installs a staged origin. Without a staged origin, returns `false` for
    /// an already registered one and [`QueryError::UnknownOrigin`] otherwise.
    async fn install_origin(&self, origin: &str, reset: bool) -> Result<bool, QueryError> {
        let mut state = self.state.write();
        if reset {
            state.origins.remove(origin);
            state.background.remove(origin);
        }
        match state.staged.remove(origin) {
            Some(staged) => {
                let data = state.origins.entry(origin.to_owned()).or_default();
                data.interfaces.extend(staged.interfaces);
                data.entities.extend(staged.entities);
                data.fixtures.extend(staged.fixtures);
                tracing::info!(origin, reset, "origin installed");
                Ok(true)
            },
            None if state.origins.contains_key(origin) => Ok(false),
            None => Err(QueryError::unknown_origin(origin)),
        }
    }
}

/// Plain query against a [`MemoryProvider`].
///
/// Answers for every registered origin starting with its own origin.
pub struct MemoryQuery {
    origin: String,
    state: Arc<RwLock<MemoryState>>,
}

impl std::fmt::Debug for MemoryQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQuery").field("origin", &self.origin).finish_non_exhaustive()
    }
}

impl MemoryQuery {
    fn entity(&self, state: &MemoryState, args: &QueryArgs) -> Result<Value, QueryError> {
        let id = args
            .entity_id()
            .ok_or_else(|| QueryError::backend("operation requires an entity"))?;
        self.matching(state)
            .find_map(|data| data.entities.get(id).cloned())
            .ok_or_else(|| QueryError::entity_not_found(self.origin.as_str(), id))
    }

    fn matching<'a>(&'a self, state: &'a MemoryState) -> impl Iterator<Item = &'a OriginData> + 'a {
        state
            .origins
            .iter()
            .filter(|(origin, _)| origin.starts_with(self.origin.as_str()))
            .map(|(_, data)| data)
    }

    fn answer(&self, state: &MemoryState, operation: Operation, args: &QueryArgs) -> Result<Value, QueryError> {
        match operation {
            Operation::Get => self.entity(state, args),
            Operation::GetItem => {
                let record = self.entity(state, args)?;
                let item = args.param_str("item").unwrap_or_default();
                Ok(record.get(item).cloned().unwrap_or(Value::Null))
            },
            Operation::GetReference => {
                Ok(self.entity(state, args)?.get("reference").cloned().unwrap_or(Value::Null))
            },
            Operation::GetUuid => {
                Ok(self.entity(state, args)?.get("uuid").cloned().unwrap_or(Value::Null))
            },
            Operation::Properties => {
                let record = self.entity(state, args)?;
                let keys: Vec<&String> =
                    record.as_object().map(|o| o.keys().collect()).unwrap_or_default();
                Ok(json!(keys))
            },
            Operation::IsLciaEngine => Ok(Value::Bool(self.matching(state).any(|d| d.lcia_engine))),
            Operation::CheckBg => Ok(Value::Bool(state.background.contains_key(&self.origin))),
            Operation::Count => {
                Ok(Value::from(self.matching(state).map(|d| d.entities.len()).sum::<usize>()))
            },
            Operation::Search => {
                let needle = args.param_str("name").unwrap_or_default();
                let hits: Vec<Value> = self
                    .matching(state)
                    .flat_map(|d| d.entities.iter())
                    .filter(|(id, _)| id.contains(needle))
                    .map(|(_, record)| record.clone())
                    .collect();
                Ok(Value::Array(hits))
            },
            _ => Ok(self
                .matching(state)
                .find_map(|d| d.fixtures.get(&operation).cloned())
                .unwrap_or(Value::Null)),
        }
    }
}

#[async_trait]
impl QueryBackend for MemoryQuery {
    fn origin(&self) -> &str {
        &self.origin
    }

    async fn perform(&self, operation: Operation, args: QueryArgs) -> Result<Value, QueryError> {
        let mut state = self.state.write();
        state.calls.push(RecordedCall { origin: self.origin.clone(), operation });
        self.answer(&state, operation, &args)
    }

    async fn setup_background(&self, query: Arc<dyn QueryBackend>) -> Result<(), QueryError> {
        if query.origin() != self.origin {
            return Err(QueryError::background_setup(format!(
                "background query for {} handed to {}",
                query.origin(),
                self.origin
            )));
        }
        self.state.write().background.insert(self.origin.clone(), query);
        Ok(())
    }
}
