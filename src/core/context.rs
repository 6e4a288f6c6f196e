//! Resources injected into steps - connection handles and shared variables

use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a source or target system
///
/// The engine only clones and forwards handles. Capabilities downcast them
/// to whatever concrete connection type they were registered with.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<dyn Any + Send + Sync>,
}

impl ConnectionHandle {
    pub fn new<T: Any + Send + Sync>(connection: T) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }

    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { inner }
    }

    /// Borrow the underlying connection if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionHandle(..)")
    }
}

/// Connection described by a connection string, as configured in settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString(pub String);

/// Execution resources for a pipeline run
///
/// Contains named connections (typically `source` and `target`) and
/// variables merged underneath every step's own config.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    /// Named connection handles
    pub connections: HashMap<String, ConnectionHandle>,

    /// Injected variables (step config takes precedence)
    pub variables: BTreeMap<String, Value>,
}

impl Resources {
    /// Create a new empty set of resources
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection handle
    pub fn with_connection(mut self, name: impl Into<String>, handle: ConnectionHandle) -> Self {
        self.connections.insert(name.into(), handle);
        self
    }

    /// Set a variable
    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Get a connection
    pub fn connection(&self, name: &str) -> Option<&ConnectionHandle> {
        self.connections.get(name)
    }

    /// Build resources from configured connection strings
    pub fn from_connection_strings<'a, I>(connections: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let connections = connections
            .into_iter()
            .map(|(name, dsn)| {
                (
                    name.clone(),
                    ConnectionHandle::new(ConnectionString(dsn.clone())),
                )
            })
            .collect();
        Self {
            connections,
            variables: BTreeMap::new(),
        }
    }

    /// Overlay pipeline-level variables on top of the injected ones
    pub fn overlay_variables(&self, variables: &BTreeMap<String, Value>) -> Self {
        let mut merged = self.clone();
        merged
            .variables
            .extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}
