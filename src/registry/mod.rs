//! Step registry - maps step types to executable capabilities

pub mod builtin;
pub mod external;
pub mod outcome;

use crate::core::context::ConnectionHandle;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub use builtin::{CompareCapability, ExpectCapability};
pub use external::ExternalCapability;
pub use outcome::{CapabilityError, CapabilityOutcome};

/// Executable behavior registered for a step type
///
/// New validator types implement this trait and register under a name;
/// the engine never needs to know their internals.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Declared parameters; the executor checks calls against this
    fn contract(&self) -> ParameterContract {
        ParameterContract::open()
    }

    /// Run the check
    async fn execute(&self, args: CallArgs) -> Result<CapabilityOutcome, CapabilityError>;
}

/// Arguments for one capability call
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Step being executed
    pub step_id: String,

    /// Injected variables merged with the step's config
    pub params: BTreeMap<String, Value>,

    /// Connection handles injected by the runner
    pub connections: HashMap<String, ConnectionHandle>,
}

impl CallArgs {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    pub fn f64_param(&self, name: &str) -> Option<f64> {
        self.params.get(name).and_then(Value::as_f64)
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionHandle> {
        self.connections.get(name)
    }
}

/// Kind of value a parameter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    String,
    Number,
    Bool,
    List,
    Object,
    /// Satisfied by an injected connection handle of the same name
    Connection,
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Bool => value.is_boolean(),
            ParamKind::List => value.is_array(),
            ParamKind::Object => value.is_object(),
            ParamKind::Connection => false,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Any => "any value",
            ParamKind::String => "a string",
            ParamKind::Number => "a number",
            ParamKind::Bool => "a boolean",
            ParamKind::List => "a list",
            ParamKind::Object => "an object",
            ParamKind::Connection => "a connection",
        };
        f.write_str(name)
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Typed parameter contract of a capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterContract {
    pub params: Vec<ParamSpec>,

    /// Accept config keys that are not declared
    pub allow_extra: bool,
}

impl ParameterContract {
    /// Contract that accepts anything
    pub fn open() -> Self {
        Self {
            params: Vec::new(),
            allow_extra: true,
        }
    }

    /// Contract that rejects undeclared config keys
    pub fn strict(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            allow_extra: false,
        }
    }

    pub fn with_params(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            allow_extra: true,
        }
    }

    /// Check a call against the contract
    ///
    /// `explicit` are the keys the step itself configured; injected
    /// variables never count as unexpected.
    pub fn check<'a, I>(&self, args: &CallArgs, explicit: I) -> Result<(), String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for spec in &self.params {
            if spec.kind == ParamKind::Connection {
                if spec.required && !args.connections.contains_key(&spec.name) {
                    return Err(format!("missing required connection '{}'", spec.name));
                }
                continue;
            }

            match args.params.get(&spec.name) {
                None if spec.required => {
                    return Err(format!("missing required parameter '{}'", spec.name));
                }
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(format!("parameter '{}' expected {}", spec.name, spec.kind));
                }
                _ => {}
            }
        }

        if !self.allow_extra {
            for key in explicit {
                if !self.params.iter().any(|p| &p.name == key) {
                    return Err(format!("unexpected parameter '{}'", key));
                }
            }
        }

        Ok(())
    }
}

/// Registry of capabilities, keyed by step type
///
/// Built once at startup and then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct StepRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl StepRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `expect` and `compare` capabilities
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("expect", ExpectCapability);
        registry.register("compare", CompareCapability);
        registry
    }

    /// Register a capability under a step type, replacing any previous one
    pub fn register<C: Capability + 'static>(&mut self, step_type: impl Into<String>, capability: C) {
        self.register_arc(step_type, Arc::new(capability));
    }

    pub fn register_arc(&mut self, step_type: impl Into<String>, capability: Arc<dyn Capability>) {
        self.capabilities.insert(step_type.into(), capability);
    }

    /// Look up the capability for a step type
    pub fn get(&self, step_type: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(step_type).cloned()
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.capabilities.contains_key(step_type)
    }

    /// Registered step types, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("step_types", &self.names())
            .finish()
    }
}
