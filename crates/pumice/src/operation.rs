use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A named unit of work a worker knows how to run.
///
/// Operations take and return plain JSON so that tasks can be described by
/// name and payload alone and rebuilt on the other side of a process boundary.
pub trait Operation: Send + Sync {
    /// Name tasks use to refer to this operation.
    fn name(&self) -> &str;

    /// Run the operation on one payload.
    fn execute(&self, payload: Value) -> Result<Value, OperationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Adapter turning a plain function or closure into an [`Operation`].
pub struct FnOperation<F> {
    name: String,
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn(Value) -> Result<Value, OperationError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Operation for FnOperation<F>
where
    F: Fn(Value) -> Result<Value, OperationError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, payload: Value) -> Result<Value, OperationError> {
        (self.f)(payload)
    }
}

impl<F> fmt::Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").field("name", &self.name).finish()
    }
}

/// Operations available to a worker, looked up by name.
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register an operation. Returns error if name already registered.
    pub fn register(&mut self, op: impl Operation + 'static) -> Result<(), RegistryError> {
        let name = op.name().to_string();
        if self.operations.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.operations.insert(name, Arc::new(op));
        Ok(())
    }

    /// Register a closure under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Value) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        self.register(FnOperation::new(name, f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("operation with name '{0}' is already registered")]
    DuplicateName(String),
}
