//! The process-wide Internal Service Registry.
//!
//! Populated once during bootstrap via [`InternalServiceRegistry::register`],
//! then read-only for the remainder of the process's life: a readers-many /
//! writers-none discipline that needs no lock in the hot dispatch path once
//! serving traffic has started (the registry is still guarded for the
//! duration of bootstrap itself, when handlers are added one at a time).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::DispatchError;
use crate::model::Line;
use crate::story::StoryHandle;

/// An internal service's handler: given the resolved arguments for a line,
/// produce a result. Registered once per `(service, command)` pair.
#[async_trait]
pub trait InternalHandler: Send + Sync {
    /// Invoke the handler with the line's resolved arguments.
    async fn call(
        &self,
        story: &StoryHandle,
        line: &Line,
        resolved_args: HashMap<String, Value>,
    ) -> Result<Value, DispatchError>;
}

/// A registered internal command: its declared argument names, an output
/// type tag, and the handler that implements it.
#[derive(Clone)]
pub struct InternalCommand {
    /// Names of the arguments this command declares; each is resolved via
    /// the Argument Resolver before the handler is invoked.
    pub arguments: Vec<String>,
    /// Free-form output type tag (e.g. `"any"`, `"string"`), used only for
    /// documentation/startup logging - the core does not validate against it.
    pub output_type: String,
    /// The handler implementation.
    pub handler: Arc<dyn InternalHandler>,
}

/// Process-wide mapping from `(service, command)` to its [`InternalCommand`].
#[derive(Default)]
pub struct InternalServiceRegistry {
    services: RwLock<HashMap<String, HashMap<String, InternalCommand>>>,
}

impl InternalServiceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(service, command)`. If one is already
    /// registered, the new registration overwrites it deterministically -
    /// the last call for a given pair wins.
    pub fn register(
        &self,
        service: impl Into<String>,
        command: impl Into<String>,
        arguments: Vec<String>,
        output_type: impl Into<String>,
        handler: Arc<dyn InternalHandler>,
    ) {
        let mut services = self.services.write();
        let commands = match services.entry(service.into()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(HashMap::new()),
        };
        commands.insert(
            command.into(),
            InternalCommand {
                arguments,
                output_type: output_type.into(),
                handler,
            },
        );
    }

    /// True iff both `service` and `command` are registered.
    pub fn is_internal(&self, service: &str, command: &str) -> bool {
        self.services
            .read()
            .get(service)
            .map(|commands| commands.contains_key(command))
            .unwrap_or(false)
    }

    /// Fetch the registered command, if any.
    pub fn get(&self, service: &str, command: &str) -> Option<InternalCommand> {
        self.services.read().get(service)?.get(command).cloned()
    }

    /// `(service, [commands])` pairs, for startup logging.
    pub fn list(&self) -> Vec<(String, Vec<String>)> {
        self.services
            .read()
            .iter()
            .map(|(service, commands)| (service.clone(), commands.keys().cloned().collect()))
            .collect()
    }
}
