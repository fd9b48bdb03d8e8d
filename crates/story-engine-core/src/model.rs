//! The story/line/chain data model.
//!
//! `Line` is modeled as a typed struct rather than a bare map: the recognized
//! keys (`service`, `command`, `method`, `parent`, `output`, `enter`, `exit`,
//! `ln`, `args`) are first-class fields. A `raw`
//! escape hatch keeps room for story-tree-construction keys this core never
//! interprets, without widening the typed surface every dispatch call sees.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies a line within a story's tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub String);

impl From<&str> for LineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for LineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two ways a line can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// A direct call: `service command`.
    Execute,
    /// A subscription binding: `when service.command as ...`.
    When,
}

/// Where a declared argument is placed on an outbound HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentLocation {
    /// JSON-encoded request body (the default).
    RequestBody,
    /// URL query string.
    Query,
    /// `{name}` path template substitution.
    Path,
}

impl ArgumentLocation {
    /// Parse the `in` field of an argument descriptor. Returns `None` for
    /// any value other than the three recognized locations, matching the
    /// spec's "unknown `in` is fatal" rule at the call site.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "requestBody" => Some(Self::RequestBody),
            "query" => Some(Self::Query),
            "path" => Some(Self::Path),
            _ => None,
        }
    }
}

/// A single declared argument on a line, as written in the story source.
#[derive(Debug, Clone)]
pub struct ArgumentDescriptor {
    /// The argument's name.
    pub name: String,
    /// The resolved/literal value carried in the story tree. Resolution
    /// through `story.argument_by_name` may consult this, story context, or
    /// upstream results - the core treats it as opaque.
    pub value: Value,
}

/// One execution unit in a story tree.
#[derive(Debug, Clone)]
pub struct Line {
    /// This line's id.
    pub ln: LineId,
    /// Service name, or the name of a handle bound by an ancestor's `output`.
    pub service: String,
    /// Command name on that service.
    pub command: String,
    /// Whether this is a direct call or an event subscription.
    pub method: Method,
    /// The owning line, if any (the root has none).
    pub parent: Option<LineId>,
    /// Names this line's output binds, if it produces one.
    pub output: Option<Vec<String>>,
    /// First line of this line's body, if it has one.
    pub enter: Option<LineId>,
    /// Line to continue at after this line's body, if any.
    pub exit: Option<LineId>,
    /// Declared arguments, in source order.
    pub args: Vec<ArgumentDescriptor>,
    /// Unrecognized keys, preserved for round-tripping.
    pub raw: serde_json::Map<String, Value>,
}

impl Line {
    /// Look up a declared argument by name.
    pub fn arg(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// One element of a resolved [`Chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainElem {
    /// A concrete service, or an internal service name. Always at index 0.
    Service(String),
    /// A command name.
    Command(String),
    /// An event name, bound by an ancestor line with `method = when`.
    Event(String),
}

impl ChainElem {
    /// The name carried by this element, regardless of variant.
    pub fn name(&self) -> &str {
        match self {
            ChainElem::Service(n) | ChainElem::Command(n) | ChainElem::Event(n) => n,
        }
    }

    /// True if this is a [`ChainElem::Service`].
    pub fn is_service(&self) -> bool {
        matches!(self, ChainElem::Service(_))
    }
}

/// The resolved path `Service -> (Command|Event)* -> Command` used to locate
/// configuration and select a transport.
///
/// Invariants (upheld by [`crate::chain::resolve_chain`], never by callers):
/// length >= 2; exactly one [`ChainElem::Service`], at index 0; the last
/// element is always a [`ChainElem::Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain(VecDeque<ChainElem>);

impl Chain {
    pub(crate) fn from_deque(elems: VecDeque<ChainElem>) -> Self {
        debug_assert!(elems.len() >= 2, "a resolved chain has at least 2 elements");
        debug_assert!(
            matches!(elems.front(), Some(ChainElem::Service(_))),
            "a resolved chain starts with a Service"
        );
        debug_assert!(
            matches!(elems.back(), Some(ChainElem::Command(_))),
            "a resolved chain ends with a Command"
        );
        Self(elems)
    }

    /// The service at the head of the chain.
    pub fn service(&self) -> &str {
        match self.0.front() {
            Some(ChainElem::Service(name)) => name,
            _ => unreachable!("Chain invariant: first element is always Service"),
        }
    }

    /// The command at the tail of the chain.
    pub fn last_command(&self) -> &str {
        match self.0.back() {
            Some(ChainElem::Command(name)) => name,
            _ => unreachable!("Chain invariant: last element is always Command"),
        }
    }

    /// The final element, always a [`ChainElem::Command`].
    pub fn last(&self) -> &ChainElem {
        self.0.back().expect("chain is never empty")
    }

    /// The first element, always a [`ChainElem::Service`].
    pub fn first(&self) -> &ChainElem {
        self.0.front().expect("chain is never empty")
    }

    /// Iterate the chain front-to-back.
    pub fn iter(&self) -> impl Iterator<Item = &ChainElem> {
        self.0.iter()
    }

    /// Number of elements in the chain.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A chain is never empty; provided for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| match e {
                ChainElem::Service(n) => format!("Service({n})"),
                ChainElem::Command(n) => format!("Command({n})"),
                ChainElem::Event(n) => format!("Event({n})"),
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// A live binding from a service name to a running container, or the
/// in-process gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingServiceHandle {
    /// The service name this handle was started for.
    pub name: String,
    /// The command whose body started this streaming service.
    pub command: String,
    /// The container's name, or `"gateway"` for the synthetic HTTP handle.
    pub container_name: String,
    /// Hostname the service is reachable at.
    pub hostname: String,
}
