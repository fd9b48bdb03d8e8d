//! # story-engine-core
//!
//! Service-dispatch core for the story execution engine.
//!
//! Given a resolved line in a running story, this crate decides *how* to
//! carry it out - an internal handler, a container `exec`, a one-shot HTTP
//! request, or a write onto the story's own inbound connection - and
//! carries it out. Story tree construction, container orchestration, and
//! the subscription broker itself are out of scope; this crate only owns
//! the seam between "a line is ready to run" and "the line ran".
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use story_engine_core::prelude::*;
//!
//! # async fn run(story: StoryHandle, line: &Line) -> Result<(), DispatchError> {
//! let registry = Arc::new(InternalServiceRegistry::new());
//! let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
//! let dispatcher = Dispatcher::new(registry, containers)?;
//!
//! let result = dispatcher.execute(&story, line).await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// The Chain Resolver.
pub mod chain;
/// Engine-wide configuration.
pub mod config;
/// Command Config Lookup.
pub mod config_lookup;
/// Container Manager boundary and bootstrap facade.
pub mod container;
/// The story's mutable per-execution context.
pub mod context;
/// Typed dispatch errors.
pub mod error;
/// Transport Selector & Executor.
pub mod executor;
/// The Retrying HTTP Client.
pub mod http_client;
/// The story/line/chain data model.
pub mod model;
/// The process-wide Internal Service Registry.
pub mod registry;
/// Retry with exponential backoff.
pub mod resilience;
/// The `Story`/`Application` collaborator surface.
pub mod story;
/// The Subscription Manager.
pub mod subscription;

/// Commonly used items, re-exported for downstream crates.
pub mod prelude {
    pub use crate::chain::resolve_chain;
    pub use crate::config::EngineConfig;
    pub use crate::config_lookup::get_command_conf;
    pub use crate::container::{start_container, ContainerManager, DnsContainerManager, MockContainerManager};
    pub use crate::context::{ContextValue, IoLoop, ServerRequest, StoryContext, TokioIoLoop};
    pub use crate::error::{DispatchContext, DispatchError};
    pub use crate::executor::Dispatcher;
    pub use crate::http_client::{HttpResponse, RetryingHttpClient};
    pub use crate::model::{ArgumentDescriptor, ArgumentLocation, Chain, ChainElem, Line, LineId, Method, StreamingServiceHandle};
    pub use crate::registry::{InternalCommand, InternalHandler, InternalServiceRegistry};
    pub use crate::story::{Application, ServiceRecord, Story, StoryHandle, SubscriptionRecord};
    pub use crate::subscription::when;
}
