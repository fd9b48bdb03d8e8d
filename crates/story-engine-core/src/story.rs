//! The `Story` and `Application` collaborator traits/types the dispatch core
//! consumes. Story tree construction, line-to-line control flow, and result
//! persistence are out of scope here; this module only defines the surface
//! the core needs to read.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::context::StoryContext;
use crate::error::DispatchError;
use crate::model::{Line, LineId, StreamingServiceHandle};

/// A service's configuration, as authored by the application owner. Kept as
/// a free-form [`Value`] tree: action/event schemas are application data the
/// core never needs to know the shape of beyond the handful of keys
/// (`format`, `http`, `arguments`, `events`) dispatch actually reads.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    /// `configuration.actions` subtree for this service.
    pub configuration: Value,
}

/// A registered event subscription, as POSTed to the subscription broker and
/// recorded on the owning application.
#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    /// Subscription id (128-bit random, textual form).
    pub sub_id: String,
    /// URL the subscribe request was sent to.
    pub sub_url: String,
    /// HTTP method used for the subscribe request.
    pub sub_method: String,
    /// The body sent to the broker (`endpoint`, `data`, `event`, `id`).
    pub sub_body: Value,
    /// Name of the pod/container the subscription targets.
    pub pod_name: String,
    /// Owning application id.
    pub app_id: String,
}

/// A running application: its service configuration, engine-wide config,
/// and identity. Application and user persistence are out of scope; this is
/// an in-memory view the core reads from and writes subscriptions to.
pub struct Application {
    /// Concrete services available to this application, by name.
    pub services: HashMap<String, ServiceRecord>,
    /// Engine host/port and gateway/synapse configuration.
    pub config: EngineConfig,
    /// This application's id.
    pub app_id: String,
    /// DNS name this application is reachable at (used as `data.host` when
    /// subscribing to the synthetic `http` streaming service).
    pub app_dns: String,
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
}

impl Application {
    /// Build an application with no subscriptions recorded yet.
    pub fn new(
        services: HashMap<String, ServiceRecord>,
        config: EngineConfig,
        app_id: impl Into<String>,
        app_dns: impl Into<String>,
    ) -> Self {
        Self {
            services,
            config,
            app_id: app_id.into(),
            app_dns: app_dns.into(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Record a subscription. Writers are serialized through a mutex;
    /// service configuration itself is treated as immutable for a story's
    /// lifetime and needs no such guard.
    pub fn add_subscription(
        &self,
        sub_id: String,
        streaming_service: &StreamingServiceHandle,
        event: &str,
        body: Value,
    ) {
        self.subscriptions.lock().push(SubscriptionRecord {
            sub_id,
            sub_url: body
                .get("sub_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            sub_method: body
                .get("sub_method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            sub_body: body.get("sub_body").cloned().unwrap_or(Value::Null),
            pod_name: streaming_service.container_name.clone(),
            app_id: self.app_id.clone(),
        });
        let _ = event;
    }

    /// All subscriptions recorded so far, for diagnostics/tests.
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.subscriptions.lock().clone()
    }
}

/// A story being executed: the tree it was built from, its mutable context,
/// and the application it belongs to.
///
/// Story tree construction and line-to-line control flow are out of scope;
/// implementors only need to answer "what line is this" and "what's the
/// current value of this argument".
pub trait Story: Send + Sync {
    /// This story's name (e.g. `my_story.story`).
    fn name(&self) -> &str;

    /// Look up a line by id.
    fn line(&self, id: &LineId) -> Option<Line>;

    /// Resolve an argument's runtime value from the story's context.
    ///
    /// Pure from the core's perspective: no caching, no side effects beyond
    /// whatever the story implementation does internally to produce a
    /// value (e.g. reading an upstream result).
    fn argument_by_name(&self, line: &Line, name: &str) -> Result<Value, DispatchError>;

    /// The application this story belongs to.
    fn app(&self) -> &Application;

    /// This story's mutable per-execution context.
    fn context(&self) -> &StoryContext;
}

/// Shared handle to a [`Story`], the shape the executor and subscription
/// manager operate on.
pub type StoryHandle = Arc<dyn Story>;
