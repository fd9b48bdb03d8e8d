//! The Container Manager boundary and the bootstrap facade in front of it.
//!
//! Container orchestration itself - scheduling, image pulls, networking - is
//! out of scope for this crate; [`ContainerManager`] is the seam the
//! executor calls through, and [`start_container`] is the thin piece of
//! logic that belongs here: recognizing the synthetic `http` service and
//! routing everything else to the real container manager.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::chain::resolve_chain;
use crate::error::{DispatchContext, DispatchError};
use crate::model::{Line, StreamingServiceHandle};
use crate::registry::InternalServiceRegistry;
use crate::story::StoryHandle;

/// Starts and addresses service containers for a story.
///
/// Out of scope here: scheduling, image management, networking. An
/// implementation only needs to answer "is this running, and if not, start
/// it" and "what hostname can I reach it at".
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Ensure a container for `line`'s service is running, returning a
    /// handle to it.
    async fn start(&self, story: &StoryHandle, line: &Line) -> Result<StreamingServiceHandle, DispatchError>;

    /// Execute a command inside an already-running container (the
    /// `format`-style dispatch path), returning its raw output.
    async fn exec(&self, story: &StoryHandle, line: &Line, service: &str, command: &str) -> Result<Vec<u8>, DispatchError>;

    /// Resolve the hostname a running service is reachable at.
    async fn get_hostname(&self, story: &StoryHandle, line: &Line, service: &str) -> Result<String, DispatchError>;
}

/// Ensure a container is running for the service that owns `line`, handling
/// the synthetic `http` service specially: rather than starting a
/// container, it resolves to the in-process HTTP gateway.
pub async fn start_container(
    story: &StoryHandle,
    line: &Line,
    registry: &InternalServiceRegistry,
    containers: &dyn ContainerManager,
) -> Result<StreamingServiceHandle, DispatchError> {
    let chain = resolve_chain(story, line, registry)?;

    if chain.service() == "http" {
        return Ok(StreamingServiceHandle {
            name: "http".to_string(),
            command: line.command.clone(),
            container_name: "gateway".to_string(),
            hostname: story.app().config.http_gateway_host.clone(),
        });
    }

    containers.start(story, line).await
}

/// A [`ContainerManager`] backed by in-memory, pre-seeded records. Useful
/// for embedding this crate in a process that resolves containers by a DNS
/// naming scheme rather than talking to an orchestration API directly.
pub struct DnsContainerManager {
    hostnames: HashMap<String, String>,
}

impl DnsContainerManager {
    /// Build a manager that resolves `service` to `hostnames[service]`,
    /// treating any other service as not yet started.
    pub fn new(hostnames: HashMap<String, String>) -> Self {
        Self { hostnames }
    }
}

#[async_trait]
impl ContainerManager for DnsContainerManager {
    async fn start(&self, story: &StoryHandle, line: &Line) -> Result<StreamingServiceHandle, DispatchError> {
        let hostname = self.hostnames.get(&line.service).cloned().ok_or_else(|| DispatchError::DownstreamError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            source: format!("no DNS entry for service \"{}\"", line.service).into(),
        })?;

        Ok(StreamingServiceHandle {
            name: line.service.clone(),
            command: line.command.clone(),
            container_name: format!("{}--{}-1", story.app().app_id, line.service),
            hostname,
        })
    }

    async fn exec(&self, story: &StoryHandle, line: &Line, service: &str, _command: &str) -> Result<Vec<u8>, DispatchError> {
        Err(DispatchError::DownstreamError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            source: format!("DnsContainerManager cannot exec into \"{service}\" - no exec transport configured").into(),
        })
    }

    async fn get_hostname(&self, story: &StoryHandle, line: &Line, service: &str) -> Result<String, DispatchError> {
        self.hostnames.get(service).cloned().ok_or_else(|| DispatchError::DownstreamError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            source: format!("no DNS entry for service \"{service}\"").into(),
        })
    }
}

/// A [`ContainerManager`] that always answers from a fixed, in-memory table.
/// Used in tests, and as a reference implementation for embedding this
/// crate without a real container orchestrator wired up yet.
#[derive(Default)]
pub struct MockContainerManager {
    hostnames: parking_lot::RwLock<HashMap<String, String>>,
}

impl MockContainerManager {
    /// An empty mock with no services pre-seeded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a service's hostname, as if it had already been started.
    pub fn seed(&self, service: impl Into<String>, hostname: impl Into<String>) {
        self.hostnames.write().insert(service.into(), hostname.into());
    }
}

#[async_trait]
impl ContainerManager for MockContainerManager {
    async fn start(&self, story: &StoryHandle, line: &Line) -> Result<StreamingServiceHandle, DispatchError> {
        let hostname = self
            .hostnames
            .read()
            .get(&line.service)
            .cloned()
            .unwrap_or_else(|| format!("{}.local", line.service));

        self.hostnames.write().insert(line.service.clone(), hostname.clone());

        Ok(StreamingServiceHandle {
            name: line.service.clone(),
            command: line.command.clone(),
            container_name: format!("{}--{}-1", story.app().app_id, line.service),
            hostname,
        })
    }

    async fn exec(&self, _story: &StoryHandle, _line: &Line, _service: &str, _command: &str) -> Result<Vec<u8>, DispatchError> {
        Ok(Vec::new())
    }

    async fn get_hostname(&self, _story: &StoryHandle, _line: &Line, service: &str) -> Result<String, DispatchError> {
        Ok(self
            .hostnames
            .read()
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("{service}.local")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::context::StoryContext;
    use crate::model::{ArgumentDescriptor, LineId, Method};
    use crate::story::{Application, ServiceRecord, Story};

    struct FixtureStory {
        app: Application,
        context: StoryContext,
    }

    impl Story for FixtureStory {
        fn name(&self) -> &str {
            "fixture.story"
        }
        fn line(&self, _id: &LineId) -> Option<Line> {
            None
        }
        fn argument_by_name(&self, _line: &Line, _name: &str) -> Result<serde_json::Value, DispatchError> {
            Ok(serde_json::Value::Null)
        }
        fn app(&self) -> &Application {
            &self.app
        }
        fn context(&self) -> &StoryContext {
            &self.context
        }
    }

    fn http_line() -> Line {
        Line {
            ln: LineId::from("1"),
            service: "http".to_string(),
            command: "finish".to_string(),
            method: Method::Execute,
            parent: None,
            output: None,
            enter: None,
            exit: None,
            args: Vec::<ArgumentDescriptor>::new(),
            raw: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn http_service_resolves_to_the_gateway_without_starting_a_container() {
        let mut services = Map::new();
        services.insert("http".to_string(), ServiceRecord { configuration: json!({}) });

        let story: StoryHandle = Arc::new(FixtureStory {
            app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
            context: StoryContext::new(),
        });

        let registry = InternalServiceRegistry::new();
        let containers = MockContainerManager::new();

        let handle = start_container(&story, &http_line(), &registry, &containers).await.unwrap();
        assert_eq!(handle.container_name, "gateway");
        assert_eq!(handle.hostname, "gateway");
        assert!(containers.hostnames.read().is_empty());
    }
}
