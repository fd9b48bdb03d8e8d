//! End-to-end dispatch scenarios: a line goes in, a chain gets resolved,
//! and the right transport carries it out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use story_engine_core::prelude::*;

struct FixtureStory {
    lines: HashMap<String, Line>,
    app: Application,
    context: StoryContext,
}

impl Story for FixtureStory {
    fn name(&self) -> &str {
        "fixture.story"
    }

    fn line(&self, id: &LineId) -> Option<Line> {
        self.lines.get(&id.0).cloned()
    }

    fn argument_by_name(&self, line: &Line, name: &str) -> Result<Value, DispatchError> {
        Ok(line.arg(name).map(|a| a.value.clone()).unwrap_or(Value::Null))
    }

    fn app(&self) -> &Application {
        &self.app
    }

    fn context(&self) -> &StoryContext {
        &self.context
    }
}

fn line(ln: &str, service: &str, command: &str, method: Method, parent: Option<&str>, output: Option<Vec<&str>>, args: Vec<(&str, Value)>) -> Line {
    Line {
        ln: LineId::from(ln),
        service: service.to_string(),
        command: command.to_string(),
        method,
        parent: parent.map(LineId::from),
        output: output.map(|o| o.into_iter().map(str::to_string).collect()),
        enter: None,
        exit: None,
        args: args
            .into_iter()
            .map(|(name, value)| ArgumentDescriptor { name: name.to_string(), value })
            .collect(),
        raw: serde_json::Map::new(),
    }
}

async fn spawn_test_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn internal_dispatch_resolves_the_registered_handler() {
    struct Echo;
    #[async_trait]
    impl InternalHandler for Echo {
        async fn call(&self, _story: &StoryHandle, _line: &Line, resolved_args: HashMap<String, Value>) -> Result<Value, DispatchError> {
            Ok(resolved_args.get("msg").cloned().unwrap_or(Value::Null))
        }
    }

    let registry = Arc::new(InternalServiceRegistry::new());
    registry.register("log", "info", vec!["msg".to_string()], "any", Arc::new(Echo));

    let mut lines = HashMap::new();
    lines.insert("1".to_string(), line("1", "log", "info", Method::Execute, None, None, vec![("msg", json!("hello"))]));

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(HashMap::new(), EngineConfig::default(), "app-1", "app-1.example.com"),
        context: StoryContext::new(),
    });

    let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    let result = dispatcher.execute(&story, &story.line(&LineId::from("1")).unwrap()).await.unwrap();
    assert_eq!(result, json!("hello"));
}

#[tokio::test]
async fn chain_resolution_reaches_across_a_bound_event() {
    let mut lines = HashMap::new();
    lines.insert(
        "1".to_string(),
        line("1", "alpine", "echo", Method::When, None, Some(vec!["waiter"]), vec![]),
    );
    lines.insert(
        "2".to_string(),
        line("2", "waiter", "done", Method::Execute, Some("1"), None, vec![]),
    );

    let mut services = HashMap::new();
    services.insert("alpine".to_string(), ServiceRecord { configuration: json!({}) });

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
        context: StoryContext::new(),
    });

    let registry = InternalServiceRegistry::new();
    let chain = resolve_chain(&story, &story.line(&LineId::from("2")).unwrap(), &registry).unwrap();

    assert_eq!(chain.service(), "alpine");
    assert_eq!(chain.last_command(), "done");
    assert_eq!(chain.len(), 3);
}

#[tokio::test]
async fn http_dispatch_places_arguments_by_declared_location() {
    let received_path = Arc::new(Mutex::new(String::new()));
    let received_path_clone = received_path.clone();

    #[derive(Clone)]
    struct CapturedPath(Arc<Mutex<String>>);

    async fn handler(State(captured): State<CapturedPath>, axum::extract::RawQuery(raw): axum::extract::RawQuery, path: axum::extract::Path<String>) -> Json<Value> {
        let mut full = format!("/echo/{}", path.0);
        if let Some(raw) = raw {
            full.push('?');
            full.push_str(&raw);
        }
        *captured.0.lock().unwrap() = full;
        Json(json!({"ok": true}))
    }

    let router = Router::new().route("/echo/{id}", axum::routing::get(handler)).with_state(CapturedPath(received_path_clone));
    let addr = spawn_test_server(router).await;

    let mut lines = HashMap::new();
    lines.insert(
        "1".to_string(),
        line(
            "1",
            "alpine",
            "echo",
            Method::Execute,
            None,
            None,
            vec![("id", json!("42")), ("verbose", json!("true"))],
        ),
    );

    let mut services = HashMap::new();
    services.insert(
        "alpine".to_string(),
        ServiceRecord {
            configuration: json!({
                "echo": {
                    "http": {"method": "get", "path": "/echo/{id}", "port": addr.port()},
                    "arguments": {
                        "id": {"in": "path"},
                        "verbose": {"in": "query"}
                    }
                }
            }),
        },
    );

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
        context: StoryContext::new(),
    });

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers = Arc::new(DnsContainerManager::new(HashMap::from([("alpine".to_string(), "127.0.0.1".to_string())])));
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    let result = dispatcher.execute(&story, &story.line(&LineId::from("1")).unwrap()).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    assert_eq!(*received_path.lock().unwrap(), "/echo/42?verbose=true");
}

#[tokio::test]
async fn http_dispatch_rejects_a_request_body_on_a_non_post_method() {
    let mut lines = HashMap::new();
    lines.insert("1".to_string(), line("1", "alpine", "echo", Method::Execute, None, None, vec![("msg", json!("hi"))]));

    let mut services = HashMap::new();
    services.insert(
        "alpine".to_string(),
        ServiceRecord {
            configuration: json!({
                "echo": {
                    "http": {"method": "get", "path": "/echo", "port": 9999},
                    "arguments": {"msg": {"in": "requestBody"}}
                }
            }),
        },
    );

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
        context: StoryContext::new(),
    });

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers = Arc::new(DnsContainerManager::new(HashMap::from([("alpine".to_string(), "127.0.0.1".to_string())])));
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    let err = dispatcher.execute(&story, &story.line(&LineId::from("1")).unwrap()).await.unwrap_err();
    assert!(matches!(err, DispatchError::ConfigError { .. }));
}

struct RecordingRequest {
    writes: Mutex<Vec<Vec<u8>>>,
    finished: std::sync::atomic::AtomicBool,
}

impl ServerRequest for RecordingRequest {
    fn write(&self, chunk: &[u8]) {
        self.writes.lock().unwrap().push(chunk.to_vec());
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn inline_write_finishes_only_on_the_http_services_finish_command() {
    let mut services = HashMap::new();
    services.insert(
        "http".to_string(),
        ServiceRecord {
            configuration: json!({
                "write": {"http": {"use_event_conn": true}, "arguments": {"data": {}}},
                "finish": {"http": {"use_event_conn": true}, "arguments": {}}
            }),
        },
    );

    let req = Arc::new(RecordingRequest {
        writes: Mutex::new(Vec::new()),
        finished: std::sync::atomic::AtomicBool::new(false),
    });
    let io_loop = Arc::new(TokioIoLoop);

    let context = StoryContext::new();
    context.set(story_engine_core::context::keys::SERVER_REQUEST.to_string(), ContextValue::ServerRequest(req.clone()));
    context.set(story_engine_core::context::keys::SERVER_IO_LOOP.to_string(), ContextValue::IoLoop(io_loop));

    let mut lines = HashMap::new();
    lines.insert("1".to_string(), line("1", "http", "write", Method::Execute, None, None, vec![("data", json!("chunk-one"))]));
    lines.insert("2".to_string(), line("2", "http", "finish", Method::Execute, None, None, vec![]));

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
        context,
    });

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    dispatcher.execute(&story, &story.line(&LineId::from("1")).unwrap()).await.unwrap();
    assert!(!req.finished.load(Ordering::SeqCst), "a plain write must not finish the response");

    dispatcher.execute(&story, &story.line(&LineId::from("2")).unwrap()).await.unwrap();
    assert!(!req.finished.load(Ordering::SeqCst), "finish is scheduled, never observed synchronously");

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert!(req.finished.load(Ordering::SeqCst));

    let writes = req.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    let first: Value = serde_json::from_slice(writes[0].strip_suffix(b"\n").unwrap()).unwrap();
    assert_eq!(first["command"], "write");
    assert_eq!(first["data"]["data"], "chunk-one");
}

#[tokio::test]
async fn subscription_round_trip_records_the_subscription_once_accepted() {
    static SUB_COUNT: AtomicU16 = AtomicU16::new(0);

    async fn subscribe_handler(Json(_body): Json<Value>) -> StatusCode {
        SUB_COUNT.fetch_add(1, Ordering::SeqCst);
        StatusCode::OK
    }

    let router = Router::new().route("/subscribe", post(subscribe_handler));
    let addr = spawn_test_server(router).await;

    let mut services = HashMap::new();
    services.insert(
        "slack".to_string(),
        ServiceRecord {
            configuration: json!({
                "bot": {
                    "events": {
                        "hears": {
                            "http": {"port": 9090, "subscribe": {"path": "/events/hears", "method": "post"}},
                            "arguments": {}
                        }
                    }
                }
            }),
        },
    );

    let mut config = EngineConfig::default();
    config.synapse_host = "127.0.0.1".to_string();
    config.synapse_port = addr.port();

    let app = Application::new(services, config, "app-1", "app-1.example.com");
    let story: StoryHandle = Arc::new(FixtureStory {
        lines: HashMap::from([(
            "1".to_string(),
            line("1", "bot", "hears", Method::When, None, None, vec![]),
        )]),
        app,
        context: StoryContext::new(),
    });

    let streaming = StreamingServiceHandle {
        name: "slack".to_string(),
        command: "bot".to_string(),
        container_name: "asyncy--slack-1".to_string(),
        hostname: "127.0.0.1".to_string(),
    };

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    dispatcher.subscribe(&story, &streaming, &story.line(&LineId::from("1")).unwrap()).await.unwrap();

    assert_eq!(SUB_COUNT.load(Ordering::SeqCst), 1);
    let subscriptions = story.app().subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].pod_name, "asyncy--slack-1");
}

#[tokio::test]
async fn subscription_rejected_by_the_broker_raises_a_transport_error() {
    async fn subscribe_handler(Json(_body): Json<Value>) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    let router = Router::new().route("/subscribe", post(subscribe_handler));
    let addr = spawn_test_server(router).await;

    let mut services = HashMap::new();
    services.insert(
        "slack".to_string(),
        ServiceRecord {
            configuration: json!({
                "bot": {
                    "events": {
                        "hears": {
                            "http": {"port": 9090, "subscribe": {"path": "/events/hears", "method": "post"}},
                            "arguments": {}
                        }
                    }
                }
            }),
        },
    );

    let mut config = EngineConfig::default();
    config.synapse_host = "127.0.0.1".to_string();
    config.synapse_port = addr.port();

    let app = Application::new(services, config, "app-1", "app-1.example.com");
    let story: StoryHandle = Arc::new(FixtureStory {
        lines: HashMap::from([(
            "1".to_string(),
            line("1", "bot", "hears", Method::When, None, None, vec![]),
        )]),
        app,
        context: StoryContext::new(),
    });

    let streaming = StreamingServiceHandle {
        name: "slack".to_string(),
        command: "bot".to_string(),
        container_name: "asyncy--slack-1".to_string(),
        hostname: "127.0.0.1".to_string(),
    };

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers: Arc<dyn ContainerManager> = Arc::new(MockContainerManager::new());
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    let err = dispatcher
        .subscribe(&story, &streaming, &story.line(&LineId::from("1")).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::TransportError { .. }));
    assert!(story.app().subscriptions().is_empty());
}

/// A [`ContainerManager`] that records, in order, every call it receives, so
/// tests can observe that `execute_external` ensures a container before it
/// ever picks a transport.
struct SpyContainerManager {
    hostname: String,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ContainerManager for SpyContainerManager {
    async fn start(&self, story: &StoryHandle, line: &Line) -> Result<StreamingServiceHandle, DispatchError> {
        self.calls.lock().unwrap().push("start");
        Ok(StreamingServiceHandle {
            name: line.service.clone(),
            command: line.command.clone(),
            container_name: format!("{}--{}-1", story.app().app_id, line.service),
            hostname: self.hostname.clone(),
        })
    }

    async fn exec(&self, _story: &StoryHandle, _line: &Line, _service: &str, _command: &str) -> Result<Vec<u8>, DispatchError> {
        self.calls.lock().unwrap().push("exec");
        Ok(Vec::new())
    }

    async fn get_hostname(&self, _story: &StoryHandle, _line: &Line, _service: &str) -> Result<String, DispatchError> {
        self.calls.lock().unwrap().push("get_hostname");
        Ok(self.hostname.clone())
    }
}

#[tokio::test]
async fn execute_external_ensures_a_container_before_the_http_transport_is_reached() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_for_handler = calls.clone();

    async fn handler(State(calls): State<Arc<Mutex<Vec<&'static str>>>>) -> Json<Value> {
        calls.lock().unwrap().push("http_request");
        Json(json!({"ok": true}))
    }

    let router = Router::new().route("/echo", axum::routing::get(handler)).with_state(calls_for_handler);
    let addr = spawn_test_server(router).await;

    let mut lines = HashMap::new();
    lines.insert("1".to_string(), line("1", "alpine", "echo", Method::Execute, None, None, vec![]));

    let mut services = HashMap::new();
    services.insert(
        "alpine".to_string(),
        ServiceRecord {
            configuration: json!({
                "echo": {
                    "http": {"method": "get", "path": "/echo", "port": addr.port()},
                    "arguments": {}
                }
            }),
        },
    );

    let story: StoryHandle = Arc::new(FixtureStory {
        lines,
        app: Application::new(services, EngineConfig::default(), "app-1", "app-1.example.com"),
        context: StoryContext::new(),
    });

    let registry = Arc::new(InternalServiceRegistry::new());
    let containers: Arc<dyn ContainerManager> = Arc::new(SpyContainerManager {
        hostname: "127.0.0.1".to_string(),
        calls: calls.clone(),
    });
    let dispatcher = Dispatcher::new(registry, containers).unwrap();

    dispatcher.execute(&story, &story.line(&LineId::from("1")).unwrap()).await.unwrap();

    let recorded = calls.lock().unwrap().clone();
    assert_eq!(recorded, vec!["start", "get_hostname", "http_request"], "start_container must run before the HTTP transport is invoked");
}
