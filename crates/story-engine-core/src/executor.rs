//! The Transport Selector & Executor: the entry point every dispatched line
//! passes through, and the four ways it can end up being carried out -
//! an internal handler call, a `docker exec`-style command, a one-shot HTTP
//! request, or a write onto the story's own inbound HTTP connection.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method as HttpMethod;
use serde_json::Value;

use crate::chain::resolve_chain;
use crate::config_lookup::get_command_conf;
use crate::container::{start_container, ContainerManager};
use crate::error::{DispatchContext, DispatchError};
use crate::http_client::RetryingHttpClient;
use crate::model::{ArgumentLocation, Chain, Line};
use crate::registry::InternalServiceRegistry;
use crate::story::StoryHandle;

/// Bundles the collaborators dispatch needs: the internal service registry,
/// the container manager, and the retrying HTTP client. Built once at
/// startup and shared across every story.
pub struct Dispatcher {
    registry: Arc<InternalServiceRegistry>,
    containers: Arc<dyn ContainerManager>,
    http_client: RetryingHttpClient,
}

impl Dispatcher {
    /// Build a dispatcher over the given registry and container manager.
    pub fn new(registry: Arc<InternalServiceRegistry>, containers: Arc<dyn ContainerManager>) -> Result<Self, DispatchError> {
        Ok(Self {
            registry,
            containers,
            http_client: RetryingHttpClient::new()?,
        })
    }

    /// Ensure the streaming service that owns `line` is running, for
    /// callers (e.g. a `when` binding) that need the handle before
    /// dispatching rather than as a side effect of [`Dispatcher::execute`].
    pub async fn start_service(&self, story: &StoryHandle, line: &Line) -> Result<crate::model::StreamingServiceHandle, DispatchError> {
        start_container(story, line, &self.registry, self.containers.as_ref()).await
    }

    /// Register an event subscription with the broker for a streaming
    /// service that was just started, recording it on the owning
    /// application once the broker accepts it.
    pub async fn subscribe(
        &self,
        story: &StoryHandle,
        streaming_service: &crate::model::StreamingServiceHandle,
        line: &Line,
    ) -> Result<(), DispatchError> {
        crate::subscription::when(&self.http_client, story, streaming_service, line).await
    }

    /// Dispatch `line`: resolve its chain, then route to the internal or
    /// external transport depending on whether the chain's service is a
    /// registered internal service.
    pub async fn execute(&self, story: &StoryHandle, line: &Line) -> Result<Value, DispatchError> {
        let chain = resolve_chain(story, line, &self.registry)?;

        if self.registry.is_internal(chain.service(), chain.last_command()) {
            self.execute_internal(story, line).await
        } else {
            self.execute_external(story, line, &chain).await
        }
    }

    /// Call a registered internal handler directly, bypassing chain
    /// resolution's configuration lookup - internal commands are looked up
    /// by the line's own service/command, not the chain's head.
    async fn execute_internal(&self, story: &StoryHandle, line: &Line) -> Result<Value, DispatchError> {
        let command = self.registry.get(&line.service, &line.command).ok_or_else(|| DispatchError::UnknownCommand {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            service: line.service.clone(),
            command: line.command.clone(),
        })?;

        let mut resolved_args = HashMap::new();
        for arg in &command.arguments {
            let value = story.argument_by_name(line, arg)?;
            resolved_args.insert(arg.clone(), value);
        }

        command.handler.call(story, line, resolved_args).await
    }

    /// Start the owning container (or resolve the synthetic `http` gateway),
    /// then route to `exec`, `execute_http`, or `execute_inline` depending
    /// on the command's configuration.
    async fn execute_external(&self, story: &StoryHandle, line: &Line, chain: &Chain) -> Result<Value, DispatchError> {
        let command_conf = get_command_conf(story, chain)?;
        start_container(story, line, &self.registry, self.containers.as_ref()).await?;

        if command_conf.get("format").is_some() {
            let output = self
                .containers
                .exec(story, line, &line.service, &line.command)
                .await?;
            return Ok(Value::String(String::from_utf8_lossy(&output).into_owned()));
        }

        let http_conf = command_conf.get("http").ok_or_else(|| DispatchError::ConfigError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            message: format!("service {}/{} has neither http nor format sections", line.service, line.command),
        })?;

        if http_conf.get("use_event_conn").and_then(Value::as_bool).unwrap_or(false) {
            self.execute_inline(story, line, chain, &command_conf).await
        } else {
            self.execute_http(story, line, chain, &command_conf, http_conf).await
        }
    }

    /// Write the command's resolved arguments directly onto the story's
    /// own inbound HTTP connection instead of making an outbound call.
    ///
    /// `finish` is scheduled through the story's I/O loop rather than
    /// called inline: the write above must be observed by the transport
    /// before the response is closed.
    async fn execute_inline(&self, story: &StoryHandle, line: &Line, chain: &Chain, command_conf: &Value) -> Result<Value, DispatchError> {
        let command_name = chain.last_command().to_string();
        let args = command_conf
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut data = serde_json::Map::new();
        for arg_name in args.keys() {
            data.insert(arg_name.clone(), story.argument_by_name(line, arg_name)?);
        }

        let body = serde_json::json!({ "command": command_name, "data": data });
        let mut encoded = serde_json::to_vec(&body).map_err(|e| DispatchError::ProgrammingError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            message: format!("failed to encode inline dispatch body: {e}"),
        })?;
        encoded.push(b'\n');

        let req = story.context().server_request().ok_or_else(|| DispatchError::ProgrammingError {
            context: DispatchContext::new(story.name(), line.ln.clone()),
            message: "execute_inline called without a server request in context".to_string(),
        })?;
        req.write(&encoded);

        if chain.service() == "http" && command_name == "finish" {
            let io_loop = story.context().io_loop().ok_or_else(|| DispatchError::ProgrammingError {
                context: DispatchContext::new(story.name(), line.ln.clone()),
                message: "execute_inline called without an io loop in context".to_string(),
            })?;
            io_loop.schedule(Box::new(move || req.finish()));
        }

        Ok(Value::Null)
    }

    /// Make a one-shot HTTP request to the line's owning container.
    async fn execute_http(
        &self,
        story: &StoryHandle,
        line: &Line,
        chain: &Chain,
        command_conf: &Value,
        http_conf: &Value,
    ) -> Result<Value, DispatchError> {
        let context = DispatchContext::new(story.name(), line.ln.clone());
        let hostname = self.containers.get_hostname(story, line, chain.service()).await?;

        let args = command_conf
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut body = serde_json::Map::new();
        let mut query_params: Vec<(String, String)> = Vec::new();
        let mut path_params = HashMap::new();

        for (arg_name, descriptor) in &args {
            let value = story.argument_by_name(line, arg_name)?;
            let location_raw = descriptor.get("in").and_then(Value::as_str).unwrap_or("requestBody");
            let location = ArgumentLocation::parse(location_raw).ok_or_else(|| DispatchError::ConfigError {
                context: context.clone(),
                message: format!("invalid location for argument \"{arg_name}\" specified: {location_raw}"),
            })?;

            match location {
                ArgumentLocation::Query => {
                    query_params.push((arg_name.clone(), value_to_query_string(&value)));
                }
                ArgumentLocation::Path => {
                    path_params.insert(arg_name.clone(), value_to_query_string(&value));
                }
                ArgumentLocation::RequestBody => {
                    body.insert(arg_name.clone(), value);
                }
            }
        }

        let method = http_conf.get("method").and_then(Value::as_str).unwrap_or("post").to_string();

        let mut headers = HashMap::new();
        let request_body = if method.eq_ignore_ascii_case("post") {
            headers.insert("Content-Type".to_string(), "application/json; charset=utf-8".to_string());
            Some(serde_json::to_vec(&Value::Object(body)).map_err(|e| DispatchError::ProgrammingError {
                context: context.clone(),
                message: format!("failed to encode request body: {e}"),
            })?)
        } else if !body.is_empty() {
            return Err(DispatchError::ConfigError {
                context: context.clone(),
                message: format!("parameters found in the request body, but the method is {method}"),
            });
        } else {
            None
        };

        let port = http_conf.get("port").and_then(Value::as_u64).unwrap_or(5000);
        let path_template = http_conf.get("path").and_then(Value::as_str).ok_or_else(|| DispatchError::ConfigError {
            context: context.clone(),
            message: "http configuration is missing a path".to_string(),
        })?;
        let path = apply_path_params(path_template, &path_params);
        let path = add_query_params(&path, &query_params);
        let url = format!("http://{hostname}:{port}{path}");

        tracing::debug!(%url, method = %method, "invoking service");

        let http_method = HttpMethod::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| DispatchError::ConfigError {
            context: context.clone(),
            message: format!("invalid HTTP method: {method}"),
        })?;

        let response = self
            .http_client
            .fetch_with_retry(&url, &context, http_method, &url, &headers, request_body)
            .await?;

        tracing::debug!(status = response.status, "http response received");

        if response.is_success() {
            if response.is_json() {
                serde_json::from_slice(&response.body).map_err(|e| DispatchError::TransportError {
                    context: context.clone(),
                    message: format!("response claimed application/json but failed to parse: {e}"),
                })
            } else {
                Ok(Value::String(String::from_utf8_lossy(&response.body).into_owned()))
            }
        } else {
            Err(DispatchError::TransportError {
                context,
                message: format!("failed to invoke service! http status={}", response.status),
            })
        }
    }
}

fn value_to_query_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_path_params(template: &str, params: &HashMap<String, String>) -> String {
    let mut path = template.to_string();
    for (name, value) in params {
        path = path.replace(&format!("{{{name}}}"), value);
    }
    path
}

fn add_query_params(path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();
    format!("{path}?{query}")
}
