//! The Subscription Manager: registers an event subscription with the
//! broker ("Synapse") once a streaming service has started, so that a
//! `when service.event as ...` line gets called back when the event fires.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{DispatchContext, DispatchError};
use crate::http_client::RetryingHttpClient;
use crate::model::{Line, StreamingServiceHandle};
use crate::story::StoryHandle;

/// Look up the event descriptor `actions.<command>.events.<event>` on the
/// service's configuration tree (already rooted at `actions`, per
/// [`crate::story::ServiceRecord::configuration`]).
fn find_event_conf(service_actions: &Value, command: &str, event: &str) -> Value {
    service_actions
        .get(command)
        .and_then(|c| c.get("events"))
        .and_then(|events| events.get(event))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Subscribe `line` (a `when <streaming_service.command> <event>` binding)
/// with the broker, and record the subscription on the owning application
/// once the broker accepts it.
pub async fn when(
    http_client: &RetryingHttpClient,
    story: &StoryHandle,
    streaming_service: &StreamingServiceHandle,
    line: &Line,
) -> Result<(), DispatchError> {
    let context = DispatchContext::new(story.name(), line.ln.clone());
    let event = line.command.as_str();

    let service = story.app().services.get(&streaming_service.name).ok_or_else(|| DispatchError::ConfigError {
        context: context.clone(),
        message: format!("service \"{}\" is not configured on this application", streaming_service.name),
    })?;

    let event_conf = find_event_conf(&service.configuration, &streaming_service.command, event);

    let port = event_conf.get("http").and_then(|h| h.get("port")).and_then(Value::as_u64).unwrap_or(80);
    let subscribe_path = event_conf
        .get("http")
        .and_then(|h| h.get("subscribe"))
        .and_then(|s| s.get("path"))
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::ConfigError {
            context: context.clone(),
            message: format!("event \"{event}\" on {}/{} has no http.subscribe.path", streaming_service.name, streaming_service.command),
        })?;
    let subscribe_method = event_conf
        .get("http")
        .and_then(|h| h.get("subscribe"))
        .and_then(|s| s.get("method"))
        .and_then(Value::as_str)
        .unwrap_or("post")
        .to_uppercase();

    let event_args = event_conf.get("arguments").and_then(Value::as_object).cloned().unwrap_or_default();

    let mut data = serde_json::Map::new();
    for key in event_args.keys() {
        data.insert(key.clone(), story.argument_by_name(line, key)?);
    }
    // The http service's app-to-engine callback needs the app's own DNS
    // name threaded through, since nothing else identifies which app the
    // inbound event belongs to.
    if streaming_service.name == "http" {
        data.insert("host".to_string(), Value::String(story.app().app_dns.clone()));
    }

    let sub_url = format!("http://{}:{port}{subscribe_path}", streaming_service.hostname);

    let config = &story.app().config;
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("story", story.name())
        .append_pair("block", &line.ln.0)
        .append_pair("app", &story.app().app_id)
        .finish();
    let endpoint = format!("http://{}:{}/story/event?{query}", config.engine_host, config.engine_port);

    let sub_id = Uuid::new_v4().to_string();

    let sub_body = json!({
        "endpoint": endpoint,
        "data": data,
        "event": event,
        "id": sub_id,
    });

    let body = json!({
        "sub_id": sub_id,
        "sub_url": sub_url,
        "sub_method": subscribe_method,
        "sub_body": sub_body,
        "pod_name": streaming_service.container_name,
        "app_id": story.app().app_id,
    });

    let encoded_body = serde_json::to_vec(&body).map_err(|e| DispatchError::ProgrammingError {
        context: context.clone(),
        message: format!("failed to encode subscribe body: {e}"),
    })?;

    let mut headers = std::collections::HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json; charset=utf-8".to_string());

    let url = format!("http://{}:{}/subscribe", config.synapse_host, config.synapse_port);

    tracing::debug!(%sub_url, "subscribing via broker");

    let method = reqwest::Method::from_bytes(subscribe_method.as_bytes()).unwrap_or(reqwest::Method::POST);

    let response = http_client
        .fetch_with_retry(&url, &context, method, &url, &headers, Some(encoded_body))
        .await?;

    if response.is_success() {
        tracing::info!("subscribed");
        story.app().add_subscription(sub_id, streaming_service, event, body);
        Ok(())
    } else {
        Err(DispatchError::TransportError {
            context,
            message: format!(
                "failed to subscribe to {} from {}! http status={}",
                streaming_service.name, streaming_service.command, response.status
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_event_conf_walks_actions_then_events() {
        let actions = json!({
            "bot": {
                "events": {
                    "hears": {
                        "http": {"port": 8000, "subscribe": {"path": "/sub"}}
                    }
                }
            }
        });

        let conf = find_event_conf(&actions, "bot", "hears");
        assert_eq!(conf["http"]["port"], 8000);
    }

    #[test]
    fn find_event_conf_missing_path_yields_null() {
        let actions = json!({});
        assert!(find_event_conf(&actions, "bot", "hears").is_null());
    }
}
