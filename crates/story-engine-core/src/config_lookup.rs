//! Command Config Lookup: walks a resolved [`Chain`] through an
//! application's service configuration tree to find the concrete command
//! configuration (`http`/`format`/`arguments`) that governs dispatch.

use serde_json::Value;

use crate::error::{DispatchContext, DispatchError};
use crate::model::{Chain, ChainElem};
use crate::story::StoryHandle;

/// Walk `chain` through `story.app().services` to the command configuration
/// it names.
///
/// Each [`ChainElem::Service`] enters that service's `actions` subtree, each
/// [`ChainElem::Command`] indexes into the current subtree by name, and each
/// [`ChainElem::Event`] descends through `events.<name>.output.actions`
/// before continuing. The walk ends on the chain's last element (always a
/// command), and that subtree is the command's configuration - typically
/// holding `http`, `format`, and `arguments` keys, returned as-is since the
/// executor reads only the handful of keys it needs.
pub fn get_command_conf(story: &StoryHandle, chain: &Chain) -> Result<Value, DispatchError> {
    let mut current: Value = Value::Null;

    for elem in chain.iter() {
        match elem {
            ChainElem::Service(name) => {
                let service = story.app().services.get(name).ok_or_else(|| DispatchError::ConfigError {
                    context: DispatchContext::without_line(story.name()),
                    message: format!("service \"{name}\" is not configured on this application"),
                })?;
                current = service.configuration.clone();
            }
            ChainElem::Command(name) => {
                current = current.get(name).cloned().unwrap_or(Value::Null);
            }
            ChainElem::Event(name) => {
                current = current
                    .get("events")
                    .and_then(|events| events.get(name))
                    .and_then(|event| event.get("output"))
                    .and_then(|output| output.get("actions"))
                    .cloned()
                    .unwrap_or(Value::Null);
            }
        }
    }

    Ok(if current.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        current
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::context::StoryContext;
    use crate::model::{Line, LineId};
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
        fn argument_by_name(&self, _line: &Line, _name: &str) -> Result<Value, DispatchError> {
            Ok(Value::Null)
        }
        fn app(&self) -> &Application {
            &self.app
        }
        fn context(&self) -> &StoryContext {
            &self.context
        }
    }

    fn make_chain(elems: Vec<ChainElem>) -> Chain {
        Chain::from_deque(elems.into())
    }

    #[test]
    fn resolves_a_plain_service_command() {
        let mut services = HashMap::new();
        services.insert(
            "alpine".to_string(),
            ServiceRecord {
                configuration: json!({
                    "echo": {
                        "http": {"method": "post", "path": "/echo", "port": 5000},
                        "arguments": {"msg": {"in": "requestBody"}}
                    }
                }),
            },
        );

        let story: StoryHandle = Arc::new(FixtureStory {
            app: Application::new(services, EngineConfig::default(), "app", "app.example.com"),
            context: StoryContext::new(),
        });

        let chain = make_chain(vec![
            ChainElem::Service("alpine".to_string()),
            ChainElem::Command("echo".to_string()),
        ]);

        let conf = get_command_conf(&story, &chain).unwrap();
        assert_eq!(conf["http"]["path"], "/echo");
    }

    #[test]
    fn resolves_through_an_event_subtree() {
        let mut services = HashMap::new();
        services.insert(
            "slack".to_string(),
            ServiceRecord {
                configuration: json!({
                    "bot": {
                        "events": {
                            "hears": {
                                "output": {
                                    "actions": {
                                        "reply": {
                                            "http": {"method": "post", "path": "/reply"}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }),
            },
        );

        let story: StoryHandle = Arc::new(FixtureStory {
            app: Application::new(services, EngineConfig::default(), "app", "app.example.com"),
            context: StoryContext::new(),
        });

        let chain = make_chain(vec![
            ChainElem::Service("slack".to_string()),
            ChainElem::Command("bot".to_string()),
            ChainElem::Event("hears".to_string()),
            ChainElem::Command("reply".to_string()),
        ]);

        let conf = get_command_conf(&story, &chain).unwrap();
        assert_eq!(conf["http"]["path"], "/reply");
    }

    #[test]
    fn missing_command_conf_yields_empty_object_not_error() {
        let mut services = HashMap::new();
        services.insert(
            "alpine".to_string(),
            ServiceRecord { configuration: json!({}) },
        );

        let story: StoryHandle = Arc::new(FixtureStory {
            app: Application::new(services, EngineConfig::default(), "app", "app.example.com"),
            context: StoryContext::new(),
        });

        let chain = make_chain(vec![
            ChainElem::Service("alpine".to_string()),
            ChainElem::Command("echo".to_string()),
        ]);

        let conf = get_command_conf(&story, &chain).unwrap();
        assert_eq!(conf, json!({}));
    }

    #[test]
    fn unconfigured_service_is_a_config_error() {
        let story: StoryHandle = Arc::new(FixtureStory {
            app: Application::new(HashMap::new(), EngineConfig::default(), "app", "app.example.com"),
            context: StoryContext::new(),
        });

        let chain = make_chain(vec![
            ChainElem::Service("alpine".to_string()),
            ChainElem::Command("echo".to_string()),
        ]);

        assert!(get_command_conf(&story, &chain).is_err());
    }
}
