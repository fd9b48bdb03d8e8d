//! Registers this node's internal services: `log` and `file`. The
//! synthetic `http` service is not registered here - it is recognized
//! structurally, by [`story_engine_core::container::start_container`],
//! rather than dispatched through the internal handler table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use story_engine_core::error::DispatchError;
use story_engine_core::model::Line;
use story_engine_core::registry::{InternalHandler, InternalServiceRegistry};
use story_engine_core::story::StoryHandle;

struct LogHandler {
    level: tracing::Level,
}

#[async_trait]
impl InternalHandler for LogHandler {
    async fn call(&self, story: &StoryHandle, _line: &Line, resolved_args: HashMap<String, Value>) -> Result<Value, DispatchError> {
        let msg = resolved_args.get("msg").and_then(Value::as_str).unwrap_or_default();
        match self.level {
            tracing::Level::ERROR => tracing::error!(story = story.name(), "{msg}"),
            tracing::Level::WARN => tracing::warn!(story = story.name(), "{msg}"),
            tracing::Level::DEBUG => tracing::debug!(story = story.name(), "{msg}"),
            _ => tracing::info!(story = story.name(), "{msg}"),
        }
        Ok(Value::Null)
    }
}

struct FileReadHandler;

#[async_trait]
impl InternalHandler for FileReadHandler {
    async fn call(&self, story: &StoryHandle, line: &Line, resolved_args: HashMap<String, Value>) -> Result<Value, DispatchError> {
        let path = resolved_args.get("path").and_then(Value::as_str).ok_or_else(|| DispatchError::ConfigError {
            context: story_engine_core::error::DispatchContext::new(story.name(), line.ln.clone()),
            message: "file/read requires a \"path\" argument".to_string(),
        })?;

        let content = tokio::fs::read_to_string(path).await.map_err(|e| DispatchError::DownstreamError {
            context: story_engine_core::error::DispatchContext::new(story.name(), line.ln.clone()),
            source: Box::new(e),
        })?;

        Ok(Value::String(content))
    }
}

struct FileWriteHandler;

#[async_trait]
impl InternalHandler for FileWriteHandler {
    async fn call(&self, story: &StoryHandle, line: &Line, resolved_args: HashMap<String, Value>) -> Result<Value, DispatchError> {
        let path = resolved_args.get("path").and_then(Value::as_str).ok_or_else(|| DispatchError::ConfigError {
            context: story_engine_core::error::DispatchContext::new(story.name(), line.ln.clone()),
            message: "file/write requires a \"path\" argument".to_string(),
        })?;
        let content = resolved_args.get("content").and_then(Value::as_str).unwrap_or_default();

        tokio::fs::write(path, content).await.map_err(|e| DispatchError::DownstreamError {
            context: story_engine_core::error::DispatchContext::new(story.name(), line.ln.clone()),
            source: Box::new(e),
        })?;

        Ok(Value::Null)
    }
}

/// Register every internal service this node provides.
pub fn register_all(registry: &InternalServiceRegistry) {
    registry.register("log", "info", vec!["msg".to_string()], "any", Arc::new(LogHandler { level: tracing::Level::INFO }));
    registry.register("log", "warn", vec!["msg".to_string()], "any", Arc::new(LogHandler { level: tracing::Level::WARN }));
    registry.register("log", "error", vec!["msg".to_string()], "any", Arc::new(LogHandler { level: tracing::Level::ERROR }));
    registry.register("log", "debug", vec!["msg".to_string()], "any", Arc::new(LogHandler { level: tracing::Level::DEBUG }));

    registry.register("file", "read", vec!["path".to_string()], "string", Arc::new(FileReadHandler));
    registry.register("file", "write", vec!["path".to_string(), "content".to_string()], "any", Arc::new(FileWriteHandler));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_log_and_file_commands_but_not_http() {
        let registry = InternalServiceRegistry::new();
        register_all(&registry);

        assert!(registry.is_internal("log", "info"));
        assert!(registry.is_internal("file", "read"));
        assert!(registry.is_internal("file", "write"));
        assert!(!registry.is_internal("http", "finish"));
    }
}
