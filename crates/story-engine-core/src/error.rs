//! Typed dispatch errors.
//!
//! Every error the core raises carries `(story, line)` context so the caller
//! can annotate the story's result set without re-parsing a message string.

use crate::model::LineId;

/// Identifies the story and line a [`DispatchError`] occurred on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// Name of the story being executed.
    pub story_name: String,
    /// Line the error was raised on, if resolution got far enough to know it.
    pub line_id: Option<LineId>,
}

impl DispatchContext {
    /// Build a context for a resolved line.
    pub fn new(story_name: impl Into<String>, line_id: impl Into<LineId>) -> Self {
        Self {
            story_name: story_name.into(),
            line_id: Some(line_id.into()),
        }
    }

    /// Build a context where no line has been resolved yet.
    pub fn without_line(story_name: impl Into<String>) -> Self {
        Self {
            story_name: story_name.into(),
            line_id: None,
        }
    }
}

impl std::fmt::Display for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.line_id {
            Some(line) => write!(f, "story={} line={}", self.story_name, line.0),
            None => write!(f, "story={}", self.story_name),
        }
    }
}

/// The five fatal error kinds the service-dispatch core can raise.
///
/// Nothing is swallowed: every variant is terminal for the line that raised
/// it and is propagated to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed story tree: a chain could not be resolved because a parent
    /// link was missing or no ancestor owned the expected output.
    #[error("programming error ({context}): {message}")]
    ProgrammingError {
        /// Story/line context.
        context: DispatchContext,
        /// Human-readable description.
        message: String,
    },

    /// A command's configuration is missing required pieces, declares an
    /// unknown argument location, or carries a body with a non-POST method.
    #[error("config error ({context}): {message}")]
    ConfigError {
        /// Story/line context.
        context: DispatchContext,
        /// Human-readable description.
        message: String,
    },

    /// An HTTP call (to a service container or the subscription broker)
    /// returned a non-2xx status after the retry budget was exhausted.
    #[error("transport error ({context}): {message}")]
    TransportError {
        /// Story/line context.
        context: DispatchContext,
        /// Human-readable description.
        message: String,
    },

    /// A collaborator (Container Manager, DNS resolution) failed; the
    /// underlying error is preserved as the source.
    #[error("downstream error ({context}): {source}")]
    DownstreamError {
        /// Story/line context.
        context: DispatchContext,
        /// The collaborator's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `execute_internal` was asked for a command that was never registered.
    #[error("unknown internal command ({context}): {service}/{command}")]
    UnknownCommand {
        /// Story/line context.
        context: DispatchContext,
        /// The service name that was looked up.
        service: String,
        /// The command name that was looked up.
        command: String,
    },
}

impl DispatchError {
    /// The story/line context this error was raised with.
    pub fn context(&self) -> &DispatchContext {
        match self {
            DispatchError::ProgrammingError { context, .. }
            | DispatchError::ConfigError { context, .. }
            | DispatchError::TransportError { context, .. }
            | DispatchError::DownstreamError { context, .. }
            | DispatchError::UnknownCommand { context, .. } => context,
        }
    }
}
