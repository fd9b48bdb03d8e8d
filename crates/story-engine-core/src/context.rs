//! The story's mutable per-execution context: streaming service handles and
//! the server request/I/O-loop handle used by the in-line transport.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::StreamingServiceHandle;

/// Well-known context keys. Per-service streaming handles are stored under
/// the service's own name instead of one of these constants.
pub mod keys {
    /// Key under which the active server request handle is stored.
    pub const SERVER_REQUEST: &str = "server_request";
    /// Key under which the server's I/O loop handle is stored.
    pub const SERVER_IO_LOOP: &str = "server_io_loop";
}

/// A handle onto the HTTP response backing an in-line ("streaming")
/// dispatch. Modeled with exactly the three operations the in-line
/// transport needs, per the design notes: the write/finish/schedule split
/// keeps ordering explicit instead of inherited from a global event loop.
pub trait ServerRequest: Send + Sync {
    /// Write a chunk to the response body.
    fn write(&self, chunk: &[u8]);

    /// Close the response. Callers reach this only indirectly, through
    /// [`IoLoop::schedule`] - never directly inline with a write.
    fn finish(&self);
}

/// The server's I/O loop, used to schedule a callback for a later turn.
///
/// `execute_inline`'s `finish` scheduling is load-bearing: the write must be
/// observed by the transport before the response closes, so `finish` is
/// scheduled rather than called inline.
pub trait IoLoop: Send + Sync {
    /// Schedule `op` to run after the current turn, never immediately.
    fn schedule(&self, op: Box<dyn FnOnce() + Send>);
}

/// A value stored in a [`StoryContext`].
#[derive(Clone)]
pub enum ContextValue {
    /// A running streaming service, stored under its service name.
    Streaming(StreamingServiceHandle),
    /// The active server request handle (in-line transport only).
    ServerRequest(Arc<dyn ServerRequest>),
    /// The server's I/O loop handle (in-line transport only).
    IoLoop(Arc<dyn IoLoop>),
}

/// Mutable mapping, owned by a single story, keyed by well-known constants
/// and per-service streaming handle names.
///
/// Uses interior mutability (a [`parking_lot::RwLock`]) rather than
/// requiring `&mut Story` through every dispatch call: a story's context is
/// never shared across stories, but within one story it is reached from
/// async tasks spawned off the same `Arc<dyn Story>`.
#[derive(Default)]
pub struct StoryContext {
    values: RwLock<HashMap<String, ContextValue>>,
}

impl StoryContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: ContextValue) {
        self.values.write().insert(key.into(), value);
    }

    /// Record a streaming service handle under its own name.
    pub fn set_streaming_service(&self, handle: StreamingServiceHandle) {
        self.values
            .write()
            .insert(handle.name.clone(), ContextValue::Streaming(handle));
    }

    /// Look up a streaming service handle by service name.
    pub fn streaming_service(&self, name: &str) -> Option<StreamingServiceHandle> {
        match self.values.read().get(name) {
            Some(ContextValue::Streaming(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// The active server request handle, if one has been set.
    pub fn server_request(&self) -> Option<Arc<dyn ServerRequest>> {
        match self.values.read().get(keys::SERVER_REQUEST) {
            Some(ContextValue::ServerRequest(req)) => Some(req.clone()),
            _ => None,
        }
    }

    /// The server's I/O loop handle, if one has been set.
    pub fn io_loop(&self) -> Option<Arc<dyn IoLoop>> {
        match self.values.read().get(keys::SERVER_IO_LOOP) {
            Some(ContextValue::IoLoop(loop_handle)) => Some(loop_handle.clone()),
            _ => None,
        }
    }
}

/// A [`IoLoop`] backed by `tokio::spawn`, yielding once before running the
/// scheduled callback so it never executes on the current turn.
#[derive(Clone, Default)]
pub struct TokioIoLoop;

impl IoLoop for TokioIoLoop {
    fn schedule(&self, op: Box<dyn FnOnce() + Send>) {
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            op();
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingRequest {
        writes: Mutex<Vec<Vec<u8>>>,
        finished: Mutex<bool>,
    }

    impl ServerRequest for RecordingRequest {
        fn write(&self, chunk: &[u8]) {
            self.writes.lock().unwrap().push(chunk.to_vec());
        }

        fn finish(&self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    #[test]
    fn streaming_service_round_trips_by_name() {
        let ctx = StoryContext::new();
        ctx.set_streaming_service(StreamingServiceHandle {
            name: "time-client".into(),
            command: "time-server".into(),
            container_name: "asyncy--foo-1".into(),
            hostname: "foo.com".into(),
        });

        let handle = ctx.streaming_service("time-client").unwrap();
        assert_eq!(handle.hostname, "foo.com");
        assert!(ctx.streaming_service("missing").is_none());
    }

    #[tokio::test]
    async fn io_loop_schedule_runs_after_current_turn() {
        let io_loop = TokioIoLoop;
        let req = Arc::new(RecordingRequest {
            writes: Mutex::new(Vec::new()),
            finished: Mutex::new(false),
        });

        req.write(b"hello");
        assert!(!*req.finished.lock().unwrap());

        let req_clone = req.clone();
        io_loop.schedule(Box::new(move || req_clone.finish()));

        // Not finished synchronously - scheduling never runs inline.
        assert!(!*req.finished.lock().unwrap());

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(*req.finished.lock().unwrap());
    }
}
