//! # AllFrame Core
//!
//! Graceful shutdown utilities shared across the workspace's binaries.
//!
//! This crate used to carry the full AllFrame web framework (routing, DI,
//! CQRS, gRPC, caching, and more). The story execution engine only ever
//! reached for one corner of it - [`shutdown`] - so the rest was trimmed;
//! see `DESIGN.md` at the workspace root for the rationale.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use allframe_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let shutdown = GracefulShutdown::new();
//!     shutdown.wait().await;
//! }
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Graceful shutdown utilities
pub mod shutdown;

/// Re-export async_trait for async trait definitions
pub use async_trait;
/// Re-export serde for serialization
pub use serde;
/// Re-export serde_json for JSON handling
pub use serde_json;
/// Re-export tokio for async runtime
pub use tokio;

/// Prelude module for convenient imports
pub mod prelude {
    /// Re-export shutdown utilities
    pub use crate::shutdown::{
        GracefulShutdown, GracefulShutdownExt, ShutdownAwareTaskSpawner, ShutdownSignal,
        ShutdownToken,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_allframe_core_exists() {
        assert!(true);
    }
}
