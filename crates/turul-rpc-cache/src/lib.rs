//! # Cache Group Abstractions
//!
//! **Pluggable cache backends for contract RPC sessions.**
//!
//! A session is a *cache group*: a keyed bag of JSON values opened by session id.
//! The dispatch engine opens at most one group per call and uses it both for
//! per-session state and for the ambient principal slot. Expiry is the backend's
//! responsibility; the engine only passes the configured TTL along.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! turul-rpc-cache = "0.3"
//! ```

// Core trait and types
mod traits;
/// Core cache traits and types for pluggable backend implementations
pub use traits::*;

// Implementations
#[cfg(feature = "in-memory")]
pub mod in_memory;
pub mod prelude;

#[cfg(feature = "in-memory")]
/// In-memory cache backend for development, tests and single-process deployments
pub use in_memory::{InMemoryCacheBackend, InMemoryConfig, InMemoryStats};

/// Create a default in-memory cache backend
#[cfg(feature = "in-memory")]
pub fn create_default_backend() -> InMemoryCacheBackend {
    InMemoryCacheBackend::new()
}

#[cfg(all(test, feature = "in-memory"))]
mod integration_tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_backend_trait_compliance() {
        let backend = create_default_backend();
        let ttl = Duration::from_secs(60);

        let group = backend.open_group("session-1", ttl).await.unwrap();
        assert_eq!(group.group_id(), "session-1");
        assert_eq!(backend.group_count().await.unwrap(), 1);

        group.set("answer", serde_json::json!(42)).await.unwrap();

        // A second open of the same id sees the same state
        let again = backend.open_group("session-1", ttl).await.unwrap();
        assert_eq!(again.get("answer").await.unwrap(), Some(serde_json::json!(42)));

        assert!(backend.remove_group("session-1").await.unwrap());
        assert_eq!(backend.group_count().await.unwrap(), 0);
    }
}
