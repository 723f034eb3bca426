//! Cache Backend Traits
//!
//! `CacheBackend` hands out `CacheGroup` handles keyed by group (session) id.
//! Handles are cheap to clone behind an `Arc` and stay valid until the group is
//! removed or expires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bookkeeping for one cache group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: String,
    /// Creation timestamp (Unix millis)
    pub created_at: u64,
    /// Last access timestamp (Unix millis)
    pub last_activity: u64,
    /// Idle time after which the group expires
    pub ttl_millis: u64,
}

impl GroupInfo {
    pub fn new(group_id: impl Into<String>, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp_millis() as u64;
        Self {
            group_id: group_id.into(),
            created_at: now,
            last_activity: now,
            ttl_millis: ttl.as_millis() as u64,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = chrono::Utc::now().timestamp_millis() as u64;
    }

    /// A zero TTL never expires
    pub fn is_expired(&self) -> bool {
        if self.ttl_millis == 0 {
            return false;
        }
        let now = chrono::Utc::now().timestamp_millis() as u64;
        now.saturating_sub(self.last_activity) > self.ttl_millis
    }
}

/// Handle to one group's key/value state
#[async_trait]
pub trait CacheGroup: Send + Sync {
    /// Id the group was opened with
    fn group_id(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    /// Remove a key, returning its previous value
    async fn remove(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn keys(&self) -> Result<Vec<String>, CacheError>;
}

/// Core trait for cache backends
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the backend name for logging and debugging
    fn backend_name(&self) -> &'static str;

    /// Open (creating if needed) the group for `group_id`
    ///
    /// An existing group that has outlived its TTL is reset before being returned.
    async fn open_group(&self, group_id: &str, ttl: Duration)
    -> Result<Arc<dyn CacheGroup>, CacheError>;

    /// Delete a group completely
    async fn remove_group(&self, group_id: &str) -> Result<bool, CacheError>;

    /// Get group count for monitoring
    async fn group_count(&self) -> Result<usize, CacheError>;

    /// Remove expired groups (returns the removed ids)
    async fn expire_groups(&self) -> Result<Vec<String>, CacheError>;
}

/// Unified error type for all cache backends
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache group not found: {0}")]
    GroupNotFound(String),

    #[error("Maximum groups limit reached: {0}")]
    MaxGroupsReached(usize),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_info_creation() {
        let info = GroupInfo::new("g-1", Duration::from_secs(60));
        assert_eq!(info.group_id, "g-1");
        assert_eq!(info.ttl_millis, 60_000);
        assert!(!info.is_expired());
    }

    #[test]
    fn test_group_expiration() {
        let mut info = GroupInfo::new("g-1", Duration::from_secs(60));
        info.last_activity = chrono::Utc::now().timestamp_millis() as u64 - 61_000;
        assert!(info.is_expired());

        info.ttl_millis = 0;
        assert!(!info.is_expired());
    }
}
