//! In-Memory Cache Backend
//!
//! Stores every group in a single `Arc<RwLock<HashMap>>`. Suitable for:
//! - Development and testing
//! - Single-process deployments where sessions need not survive a restart

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{CacheBackend, CacheError, CacheGroup, GroupInfo};

#[derive(Debug)]
struct GroupEntry {
    info: GroupInfo,
    state: HashMap<String, Value>,
}

impl GroupEntry {
    fn new(group_id: &str, ttl: Duration) -> Self {
        Self {
            info: GroupInfo::new(group_id, ttl),
            state: HashMap::new(),
        }
    }
}

type GroupMap = Arc<RwLock<HashMap<String, GroupEntry>>>;

/// In-memory storage for cache groups
#[derive(Debug, Clone)]
pub struct InMemoryCacheBackend {
    groups: GroupMap,
    config: InMemoryConfig,
}

/// Configuration for the in-memory backend
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum groups to keep (for memory management)
    pub max_groups: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_groups: 100_000,
        }
    }
}

/// Statistics for the in-memory backend
#[derive(Debug, Clone)]
pub struct InMemoryStats {
    pub group_count: usize,
    pub total_key_count: usize,
    pub max_groups: usize,
}

impl InMemoryCacheBackend {
    /// Create a backend with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get current statistics
    pub async fn stats(&self) -> InMemoryStats {
        let groups = self.groups.read().await;
        InMemoryStats {
            group_count: groups.len(),
            total_key_count: groups.values().map(|g| g.state.len()).sum(),
            max_groups: self.config.max_groups,
        }
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`InMemoryCacheBackend::open_group`]
struct InMemoryCacheGroup {
    group_id: String,
    groups: GroupMap,
}

impl InMemoryCacheGroup {
    fn not_found(&self) -> CacheError {
        CacheError::GroupNotFound(self.group_id.clone())
    }
}

#[async_trait]
impl CacheGroup for InMemoryCacheGroup {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut groups = self.groups.write().await;
        let entry = groups.get_mut(&self.group_id).ok_or_else(|| self.not_found())?;
        entry.info.touch();
        Ok(entry.state.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let mut groups = self.groups.write().await;
        let entry = groups.get_mut(&self.group_id).ok_or_else(|| self.not_found())?;
        entry.info.touch();
        entry.state.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut groups = self.groups.write().await;
        let entry = groups.get_mut(&self.group_id).ok_or_else(|| self.not_found())?;
        entry.info.touch();
        Ok(entry.state.remove(key))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let groups = self.groups.read().await;
        let entry = groups.get(&self.group_id).ok_or_else(|| self.not_found())?;
        Ok(entry.state.keys().cloned().collect())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn open_group(
        &self,
        group_id: &str,
        ttl: Duration,
    ) -> Result<Arc<dyn CacheGroup>, CacheError> {
        let mut groups = self.groups.write().await;

        match groups.get_mut(group_id) {
            Some(entry) if entry.info.is_expired() => {
                debug!("Cache group {} expired, starting fresh", group_id);
                *entry = GroupEntry::new(group_id, ttl);
            }
            Some(entry) => {
                entry.info.ttl_millis = ttl.as_millis() as u64;
                entry.info.touch();
            }
            None => {
                if groups.len() >= self.config.max_groups {
                    return Err(CacheError::MaxGroupsReached(self.config.max_groups));
                }
                groups.insert(group_id.to_string(), GroupEntry::new(group_id, ttl));
                debug!("Created cache group: {}", group_id);
            }
        }

        Ok(Arc::new(InMemoryCacheGroup {
            group_id: group_id.to_string(),
            groups: self.groups.clone(),
        }))
    }

    async fn remove_group(&self, group_id: &str) -> Result<bool, CacheError> {
        let mut groups = self.groups.write().await;
        let removed = groups.remove(group_id).is_some();
        if removed {
            debug!("Removed cache group: {}", group_id);
        }
        Ok(removed)
    }

    async fn group_count(&self) -> Result<usize, CacheError> {
        Ok(self.groups.read().await.len())
    }

    async fn expire_groups(&self) -> Result<Vec<String>, CacheError> {
        let mut groups = self.groups.write().await;
        let mut expired = Vec::new();

        groups.retain(|group_id, entry| {
            if entry.info.is_expired() {
                expired.push(group_id.clone());
                false
            } else {
                true
            }
        });

        if !expired.is_empty() {
            info!("Expired {} cache groups", expired.len());
        }

        Ok(expired)
    }
}
