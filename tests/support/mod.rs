//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use turul_rpc_cache::{CacheBackend, CacheError, CacheGroup, InMemoryCacheBackend};
use turul_rpc_protocol::{CallRequest, CallResponse};
use turul_rpc_server::{
    ClientEndpoint, ContainerError, ContractRegistry, ContractService, DispatchEngine,
    InMemoryContainer, ServiceContainer,
};

/// Container that counts resolutions before delegating
pub struct CountingContainer {
    inner: InMemoryContainer,
    pub resolved: AtomicUsize,
}

impl CountingContainer {
    pub fn new(inner: InMemoryContainer) -> Self {
        Self {
            inner,
            resolved: AtomicUsize::new(0),
        }
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceContainer for CountingContainer {
    async fn resolve(
        &self,
        implementation: &str,
        late_args: Vec<Value>,
    ) -> Result<Arc<dyn ContractService>, ContainerError> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(implementation, late_args).await
    }
}

/// Cache backend that counts `open_group` calls
#[derive(Default)]
pub struct CountingBackend {
    inner: InMemoryCacheBackend,
    pub opened: AtomicUsize,
}

impl CountingBackend {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for CountingBackend {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn open_group(
        &self,
        group_id: &str,
        ttl: Duration,
    ) -> Result<Arc<dyn CacheGroup>, CacheError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open_group(group_id, ttl).await
    }

    async fn remove_group(&self, group_id: &str) -> Result<bool, CacheError> {
        self.inner.remove_group(group_id).await
    }

    async fn group_count(&self) -> Result<usize, CacheError> {
        self.inner.group_count().await
    }

    async fn expire_groups(&self) -> Result<Vec<String>, CacheError> {
        self.inner.expire_groups().await
    }
}

pub struct Harness {
    pub engine: DispatchEngine,
    pub container: Arc<CountingContainer>,
    pub backend: Arc<CountingBackend>,
}

impl Harness {
    pub fn new(registry: ContractRegistry, container: InMemoryContainer) -> Self {
        let container = Arc::new(CountingContainer::new(container));
        let backend = Arc::new(CountingBackend::default());
        let engine = DispatchEngine::builder()
            .registry(Arc::new(registry))
            .container(container.clone())
            .cache_backend(backend.clone())
            .build()
            .expect("engine should build");
        Self {
            engine,
            container,
            backend,
        }
    }

    pub async fn call(&self, request: CallRequest) -> CallResponse {
        self.engine.handle_call(request, ClientEndpoint::local()).await
    }
}
