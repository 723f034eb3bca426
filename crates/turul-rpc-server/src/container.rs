//! Dependency-injection container seam
//!
//! The engine asks the container for one instance per call. Returning an `Arc`
//! covers both lifetimes: a transient registration builds a fresh instance, a
//! singleton registration hands out clones of the same one. The call context
//! only ever holds its clone, so singletons must tolerate shared use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::service::ContractService;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("No implementation registered for '{0}'")]
    NotRegistered(String),

    #[error("Failed to construct '{name}': {message}")]
    Construction { name: String, message: String },
}

impl ContainerError {
    pub fn construction(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ServiceContainer: Send + Sync {
    /// Resolve `implementation`, passing the late-bound constructor arguments
    async fn resolve(
        &self,
        implementation: &str,
        late_args: Vec<Value>,
    ) -> Result<Arc<dyn ContractService>, ContainerError>;
}

/// Constructor for a transient registration
pub type ServiceFactory =
    Arc<dyn Fn(Vec<Value>) -> Result<Arc<dyn ContractService>, ContainerError> + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Transient(ServiceFactory),
    Singleton(Arc<dyn ContractService>),
}

/// Map-backed container; names compare case-insensitively
#[derive(Default, Clone)]
pub struct InMemoryContainer {
    registrations: HashMap<String, Registration>,
}

impl InMemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a new instance for every resolution
    pub fn register_transient<F>(mut self, name: impl AsRef<str>, factory: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Arc<dyn ContractService>, ContainerError>
            + Send
            + Sync
            + 'static,
    {
        self.registrations.insert(
            name.as_ref().to_lowercase(),
            Registration::Transient(Arc::new(factory)),
        );
        self
    }

    /// Share one instance across every resolution; late arguments are ignored
    pub fn register_singleton(
        mut self,
        name: impl AsRef<str>,
        instance: Arc<dyn ContractService>,
    ) -> Self {
        self.registrations
            .insert(name.as_ref().to_lowercase(), Registration::Singleton(instance));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(&name.to_lowercase())
    }
}

impl fmt::Debug for InMemoryContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.registrations.keys().collect();
        names.sort();
        f.debug_struct("InMemoryContainer")
            .field("registrations", &names)
            .finish()
    }
}

#[async_trait]
impl ServiceContainer for InMemoryContainer {
    async fn resolve(
        &self,
        implementation: &str,
        late_args: Vec<Value>,
    ) -> Result<Arc<dyn ContractService>, ContainerError> {
        match self.registrations.get(&implementation.to_lowercase()) {
            Some(Registration::Transient(factory)) => {
                debug!("Constructing transient instance of {}", implementation);
                factory(late_args)
            }
            Some(Registration::Singleton(instance)) => Ok(instance.clone()),
            None => Err(ContainerError::NotRegistered(implementation.to_string())),
        }
    }
}
