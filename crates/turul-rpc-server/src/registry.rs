//! Contract registry
//!
//! Built once at startup from declared contracts, then shared read-only as
//! `Arc<ContractRegistry>` across every concurrent call.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use turul_rpc_protocol::CallRequest;

use crate::descriptor::{MethodDescriptor, ServiceBuilder, ServiceDescriptor};
use crate::policy::RegistryPolicy;
use crate::service::ArgFactory;

/// Metadata source for one contract
///
/// Implemented by a marker type per contract; consulted only while the
/// registry is being built.
///
/// ```rust
/// use turul_rpc_server::{Contract, MethodDescriptor, ParamType, ServiceBuilder, ServiceDescriptor, ValueType};
///
/// struct Calc;
///
/// impl Contract for Calc {
///     fn describe() -> ServiceBuilder {
///         ServiceDescriptor::builder("Calc").method(
///             MethodDescriptor::builder("Add")
///                 .param("a", ParamType::Value(ValueType::Int))
///                 .param("b", ParamType::Value(ValueType::Int)),
///         )
///     }
/// }
/// ```
pub trait Contract: 'static {
    fn describe() -> ServiceBuilder;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Contract '{0}' is already registered")]
    DuplicateContract(String),

    #[error("Empty {0} name")]
    EmptyName(String),
}

pub struct ContractRegistry {
    /// Lower-cased contract name -> descriptor
    services: HashMap<String, Arc<ServiceDescriptor>>,
    policy: RegistryPolicy,
    default_arg_factory: Option<ArgFactory>,
}

impl ContractRegistry {
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::new()
    }

    /// Case-insensitive contract lookup
    pub fn lookup(&self, contract: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services.get(&contract.to_lowercase()).cloned()
    }

    /// Overload resolution for `request` against `service`
    ///
    /// Candidates named `request.method` are tried in registration order; the
    /// first whose arity matches and whose every parameter accepts the supplied
    /// value wins. Equally compatible later candidates are never considered.
    pub fn find_method(
        &self,
        service: &ServiceDescriptor,
        request: &CallRequest,
    ) -> Option<Arc<MethodDescriptor>> {
        let found = service.find_method(&request.method, &request.params);
        match &found {
            Some(method) => debug!(
                "Resolved {}.{} to #{} {}",
                service.name(),
                request.method,
                method.id(),
                method.signature()
            ),
            None => debug!(
                "No overload of {}.{} accepts {} argument(s)",
                service.name(),
                request.method,
                request.params.len()
            ),
        }
        found
    }

    /// Registered contract names, sorted
    pub fn contracts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .values()
            .map(|s| s.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    pub fn default_arg_factory(&self) -> Option<&ArgFactory> {
        self.default_arg_factory.as_ref()
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("contracts", &self.contracts())
            .field("policy", &self.policy)
            .field("default_arg_factory", &self.default_arg_factory.is_some())
            .finish()
    }
}

/// Builder for [`ContractRegistry`]
///
/// Registration errors are collected and reported by [`build`](Self::build),
/// so registration calls can be chained.
pub struct ContractRegistryBuilder {
    services: HashMap<String, Arc<ServiceDescriptor>>,
    by_type: HashMap<TypeId, Arc<ServiceDescriptor>>,
    next_id: u32,
    policy: RegistryPolicy,
    default_arg_factory: Option<ArgFactory>,
    errors: Vec<RegistryError>,
}

impl ContractRegistryBuilder {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            by_type: HashMap::new(),
            next_id: 1,
            policy: RegistryPolicy::default(),
            default_arg_factory: None,
            errors: Vec::new(),
        }
    }

    pub fn policy(mut self, policy: RegistryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Late-bound constructor arguments for contracts without their own factory
    pub fn default_arg_factory(mut self, factory: ArgFactory) -> Self {
        self.default_arg_factory = Some(factory);
        self
    }

    pub fn register<C: Contract>(self) -> Self {
        self.register_with::<C>(None, None)
    }

    pub fn register_with<C: Contract>(
        mut self,
        implementation: Option<&str>,
        arg_factory: Option<ArgFactory>,
    ) -> Self {
        if let Err(e) = self.describe::<C>(implementation, arg_factory) {
            self.errors.push(e);
        }
        self
    }

    /// Register a contract assembled without a [`Contract`] type
    pub fn register_descriptor(mut self, builder: ServiceBuilder) -> Self {
        if let Err(e) = self.insert(builder) {
            self.errors.push(e);
        }
        self
    }

    /// Build or fetch the cached descriptor for `C`
    ///
    /// Idempotent per type: later calls return the first descriptor unchanged
    /// and ignore their implementation and factory arguments.
    pub fn describe<C: Contract>(
        &mut self,
        implementation: Option<&str>,
        arg_factory: Option<ArgFactory>,
    ) -> Result<Arc<ServiceDescriptor>, RegistryError> {
        let type_id = TypeId::of::<C>();
        if let Some(cached) = self.by_type.get(&type_id) {
            return Ok(cached.clone());
        }

        let mut builder = C::describe();
        if let Some(implementation) = implementation {
            builder = builder.implementation(implementation);
        }
        if let Some(factory) = arg_factory {
            builder = builder.arg_factory(factory);
        }

        let descriptor = self.insert(builder)?;
        self.by_type.insert(type_id, descriptor.clone());
        Ok(descriptor)
    }

    fn insert(&mut self, builder: ServiceBuilder) -> Result<Arc<ServiceDescriptor>, RegistryError> {
        let key = builder.name().to_lowercase();
        if self.services.contains_key(&key) {
            return Err(RegistryError::DuplicateContract(builder.name().to_string()));
        }

        let descriptor = Arc::new(builder.build(&mut self.next_id)?);
        debug!(
            "Registered contract {} with {} overload(s)",
            descriptor.name(),
            descriptor.methods().len()
        );
        self.services.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    pub fn build(mut self) -> Result<ContractRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        info!(
            "Contract registry ready: {} contract(s), public_access={}",
            self.services.len(),
            self.policy.public_access
        );

        Ok(ContractRegistry {
            services: self.services,
            policy: self.policy,
            default_arg_factory: self.default_arg_factory,
        })
    }
}

impl Default for ContractRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
