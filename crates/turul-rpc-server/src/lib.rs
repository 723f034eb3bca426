//! # Contract RPC Dispatch Engine
//!
//! Callers name a contract and a method; the engine resolves the overload,
//! obtains an implementation from a [`ServiceContainer`], runs the
//! calling/called filter pipeline, authorizes, validates and invokes, and
//! turns whatever happened into a [`CallResponse`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::{Value, json};
//! use turul_rpc_cache::InMemoryCacheBackend;
//! use turul_rpc_server::prelude::*;
//!
//! struct Calc;
//!
//! impl Contract for Calc {
//!     fn describe() -> ServiceBuilder {
//!         ServiceDescriptor::builder("Calc").method(
//!             MethodDescriptor::builder("Add")
//!                 .param("a", ParamType::Value(ValueType::Int))
//!                 .param("b", ParamType::Value(ValueType::Int)),
//!         )
//!     }
//! }
//!
//! struct CalcService;
//!
//! #[async_trait]
//! impl ContractService for CalcService {
//!     async fn invoke(
//!         &self,
//!         _method: &MethodDescriptor,
//!         args: &mut [Value],
//!         _ctx: &mut CallContext,
//!     ) -> Result<Value, InvokeError> {
//!         let a: i64 = arg(args, 0)?;
//!         let b: i64 = arg(args, 1)?;
//!         Ok(json!(a + b))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ContractRegistry::builder()
//!     .policy(RegistryPolicy::default().with_public_access(true))
//!     .register::<Calc>()
//!     .build()?;
//!
//! let container = InMemoryContainer::new()
//!     .register_singleton("Calc", Arc::new(CalcService) as Arc<dyn ContractService>);
//!
//! let engine = DispatchEngine::builder()
//!     .registry(Arc::new(registry))
//!     .container(Arc::new(container))
//!     .cache_backend(Arc::new(InMemoryCacheBackend::new()))
//!     .build()?;
//!
//! let response = engine
//!     .handle_call(CallRequest::new("Calc", "Add", vec![json!(2), json!(3)]), ClientEndpoint::local())
//!     .await;
//! assert_eq!(response.values, vec![json!(5)]);
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod filter;
mod pipeline;
pub mod policy;
pub mod registry;
pub mod service;
pub mod validation;

pub mod prelude;

pub use container::{ContainerError, InMemoryContainer, ServiceContainer, ServiceFactory};
pub use context::{CallContext, CallState, ClientEndpoint, ContextError, SessionScope};
pub use descriptor::{
    MethodBuilder, MethodDescriptor, ParamDescriptor, ParamType, ResultFactory, ReturnType,
    RpcResultFactory, ServiceBuilder, ServiceDescriptor, ValueType,
};
pub use engine::{
    DispatchEngine, DispatchEngineBuilder, EngineError, ErrorHook, ErrorStage, TracingErrorHook,
};
pub use filter::{CallFilter, FilterChain, FilterError, ServiceHandler};
pub use policy::{
    ErrorDisclosure, GENERIC_ERROR_MESSAGE, PolicyConfig, PolicyError, RegistryPolicy,
};
pub use registry::{Contract, ContractRegistry, ContractRegistryBuilder, RegistryError};
pub use service::{ArgFactory, ContractService, InvokeError, arg};
pub use validation::{ValidationRule, validate_params};

// Re-export protocol types used throughout the public API
pub use turul_rpc_protocol::{CallRequest, CallResponse, FileAttachment, RpcResult, StatusCode};
