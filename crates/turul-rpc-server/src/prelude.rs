//! Prelude module for common dispatch engine imports
//!
//! ```rust
//! use turul_rpc_server::prelude::*;
//! ```

pub use turul_rpc_protocol::prelude::*;

// Registration
pub use crate::{
    Contract, ContractRegistry, MethodDescriptor, ParamDescriptor, ParamType, RegistryPolicy,
    ServiceBuilder, ServiceDescriptor, ValidationRule, ValueType,
};

// Implementation seams
pub use crate::{
    CallContext, CallFilter, ContractService, FilterError, InMemoryContainer, InvokeError,
    ServiceContainer, ServiceHandler, arg,
};

// Engine
pub use crate::{ClientEndpoint, DispatchEngine, ErrorDisclosure};
