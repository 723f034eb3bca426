//! Calling/called filters
//!
//! Filters intercept a call before and after the method runs. They are attached
//! to a contract (service-level) or to a single overload (method-level) at
//! registration time.
//!
//! # Lifecycle
//!
//! 1. **Calling**: the instance's [`ServiceHandler`] hook, then service filters,
//!    then method filters, each in declared order. A hook short-circuits by
//!    setting a response on the context or by returning a [`FilterError`];
//!    no further calling hooks run and the method is not invoked.
//! 2. **Called**: method filters, then service filters, then the instance's
//!    hook. Every called hook runs exactly once per call, including hooks whose
//!    calling counterpart never ran.
//!
//! # Examples
//!
//! ```rust,no_run
//! use turul_rpc_server::filter::{CallFilter, FilterError};
//! use turul_rpc_server::CallContext;
//! use async_trait::async_trait;
//!
//! struct RequireApiKey;
//!
//! #[async_trait]
//! impl CallFilter for RequireApiKey {
//!     async fn calling(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
//!         match ctx.item("api-key") {
//!             Some(_) => Ok(()),
//!             None => Err(FilterError::unauthorized("Missing API key")),
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use turul_rpc_protocol::StatusCode;

use crate::context::CallContext;

/// Errors a filter hook can raise
///
/// A calling-hook error becomes the call's response:
///
/// - `Unauthorized` → `Unauthorized`
/// - `InvalidRequest` → `BadRequest`
/// - `NotFound` → `NotFound`
/// - `Internal` → `InternalServerError` (message subject to error disclosure)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal filter error: {0}")]
    Internal(String),
}

impl FilterError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::Unauthorized,
            Self::InvalidRequest(_) => StatusCode::BadRequest,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Message safe to return as-is (everything except `Internal`)
    pub fn public_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized(m) | Self::InvalidRequest(m) | Self::NotFound(m) => Some(m),
            Self::Internal(_) => None,
        }
    }
}

/// Middleware-style extension point around method invocation
#[async_trait]
pub trait CallFilter: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs before the method; set a response or return an error to short-circuit
    #[allow(unused_variables)]
    async fn calling(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        Ok(())
    }

    /// Runs after the method (or after a short-circuit), always exactly once
    #[allow(unused_variables)]
    async fn called(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        Ok(())
    }
}

/// Optional capability a service instance can expose to hook its own calls
///
/// Instances advertise it through
/// [`ContractService::as_service_handler`](crate::ContractService::as_service_handler).
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    #[allow(unused_variables)]
    async fn calling(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        Ok(())
    }

    #[allow(unused_variables)]
    async fn called(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        Ok(())
    }
}

/// Ordered filter list attached to a service or method
#[derive(Default, Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn CallFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; calling and called hooks both run in push order
    pub fn push(&mut self, filter: Arc<dyn CallFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CallFilter>> {
        self.filters.iter()
    }
}

impl FromIterator<Arc<dyn CallFilter>> for FilterChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn CallFilter>>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
