//! Service implementation seam
//!
//! A contract's implementation is any [`ContractService`]. The engine hands it
//! the resolved overload, a mutable copy of the positional arguments (so
//! pass-by-reference parameters can be written back) and the call context.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::CallContext;
use crate::descriptor::MethodDescriptor;
use crate::filter::ServiceHandler;

/// Late-bound constructor arguments computed per call
pub type ArgFactory = Arc<dyn Fn(&CallContext) -> Vec<Value> + Send + Sync>;

/// Failure raised by a method body
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Argument rejected by the method itself; becomes `BadRequest`
    #[error("{0}")]
    Validation(String),

    /// Business failure. Becomes a failed result value when the method returns
    /// the typed-result family, otherwise an internal error.
    #[error("{message}")]
    Result { status: i32, message: String },

    /// Anything else; becomes `InternalServerError`
    #[error(transparent)]
    Failure(Box<dyn std::error::Error + Send + Sync>),
}

impl InvokeError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn result(status: i32, message: impl Into<String>) -> Self {
        Self::Result {
            status,
            message: message.into(),
        }
    }

    pub fn failure<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failure(Box::new(error))
    }

    /// Failure from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Failure(message.into())
    }
}

impl From<serde_json::Error> for InvokeError {
    fn from(err: serde_json::Error) -> Self {
        Self::failure(err)
    }
}

/// Implementation of a registered contract
#[async_trait]
pub trait ContractService: Send + Sync {
    /// Run `method` with the given arguments
    ///
    /// `args` has exactly one entry per declared parameter. Values left in
    /// by-ref positions are echoed back in the response.
    async fn invoke(
        &self,
        method: &MethodDescriptor,
        args: &mut [Value],
        ctx: &mut CallContext,
    ) -> Result<Value, InvokeError>;

    /// Optional calling/called hooks for this instance
    fn as_service_handler(&self) -> Option<&dyn ServiceHandler> {
        None
    }
}

/// Deserialize the argument at `index`
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, InvokeError> {
    let value = args
        .get(index)
        .cloned()
        .ok_or_else(|| InvokeError::validation(format!("missing argument {}", index)))?;
    serde_json::from_value(value)
        .map_err(|e| InvokeError::validation(format!("argument {}: {}", index, e)))
}
