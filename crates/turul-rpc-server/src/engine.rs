//! Dispatch engine
//!
//! Runs one call end to end: resolve, instantiate, calling pipeline, authorize,
//! validate, invoke, called pipeline, response. Every outcome, including a panic
//! in the container, a hook or a method body, is turned into a [`CallResponse`].

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};
use turul_rpc_cache::CacheBackend;
use turul_rpc_protocol::{CallRequest, CallResponse};

use crate::container::{ContainerError, ServiceContainer};
use crate::context::{CallContext, CallState, ClientEndpoint, SessionScope};
use crate::descriptor::{MethodDescriptor, ReturnType, ServiceDescriptor};
use crate::filter::FilterError;
use crate::pipeline::Pipeline;
use crate::policy::{GENERIC_ERROR_MESSAGE, RegistryPolicy};
use crate::registry::ContractRegistry;
use crate::service::{ContractService, InvokeError};
use crate::validation::validate_params;

/// Where in the call a failure was caught
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStage {
    Instantiation,
    CallingHook,
    Validation,
    /// Result exception converted into a failed return value
    ResultConversion,
    Invocation,
    CalledHook,
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorStage::Instantiation => "instantiation",
            ErrorStage::CallingHook => "calling hook",
            ErrorStage::Validation => "validation",
            ErrorStage::ResultConversion => "result conversion",
            ErrorStage::Invocation => "invocation",
            ErrorStage::CalledHook => "called hook",
        };
        f.write_str(name)
    }
}

/// Observer for every failure the engine catches, whatever the response says
pub trait ErrorHook: Send + Sync {
    fn on_error(&self, ctx: &CallContext, stage: ErrorStage, error: &dyn Error);
}

/// Default hook: logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorHook;

impl ErrorHook for TracingErrorHook {
    fn on_error(&self, ctx: &CallContext, stage: ErrorStage, error: &dyn Error) {
        let request = ctx.request();
        match stage {
            ErrorStage::Instantiation | ErrorStage::Invocation => error!(
                "{}.{} failed during {}: {}",
                request.contract, request.method, stage, error
            ),
            ErrorStage::CallingHook | ErrorStage::CalledHook => warn!(
                "{}.{} failed during {}: {}",
                request.contract, request.method, stage, error
            ),
            ErrorStage::Validation | ErrorStage::ResultConversion => debug!(
                "{}.{} rejected during {}: {}",
                request.contract, request.method, stage, error
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine configuration error: {0}")]
    Config(String),
}

/// Message carried by a caught panic
#[derive(Debug)]
struct PanicError(String);

impl PanicError {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        Self(panic_message(payload.as_ref()))
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.0)
    }
}

impl Error for PanicError {}

#[derive(Clone)]
pub struct DispatchEngine {
    registry: Arc<ContractRegistry>,
    container: Arc<dyn ServiceContainer>,
    cache: Arc<dyn CacheBackend>,
    error_hook: Arc<dyn ErrorHook>,
}

impl DispatchEngine {
    pub fn builder() -> DispatchEngineBuilder {
        DispatchEngineBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &RegistryPolicy {
        self.registry.policy()
    }

    /// Handle one decoded request from a transport
    pub async fn handle_call(&self, request: CallRequest, endpoint: ClientEndpoint) -> CallResponse {
        let scope = Arc::new(SessionScope::new(
            &request.session_id,
            self.cache.clone(),
            self.registry.policy(),
        ));
        self.dispatch(CallContext::new(request, endpoint, scope)).await
    }

    /// Same-process call on behalf of `owner`, sharing its session and identity
    pub async fn call_local(&self, owner: &CallContext, request: CallRequest) -> CallResponse {
        self.dispatch(CallContext::local(owner, request)).await
    }

    async fn dispatch(&self, mut ctx: CallContext) -> CallResponse {
        debug!(
            "Dispatching {}.{} ({} params, session {})",
            ctx.request().contract,
            ctx.request().method,
            ctx.request().params.len(),
            ctx.session_id()
        );

        ctx.transition(CallState::Validating);
        let Some((service, method)) = self.resolve(&mut ctx) else {
            return finish(ctx);
        };

        ctx.transition(CallState::Dispatching);
        let Some(instance) = self.instantiate(&mut ctx, &service).await else {
            return finish(ctx);
        };

        let pipeline = Pipeline::new(
            instance.as_service_handler(),
            service.filters(),
            method.filters(),
        );
        debug!("Running {} calling stages for {}", pipeline.len(), method.signature());

        if let Err(failure) = pipeline.run_calling(&mut ctx).await {
            self.error_hook
                .on_error(&ctx, ErrorStage::CallingHook, &failure.error);
            let response = self.filter_response(&failure.error);
            ctx.set_response(response);
        }

        if !ctx.has_response() {
            if self.authorize(&ctx, &service, &method).await {
                self.invoke(&mut ctx, &method, &instance).await;
            } else {
                debug!(
                    "Rejected unauthenticated call to {}.{}",
                    service.name(),
                    method.name()
                );
                ctx.set_response(CallResponse::unauthorized());
            }
        }

        for failure in pipeline.run_called(&mut ctx).await {
            debug!("Called hook '{}' reported an error", failure.stage);
            self.error_hook
                .on_error(&ctx, ErrorStage::CalledHook, &failure.error);
        }

        finish(ctx)
    }

    fn resolve(
        &self,
        ctx: &mut CallContext,
    ) -> Option<(Arc<ServiceDescriptor>, Arc<MethodDescriptor>)> {
        let request = ctx.request();

        let rejection = if request.contract.trim().is_empty() {
            Some(CallResponse::bad_request("Contract name is required"))
        } else if request.method.trim().is_empty() {
            Some(CallResponse::bad_request("Method name is required"))
        } else {
            None
        };
        if let Some(response) = rejection {
            ctx.set_response(response);
            return None;
        }

        let Some(service) = self.registry.lookup(&request.contract) else {
            let response = CallResponse::not_found(format!(
                "Contract '{}' not found",
                request.contract
            ));
            ctx.set_response(response);
            return None;
        };

        let Some(method) = self.registry.find_method(&service, request) else {
            let response = CallResponse::not_found(format!(
                "Method '{}.{}' not found",
                service.name(),
                request.method
            ));
            ctx.set_response(response);
            return None;
        };

        ctx.set_service(service.clone());
        ctx.set_method(method.clone());
        Some((service, method))
    }

    async fn instantiate(
        &self,
        ctx: &mut CallContext,
        service: &ServiceDescriptor,
    ) -> Option<Arc<dyn ContractService>> {
        let late_args = service
            .arg_factory()
            .or(self.registry.default_arg_factory())
            .map(|factory| factory(&*ctx))
            .unwrap_or_default();

        let resolved = AssertUnwindSafe(self.container.resolve(service.implementation(), late_args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ContainerError::construction(
                    service.implementation(),
                    format!("panic: {}", panic_message(payload.as_ref())),
                ))
            });

        match resolved {
            Ok(instance) => {
                ctx.set_instance(instance.clone());
                Some(instance)
            }
            Err(e) => {
                self.error_hook.on_error(ctx, ErrorStage::Instantiation, &e);
                ctx.set_response(CallResponse::internal_error(GENERIC_ERROR_MESSAGE));
                None
            }
        }
    }

    async fn authorize(
        &self,
        ctx: &CallContext,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
    ) -> bool {
        self.registry.policy().public_access
            || method.is_anonymous()
            || service.is_anonymous()
            || ctx.is_authenticated().await
    }

    async fn invoke(
        &self,
        ctx: &mut CallContext,
        method: &MethodDescriptor,
        instance: &Arc<dyn ContractService>,
    ) {
        if let Err(message) = validate_params(method.params(), &ctx.request().params) {
            let error = InvokeError::validation(message.clone());
            self.error_hook.on_error(ctx, ErrorStage::Validation, &error);
            ctx.set_response(CallResponse::bad_request(message));
            return;
        }

        let mut args = ctx.request().params.clone();
        let outcome = AssertUnwindSafe(instance.invoke(method, &mut args, &mut *ctx))
            .catch_unwind()
            .await;
        ctx.transition(CallState::Invoked);

        let response = match outcome {
            Ok(Ok(value)) => CallResponse::ok(result_values(method, value, args)),
            Ok(Err(error)) => self.failure_response(ctx, method, error, args),
            Err(payload) => {
                let error = PanicError::from_payload(payload);
                self.error_hook.on_error(ctx, ErrorStage::Invocation, &error);
                CallResponse::internal_error(self.registry.policy().disclose(&error))
            }
        };
        ctx.set_response(response);
    }

    fn failure_response(
        &self,
        ctx: &CallContext,
        method: &MethodDescriptor,
        error: InvokeError,
        args: Vec<Value>,
    ) -> CallResponse {
        match (&error, method.returns()) {
            (InvokeError::Validation(message), _) => {
                self.error_hook.on_error(ctx, ErrorStage::Validation, &error);
                CallResponse::bad_request(message.clone())
            }
            (InvokeError::Result { status, message }, ReturnType::Result(factory)) => {
                self.error_hook
                    .on_error(ctx, ErrorStage::ResultConversion, &error);
                let failed = factory.failed(*status, message);
                CallResponse::ok(result_values(method, failed, args))
            }
            _ => {
                self.error_hook.on_error(ctx, ErrorStage::Invocation, &error);
                CallResponse::internal_error(self.registry.policy().disclose(&error))
            }
        }
    }

    fn filter_response(&self, error: &FilterError) -> CallResponse {
        match error.public_message() {
            Some(message) => CallResponse::with_message(error.status(), message),
            None => CallResponse::internal_error(self.registry.policy().disclose(error)),
        }
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("registry", &self.registry)
            .field("cache", &self.cache.backend_name())
            .finish()
    }
}

fn finish(mut ctx: CallContext) -> CallResponse {
    ctx.transition(CallState::Responded);
    let response = ctx.into_response();
    debug!("Call finished with {}", response.status);
    response
}

/// Return value first, then by-ref finals (null for other positions)
fn result_values(method: &MethodDescriptor, value: Value, args: Vec<Value>) -> Vec<Value> {
    if !method.has_by_ref_params() {
        return vec![value];
    }
    std::iter::once(value)
        .chain(
            method
                .params()
                .iter()
                .zip(args)
                .map(|(param, arg)| if param.is_by_ref() { arg } else { Value::Null }),
        )
        .collect()
}

pub struct DispatchEngineBuilder {
    registry: Option<Arc<ContractRegistry>>,
    container: Option<Arc<dyn ServiceContainer>>,
    cache: Option<Arc<dyn CacheBackend>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
}

impl DispatchEngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            container: None,
            cache: None,
            error_hook: None,
        }
    }

    pub fn registry(mut self, registry: Arc<ContractRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn container(mut self, container: Arc<dyn ServiceContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn cache_backend(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the default [`TracingErrorHook`]
    pub fn error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<DispatchEngine, EngineError> {
        let registry = self
            .registry
            .ok_or_else(|| EngineError::Config("a contract registry is required".to_string()))?;
        let container = self
            .container
            .ok_or_else(|| EngineError::Config("a service container is required".to_string()))?;
        let cache = self
            .cache
            .ok_or_else(|| EngineError::Config("a cache backend is required".to_string()))?;

        Ok(DispatchEngine {
            registry,
            container,
            cache,
            error_hook: self.error_hook.unwrap_or_else(|| Arc::new(TracingErrorHook)),
        })
    }
}

impl Default for DispatchEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
