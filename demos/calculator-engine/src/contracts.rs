//! Demo contracts and their implementations

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;
use turul_rpc_protocol::{CallRequest, RpcResult, StatusCode};
use turul_rpc_server::prelude::*;

/// `Calc`: integer and float addition, division with a typed result, and a
/// method that re-enters the engine in-process
pub struct Calc;

impl Contract for Calc {
    fn describe() -> ServiceBuilder {
        ServiceDescriptor::builder("Calc")
            .method(
                MethodDescriptor::builder("Add")
                    .param("a", ParamType::Value(ValueType::Int))
                    .param("b", ParamType::Value(ValueType::Int)),
            )
            .method(
                MethodDescriptor::builder("Add")
                    .param("a", ParamType::Value(ValueType::Float))
                    .param("b", ParamType::Value(ValueType::Float)),
            )
            .method(
                MethodDescriptor::builder("Divide")
                    .param("a", ParamType::Value(ValueType::Int))
                    .param("b", ParamType::Value(ValueType::Int))
                    .returns_result(),
            )
            .method(
                MethodDescriptor::builder("Double").param_with(
                    ParamDescriptor::new("x", ParamType::Value(ValueType::Int))
                        .rule(ValidationRule::range(-1e9, 1e9)),
                ),
            )
    }
}

/// `Keys`: renaming with business failures reported as data
pub struct Keys;

impl Contract for Keys {
    fn describe() -> ServiceBuilder {
        ServiceDescriptor::builder("Keys").method(
            MethodDescriptor::builder("Rename")
                .param_with(
                    ParamDescriptor::new("key", ParamType::Value(ValueType::String))
                        .rule(ValidationRule::MinLength(1)),
                )
                .param_with(
                    ParamDescriptor::new("newKey", ParamType::Value(ValueType::String))
                        .rule(ValidationRule::MinLength(1)),
                )
                .returns_result(),
        )
    }
}

/// `Session`: sign-in and principal lookup, open to anonymous callers
pub struct Session;

impl Contract for Session {
    fn describe() -> ServiceBuilder {
        ServiceDescriptor::builder("Session")
            .anonymous()
            .method(
                MethodDescriptor::builder("SignIn")
                    .param("user", ParamType::Value(ValueType::String)),
            )
            .method(MethodDescriptor::builder("SignOut"))
            .method(MethodDescriptor::builder("WhoAmI"))
    }
}

/// Engine handle for in-process calls, filled once the engine is built
pub type EngineSlot = Arc<OnceLock<DispatchEngine>>;

pub struct CalcService {
    engine: EngineSlot,
}

#[async_trait]
impl ContractService for CalcService {
    async fn invoke(
        &self,
        method: &MethodDescriptor,
        args: &mut [Value],
        ctx: &mut CallContext,
    ) -> Result<Value, InvokeError> {
        match method.name() {
            "Add" if method.params()[0].param_type() == &ParamType::Value(ValueType::Int) => {
                let a: i64 = arg(args, 0)?;
                let b: i64 = arg(args, 1)?;
                a.checked_add(b)
                    .map(|sum| json!(sum))
                    .ok_or_else(|| InvokeError::validation("integer overflow"))
            }
            "Add" => {
                let a: f64 = arg(args, 0)?;
                let b: f64 = arg(args, 1)?;
                Ok(json!(a + b))
            }
            "Divide" => {
                let a: i64 = arg(args, 0)?;
                let b: i64 = arg(args, 1)?;
                if b == 0 {
                    return Err(InvokeError::result(400, "division by zero"));
                }
                Ok(serde_json::to_value(RpcResult::ok(a / b))?)
            }
            "Double" => {
                let engine = self
                    .engine
                    .get()
                    .ok_or_else(|| InvokeError::msg("engine not ready"))?;
                let x: i64 = arg(args, 0)?;
                let request = CallRequest::new("Calc", "Add", vec![json!(x), json!(x)]);
                let response = engine.call_local(ctx, request).await;
                if response.status != StatusCode::Ok {
                    return Err(InvokeError::msg(response.message));
                }
                Ok(response.return_value().cloned().unwrap_or(Value::Null))
            }
            other => Err(InvokeError::msg(format!("Calc has no method {}", other))),
        }
    }
}

pub struct KeysService;

#[async_trait]
impl ContractService for KeysService {
    async fn invoke(
        &self,
        _method: &MethodDescriptor,
        args: &mut [Value],
        _ctx: &mut CallContext,
    ) -> Result<Value, InvokeError> {
        let key: String = arg(args, 0)?;
        let new_key: String = arg(args, 1)?;
        if key == new_key {
            return Err(InvokeError::result(409, "name unchanged"));
        }
        info!("Renamed key {} -> {}", key, new_key);
        Ok(serde_json::to_value(RpcResult::ok(new_key))?)
    }
}

pub struct SessionService;

#[async_trait]
impl ContractService for SessionService {
    async fn invoke(
        &self,
        method: &MethodDescriptor,
        args: &mut [Value],
        ctx: &mut CallContext,
    ) -> Result<Value, InvokeError> {
        match method.name() {
            "SignIn" => {
                let user: String = arg(args, 0)?;
                ctx.sign_in(json!(user)).await.map_err(InvokeError::failure)?;
                Ok(json!(ctx.session_id()))
            }
            "SignOut" => Ok(ctx
                .sign_out()
                .await
                .map_err(InvokeError::failure)?
                .unwrap_or(Value::Null)),
            "WhoAmI" => Ok(ctx
                .principal()
                .await
                .map_err(InvokeError::failure)?
                .unwrap_or(Value::Null)),
            other => Err(InvokeError::msg(format!("Session has no method {}", other))),
        }
    }
}

/// Container wiring for the demo contracts
pub fn container(engine: EngineSlot) -> InMemoryContainer {
    InMemoryContainer::new()
        .register_transient("Calc", move |_| {
            Ok(Arc::new(CalcService {
                engine: engine.clone(),
            }) as Arc<dyn ContractService>)
        })
        .register_singleton("Keys", Arc::new(KeysService) as Arc<dyn ContractService>)
        .register_transient("Session", |_| {
            Ok(Arc::new(SessionService) as Arc<dyn ContractService>)
        })
}
