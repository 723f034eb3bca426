//! End-to-end dispatch behavior: resolution, authorization, result conversion
//! and error disclosure.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use support::Harness;
use turul_rpc_protocol::{CallRequest, RequestId, StatusCode};
use turul_rpc_server::prelude::*;
use turul_rpc_server::GENERIC_ERROR_MESSAGE;

struct Calc;

impl Contract for Calc {
    fn describe() -> ServiceBuilder {
        ServiceDescriptor::builder("Calc")
            .method(
                MethodDescriptor::builder("Add")
                    .param("a", ParamType::Value(ValueType::Int))
                    .param("b", ParamType::Value(ValueType::Int)),
            )
            .method(MethodDescriptor::builder("F").param("x", ParamType::Value(ValueType::Int)))
            .method(
                MethodDescriptor::builder("F").param("x", ParamType::Reference(ValueType::Int)),
            )
            .method(
                MethodDescriptor::builder("Paint").param(
                    "color",
                    ParamType::enumeration("Color", [("Red", 0), ("Green", 1)]),
                ),
            )
            .method(MethodDescriptor::builder("Boom"))
            .method(MethodDescriptor::builder("Ping").anonymous())
    }
}

struct Keys;

impl Contract for Keys {
    fn describe() -> ServiceBuilder {
        ServiceDescriptor::builder("Keys").anonymous().method(
            MethodDescriptor::builder("Rename")
                .param("key", ParamType::Value(ValueType::String))
                .param("newKey", ParamType::Value(ValueType::String))
                .returns_result(),
        )
    }
}

#[derive(Default)]
struct CalcService {
    invoked: AtomicUsize,
}

#[async_trait]
impl ContractService for CalcService {
    async fn invoke(
        &self,
        method: &MethodDescriptor,
        args: &mut [Value],
        _ctx: &mut CallContext,
    ) -> Result<Value, InvokeError> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        match method.name() {
            "Add" => Ok(json!(arg::<i64>(args, 0)? + arg::<i64>(args, 1)?)),
            "F" | "Paint" => Ok(json!(method.signature())),
            "Boom" => Err(InvokeError::msg("connection refused by 10.0.0.7")),
            "Ping" => Ok(json!("pong")),
            other => Err(InvokeError::msg(format!("unexpected {}", other))),
        }
    }
}

struct KeysService;

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
        Ok(serde_json::to_value(RpcResult::ok(new_key))?)
    }
}

fn harness(policy: RegistryPolicy) -> (Harness, Arc<CalcService>) {
    let registry = ContractRegistry::builder()
        .policy(policy)
        .register::<Calc>()
        .register::<Keys>()
        .build()
        .unwrap();

    let calc = Arc::new(CalcService::default());
    let container = InMemoryContainer::new()
        .register_singleton("Calc", calc.clone())
        .register_singleton("Keys", Arc::new(KeysService));

    (Harness::new(registry, container), calc)
}

fn public() -> RegistryPolicy {
    RegistryPolicy::default().with_public_access(true)
}

#[tokio::test]
async fn test_add_with_public_access() {
    let (harness, _) = harness(public());
    let response = harness
        .call(CallRequest::new("Calc", "Add", vec![json!(2), json!(3)]).with_id(1))
        .await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.values, vec![json!(5)]);
    assert_eq!(response.id, RequestId::Number(1));
}

#[tokio::test]
async fn test_add_unauthenticated_without_public_access() {
    let (harness, calc) = harness(RegistryPolicy::default());
    let response = harness
        .call(CallRequest::new("Calc", "Add", vec![json!(2), json!(3)]))
        .await;

    assert_eq!(response.status, StatusCode::Unauthorized);
    assert!(response.values.is_empty());
    assert_eq!(calc.invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_anonymous_method_skips_authorization() {
    let (harness, _) = harness(RegistryPolicy::default());
    let response = harness.call(CallRequest::new("calc", "PING", vec![])).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.values, vec![json!("pong")]);
}

#[tokio::test]
async fn test_undeclared_method_is_not_found() {
    let (harness, calc) = harness(public());
    let response = harness
        .call(CallRequest::new("Calc", "Subtract", vec![json!(2), json!(3)]))
        .await;

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(harness.container.resolved(), 0);
    assert_eq!(calc.invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unregistered_contract_never_instantiates() {
    let (harness, _) = harness(public());
    let response = harness
        .call(CallRequest::new("Weather", "Forecast", vec![]))
        .await;

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(harness.container.resolved(), 0);
}

#[tokio::test]
async fn test_no_overload_matches_arity_or_type() {
    let (harness, _) = harness(public());

    let wrong_arity = harness
        .call(CallRequest::new("Calc", "Add", vec![json!(2)]))
        .await;
    assert_eq!(wrong_arity.status, StatusCode::NotFound);

    let wrong_type = harness
        .call(CallRequest::new("Calc", "Add", vec![json!(2), json!("3")]))
        .await;
    assert_eq!(wrong_type.status, StatusCode::NotFound);

    let bad_member = harness
        .call(CallRequest::new("Calc", "Paint", vec![json!("Blue")]))
        .await;
    assert_eq!(bad_member.status, StatusCode::NotFound);
    assert_eq!(harness.container.resolved(), 0);
}

#[tokio::test]
async fn test_first_full_overload_match_wins() {
    let (harness, _) = harness(public());

    let int_call = harness.call(CallRequest::new("Calc", "F", vec![json!(4)])).await;
    assert_eq!(int_call.values, vec![json!("F(int)")]);

    let null_call = harness
        .call(CallRequest::new("Calc", "F", vec![Value::Null]))
        .await;
    assert_eq!(null_call.values, vec![json!("F(int?)")]);

    let by_discriminant = harness
        .call(CallRequest::new("Calc", "Paint", vec![json!(1)]))
        .await;
    assert_eq!(by_discriminant.values, vec![json!("Paint(Color)")]);
}

#[tokio::test]
async fn test_result_exception_becomes_failed_value() {
    let (harness, _) = harness(RegistryPolicy::default());
    let response = harness
        .call(CallRequest::new("Keys", "Rename", vec![json!("a"), json!("a")]))
        .await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.values.len(), 1);
    let failed: RpcResult = serde_json::from_value(response.values[0].clone()).unwrap();
    assert!(failed.failed);
    assert_eq!(failed.status, 409);
    assert_eq!(failed.message.as_deref(), Some("name unchanged"));
}

#[tokio::test]
async fn test_successful_result_value() {
    let (harness, _) = harness(RegistryPolicy::default());
    let response = harness
        .call(CallRequest::new("Keys", "Rename", vec![json!("a"), json!("b")]))
        .await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.values[0]["failed"], false);
    assert_eq!(response.values[0]["data"], "b");
}

#[tokio::test]
async fn test_generic_disclosure_hides_exception_text() {
    let (harness, _) = harness(public());
    let response = harness.call(CallRequest::new("Calc", "Boom", vec![])).await;

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(response.message, GENERIC_ERROR_MESSAGE);
    assert!(!response.message.contains("10.0.0.7"));
}

#[tokio::test]
async fn test_override_disclosure_message() {
    let policy = public().with_error_disclosure(ErrorDisclosure::Override(
        "Service temporarily unavailable".to_string(),
    ));
    let (harness, _) = harness(policy);
    let response = harness.call(CallRequest::new("Calc", "Boom", vec![])).await;

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(response.message, "Service temporarily unavailable");
}

#[tokio::test]
async fn test_policy_from_toml_drives_engine() {
    let policy = RegistryPolicy::from_toml_str(
        r#"
        public_access = true
        error_disclosure = "verbose"
        "#,
    )
    .unwrap();
    let (harness, _) = harness(policy);

    let response = harness.call(CallRequest::new("Calc", "Boom", vec![])).await;
    assert_eq!(response.message, "connection refused by 10.0.0.7");
}
