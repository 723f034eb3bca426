//! Service and method descriptors
//!
//! Descriptors are computed once at registration and never mutated afterwards.
//! Parameter signatures are stored as tagged [`ParamType`] values so the call
//! path only ever matches JSON values against precomputed descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use turul_rpc_protocol::RpcResult;

use crate::filter::{CallFilter, FilterChain};
use crate::registry::RegistryError;
use crate::service::ArgFactory;
use crate::validation::ValidationRule;

/// Runtime shape a parameter value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    /// Integral JSON number
    Int,
    /// Any JSON number
    Float,
    String,
    Array,
    Object,
    /// Any non-null value
    Any,
}

impl ValueType {
    /// Whether `value` is an instance of this type
    pub fn is_instance(&self, value: &Value) -> bool {
        match self {
            ValueType::Bool => value.is_boolean(),
            ValueType::Int => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
            ValueType::Any => !value.is_null(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Declared parameter type
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Enumeration: accepts a member name or a member discriminant
    Enum {
        name: String,
        members: Vec<(String, i64)>,
    },
    /// Nullable type: accepts `null` or an instance
    Reference(ValueType),
    /// Non-nullable type: accepts instances only
    Value(ValueType),
}

impl ParamType {
    pub fn enumeration<N, I, M>(name: N, members: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (M, i64)>,
        M: Into<String>,
    {
        ParamType::Enum {
            name: name.into(),
            members: members.into_iter().map(|(m, d)| (m.into(), d)).collect(),
        }
    }

    /// Overload-matching rule for a single position
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::Enum { members, .. } => match value {
                Value::String(s) => members.iter().any(|(name, _)| name == s),
                Value::Number(n) => n
                    .as_i64()
                    .is_some_and(|d| members.iter().any(|(_, disc)| *disc == d)),
                _ => false,
            },
            ParamType::Reference(ty) => value.is_null() || ty.is_instance(value),
            ParamType::Value(ty) => ty.is_instance(value),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Enum { name, .. } => write!(f, "{}", name),
            ParamType::Reference(ty) => write!(f, "{}?", ty),
            ParamType::Value(ty) => write!(f, "{}", ty),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    name: String,
    ty: ParamType,
    by_ref: bool,
    rules: Vec<ValidationRule>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            by_ref: false,
            rules: Vec::new(),
        }
    }

    /// Mark as pass-by-reference: its final value is echoed in the response
    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type. For by-ref parameters this is the referenced element type.
    pub fn param_type(&self) -> &ParamType {
        &self.ty
    }

    pub fn is_by_ref(&self) -> bool {
        self.by_ref
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }
}

/// Builds the failed instance of a typed-result return type
pub trait ResultFactory: Send + Sync {
    fn failed(&self, status: i32, message: &str) -> Value;
}

/// Default factory producing a serialized [`RpcResult`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcResultFactory;

impl ResultFactory for RpcResultFactory {
    fn failed(&self, status: i32, message: &str) -> Value {
        let result: RpcResult = RpcResult::fail(status, message);
        serde_json::to_value(result).unwrap_or(Value::Null)
    }
}

/// Declared return type of a method
#[derive(Clone, Default)]
pub enum ReturnType {
    #[default]
    Plain,
    /// Typed-result family: result exceptions become failed values
    Result(Arc<dyn ResultFactory>),
}

impl ReturnType {
    pub fn is_result(&self) -> bool {
        matches!(self, ReturnType::Result(_))
    }
}

impl fmt::Debug for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Plain => f.write_str("Plain"),
            ReturnType::Result(_) => f.write_str("Result"),
        }
    }
}

/// Metadata for one method overload
pub struct MethodDescriptor {
    id: u32,
    name: String,
    params: Vec<ParamDescriptor>,
    returns: ReturnType,
    filters: FilterChain,
    anonymous: bool,
}

impl MethodDescriptor {
    pub fn builder(name: impl Into<String>) -> MethodBuilder {
        MethodBuilder::new(name)
    }

    /// Registry-wide identity, ascending in registration order
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn returns(&self) -> &ReturnType {
        &self.returns
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn has_by_ref_params(&self) -> bool {
        self.params.iter().any(ParamDescriptor::is_by_ref)
    }

    /// Whether every supplied value matches the declared parameter at its position
    pub fn matches(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, value)| param.param_type().accepts(value))
    }

    /// Human-readable signature, e.g. `Add(int, int)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.by_ref {
                    format!("ref {}", p.ty)
                } else {
                    p.ty.to_string()
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("id", &self.id)
            .field("signature", &self.signature())
            .field("returns", &self.returns)
            .field("filters", &self.filters.len())
            .field("anonymous", &self.anonymous)
            .finish()
    }
}

/// Builder for [`MethodDescriptor`]; identities are assigned by the registry
pub struct MethodBuilder {
    name: String,
    params: Vec<ParamDescriptor>,
    returns: ReturnType,
    filters: FilterChain,
    anonymous: bool,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnType::Plain,
            filters: FilterChain::new(),
            anonymous: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(ParamDescriptor::new(name, ty));
        self
    }

    /// Add a fully configured parameter (by-ref flag, validation rules)
    pub fn param_with(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Declare an [`RpcResult`]-shaped return type
    pub fn returns_result(self) -> Self {
        self.returns_result_with(Arc::new(RpcResultFactory))
    }

    /// Declare a custom typed-result return type
    pub fn returns_result_with(mut self, factory: Arc<dyn ResultFactory>) -> Self {
        self.returns = ReturnType::Result(factory);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn CallFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub(crate) fn build(self, id: u32) -> Result<MethodDescriptor, RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName("method".to_string()));
        }
        Ok(MethodDescriptor {
            id,
            name: self.name,
            params: self.params,
            returns: self.returns,
            filters: self.filters,
            anonymous: self.anonymous,
        })
    }
}

/// Registry-held metadata for one contract
pub struct ServiceDescriptor {
    name: String,
    /// Lower-cased method name -> overloads in registration order
    methods: HashMap<String, Vec<Arc<MethodDescriptor>>>,
    filters: FilterChain,
    anonymous: bool,
    implementation: Option<String>,
    arg_factory: Option<ArgFactory>,
}

impl ServiceDescriptor {
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overload candidates for `method`, compared case-insensitively
    pub fn overloads(&self, method: &str) -> &[Arc<MethodDescriptor>] {
        self.methods
            .get(&method.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First overload, in registration order, whose every position matches
    pub fn find_method(&self, method: &str, args: &[Value]) -> Option<Arc<MethodDescriptor>> {
        self.overloads(method)
            .iter()
            .find(|candidate| candidate.matches(args))
            .cloned()
    }

    /// All overloads across every method name, ordered by identity
    pub fn methods(&self) -> Vec<Arc<MethodDescriptor>> {
        let mut all: Vec<_> = self.methods.values().flatten().cloned().collect();
        all.sort_by_key(|m| m.id());
        all
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Name handed to the container: the implementation indirection or the contract name
    pub fn implementation(&self) -> &str {
        self.implementation.as_deref().unwrap_or(&self.name)
    }

    pub fn arg_factory(&self) -> Option<&ArgFactory> {
        self.arg_factory.as_ref()
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods())
            .field("filters", &self.filters.len())
            .field("anonymous", &self.anonymous)
            .field("implementation", &self.implementation())
            .field("arg_factory", &self.arg_factory.is_some())
            .finish()
    }
}

/// Builder for [`ServiceDescriptor`]
pub struct ServiceBuilder {
    name: String,
    methods: Vec<MethodBuilder>,
    filters: FilterChain,
    anonymous: bool,
    implementation: Option<String>,
    arg_factory: Option<ArgFactory>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            filters: FilterChain::new(),
            anonymous: false,
            implementation: None,
            arg_factory: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn CallFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Allow every method of this contract without authentication
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Resolve a different implementation name from the container
    pub fn implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    /// Late-bound constructor arguments, overriding the registry default
    pub fn arg_factory(mut self, factory: ArgFactory) -> Self {
        self.arg_factory = Some(factory);
        self
    }

    pub(crate) fn build(self, next_id: &mut u32) -> Result<ServiceDescriptor, RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName("contract".to_string()));
        }

        let mut methods: HashMap<String, Vec<Arc<MethodDescriptor>>> = HashMap::new();
        for builder in self.methods {
            let method = builder.build(*next_id)?;
            *next_id += 1;
            methods
                .entry(method.name().to_lowercase())
                .or_default()
                .push(Arc::new(method));
        }

        Ok(ServiceDescriptor {
            name: self.name,
            methods,
            filters: self.filters,
            anonymous: self.anonymous,
            implementation: self.implementation,
            arg_factory: self.arg_factory,
        })
    }
}
