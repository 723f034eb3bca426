//! Per-call execution context
//!
//! One [`CallContext`] exists per inbound call and is threaded explicitly through
//! the pipeline, filters and the service. Identity state (session handle,
//! authenticated flag, principal) lives in a [`SessionScope`] that a local call
//! shares with its owner; everything else is private to the call.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use turul_rpc_cache::{CacheBackend, CacheError, CacheGroup};
use turul_rpc_protocol::{CallRequest, CallResponse, FileAttachment};
use uuid::Uuid;

use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
use crate::policy::{GENERIC_ERROR_MESSAGE, RegistryPolicy};
use crate::service::ContractService;

/// Lifecycle of one call; only moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallState {
    Created,
    Validating,
    Dispatching,
    Invoked,
    Responded,
    Discarded,
}

/// What the transport knows about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEndpoint {
    pub remote_addr: Option<SocketAddr>,
    /// Whether the transport can deliver file attachments
    pub allow_files: bool,
}

impl ClientEndpoint {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            allow_files: false,
        }
    }

    /// In-process caller with no network address
    pub fn local() -> Self {
        Self::default()
    }

    pub fn with_files(mut self, allow_files: bool) -> Self {
        self.allow_files = allow_files;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("File attachments are not supported by this endpoint")]
    FilesNotSupported,

    #[error("Session unavailable: {0}")]
    Cache(#[from] CacheError),
}

/// Identity state of a call: session handle, authenticated flag, principal slot
pub struct SessionScope {
    session_id: String,
    generated: bool,
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    session_key: String,
    handle: OnceCell<Arc<dyn CacheGroup>>,
    authenticated: AtomicBool,
}

impl SessionScope {
    /// Scope for `request_session_id`, generating a fresh id when it is empty
    pub fn new(
        request_session_id: &str,
        backend: Arc<dyn CacheBackend>,
        policy: &RegistryPolicy,
    ) -> Self {
        let (session_id, generated) = if request_session_id.is_empty() {
            (Uuid::now_v7().to_string(), true)
        } else {
            (request_session_id.to_string(), false)
        };

        Self {
            session_id,
            generated,
            backend,
            ttl: policy.session_ttl,
            session_key: policy.session_key.clone(),
            handle: OnceCell::new(),
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// True when the caller sent no session id
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Whether the cache group has been opened yet
    pub fn is_open(&self) -> bool {
        self.handle.initialized()
    }

    /// Session handle, opening the cache group on first use only
    pub async fn session(&self) -> Result<Arc<dyn CacheGroup>, CacheError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                debug!(
                    "Opening session {} on {} backend",
                    self.session_id,
                    self.backend.backend_name()
                );
                self.backend.open_group(&self.session_id, self.ttl).await
            })
            .await?;
        Ok(handle.clone())
    }
}

impl fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionScope")
            .field("session_id", &self.session_id)
            .field("generated", &self.generated)
            .field("backend", &self.backend.backend_name())
            .field("open", &self.is_open())
            .field("authenticated", &self.authenticated.load(Ordering::Acquire))
            .finish()
    }
}

pub struct CallContext {
    request: CallRequest,
    response: Option<CallResponse>,
    service: Option<Arc<ServiceDescriptor>>,
    method: Option<Arc<MethodDescriptor>>,
    instance: Option<Arc<dyn ContractService>>,
    scope: Arc<SessionScope>,
    items: HashMap<String, Value>,
    files: Vec<FileAttachment>,
    endpoint: ClientEndpoint,
    state: CallState,
    local: bool,
}

impl CallContext {
    pub fn new(request: CallRequest, endpoint: ClientEndpoint, scope: Arc<SessionScope>) -> Self {
        Self {
            request,
            response: None,
            service: None,
            method: None,
            instance: None,
            scope,
            items: HashMap::new(),
            files: Vec::new(),
            endpoint,
            state: CallState::Created,
            local: false,
        }
    }

    /// Context for an in-process call made while `owner` is executing
    ///
    /// Shares the owner's session scope, so authentication and principal carry
    /// over; response, items, files and the resolved service stay separate.
    pub fn local(owner: &CallContext, request: CallRequest) -> Self {
        let mut ctx = Self::new(request, owner.endpoint.clone(), owner.scope.clone());
        ctx.local = true;
        ctx
    }

    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    pub fn response(&self) -> Option<&CallResponse> {
        self.response.as_ref()
    }

    /// Set the response; during the calling phase this short-circuits the call
    pub fn set_response(&mut self, response: CallResponse) {
        self.response = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn service(&self) -> Option<&Arc<ServiceDescriptor>> {
        self.service.as_ref()
    }

    pub fn method(&self) -> Option<&Arc<MethodDescriptor>> {
        self.method.as_ref()
    }

    pub fn instance(&self) -> Option<&Arc<dyn ContractService>> {
        self.instance.as_ref()
    }

    pub fn session_id(&self) -> &str {
        self.scope.session_id()
    }

    pub fn scope(&self) -> &Arc<SessionScope> {
        &self.scope
    }

    pub async fn session(&self) -> Result<Arc<dyn CacheGroup>, ContextError> {
        Ok(self.scope.session().await?)
    }

    /// Authenticated flag set, or a principal stored in the session
    pub async fn is_authenticated(&self) -> bool {
        if self.scope.authenticated.load(Ordering::Acquire) {
            return true;
        }
        // A session minted for this call cannot hold a principal yet
        if self.scope.is_generated() && !self.scope.is_open() {
            return false;
        }
        match self.principal().await {
            Ok(principal) => principal.is_some(),
            Err(e) => {
                warn!("Failed to read principal for session {}: {}", self.session_id(), e);
                false
            }
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.scope.authenticated.store(authenticated, Ordering::Release);
    }

    /// Store `principal` in the session and mark the scope authenticated
    pub async fn sign_in(&self, principal: Value) -> Result<(), ContextError> {
        let session = self.session().await?;
        session.set(self.scope.session_key(), principal).await?;
        self.set_authenticated(true);
        debug!("Session {} signed in", self.session_id());
        Ok(())
    }

    /// Remove the principal, returning it
    pub async fn sign_out(&self) -> Result<Option<Value>, ContextError> {
        let session = self.session().await?;
        let previous = session.remove(self.scope.session_key()).await?;
        self.set_authenticated(false);
        debug!("Session {} signed out", self.session_id());
        Ok(previous)
    }

    pub async fn principal(&self) -> Result<Option<Value>, ContextError> {
        let session = self.session().await?;
        Ok(session.get(self.scope.session_key()).await?)
    }

    /// Scratch value shared between filters and the service for this call
    pub fn item(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    pub fn set_item(&mut self, key: impl Into<String>, value: Value) {
        self.items.insert(key.into(), value);
    }

    pub fn remove_item(&mut self, key: &str) -> Option<Value> {
        self.items.remove(key)
    }

    /// Pending attachments; moved into the response after a successful call
    pub fn files_mut(&mut self) -> Result<&mut Vec<FileAttachment>, ContextError> {
        if !self.endpoint.allow_files {
            return Err(ContextError::FilesNotSupported);
        }
        Ok(&mut self.files)
    }

    pub fn attach_file(&mut self, file: FileAttachment) -> Result<(), ContextError> {
        self.files_mut()?.push(file);
        Ok(())
    }

    pub fn endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub(crate) fn transition(&mut self, next: CallState) {
        if next < self.state {
            warn!(
                "Ignoring call state transition {:?} -> {:?} for {}.{}",
                self.state, next, self.request.contract, self.request.method
            );
            return;
        }
        if next != self.state {
            debug!("Call state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    pub(crate) fn set_service(&mut self, service: Arc<ServiceDescriptor>) {
        self.service = Some(service);
    }

    pub(crate) fn set_method(&mut self, method: Arc<MethodDescriptor>) {
        self.method = Some(method);
    }

    pub(crate) fn set_instance(&mut self, instance: Arc<dyn ContractService>) {
        self.instance = Some(instance);
    }

    /// Consume the context into its final response
    pub(crate) fn into_response(mut self) -> CallResponse {
        self.transition(CallState::Discarded);

        let mut response = match self.response.take() {
            Some(response) => response,
            None => {
                warn!(
                    "Call {}.{} finished without a response",
                    self.request.contract, self.request.method
                );
                CallResponse::internal_error(GENERIC_ERROR_MESSAGE)
            }
        };

        if response.is_ok() && !self.files.is_empty() {
            response.files.append(&mut self.files);
        }
        response.id = self.request.id.clone();
        response.session_id = self.scope.session_id().to_string();
        response
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("contract", &self.request.contract)
            .field("method", &self.request.method)
            .field("state", &self.state)
            .field("session_id", &self.scope.session_id())
            .field("has_response", &self.response.is_some())
            .field("local", &self.local)
            .finish()
    }
}
