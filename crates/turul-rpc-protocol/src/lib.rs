//! # Contract RPC Protocol Types
//!
//! Transport-agnostic data model shared by the dispatch engine and any transport
//! adapter that feeds it. Nothing in this crate knows about sockets, framing or a
//! specific byte format: every type derives serde so the transport can pick its
//! own serializer.
//!
//! ## Contents
//! - [`CallRequest`]: an already-decoded call (contract, method, positional params)
//! - [`CallResponse`]: status, message, result slots, attached files, session id
//! - [`StatusCode`]: the five outcomes the engine can produce
//! - [`RpcResult`]: the typed-result family used to carry business failures as data

pub mod request;
pub mod response;
pub mod result;
pub mod status;
pub mod types;

pub mod prelude;

// Re-export main types
pub use request::CallRequest;
pub use response::{CallResponse, FileAttachment};
pub use result::RpcResult;
pub use status::{StatusCode, UnknownStatusCode};
pub use types::RequestId;
