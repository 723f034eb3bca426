//! # Protocol Prelude
//!
//! ```rust
//! use turul_rpc_protocol::prelude::*;
//! ```

pub use crate::request::CallRequest;
pub use crate::response::{CallResponse, FileAttachment};
pub use crate::result::RpcResult;
pub use crate::status::StatusCode;
pub use crate::types::RequestId;
