//! # Cache Prelude
//!
//! ```rust
//! use turul_rpc_cache::prelude::*;
//! ```

pub use crate::{CacheBackend, CacheError, CacheGroup, GroupInfo};

#[cfg(feature = "in-memory")]
pub use crate::{InMemoryCacheBackend, InMemoryConfig};
