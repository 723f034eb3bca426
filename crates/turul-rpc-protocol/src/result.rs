//! Typed result family
//!
//! Contracts whose methods return `RpcResult<T>` report expected business
//! failures as data. Callers branch on [`RpcResult::failed`] instead of on the
//! response status, which stays `OK`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResult<T = Value> {
    pub failed: bool,
    #[serde(default)]
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> RpcResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            failed: false,
            status: 0,
            message: None,
            data: Some(data),
        }
    }

    pub fn fail(status: i32, message: impl Into<String>) -> Self {
        Self {
            failed: true,
            status,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        !self.failed
    }

    /// Convert into a std `Result`, pairing the status with the message
    pub fn into_result(self) -> Result<Option<T>, (i32, String)> {
        if self.failed {
            Err((self.status, self.message.unwrap_or_default()))
        } else {
            Ok(self.data)
        }
    }
}

impl RpcResult<()> {
    /// A successful result that carries no data
    pub fn done() -> Self {
        Self {
            failed: false,
            status: 0,
            message: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_result_shape() {
        let result: RpcResult = RpcResult::fail(409, "name unchanged");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json, json!({"failed": true, "status": 409, "message": "name unchanged"}));
        assert_eq!(result.into_result(), Err((409, "name unchanged".to_string())));
    }

    #[test]
    fn test_ok_result_from_wire() {
        let result: RpcResult<i64> =
            serde_json::from_value(json!({"failed": false, "data": 5})).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.into_result(), Ok(Some(5)));
    }
}
