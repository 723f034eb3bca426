use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::RequestId;

/// A decoded call, as handed to the engine by the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Contract (service) name, compared case-insensitively
    pub contract: String,
    /// Method name, compared case-insensitively
    pub method: String,
    /// Positional parameter values
    #[serde(default)]
    pub params: Vec<Value>,
    /// Correlation id echoed on the response
    #[serde(default)]
    pub id: RequestId,
    /// Session id, empty when the caller has none yet
    #[serde(default)]
    pub session_id: String,
}

impl CallRequest {
    pub fn new(contract: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            contract: contract.into(),
            method: method.into(),
            params,
            id: RequestId::default(),
            session_id: String::new(),
        }
    }

    /// Set the correlation id
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach an existing session id
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn has_session(&self) -> bool {
        !self.session_id.is_empty()
    }

    /// Get a parameter by position
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json};

    #[test]
    fn test_request_defaults_from_wire() {
        let request: CallRequest = from_value(json!({
            "contract": "Calc",
            "method": "Add",
            "params": [2, 3]
        }))
        .unwrap();

        assert_eq!(request.contract, "Calc");
        assert_eq!(request.param(1), Some(&json!(3)));
        assert!(!request.has_session());
        assert_eq!(request.id, RequestId::Number(0));
    }

    #[test]
    fn test_request_builder() {
        let request = CallRequest::new("Keys", "Rename", vec![json!("a"), json!("b")])
            .with_id("req-1")
            .with_session("s-1");

        assert_eq!(request.id, RequestId::String("req-1".to_string()));
        assert_eq!(request.session_id, "s-1");
        assert!(request.has_session());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sessionId"], "s-1");
    }
}
