use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::StatusCode;
use crate::types::RequestId;

/// Downloadable content a contract attaches to its response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl FileAttachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content,
        }
    }
}

/// Wire-ready outcome of one call
///
/// `values[0]` is the return value. For methods with pass-by-reference
/// parameters, `values[i + 1]` holds the final value of parameter `i` when it
/// is by-ref and `null` otherwise. Responses that never reached the method
/// carry no values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub status: StatusCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub id: RequestId,
}

impl CallResponse {
    /// Create a response with the status's default reason phrase
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: status.message().to_string(),
            ..Default::default()
        }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn ok(values: Vec<Value>) -> Self {
        Self {
            values,
            ..Self::new(StatusCode::Ok)
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::NotFound, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::Unauthorized)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(StatusCode::InternalServerError, message)
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// The method's return value, if the call got that far
    pub fn return_value(&self) -> Option<&Value> {
        self.values.first()
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_string};

    #[test]
    fn test_response_serialization() {
        let mut response = CallResponse::ok(vec![json!(5)]);
        response.id = RequestId::Number(9);
        response.session_id = "s-1".to_string();

        let json_str = to_string(&response).unwrap();
        let parsed: CallResponse = from_str(&json_str).unwrap();

        assert_eq!(parsed.status, StatusCode::Ok);
        assert_eq!(parsed.return_value(), Some(&json!(5)));
        assert_eq!(parsed.id, RequestId::Number(9));
        assert_eq!(parsed.session_id, "s-1");
    }

    #[test]
    fn test_error_responses_carry_no_values() {
        let response = CallResponse::not_found("Contract 'Nope' not found");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], 404);
        assert!(json.get("values").is_none());
        assert_eq!(response.return_value(), None);
    }

    #[test]
    fn test_file_attachment_base64() {
        let file = FileAttachment::new("hello.txt", "text/plain", b"hello".to_vec());
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["content"], "aGVsbG8=");

        let back: FileAttachment = serde_json::from_value(json).unwrap();
        assert_eq!(back.content, b"hello");
    }
}
