use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The reply envelope for a [`Request`](super::Request).
///
/// A provider-side failure of any kind becomes a well-formed response with
/// `status == false` and an error message of the form `"<CODE>: <message>"`,
/// never a transport-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            status: true,
            data: Some(data),
            error_message: None,
        }
    }

    /// Success with no payload, for methods returning unit.
    pub fn ok_empty() -> Self {
        Self {
            status: true,
            data: None,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: false,
            data: None,
            error_message: Some(message.into()),
        }
    }
}
