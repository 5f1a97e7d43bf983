//! Invocation result (payload of RESULT frames).
//!
//! JSON form carries a `status` discriminator:
//!
//! ```text
//! {"status":"success","requestId":"r-1","value":5}
//! {"status":"failure","requestId":"r-1","errorType":"MethodNotFound","errorMessage":"..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Well-known `error_type` values produced by the relay itself.
pub mod error_types {
    /// The broker has no open connection for the target client.
    pub const CLIENT_NOT_AVAILABLE: &str = "ClientNotAvailable";
    /// The target has no handler registered under the method id.
    pub const METHOD_NOT_FOUND: &str = "MethodNotFound";
    /// Arguments could not be decoded into the handler's parameter types.
    pub const ILLEGAL_ARGUMENT: &str = "IllegalArgument";
    /// The target is at its concurrent-handler limit.
    pub const OVERLOADED: &str = "Overloaded";
    /// A handler result could not be serialized.
    pub const SERIALIZATION: &str = "Serialization";
    /// The handler task panicked.
    pub const INTERNAL: &str = "InternalError";
}

/// Outcome of one invocation. Exactly one arm exists per result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
    /// The method returned a value (`null` for unit).
    #[serde(rename_all = "camelCase")]
    Success {
        request_id: String,
        #[serde(default)]
        value: Value,
    },
    /// The method (or the relay on its behalf) failed.
    #[serde(rename_all = "camelCase")]
    Failure {
        request_id: String,
        error_type: String,
        error_message: String,
    },
}

impl InvocationResult {
    pub fn success(request_id: impl Into<String>, value: Value) -> Self {
        Self::Success {
            request_id: request_id.into(),
            value,
        }
    }

    pub fn failure(
        request_id: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::Failure {
            request_id: request_id.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }

    /// Build a failure from a handler error.
    pub fn from_error(request_id: impl Into<String>, error: InvocationError) -> Self {
        Self::failure(request_id, error.error_type, error.message)
    }

    /// Echo of the originating request's id.
    pub fn request_id(&self) -> &str {
        match self {
            Self::Success { request_id, .. } | Self::Failure { request_id, .. } => request_id,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Convert into the caller-facing outcome.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure {
                error_type,
                error_message,
                ..
            } => Err(RelayError::Remote {
                error_type,
                error_message,
            }),
        }
    }
}

/// Error returned by a local method handler.
///
/// Carried back to the caller as `Failure(error_type, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationError {
    pub error_type: String,
    pub message: String,
}

impl InvocationError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(error_types::ILLEGAL_ARGUMENT, message)
    }
}

impl std::fmt::Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for InvocationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_json_shape() {
        let result = InvocationResult::success("r-1", json!(5));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({"status": "success", "requestId": "r-1", "value": 5})
        );
    }

    #[test]
    fn test_failure_json_shape() {
        let result = InvocationResult::failure("r-2", "MethodNotFound", "no such method");
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({
                "status": "failure",
                "requestId": "r-2",
                "errorType": "MethodNotFound",
                "errorMessage": "no such method"
            })
        );
    }

    #[test]
    fn test_success_without_value_is_null() {
        let result: InvocationResult =
            serde_json::from_value(json!({"status": "success", "requestId": "r-3"})).unwrap();

        assert_eq!(result, InvocationResult::success("r-3", Value::Null));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result: std::result::Result<InvocationResult, _> =
            serde_json::from_value(json!({"status": "maybe", "requestId": "r-4"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_request_id_for_both_arms() {
        assert_eq!(InvocationResult::success("a", json!(1)).request_id(), "a");
        assert_eq!(InvocationResult::failure("b", "T", "m").request_id(), "b");
    }

    #[test]
    fn test_into_value() {
        assert_eq!(
            InvocationResult::success("a", json!("ok")).into_value().unwrap(),
            json!("ok")
        );

        let err = InvocationResult::failure("b", "ArithmeticError", "divide by zero")
            .into_value()
            .unwrap_err();
        match err {
            RelayError::Remote {
                error_type,
                error_message,
            } => {
                assert_eq!(error_type, "ArithmeticError");
                assert_eq!(error_message, "divide by zero");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_error() {
        let result = InvocationResult::from_error("c", InvocationError::illegal_argument("bad"));

        assert!(result.is_failure());
        assert_eq!(
            result,
            InvocationResult::failure("c", error_types::ILLEGAL_ARGUMENT, "bad")
        );
    }
}
