//! Inbound response types.
//!
//! The core only looks at `(id, success-or-error)`. Success values are a
//! closed set of [`Reply`] variants; interpreting them is left to callers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Response
// ============================================================================

/// A response from the companion process.
///
/// # Format
///
/// Success:
/// ```json
/// { "callbackIdx": 3, "type": "value", "value": "bar" }
/// ```
///
/// Error:
/// ```json
/// { "callbackIdx": 3, "type": "requestError", "kind": "timeout", "message": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request's ID.
    #[serde(rename = "callbackIdx")]
    pub id: RequestId,

    /// Outcome.
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    /// Creates a response.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, body: ResponseBody) -> Self {
        Self { id, body }
    }
}

// ============================================================================
// ResponseBody
// ============================================================================

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResponseBody {
    /// Constant `OK`.
    Ok,
    /// Empty result.
    Nil,
    /// Data result.
    Value {
        /// The returned data.
        value: Value,
    },
    /// The backend rejected this request.
    RequestError {
        /// Error category, `unspecified` when absent.
        #[serde(default)]
        kind: RequestErrorKind,
        /// Error message.
        message: String,
    },
    /// The companion process is closing the connection.
    ClosingError {
        /// Why it is closing.
        message: String,
    },
}

impl ResponseBody {
    /// Converts the body into the value or error handed to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::Request`] for `RequestError`
    /// - [`Error::Closing`] for `ClosingError`
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Self::Ok => Ok(Reply::Ok),
            Self::Nil => Ok(Reply::Nil),
            Self::Value { value } => Ok(Reply::Value(value)),
            Self::RequestError { kind, message } => Err(Error::request(kind, message)),
            Self::ClosingError { message } => Err(Error::closing(message)),
        }
    }
}

// ============================================================================
// RequestErrorKind
// ============================================================================

/// Category of a backend-reported request error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestErrorKind {
    /// Error the companion did not categorize.
    #[default]
    Unspecified,
    /// A transaction was aborted.
    ExecAbort,
    /// The backend did not answer in time.
    Timeout,
    /// The backend connection dropped while the request was in flight.
    Disconnect,
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "Unspecified",
            Self::ExecAbort => "ExecAbort",
            Self::Timeout => "Timeout",
            Self::Disconnect => "Disconnect",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Reply
// ============================================================================

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Constant `OK`.
    Ok,
    /// Empty result.
    Nil,
    /// Data result.
    Value(Value),
}

impl Reply {
    /// Returns `true` for the constant `OK`.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` for an empty result.
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the string if the result is a string value.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(value) => value.as_str(),
            _ => None,
        }
    }

    /// Converts into a JSON value. `OK` becomes `"OK"`, empty becomes `null`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Ok => Value::String("OK".to_string()),
            Self::Nil => Value::Null,
            Self::Value(value) => value,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{from_str, json};

    #[test]
    fn test_parse_ok_response() {
        let response: Response = from_str(r#"{"callbackIdx":0,"type":"ok"}"#).expect("parse");
        assert_eq!(response.id, RequestId::HANDSHAKE);
        assert_eq!(response.body, ResponseBody::Ok);
    }

    #[test]
    fn test_parse_value_response() {
        let response: Response =
            from_str(r#"{"callbackIdx":4,"type":"value","value":["a",1]}"#).expect("parse");
        assert_eq!(response.id, RequestId::new(4));

        let reply = response.body.into_result().expect("ok");
        assert_eq!(reply, Reply::Value(json!(["a", 1])));
    }

    #[test]
    fn test_parse_request_error() {
        let response: Response = from_str(
            r#"{"callbackIdx":9,"type":"requestError","kind":"execAbort","message":"aborted"}"#,
        )
        .expect("parse");

        let err = response.body.into_result().expect_err("error");
        assert!(matches!(
            err,
            Error::Request {
                kind: RequestErrorKind::ExecAbort,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_closing_error() {
        let response: Response =
            from_str(r#"{"callbackIdx":2,"type":"closingError","message":"shutting down"}"#)
                .expect("parse");

        let err = response.body.into_result().expect_err("error");
        assert!(err.is_closing());
    }

    #[test]
    fn test_error_kind_defaults_to_unspecified() {
        let response: Response =
            from_str(r#"{"callbackIdx":4,"type":"requestError","message":"boom"}"#).expect("parse");
        assert_eq!(
            response.body,
            ResponseBody::RequestError {
                kind: RequestErrorKind::Unspecified,
                message: "boom".into(),
            }
        );
    }

    #[test]
    fn test_parse_unknown_type_fails() {
        let result = from_str::<Response>(r#"{"callbackIdx":2,"type":"mystery"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_helpers() {
        assert!(Reply::Ok.is_ok());
        assert!(Reply::Nil.is_nil());
        assert_eq!(Reply::Value(json!("bar")).as_str(), Some("bar"));
        assert_eq!(Reply::Ok.into_value(), json!("OK"));
        assert_eq!(Reply::Nil.into_value(), Value::Null);
    }
}
