//! Structured error payload sent to a client whose request failed.

use serde::Serialize;

use crate::time_util;

/// Error code for a subscribe request that could not be honoured.
pub const SUBSCRIBE_FAILED: &str = "SUBSCRIBE_FAILED";

/// Error code for a client frame the server could not parse.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// `{code, message, severity, timestamp}` with an ISO-8601 timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub severity: String,
    pub timestamp: String,
}

impl ClientError {
    /// An `error`-severity payload stamped with the current time.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self { code: code.to_string(), message: message.into(), severity: "error".into(), timestamp: time_util::now_iso8601() }
    }

    pub fn subscribe_failed(message: impl Into<String>) -> Self {
        Self::error(SUBSCRIBE_FAILED, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_failed_shape() {
        let e = ClientError::subscribe_failed("malformed feed key 'badkey'");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["code"], "SUBSCRIBE_FAILED");
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "malformed feed key 'badkey'");
        assert!(chrono::DateTime::parse_from_rfc3339(v["timestamp"].as_str().unwrap()).is_ok());
    }
}
