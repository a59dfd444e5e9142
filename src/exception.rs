//! Domain exceptions
//!
//! Expected, application-defined failures carrying a stable numeric code. Handlers raise
//! them through [`HandlerError::Domain`]; anything else becomes [`HandlerError::Fault`].

use http::StatusCode;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A `(code, default message)` entry of the exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionKind {
    pub code: i64,
    pub message: &'static str,
}

impl ExceptionKind {
    pub const fn new(code: i64, message: &'static str) -> Self {
        Self { code, message }
    }
}

/// Unexpected internal error; also the generic sentinel for non-domain faults.
pub const SYSTEM_ERROR: ExceptionKind = ExceptionKind::new(-1000, "system error");
/// Request parameters failed validation.
pub const SYSTEM_REQUEST_VALIDATION_ERROR: ExceptionKind =
    ExceptionKind::new(-1001, "request validation error");
/// No route matched the request method and path.
pub const SYSTEM_NOT_ROUTE_MATCHING: ExceptionKind =
    ExceptionKind::new(-1002, "no matching route");

pub const API_TEST: ExceptionKind = ExceptionKind::new(-9999, "api test");
pub const API_REQUEST_PARAMS_INVALID: ExceptionKind =
    ExceptionKind::new(-2000, "request params invalid");
pub const API_REQUEST_FAILED: ExceptionKind = ExceptionKind::new(-2001, "request failed");
pub const API_TOKEN_EXPIRES: ExceptionKind = ExceptionKind::new(-2002, "token expired");
pub const API_FILE_URL_INVALID: ExceptionKind = ExceptionKind::new(-2003, "file url invalid");
pub const API_FILE_EXECEEDS_SIZE: ExceptionKind =
    ExceptionKind::new(-2004, "file exceeds size limit");
pub const API_CHAT_STREAM_PUSHING: ExceptionKind =
    ExceptionKind::new(-2005, "chat stream is already pushing");
pub const API_CONTENT_FILTERED: ExceptionKind = ExceptionKind::new(-2006, "content filtered");

/// Codes that denote a client fault when no explicit HTTP status was attached.
const CLIENT_FAULT_CODES: [i64; 2] = [
    SYSTEM_REQUEST_VALIDATION_ERROR.code,
    API_REQUEST_PARAMS_INVALID.code,
];

/// Returns true if `code` belongs to the client-fault category (mapped to HTTP 400).
pub fn is_client_fault(code: i64) -> bool {
    CLIENT_FAULT_CODES.contains(&code) || (40000..=49999).contains(&code)
}

/// An expected failure with a stable code, a message and optional payload/status overrides.
#[derive(Debug, Clone)]
pub struct GatewayException {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
    pub http_status: Option<StatusCode>,
}

impl GatewayException {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            http_status: None,
        }
    }

    /// Raise a table entry with its default message.
    pub fn from_kind(kind: ExceptionKind) -> Self {
        Self::new(kind.code, kind.message)
    }

    /// Raise a table entry with a custom message.
    pub fn with_message(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self::new(kind.code, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = if data.is_null() { None } else { Some(data) };
        self
    }

    pub fn with_http_status(mut self, status: StatusCode) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Catch-by-code comparison against a table entry.
    pub fn is(&self, kind: &ExceptionKind) -> bool {
        self.code == kind.code
    }
}

impl PartialEq for GatewayException {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for GatewayException {}

impl fmt::Display for GatewayException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayException {}

impl From<ExceptionKind> for GatewayException {
    fn from(kind: ExceptionKind) -> Self {
        Self::from_kind(kind)
    }
}

/// Error type returned by route handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Domain(#[from] GatewayException),
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl HandlerError {
    /// Build a generic fault from any message.
    pub fn fault(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Fault(anyhow::Error::msg(message))
    }
}

impl From<ExceptionKind> for HandlerError {
    fn from(kind: ExceptionKind) -> Self {
        Self::Domain(kind.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Fault(err.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::Fault(err.into())
    }
}
