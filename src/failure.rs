//! Error translation
//!
//! Turns any [`HandlerError`] into the `{code, message, data?}` wire payload and an HTTP status.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::envelope::Reply;
use crate::exception::{is_client_fault, GatewayException, HandlerError, SYSTEM_ERROR};

/// Failure payload sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Mapped HTTP status; not part of the wire shape.
    #[serde(skip, default = "default_failure_status")]
    pub status: StatusCode,
}

fn default_failure_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl FailureBody {
    /// Minimal payload used when even formatting the underlying error failed.
    pub fn internal() -> Self {
        Self {
            code: SYSTEM_ERROR.code,
            message: "internal error".into(),
            data: None,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn from_exception(ex: &GatewayException) -> Self {
        let status = ex.http_status.unwrap_or(if is_client_fault(ex.code) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        });
        Self {
            code: ex.code,
            message: ex.message.clone(),
            data: ex.data.clone(),
            status,
        }
    }

    /// Serialize to the JSON wire shape.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "code": SYSTEM_ERROR.code, "message": "internal error" })
        })
    }
}

impl From<GatewayException> for FailureBody {
    fn from(ex: GatewayException) -> Self {
        Self::from_exception(&ex)
    }
}

/// Map an error to its failure payload and HTTP status. Never panics.
pub fn translate(err: &HandlerError) -> (FailureBody, StatusCode) {
    let body = catch_unwind(AssertUnwindSafe(|| match err {
        HandlerError::Domain(ex) => FailureBody::from_exception(ex),
        HandlerError::Fault(fault) => FailureBody {
            code: SYSTEM_ERROR.code,
            message: fault.to_string(),
            data: None,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        },
    }))
    .unwrap_or_else(|_| FailureBody::internal());
    let status = body.status;
    (body, status)
}

/// Log `err` once at error level and wrap its translation into a [`Reply`].
pub fn failure_reply(err: &HandlerError) -> Reply {
    let (body, status) = translate(err);
    match err {
        HandlerError::Domain(ex) => tracing::error!(
            code = ex.code,
            status = status.as_u16(),
            data = ?ex.data,
            "{}",
            ex.message
        ),
        HandlerError::Fault(fault) => tracing::error!(status = status.as_u16(), "{:?}", fault),
    }
    Reply::failure(body)
}

/// Failure payload for a handler that panicked.
pub fn panic_failure(panic: Box<dyn std::any::Any + Send>) -> HandlerError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    HandlerError::fault(message)
}
