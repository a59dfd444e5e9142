//! Response envelope
//!
//! [`Reply`] is the transport-neutral description of an outgoing response. Handlers either
//! build one explicitly or return a plain value that converts into one.

use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::time::Instant;

use crate::failure::FailureBody;

/// Boxed byte stream used for streaming bodies (SSE, file passthrough).
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// Response payload shapes understood by the encoder.
pub enum ReplyBody {
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(Value),
    Failure(FailureBody),
    Stream(ByteStream),
}

impl fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyBody::Empty => f.write_str("Empty"),
            ReplyBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            ReplyBody::Text(t) => f.debug_tuple("Text").field(t).finish(),
            ReplyBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ReplyBody::Failure(b) => f.debug_tuple("Failure").field(b).finish(),
            ReplyBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Transport-neutral response envelope.
#[derive(Debug)]
pub struct Reply {
    pub status: Option<StatusCode>,
    /// Content type, either a MIME string or a short name such as `"html"`.
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub redirect: Option<String>,
    pub body: ReplyBody,
    pub size: Option<u64>,
    pub timestamp: Instant,
}

impl Reply {
    pub fn new(body: ReplyBody) -> Self {
        let status = match &body {
            ReplyBody::Failure(failure) => Some(failure.status),
            _ => None,
        };
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            redirect: None,
            body,
            size: None,
            timestamp: Instant::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(ReplyBody::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ReplyBody::Text(text.into()))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(ReplyBody::Bytes(bytes.into()))
    }

    pub fn json(value: Value) -> Self {
        Self::new(ReplyBody::Json(value))
    }

    /// Serialize any value into a JSON body.
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::json(serde_json::to_value(value)?))
    }

    pub fn failure(body: FailureBody) -> Self {
        Self::new(ReplyBody::Failure(body))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::new(ReplyBody::Stream(stream.boxed()))
    }

    /// Redirect to `target`; the encoder picks 302 unless a 3xx status is set.
    pub fn redirect(target: impl Into<String>) -> Self {
        let mut reply = Self::empty();
        reply.redirect = Some(target.into());
        reply
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Stamp the completion time.
    pub fn touch(&mut self) {
        self.timestamp = Instant::now();
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.body, ReplyBody::Failure(_))
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::empty()
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::text(text)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::text(text)
    }
}

impl From<Bytes> for Reply {
    fn from(bytes: Bytes) -> Self {
        Reply::bytes(bytes)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Reply::bytes(bytes)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::json(value)
    }
}

impl From<FailureBody> for Reply {
    fn from(body: FailureBody) -> Self {
        Reply::failure(body)
    }
}
