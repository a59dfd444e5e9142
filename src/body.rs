//! Request body decoding
//!
//! Content-type driven, best effort. Every failure path degrades to a neutral value so
//! handlers always receive a well-formed context:
//! - `application/json` → parsed value, or [`RequestBody::Empty`] when malformed
//! - `application/x-www-form-urlencoded` → flat string map
//! - `multipart/form-data` → fields into the body, uploads into `files`
//! - `text/*` and everything else → text ([`RequestBody::Null`] when the read fails)

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use thiserror::Error;

use crate::exception::{GatewayException, HandlerError, SYSTEM_REQUEST_VALIDATION_ERROR};

/// Decoded request payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No payload, or a payload that could not be decoded. Reads as `{}`.
    #[default]
    Empty,
    Json(Value),
    /// Urlencoded pairs or non-file multipart fields.
    Form(BTreeMap<String, String>),
    Text(String),
    /// The raw payload could not be read at all.
    Null,
}

impl RequestBody {
    /// JSON view of the body.
    pub fn to_value(&self) -> Value {
        match self {
            RequestBody::Empty => Value::Object(Map::new()),
            RequestBody::Json(v) => v.clone(),
            RequestBody::Form(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            RequestBody::Text(t) => Value::String(t.clone()),
            RequestBody::Null => Value::Null,
        }
    }

    /// Deserialize the body into `T`, raising a validation exception on mismatch.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            GatewayException::with_message(
                SYSTEM_REQUEST_VALIDATION_ERROR,
                format!("invalid request body: {e}"),
            )
            .into()
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// A file part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Output of [`decode_body`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub body: RequestBody,
    pub files: HashMap<String, UploadedFile>,
}

impl Decoded {
    fn body(body: RequestBody) -> Self {
        Self {
            body,
            files: HashMap::new(),
        }
    }
}

/// Per-request body limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    /// Upper bound on the raw payload size in bytes.
    pub max_bytes: usize,
    /// Upper bound on multipart parts.
    pub max_fields: usize,
    /// Upper bound on a single multipart part in bytes.
    pub max_file_bytes: u64,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            max_fields: 1000,
            max_file_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Error, Debug)]
pub enum BodyReadError {
    #[error("payload exceeds limit of {0} bytes")]
    TooLarge(usize),
    #[error("payload read failed: {0}")]
    Read(String),
}

/// Methods whose requests are decoded; all others get an empty body.
pub fn carries_payload(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Collect a byte stream, failing once more than `limit` bytes arrived.
pub async fn read_limited<S, E>(stream: S, limit: usize) -> Result<Bytes, BodyReadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    futures_util::pin_mut!(stream);
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyReadError::Read(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyReadError::TooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Read and decode a payload stream according to `content_type`. Never fails.
pub async fn decode_body<S, E>(stream: S, content_type: &str, limits: &BodyLimits) -> Decoded
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let raw = read_limited(stream, limits.max_bytes).await;
    decode_raw(raw, content_type, limits).await
}

/// Decode an already collected payload (or the error that interrupted reading it).
pub async fn decode_raw(
    raw: Result<Bytes, BodyReadError>,
    content_type: &str,
    limits: &BodyLimits,
) -> Decoded {
    let kind = content_type.trim().to_ascii_lowercase();
    let bytes = match raw {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(content_type = %kind, "Parse request body failed: {}", e);
            if is_structured(&kind) {
                return Decoded::default();
            }
            return Decoded::body(RequestBody::Null);
        }
    };

    if kind.starts_with("application/json") {
        return Decoded::body(decode_json(&bytes));
    }
    if kind.starts_with("application/x-www-form-urlencoded") {
        return Decoded::body(decode_form(&bytes));
    }
    if kind.starts_with("multipart/form-data") {
        return decode_multipart(bytes, content_type, limits).await;
    }
    Decoded::body(RequestBody::Text(
        String::from_utf8_lossy(&bytes).into_owned(),
    ))
}

fn is_structured(kind: &str) -> bool {
    kind.starts_with("application/json")
        || kind.starts_with("application/x-www-form-urlencoded")
        || kind.starts_with("multipart/form-data")
}

fn decode_json(bytes: &[u8]) -> RequestBody {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => RequestBody::Json(value),
        Err(e) => {
            tracing::warn!("Parse request body failed: {}", e);
            RequestBody::Empty
        }
    }
}

fn decode_form(bytes: &[u8]) -> RequestBody {
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes) {
        Ok(pairs) => RequestBody::Form(pairs.into_iter().collect()),
        Err(e) => {
            tracing::warn!("Parse request body failed: {}", e);
            RequestBody::Empty
        }
    }
}

async fn decode_multipart(bytes: Bytes, content_type: &str, limits: &BodyLimits) -> Decoded {
    let boundary = match multer::parse_boundary(content_type) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Parse request body failed: {}", e);
            return Decoded::default();
        }
    };
    let constraints = multer::Constraints::new().size_limit(
        multer::SizeLimit::new()
            .whole_stream(limits.max_bytes as u64)
            .per_field(limits.max_file_bytes),
    );
    let source = stream::once(async move { Ok::<Bytes, Infallible>(bytes) });
    let mut multipart = multer::Multipart::with_constraints(source, boundary, constraints);

    let mut fields = BTreeMap::new();
    let mut files = HashMap::new();
    let mut count = 0usize;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Parse request body failed: {}", e);
                return Decoded::default();
            }
        };
        count += 1;
        if count > limits.max_fields {
            tracing::warn!(max_fields = limits.max_fields, "Too many multipart fields");
            return Decoded::default();
        }
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let part_type = field.content_type().map(|m| m.to_string());
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Parse request body failed: {}", e);
                return Decoded::default();
            }
        };
        match file_name {
            Some(file_name) => {
                files.insert(
                    name.clone(),
                    UploadedFile {
                        field: name,
                        file_name: Some(file_name),
                        content_type: part_type,
                        data,
                    },
                );
            }
            None => {
                fields.insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }

    Decoded {
        body: RequestBody::Form(fields),
        files,
    }
}
