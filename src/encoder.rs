//! Response encoding
//!
//! [`encode`] turns a [`Reply`] into status, headers and body bytes (or a stream). The
//! transports only translate an [`Encoded`] into their native response type.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::envelope::{ByteStream, Reply, ReplyBody};
use crate::failure::FailureBody;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";
const HTML: &str = "text/html; charset=utf-8";
const OCTET: &str = "application/octet-stream";

/// Serialized body.
pub enum EncodedBody {
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodedBody::Empty => f.write_str("Empty"),
            EncodedBody::Full(b) => f.debug_tuple("Full").field(b).finish(),
            EncodedBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Transport-neutral serialized response.
#[derive(Debug)]
pub struct Encoded {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: EncodedBody,
}

impl Encoded {
    /// Body bytes of a non-streaming response.
    pub fn full_body(&self) -> Option<&Bytes> {
        match &self.body {
            EncodedBody::Full(b) => Some(b),
            _ => None,
        }
    }
}

/// Resolve a short content-type name (`"html"`, `"json"`) to a MIME type. Anything that
/// already looks like a MIME type, or that has no known mapping, is used literally.
pub fn resolve_content_type(name: &str) -> String {
    if name.contains('/') {
        return name.to_string();
    }
    let ext = name.trim_start_matches('.');
    mime_guess::from_ext(ext)
        .first_raw()
        .map(str::to_string)
        .unwrap_or_else(|| name.to_string())
}

/// Serialize a reply. Pure: equal replies yield identical output.
pub fn encode(reply: Reply) -> Encoded {
    let Reply {
        status,
        content_type,
        headers: extra,
        redirect,
        body,
        size,
        ..
    } = reply;

    let mut status = status.unwrap_or(match &body {
        ReplyBody::Failure(f) => f.status,
        _ => StatusCode::OK,
    });

    let mut headers = HeaderMap::new();
    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(n), Ok(v)) => {
                headers.append(n, v);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid response header"),
        }
    }

    if let Some(len) = size {
        if !headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
    }

    if let Some(name) = content_type {
        if let Ok(v) = HeaderValue::from_str(&resolve_content_type(&name)) {
            headers.entry(header::CONTENT_TYPE).or_insert(v);
        }
    }

    if let Some(target) = redirect {
        match HeaderValue::from_str(&target) {
            Ok(v) => {
                headers.insert(header::LOCATION, v);
                if !status.is_redirection() {
                    status = StatusCode::FOUND;
                }
            }
            Err(_) => tracing::warn!(target = %target, "Skipping invalid redirect target"),
        }
    }

    let (body, inferred) = match body {
        ReplyBody::Empty => (EncodedBody::Empty, None),
        ReplyBody::Failure(failure) => (EncodedBody::Full(failure_bytes(&failure)), Some(JSON)),
        ReplyBody::Json(value) => (
            EncodedBody::Full(serde_json::to_vec(&value).map(Bytes::from).unwrap_or_default()),
            Some(JSON),
        ),
        ReplyBody::Text(text) => {
            let ct = if text.trim_start().starts_with('<') {
                HTML
            } else {
                TEXT
            };
            (EncodedBody::Full(Bytes::from(text)), Some(ct))
        }
        ReplyBody::Bytes(bytes) => (EncodedBody::Full(bytes), Some(OCTET)),
        ReplyBody::Stream(stream) => (EncodedBody::Stream(stream), Some(OCTET)),
    };
    if let Some(ct) = inferred {
        headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(ct));
    }

    Encoded {
        status,
        headers,
        body,
    }
}

fn failure_bytes(failure: &FailureBody) -> Bytes {
    serde_json::to_vec(&failure.to_json())
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(br#"{"code":-1000,"message":"internal error"}"#))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn sample() -> Reply {
        Reply::json(json!({"id": "chatcmpl-1", "choices": []}))
            .with_header("x-trace", "abc")
            .with_size(37)
    }

    #[test]
    fn encoding_is_idempotent() {
        let a = encode(sample());
        let b = encode(sample());
        assert_eq!(a.status, b.status);
        assert_eq!(a.headers, b.headers);
        assert_eq!(a.full_body(), b.full_body());
    }

    #[test]
    fn plain_text_defaults() {
        let encoded = encode(Reply::from("ok"));
        assert_eq!(encoded.status, StatusCode::OK);
        assert_eq!(encoded.headers[header::CONTENT_TYPE], TEXT);
        assert_eq!(encoded.full_body().unwrap(), &Bytes::from_static(b"ok"));
    }

    #[test]
    fn html_text_is_sniffed() {
        let encoded = encode(Reply::text("<h1>hi</h1>"));
        assert_eq!(encoded.headers[header::CONTENT_TYPE], HTML);
    }

    #[test]
    fn short_content_type_names_resolve() {
        assert_eq!(resolve_content_type("html"), "text/html");
        assert_eq!(resolve_content_type("json"), "application/json");
        assert_eq!(resolve_content_type("text/event-stream"), "text/event-stream");
        assert_eq!(resolve_content_type("not-a-type"), "not-a-type");

        let encoded = encode(Reply::bytes(&b"<p/>"[..]).with_content_type("html"));
        assert_eq!(encoded.headers[header::CONTENT_TYPE], "text/html");
    }

    #[test]
    fn failure_serializes_with_status() {
        let failure = FailureBody {
            code: 40001,
            message: "bad request".into(),
            data: None,
            status: StatusCode::BAD_REQUEST,
        };
        let encoded = encode(Reply::failure(failure));
        assert_eq!(encoded.status, StatusCode::BAD_REQUEST);
        assert_eq!(encoded.headers[header::CONTENT_TYPE], JSON);
        let body: serde_json::Value =
            serde_json::from_slice(encoded.full_body().unwrap()).unwrap();
        assert_eq!(body, json!({"code": 40001, "message": "bad request"}));
    }

    #[test]
    fn explicit_headers_win() {
        let encoded = encode(
            Reply::json(json!([1, 2]))
                .with_header("content-type", "application/vnd.api+json")
                .with_header("Content-Length", "5")
                .with_size(99),
        );
        assert_eq!(
            encoded.headers[header::CONTENT_TYPE],
            "application/vnd.api+json"
        );
        assert_eq!(encoded.headers[header::CONTENT_LENGTH], "5");
    }

    #[test]
    fn handler_content_type_header_beats_content_type_name() {
        let encoded = encode(
            Reply::text("x")
                .with_header("content-type", "application/vnd.custom")
                .with_content_type("html"),
        );
        assert_eq!(encoded.headers[header::CONTENT_TYPE], "application/vnd.custom");
        assert_eq!(encoded.headers.get_all(header::CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn size_synthesizes_content_length() {
        let encoded = encode(Reply::bytes(vec![0u8; 3]).with_size(3));
        assert_eq!(encoded.headers[header::CONTENT_LENGTH], "3");
    }

    #[test]
    fn redirect_sets_location_and_found() {
        let encoded = encode(Reply::redirect("/welcome"));
        assert_eq!(encoded.status, StatusCode::FOUND);
        assert_eq!(encoded.headers[header::LOCATION], "/welcome");

        let encoded = encode(Reply::redirect("/moved").with_status(StatusCode::MOVED_PERMANENTLY));
        assert_eq!(encoded.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn streams_stay_streams() {
        let s = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"data: 1\n\n"))]);
        let encoded = encode(Reply::stream(s).with_content_type("text/event-stream"));
        assert!(matches!(encoded.body, EncodedBody::Stream(_)));
        assert_eq!(encoded.headers[header::CONTENT_TYPE], "text/event-stream");
    }
}
