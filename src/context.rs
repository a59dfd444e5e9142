//! Request context
//!
//! The normalized, read-only view of an inbound request handed to route handlers. Both
//! transports produce exactly this shape.

use http::header::{HeaderMap, CONTENT_TYPE};
use http::Method;
use std::collections::HashMap;
use std::time::Instant;

use crate::body::{Decoded, RequestBody, UploadedFile};

/// Headers consulted for the client address, highest priority first.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["x-real-ip", "x-forwarded-for", "cf-connecting-ip"];

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    /// Path plus query string, as received.
    pub url: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub content_type: String,
    pub body: RequestBody,
    pub files: HashMap<String, UploadedFile>,
    pub client_ip: Option<String>,
    pub arrival: Instant,
}

/// Transport-independent request head collected by the adapters before body decoding.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query_string: Option<String>,
    pub headers: HeaderMap,
    pub arrival: Instant,
}

impl RequestHead {
    pub fn content_type(&self) -> String {
        header_str(&self.headers, CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn client_ip(&self) -> Option<String> {
        resolve_client_ip(&self.headers)
    }
}

impl RequestContext {
    /// Assemble the context from a request head and its decoded body.
    pub fn assemble(head: RequestHead, decoded: Decoded) -> Self {
        let content_type = head.content_type();
        let client_ip = head.client_ip();
        let request_id = header_str(&head.headers, X_REQUEST_ID)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (url, query) = match head.query_string.as_deref() {
            Some(q) if !q.is_empty() => (format!("{}?{}", head.path, q), parse_query(q)),
            _ => (head.path.clone(), HashMap::new()),
        };
        Self {
            request_id,
            method: head.method,
            url,
            path: head.path,
            query,
            headers: head.headers,
            content_type,
            body: decoded.body,
            files: decoded.files,
            client_ip,
            arrival: head.arrival,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Bearer token from the `Authorization` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: Method, path: &str) -> Self {
        Self::assemble(
            RequestHead {
                method,
                path: path.to_string(),
                query_string: None,
                headers: HeaderMap::new(),
                arrival: Instant::now(),
            },
            Decoded::default(),
        )
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Client address from proxy headers; the first hop of `x-forwarded-for` is used.
pub fn resolve_client_ip(headers: &HeaderMap) -> Option<String> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        header_str(headers, name)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Parse a query string; repeated keys keep the last value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}
