//! Permissive CORS
//!
//! Every response gets allow-origin/headers/methods unless the handler already set them.
//! `OPTIONS` requests are answered directly with an empty 204.

use actix_web::body::BoxBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::HttpResponse;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::encoder::{Encoded, EncodedBody};

/// Headers appended to every outgoing response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-headers", "*"),
    ("access-control-allow-methods", "GET,POST,OPTIONS"),
];

/// Add missing CORS headers to an `http` header map.
pub fn apply(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        let name = HeaderName::from_static(name);
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
}

/// Empty 204 answer to a preflight request.
pub fn preflight() -> Encoded {
    let mut headers = HeaderMap::new();
    apply(&mut headers);
    Encoded {
        status: StatusCode::NO_CONTENT,
        headers,
        body: EncodedBody::Empty,
    }
}

/// Actix middleware: short-circuits `OPTIONS` and decorates every other response.
pub async fn actix_cors(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, actix_web::Error> {
    if req.method() == actix_web::http::Method::OPTIONS {
        let mut res = HttpResponse::NoContent().finish();
        apply_actix(res.headers_mut());
        return Ok(req.into_response(res));
    }
    let mut res = next.call(req).await?;
    apply_actix(res.headers_mut());
    Ok(res)
}

fn apply_actix(headers: &mut actix_web::http::header::HeaderMap) {
    use actix_web::http::header::{HeaderName, HeaderValue};
    for (name, value) in CORS_HEADERS {
        let name = HeaderName::from_static(name);
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
}
