//! Actix transport
//!
//! Mounts the gateway as the default service of an actix-web `App`, behind the permissive
//! CORS middleware. Requests whose body was already decoded by an earlier middleware carry a
//! [`PreparsedBody`] extension and skip payload reading.

use actix_web::http::header as actix_header;
use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpMessage, HttpRequest, HttpResponse, HttpServer};
use bytes::Bytes;
use futures_util::Stream;
use std::fmt;
use std::io;
use std::time::Instant;

use crate::body::{carries_payload, decode_body, Decoded};
use crate::context::{RequestContext, RequestHead};
use crate::cors;
use crate::dispatcher::{Dispatcher, Routed};
use crate::encoder::{encode, Encoded, EncodedBody};
use crate::range::apply_range;

/// Request extension holding a body decoded upstream of the gateway.
#[derive(Debug, Clone)]
pub struct PreparsedBody(pub Decoded);

/// Install the gateway as the default service.
pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(dispatch));
}

/// Serve on every address until the actix system stops.
pub async fn serve_actix(addrs: Vec<(String, u16)>, dispatcher: Dispatcher) -> io::Result<()> {
    let data = web::Data::new(dispatcher);
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(from_fn(cors::actix_cors))
            .configure(config_routes)
    });
    for (host, port) in addrs {
        tracing::info!("Chatgate (actix) listening on http://{}:{}", host, port);
        server = server.bind((host.as_str(), port))?;
    }
    server.run().await
}

async fn dispatch(
    req: HttpRequest,
    payload: web::Payload,
    gateway: web::Data<Dispatcher>,
) -> HttpResponse {
    into_http_response(respond(&req, payload, &gateway).await)
}

async fn respond<S, E>(req: &HttpRequest, payload: S, gateway: &Dispatcher) -> Encoded
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let head = request_head(req);
    let entry = match gateway.route(
        &head.method,
        &head.path,
        head.client_ip().as_deref(),
        head.arrival,
    ) {
        Routed::Preflight => return cors::preflight(),
        Routed::NotFound(reply) => return encode(reply),
        Routed::Matched(entry) => entry,
    };

    let preparsed = req.extensions().get::<PreparsedBody>().cloned();
    let decoded = match preparsed {
        Some(PreparsedBody(decoded)) => decoded,
        None if carries_payload(&head.method) => {
            decode_body(payload, &head.content_type(), gateway.limits()).await
        }
        None => Decoded::default(),
    };

    let method = head.method.clone();
    let range = head.headers.get(http::header::RANGE).cloned();
    let ctx = RequestContext::assemble(head, decoded);
    apply_range(encode(gateway.invoke(&entry, ctx).await), &method, range.as_ref())
}

/// Translate the actix request head into the transport-neutral one.
fn request_head(req: &HttpRequest) -> RequestHead {
    let method = http::Method::from_bytes(req.method().as_str().as_bytes()).unwrap_or_default();
    let mut headers = http::HeaderMap::with_capacity(req.headers().len());
    for (name, value) in req.headers().iter() {
        if let (Ok(n), Ok(v)) = (
            http::HeaderName::from_bytes(name.as_str().as_bytes()),
            http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(n, v);
        }
    }
    let query = req.query_string();
    RequestHead {
        method,
        path: req.path().to_string(),
        query_string: (!query.is_empty()).then(|| query.to_string()),
        headers,
        arrival: Instant::now(),
    }
}

fn into_http_response(encoded: Encoded) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(encoded.status.as_u16())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    for (name, value) in encoded.headers.iter() {
        if let (Ok(n), Ok(v)) = (
            actix_header::HeaderName::from_bytes(name.as_str().as_bytes()),
            actix_header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.append_header((n, v));
        }
    }
    match encoded.body {
        EncodedBody::Empty => builder.finish(),
        EncodedBody::Full(bytes) => builder.body(bytes),
        EncodedBody::Stream(stream) => builder.streaming(stream),
    }
}
