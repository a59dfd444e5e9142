//! Fetch-style transport
//!
//! A single `Request -> Response` entry point over the `http` types, hosted by a hyper
//! HTTP/1 accept loop. Anything that can hand over an `http::Request` with a body (a
//! hyper connection, a test, an embedding runtime) can drive the gateway through
//! [`FetchHandler::call`].

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{header, Request, Response};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::time::Instant;
use tokio::net::TcpListener;

use crate::body::{carries_payload, decode_body, Decoded};
use crate::context::{RequestContext, RequestHead};
use crate::cors;
use crate::dispatcher::{Dispatcher, Routed};
use crate::encoder::{encode, Encoded, EncodedBody};
use crate::range::apply_range;

pub type FetchBody = UnsyncBoxBody<Bytes, io::Error>;

#[derive(Debug, Clone)]
pub struct FetchHandler {
    dispatcher: Dispatcher,
}

impl FetchHandler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Serve one request. Never fails: every outcome is a response with CORS headers.
    pub async fn call<B>(&self, req: Request<B>) -> Response<FetchBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: fmt::Display,
    {
        let mut response = into_response(self.respond(req).await);
        cors::apply(response.headers_mut());
        response
    }

    async fn respond<B>(&self, req: Request<B>) -> Encoded
    where
        B: Body<Data = Bytes> + Send,
        B::Error: fmt::Display,
    {
        let arrival = Instant::now();
        let (parts, body) = req.into_parts();
        let head = RequestHead {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_string: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            arrival,
        };

        let entry = match self.dispatcher.route(
            &head.method,
            &head.path,
            head.client_ip().as_deref(),
            head.arrival,
        ) {
            Routed::Preflight => return cors::preflight(),
            Routed::NotFound(reply) => return encode(reply),
            Routed::Matched(entry) => entry,
        };

        let decoded = if carries_payload(&head.method) {
            decode_body(
                body.into_data_stream(),
                &head.content_type(),
                self.dispatcher.limits(),
            )
            .await
        } else {
            Decoded::default()
        };

        let method = head.method.clone();
        let range = head.headers.get(header::RANGE).cloned();
        let ctx = RequestContext::assemble(head, decoded);
        let encoded = encode(self.dispatcher.invoke(&entry, ctx).await);
        apply_range(encoded, &method, range.as_ref())
    }
}

fn into_response(encoded: Encoded) -> Response<FetchBody> {
    let body = match encoded.body {
        EncodedBody::Empty => Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync(),
        EncodedBody::Full(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        EncodedBody::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
    };
    let mut response = Response::new(body);
    *response.status_mut() = encoded.status;
    *response.headers_mut() = encoded.headers;
    response
}

/// Accept connections on every listener until Ctrl-C.
pub async fn serve_fetch(listeners: Vec<TcpListener>, handler: FetchHandler) -> io::Result<()> {
    let mut loops = Vec::with_capacity(listeners.len());
    for listener in listeners {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Chatgate (fetch) listening on http://{}", addr);
        }
        loops.push(tokio::spawn(accept_loop(listener, handler.clone())));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received; closing listeners");
    for task in loops {
        task.abort();
    }
    Ok(())
}

async fn accept_loop(listener: TcpListener, handler: FetchHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = handler.clone();
                        async move { Ok::<_, Infallible>(handler.call(req).await) }
                    });
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        if is_disconnect(&err) {
                            tracing::debug!("Client {} disconnected: {}", addr, err);
                        } else {
                            tracing::warn!("Error serving connection from {}: {:?}", addr, err);
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Whether a connection error is the client going away mid-exchange.
fn is_disconnect(err: &hyper::Error) -> bool {
    if err.is_incomplete_message() || err.is_canceled() || err.is_closed() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            );
        }
        source = cause.source();
    }
    false
}
