//! Dispatcher
//!
//! Transport-neutral orchestration: route lookup, handler invocation, error translation and
//! request timing. The transports call [`Dispatcher::route`] with the request head, build a
//! [`RequestContext`] only for matched routes, then hand it to [`Dispatcher::invoke`].

use futures::FutureExt;
use http::{Method, StatusCode};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

use crate::body::BodyLimits;
use crate::context::RequestContext;
use crate::envelope::Reply;
use crate::exception::{GatewayException, SYSTEM_NOT_ROUTE_MATCHING};
use crate::failure::{failure_reply, panic_failure, FailureBody};
use crate::route_table::{RouteEntry, RouteTable};

/// Dispatcher settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Log `->`/`<-` lines for every request.
    pub request_log: bool,
    /// Endpoint named in the not-found hint, e.g. `POST -> /v1/chat/completions`.
    pub primary_route: String,
    pub body_limits: BodyLimits,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            request_log: false,
            primary_route: "POST -> /v1/chat/completions".into(),
            body_limits: BodyLimits::default(),
        }
    }
}

/// Outcome of routing a request head.
#[derive(Debug)]
pub enum Routed {
    /// `OPTIONS`: answer with the CORS preflight.
    Preflight,
    /// No entry matched; the reply is the 404 failure.
    NotFound(Reply),
    Matched(RouteEntry),
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    settings: Arc<DispatchSettings>,
}

impl Dispatcher {
    pub fn new(table: RouteTable, settings: DispatchSettings) -> Self {
        Self {
            table: Arc::new(table),
            settings: Arc::new(settings),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn limits(&self) -> &BodyLimits {
        &self.settings.body_limits
    }

    /// Decide what to do with a request before any body is read. `arrival` times the
    /// not-found reply.
    pub fn route(
        &self,
        method: &Method,
        path: &str,
        client_ip: Option<&str>,
        arrival: Instant,
    ) -> Routed {
        if method == Method::OPTIONS {
            return Routed::Preflight;
        }
        match self.table.find(method, path) {
            Some(entry) => Routed::Matched(entry.clone()),
            None => Routed::NotFound(self.not_found(method, path, client_ip, arrival)),
        }
    }

    /// The fixed 404 failure naming the expected endpoint.
    pub fn not_found(
        &self,
        method: &Method,
        path: &str,
        client_ip: Option<&str>,
        arrival: Instant,
    ) -> Reply {
        tracing::debug!(
            "-> {} {} request is not supported - {}",
            method,
            path,
            client_ip.unwrap_or("unknown")
        );
        let message = format!(
            "[bad request]: the correct request is {}, got {} -> {}, please correct it",
            self.settings.primary_route, method, path
        );
        tracing::warn!("{}", message);
        let ex = GatewayException::with_message(SYSTEM_NOT_ROUTE_MATCHING, message)
            .with_http_status(StatusCode::NOT_FOUND);
        let mut reply = Reply::failure(FailureBody::from_exception(&ex));
        reply.touch();
        if self.settings.request_log {
            let elapsed = reply.timestamp.saturating_duration_since(arrival);
            tracing::info!("<- {} {} {}ms", method, path, elapsed.as_millis());
        }
        reply
    }

    /// Run the handler of `entry`; errors and panics become failure replies.
    pub async fn invoke(&self, entry: &RouteEntry, ctx: RequestContext) -> Reply {
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path
        );
        let method = ctx.method.clone();
        let url = ctx.url.clone();
        let arrival = ctx.arrival;
        let request_log = self.settings.request_log;

        async move {
            if request_log {
                tracing::info!("-> {} {}", method, url);
            }
            let outcome = AssertUnwindSafe(entry.handler.call(ctx))
                .catch_unwind()
                .await;
            let mut reply = match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => failure_reply(&err),
                Err(panic) => failure_reply(&panic_failure(panic)),
            };
            reply.touch();
            if request_log {
                let elapsed = reply.timestamp.saturating_duration_since(arrival);
                tracing::info!("<- {} {} {}ms", method, url, elapsed.as_millis());
            }
            reply
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ReplyBody;
    use crate::exception::HandlerError;
    use crate::route_table::RouteGroup;
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    async fn echo(ctx: RequestContext) -> Result<serde_json::Value, HandlerError> {
        Ok(json!({ "path": ctx.path }))
    }

    async fn explode(_: RequestContext) -> Result<Reply, HandlerError> {
        panic!("kaboom")
    }

    async fn boom(_: RequestContext) -> Result<Reply, HandlerError> {
        Err(HandlerError::fault("boom"))
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn dispatcher() -> Dispatcher {
        let table = RouteTable::build(
            vec![RouteGroup::new()
                .get("/echo", echo)
                .get("/explode", explode)
                .get("/boom", boom)],
            "",
        );
        Dispatcher::new(table, DispatchSettings::default())
    }

    #[test]
    fn options_is_preflight() {
        assert!(matches!(
            dispatcher().route(&Method::OPTIONS, "/anything", None, Instant::now()),
            Routed::Preflight
        ));
    }

    #[test]
    fn unmatched_is_404_with_hint() {
        let routed = dispatcher().route(
            &Method::GET,
            "/does-not-exist",
            Some("1.2.3.4"),
            Instant::now(),
        );
        let Routed::NotFound(reply) = routed else {
            panic!("expected not found");
        };
        assert_eq!(reply.status, Some(StatusCode::NOT_FOUND));
        let ReplyBody::Failure(body) = reply.body else {
            panic!("expected failure body");
        };
        assert_eq!(body.code, SYSTEM_NOT_ROUTE_MATCHING.code);
        assert!(body.message.contains("POST -> /v1/chat/completions"));
        assert!(body.message.contains("GET -> /does-not-exist"));
    }

    #[tokio::test]
    async fn plain_value_is_wrapped() {
        let d = dispatcher();
        let Routed::Matched(entry) = d.route(&Method::GET, "/echo/", None, Instant::now()) else {
            panic!("expected match");
        };
        let reply = d
            .invoke(&entry, RequestContext::for_test(Method::GET, "/echo/"))
            .await;
        assert!(reply.status.is_none());
        assert!(matches!(reply.body, ReplyBody::Json(ref v) if v == &json!({"path": "/echo/"})));
    }

    #[tokio::test]
    async fn panics_become_500() {
        let d = dispatcher();
        let Routed::Matched(entry) = d.route(&Method::GET, "/explode", None, Instant::now()) else {
            panic!("expected match");
        };
        let reply = d
            .invoke(&entry, RequestContext::for_test(Method::GET, "/explode"))
            .await;
        assert_eq!(reply.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        let ReplyBody::Failure(body) = reply.body else {
            panic!("expected failure body");
        };
        assert_eq!(body.message, "kaboom");
    }

    #[tokio::test]
    async fn failures_are_logged_once_with_timing() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(capture.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let table = RouteTable::build(vec![RouteGroup::new().get("/boom", boom)], "");
        let d = Dispatcher::new(
            table,
            DispatchSettings {
                request_log: true,
                ..DispatchSettings::default()
            },
        );
        let Routed::Matched(entry) = d.route(&Method::GET, "/boom", None, Instant::now()) else {
            panic!("expected match");
        };
        let reply = d
            .invoke(&entry, RequestContext::for_test(Method::GET, "/boom"))
            .await;
        assert_eq!(reply.status, Some(StatusCode::INTERNAL_SERVER_ERROR));

        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logged.matches("ERROR").count(), 1, "{logged}");
        assert!(logged.contains("boom"));
        assert!(logged.contains("-> GET /boom"));
        assert!(logged.contains("<- GET /boom"));
        assert!(logged.contains("ms"));
    }

    #[test]
    fn not_found_logs_time_since_arrival() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(capture.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let d = Dispatcher::new(
            RouteTable::build(vec![RouteGroup::new().get("/echo", echo)], ""),
            DispatchSettings {
                request_log: true,
                ..DispatchSettings::default()
            },
        );
        let arrival = Instant::now()
            .checked_sub(std::time::Duration::from_millis(250))
            .unwrap();
        let routed = d.route(&Method::GET, "/nowhere", None, arrival);
        assert!(matches!(routed, Routed::NotFound(_)));

        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line = logged
            .lines()
            .find(|l| l.contains("<- GET /nowhere"))
            .expect("timing line");
        let ms: u128 = line
            .rsplit(' ')
            .next()
            .and_then(|t| t.strip_suffix("ms"))
            .and_then(|t| t.parse().ok())
            .expect("elapsed millis");
        assert!(ms >= 250, "{line}");
    }
}
