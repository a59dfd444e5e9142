#![forbid(unsafe_code)]
#![doc = r#"
Chatgate

HTTP gateway core for chat-completion services. Route handlers are written once against a
neutral request context and reply envelope, then served by either of two transports.

Crate highlights
- Routing: nested `RouteGroup` declarations flattened into a frozen `RouteTable`.
- Transports: an actix-web server (`transport_actix`) and a fetch-style
  `Request -> Response` handler hosted by hyper (`transport_fetch`), chosen at startup.
- Pipeline: content-type aware body decoding, response encoding, permissive CORS, and
  translation of handler errors into `{code, message, data}` failures.

Modules
- `route_table`: handler contract, route declarations, lookup.
- `context` / `body`: the request view handed to handlers and its payload decoding.
- `envelope` / `encoder` / `range`: handler replies, their serialization, byte ranges.
- `exception` / `failure`: domain exceptions and error-to-response translation.
- `dispatcher`: transport-neutral orchestration.
- `cors`, `config`, `util` (tracing, env files, log sanitizing), `api` (default routes).
"#]

pub mod api;
pub mod body;
pub mod config;
pub mod context;
pub mod cors;
pub mod dispatcher;
pub mod encoder;
pub mod envelope;
pub mod exception;
pub mod failure;
pub mod range;
pub mod route_table;
pub mod transport;
pub mod transport_actix;
pub mod transport_fetch;
pub mod util;

pub use crate::body::{BodyLimits, RequestBody, UploadedFile};
pub use crate::config::GatewayConfig;
pub use crate::context::RequestContext;
pub use crate::dispatcher::{DispatchSettings, Dispatcher};
pub use crate::envelope::Reply;
pub use crate::exception::{ExceptionKind, GatewayException, HandlerError};
pub use crate::route_table::{RouteError, RouteGroup, RouteHandler, RouteSlot, RouteTable};
pub use crate::transport::Transport;
pub use crate::transport_fetch::FetchHandler;
