//! Default route set served by the `chatgate` binary.
//!
//! `GET /` welcome page, `GET /ping`, and a local `POST /v1/chat/completions` that echoes the
//! last user message in the OpenAI response shape. The echo stands in for the upstream chat
//! service, which is mounted by embedding applications as an ordinary route handler.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;

use crate::context::RequestContext;
use crate::envelope::Reply;
use crate::exception::{GatewayException, HandlerError, API_REQUEST_PARAMS_INVALID};
use crate::route_table::{RouteGroup, RouteHandler};

const WELCOME_FALLBACK: &str = "<h1>Chatgate</h1><p>Service is running.</p>";

/// Serves `welcome.html` from disk, read once and cached; falls back to a built-in page.
pub struct WelcomePage {
    path: PathBuf,
    cached: OnceCell<Bytes>,
}

impl WelcomePage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    async fn content(&self) -> Bytes {
        self.cached
            .get_or_init(|| async {
                match tokio::fs::read(&self.path).await {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => {
                        tracing::debug!(path = %self.path.display(), "Welcome page not readable: {}", e);
                        Bytes::from_static(WELCOME_FALLBACK.as_bytes())
                    }
                }
            })
            .await
            .clone()
    }
}

#[async_trait]
impl RouteHandler for WelcomePage {
    async fn call(&self, _ctx: RequestContext) -> Result<Reply, HandlerError> {
        Ok(Reply::bytes(self.content().await)
            .with_content_type("html")
            .with_header("Expires", "-1"))
    }
}

async fn ping(_ctx: RequestContext) -> Result<&'static str, HandlerError> {
    Ok("pong")
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Value,
}

impl ChatMessage {
    /// Text of the message; content-part arrays are joined.
    fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

async fn chat_completions(ctx: RequestContext) -> Result<Reply, HandlerError> {
    let request: ChatRequest = ctx.body.parse()?;
    if request.messages.is_empty() {
        return Err(GatewayException::with_message(
            API_REQUEST_PARAMS_INVALID,
            "messages must not be empty",
        )
        .into());
    }

    let model = request.model.unwrap_or_else(|| "chatgate-echo".into());
    let content = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(ChatMessage::text)
        .unwrap_or_default();
    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    if !request.stream {
        return Ok(Reply::json(json!({
            "id": id,
            "object": "chat.completion",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 }
        })));
    }

    let chunk = |delta: Value, finish: Option<&str>| {
        let event = json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
        });
        Bytes::from(format!("data: {event}\n\n"))
    };
    let events = vec![
        chunk(json!({ "role": "assistant", "content": "" }), None),
        chunk(json!({ "content": content }), None),
        chunk(json!({}), Some("stop")),
        Bytes::from_static(b"data: [DONE]\n\n"),
    ];
    Ok(
        Reply::stream(stream::iter(events.into_iter().map(Ok::<_, std::io::Error>)))
            .with_content_type("text/event-stream")
            .with_header("Cache-Control", "no-cache"),
    )
}

/// The binary's route groups. `public_dir` holds `welcome.html`.
pub fn default_routes(public_dir: impl Into<PathBuf>) -> Vec<RouteGroup> {
    let welcome = WelcomePage::new(public_dir.into().join("welcome.html"));
    vec![
        RouteGroup::new().get("/", welcome),
        RouteGroup::new().get("/ping", ping),
        RouteGroup::new()
            .prefix("/v1/chat")
            .post("/completions", chat_completions),
    ]
}
