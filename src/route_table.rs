//! Route Table Module
//!
//! Flattens nested route declarations into an immutable list of `(method, path, handler)`
//! entries. Built once at startup, then shared read-only behind an `Arc`.

use async_trait::async_trait;
use http::Method;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::context::RequestContext;
use crate::envelope::Reply;
use crate::exception::HandlerError;

/// An asynchronous route handler.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn call(&self, ctx: RequestContext) -> Result<Reply, HandlerError>;
}

#[async_trait]
impl<F, Fut, R> RouteHandler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Into<Reply>,
{
    async fn call(&self, ctx: RequestContext) -> Result<Reply, HandlerError> {
        (self)(ctx).await.map(Into::into)
    }
}

pub type SharedHandler = Arc<dyn RouteHandler>;

/// What a group declares for one verb.
pub enum RouteSlot {
    /// Ordered `uri suffix → handler` pairs.
    Handlers(Vec<(String, SharedHandler)>),
    /// A declaration that is not a path map; skipped with a warning.
    Invalid(String),
}

/// A nested route declaration: an optional prefix plus per-verb handler maps.
#[derive(Default)]
pub struct RouteGroup {
    pub prefix: Option<String>,
    pub slots: Vec<(String, RouteSlot)>,
}

impl RouteGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Declare a whole slot for `verb`.
    pub fn slot(mut self, verb: impl Into<String>, slot: RouteSlot) -> Self {
        self.slots.push((verb.into(), slot));
        self
    }

    /// Add one handler under `verb`, merging into an existing slot for that verb.
    pub fn route<H>(mut self, verb: &str, uri: impl Into<String>, handler: H) -> Self
    where
        H: RouteHandler + 'static,
    {
        let handler: SharedHandler = Arc::new(handler);
        let uri = uri.into();
        let existing = self
            .slots
            .iter()
            .position(|(v, s)| v.eq_ignore_ascii_case(verb) && matches!(s, RouteSlot::Handlers(_)));
        match existing.map(|idx| &mut self.slots[idx].1) {
            Some(RouteSlot::Handlers(list)) => list.push((uri, handler)),
            _ => self
                .slots
                .push((verb.to_string(), RouteSlot::Handlers(vec![(uri, handler)]))),
        }
        self
    }

    pub fn get<H: RouteHandler + 'static>(self, uri: impl Into<String>, handler: H) -> Self {
        self.route("get", uri, handler)
    }

    pub fn post<H: RouteHandler + 'static>(self, uri: impl Into<String>, handler: H) -> Self {
        self.route("post", uri, handler)
    }

    pub fn put<H: RouteHandler + 'static>(self, uri: impl Into<String>, handler: H) -> Self {
        self.route("put", uri, handler)
    }

    pub fn delete<H: RouteHandler + 'static>(self, uri: impl Into<String>, handler: H) -> Self {
        self.route("delete", uri, handler)
    }
}

/// A bound `(method, path, handler)` triple.
#[derive(Clone)]
pub struct RouteEntry {
    pub method: Method,
    pub path: String,
    pub handler: SharedHandler,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("duplicate route: {method} {path}")]
    Duplicate { method: Method, path: String },
}

/// Frozen routing table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build the table; a duplicate `(method, path)` replaces the earlier entry.
    pub fn build(groups: Vec<RouteGroup>, global_prefix: &str) -> Self {
        let mut entries: Vec<RouteEntry> = Vec::new();
        for entry in flatten(groups, global_prefix) {
            if let Some(pos) = entries
                .iter()
                .position(|e| e.method == entry.method && e.path == entry.path)
            {
                tracing::warn!(method = %entry.method, path = %entry.path, "Route redeclared; later declaration wins");
                entries.remove(pos);
            }
            entries.push(entry);
        }
        log_attached(&entries);
        Self { entries }
    }

    /// Build the table, rejecting duplicate `(method, path)` declarations.
    pub fn build_strict(groups: Vec<RouteGroup>, global_prefix: &str) -> Result<Self, RouteError> {
        let mut entries: Vec<RouteEntry> = Vec::new();
        for entry in flatten(groups, global_prefix) {
            if entries
                .iter()
                .any(|e| e.method == entry.method && e.path == entry.path)
            {
                return Err(RouteError::Duplicate {
                    method: entry.method,
                    path: entry.path,
                });
            }
            entries.push(entry);
        }
        log_attached(&entries);
        Ok(Self { entries })
    }

    /// Exact lookup; trailing slashes on `path` are ignored.
    pub fn find(&self, method: &Method, path: &str) -> Option<&RouteEntry> {
        let wanted = strip_trailing(path);
        let method = method.as_str().to_ascii_uppercase();
        self.entries
            .iter()
            .find(|e| e.method.as_str() == method && e.path == wanted)
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn log_attached(entries: &[RouteEntry]) {
    for entry in entries {
        tracing::info!("Route {} {} attached", entry.method, entry.path);
    }
}

fn flatten(groups: Vec<RouteGroup>, global_prefix: &str) -> Vec<RouteEntry> {
    let mut out = Vec::new();
    for group in groups {
        let group_prefix = group.prefix.unwrap_or_default();
        for (verb, slot) in group.slots {
            let Some(method) = parse_verb(&verb) else {
                tracing::warn!("Router {} {} invalid", group_prefix, verb);
                continue;
            };
            let handlers = match slot {
                RouteSlot::Handlers(h) => h,
                RouteSlot::Invalid(reason) => {
                    tracing::warn!("Router {} {} invalid: {}", group_prefix, verb, reason);
                    continue;
                }
            };
            for (uri, handler) in handlers {
                out.push(RouteEntry {
                    method: method.clone(),
                    path: normalize_path(&[global_prefix, &group_prefix, &uri]),
                    handler,
                });
            }
        }
    }
    out
}

fn parse_verb(verb: &str) -> Option<Method> {
    match verb.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "HEAD" => Some(Method::HEAD),
        "OPTIONS" => Some(Method::OPTIONS),
        _ => None,
    }
}

/// Join path parts into a single absolute path: one leading slash, no repeated slashes,
/// no trailing slash except for the root.
pub fn normalize_path(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

fn strip_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_: RequestContext) -> Result<&'static str, HandlerError> {
        Ok("ok")
    }

    async fn other(_: RequestContext) -> Result<&'static str, HandlerError> {
        Ok("other")
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path(&["", "", ""]), "/");
        assert_eq!(normalize_path(&["/api/", "//v1/", "chat/completions/"]), "/api/v1/chat/completions");
        assert_eq!(normalize_path(&["", "", "/"]), "/");
        assert_eq!(normalize_path(&["api", "", "ping"]), "/api/ping");
    }

    #[test]
    fn builds_from_groups_with_prefixes() {
        let table = RouteTable::build(
            vec![
                RouteGroup::new().get("/", ok),
                RouteGroup::new()
                    .prefix("/v1/chat")
                    .post("/completions", ok),
            ],
            "/api",
        );
        assert_eq!(table.len(), 2);
        assert!(table.find(&Method::GET, "/api").is_some());
        assert!(table.find(&Method::POST, "/api/v1/chat/completions").is_some());
        assert!(table.find(&Method::POST, "/api/v1/chat/completions/").is_some());
        assert!(table.find(&Method::GET, "/api/v1/chat/completions").is_none());
        assert!(table.find(&Method::POST, "/v1/chat/completions").is_none());
    }

    #[test]
    fn invalid_slots_and_verbs_are_skipped() {
        let table = RouteTable::build(
            vec![RouteGroup::new()
                .slot("post", RouteSlot::Invalid("expected a path map".into()))
                .slot("fetch", RouteSlot::Handlers(vec![("/x".into(), Arc::new(ok) as SharedHandler)]))
                .get("/ping", ok)],
            "",
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].path, "/ping");
    }

    #[tokio::test]
    async fn later_declaration_wins() {
        let table = RouteTable::build(
            vec![
                RouteGroup::new().get("/ping", ok),
                RouteGroup::new().get("/ping/", other),
            ],
            "",
        );
        assert_eq!(table.len(), 1);
        let entry = table.find(&Method::GET, "/ping").unwrap();
        let ctx = RequestContext::for_test(Method::GET, "/ping");
        let reply = entry.handler.call(ctx).await.unwrap();
        assert!(matches!(reply.body, crate::envelope::ReplyBody::Text(ref t) if t == "other"));
    }

    #[test]
    fn strict_build_rejects_duplicates() {
        let err = RouteTable::build_strict(
            vec![
                RouteGroup::new().post("/a", ok),
                RouteGroup::new().prefix("/").post("a", ok),
            ],
            "",
        )
        .unwrap_err();
        assert_eq!(
            err,
            RouteError::Duplicate {
                method: Method::POST,
                path: "/a".into()
            }
        );
    }
}
