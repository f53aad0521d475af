//! The router: method/path registration, validation and composition.
//!
//! A [`Router`] owns a [`Multiplexer`] and registers adapted handlers
//! against it as `"<METHOD> <path>"` patterns. Routers compose: one
//! router's whole pattern space can be linked under a path prefix of
//! another, or merged into it wholesale at the root.
//!
//! Path patterns are validated at registration time and a bad pattern
//! panics on the spot. Routes are wired during startup; a malformed
//! table is a bug to fail loudly on, not an error to bubble to some
//! caller that cannot fix it.

use crate::handler::{adapt, Handler, SinkHandler};
use crate::mux::{Multiplexer, PatternMux};
use crate::request::Request;
use crate::response::Response;
use crate::sink::{ResponseSink, SinkError};
use async_trait::async_trait;
use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// General path-pattern shape: `/`-delimited segments, each either
/// plain text or a whole `{name}` placeholder, ending in `/`. The root
/// path and the consecutive-slash rule are handled in [`validate`].
static VALID_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:[^/\s{}]+|\{[^/\s{}]+\})*(?:/(?:[^/\s{}]+|\{[^/\s{}]+\}))*/$")
        .expect("path pattern regex should compile")
});

/// Panics unless `path` is a valid pattern: non-empty, starts and ends
/// with `/`, no consecutive slashes, no whitespace, `{name}` segments
/// allowed. The root path `/` is always valid.
fn validate(path: &str) {
    if path == "/" {
        return;
    }
    if path.contains("//") || !VALID_PATH.is_match(path) {
        panic!("path {path:?} is invalid");
    }
}

/// Maps `(method, path)` pairs to handlers through a [`Multiplexer`].
pub struct Router {
    multiplexer: Box<dyn Multiplexer>,
}

impl Router {
    /// A router over the default [`PatternMux`].
    pub fn new() -> Self {
        Self::with_multiplexer(PatternMux::new())
    }

    /// A router over a caller-supplied multiplexer.
    pub fn with_multiplexer(multiplexer: impl Multiplexer + 'static) -> Self {
        Self { multiplexer: Box::new(multiplexer) }
    }

    /// Registers `handler` for `method` requests on `path`.
    ///
    /// Panics if `path` does not validate or is already taken.
    pub fn route(mut self, method: Method, path: &str, handler: impl Handler + 'static) -> Self {
        validate(path);
        let pattern = format!("{method} {path}");
        debug!(%pattern, "registering route");
        self.multiplexer.register(&pattern, Arc::new(adapt(handler)));
        self
    }

    /// Mounts `other`'s entire pattern space under `path`.
    ///
    /// Requests matching `path` are forwarded to `other` with the
    /// prefix (minus its trailing slash) stripped, so a sub-router
    /// route `/users/` linked at `/api/` answers `/api/users/`.
    ///
    /// Linking at the root path is special: the two pattern spaces are
    /// unified directly: `other` becomes the fallback for everything
    /// this router does not match, with no prefix stripping. That
    /// asymmetry is what [`Router::merge`] is built on; don't expect
    /// uniform prefix semantics from the root case.
    pub fn link(mut self, path: &str, other: Router) -> Self {
        if path == "/" {
            debug!("merging router at root");
            self.multiplexer.register("/", Arc::new(other));
            return self;
        }
        validate(path);
        debug!(prefix = path, "linking router");
        let prefix = path[..path.len() - 1].to_string();
        self.multiplexer.register(path, Arc::new(StripPrefix { prefix, inner: Arc::new(other) }));
        self
    }

    /// Combines two routers into one flat namespace; equivalent to
    /// `link("/", other)`.
    pub fn merge(self, other: Router) -> Self {
        self.link("/", other)
    }

    /// A fresh router with `router` linked under `prefix`. Useful for
    /// versioned APIs: `Router::with_prefix("/v1/", api)`.
    pub fn with_prefix(prefix: &str, router: Router) -> Self {
        Self::new().link(prefix, router)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkHandler for Router {
    async fn serve(&self, request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        self.multiplexer.dispatch(request, sink).await
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Router")
    }
}

/// Forwards to `inner` with `prefix` removed from the request path.
struct StripPrefix {
    prefix: String,
    inner: Arc<dyn SinkHandler>,
}

#[async_trait]
impl SinkHandler for StripPrefix {
    async fn serve(&self, mut request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        let stripped = request.path().strip_prefix(&self.prefix).map(str::to_string);
        match stripped {
            Some(rest) if rest.starts_with('/') => {
                request.set_path(rest);
                self.inner.serve(request, sink).await
            }
            _ => Response::error(StatusCode::NOT_FOUND, "not found").write(sink),
        }
    }
}
