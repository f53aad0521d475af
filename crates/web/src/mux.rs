//! The multiplexing primitive behind a [`Router`](crate::Router).
//!
//! A [`Multiplexer`] is a pattern → callback registry with best-match
//! dispatch. It is an injected capability rather than a singleton so
//! that routers can be composed and tested against a recording fake.
//! [`PatternMux`] is the default implementation, built on
//! [`matchit::Router`].
//!
//! Three pattern shapes are understood:
//!
//! - `"GET /users/{id}/"`: a method-qualified route;
//! - `"/admin/"`: a subtree mount; the callback receives every request
//!   under the prefix, any method;
//! - `"/"`: the fallback callback for otherwise-unmatched requests.
//!
//! Registering the same thing twice is a configuration fault and
//! panics immediately.

use crate::handler::SinkHandler;
use crate::request::{PathParams, Request};
use crate::response::Response;
use crate::sink::{ResponseSink, SinkError};
use async_trait::async_trait;
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// Pattern registry with best-match dispatch.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Registers `callback` under `pattern`.
    ///
    /// Panics if the pattern is malformed or already taken; route
    /// tables are wired at startup and a conflict there is a bug, not
    /// a runtime condition.
    fn register(&mut self, pattern: &str, callback: Arc<dyn SinkHandler>);

    /// Serves `request` against the best-matching registration,
    /// answering `404`/`405` itself when nothing fits.
    async fn dispatch(&self, request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError>;
}

/// Name of the internal catchall segment backing subtree mounts. Never
/// surfaces in [`PathParams`].
const MOUNT_REST: &str = "__mount_rest";

enum Node {
    Route(HashMap<Method, Arc<dyn SinkHandler>>),
    Mount(Arc<dyn SinkHandler>),
}

/// The default [`Multiplexer`].
///
/// Static segments win over `{name}` segments, which win over mount
/// catchalls, so a deeper mount or an explicit route always shadows a
/// shallower mount.
#[derive(Default)]
pub struct PatternMux {
    inner: matchit::Router<usize>,
    nodes: Vec<Node>,
    by_path: HashMap<String, usize>,
    fallback: Option<Arc<dyn SinkHandler>>,
}

impl PatternMux {
    pub fn new() -> Self {
        Self::default()
    }

    fn register_route(&mut self, method: Method, path: &str, callback: Arc<dyn SinkHandler>) {
        let index = match self.by_path.get(path) {
            Some(&index) => index,
            None => self.insert_node(path, Node::Route(HashMap::new())),
        };
        match &mut self.nodes[index] {
            Node::Route(by_method) => {
                if by_method.insert(method.clone(), callback).is_some() {
                    panic!("duplicate registration for {method} {path}");
                }
            }
            Node::Mount(_) => panic!("{path} is already a mount"),
        }
    }

    fn register_mount(&mut self, path: &str, callback: Arc<dyn SinkHandler>) {
        if self.by_path.contains_key(path) {
            panic!("{path} is already registered");
        }
        let index = self.insert_node(path, Node::Mount(callback));
        let subtree = format!("{path}{{*{MOUNT_REST}}}");
        if let Err(conflict) = self.inner.insert(&subtree, index) {
            panic!("mount {path} conflicts with an existing registration: {conflict}");
        }
    }

    fn register_fallback(&mut self, callback: Arc<dyn SinkHandler>) {
        if self.fallback.is_some() {
            panic!("/ is already registered");
        }
        self.fallback = Some(callback);
    }

    fn insert_node(&mut self, path: &str, node: Node) -> usize {
        let index = self.nodes.len();
        if let Err(conflict) = self.inner.insert(path, index) {
            panic!("pattern {path} conflicts with an existing registration: {conflict}");
        }
        self.nodes.push(node);
        self.by_path.insert(path.to_string(), index);
        index
    }
}

#[async_trait]
impl Multiplexer for PatternMux {
    fn register(&mut self, pattern: &str, callback: Arc<dyn SinkHandler>) {
        match pattern.split_once(' ') {
            Some((method, path)) => {
                let method = Method::from_str(method)
                    .unwrap_or_else(|_| panic!("pattern {pattern:?} has an invalid method"));
                self.register_route(method, path, callback);
            }
            None if pattern == "/" => self.register_fallback(callback),
            None => self.register_mount(pattern, callback),
        }
    }

    async fn dispatch(&self, mut request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        let path = request.path().to_string();
        let matched = match self.inner.at(&path) {
            Ok(matched) => Some((*matched.value, PathParams::from(matched.params))),
            Err(_) => None,
        };

        match matched {
            Some((index, params)) => match &self.nodes[index] {
                Node::Mount(callback) => {
                    trace!(%path, "dispatching to mount");
                    callback.serve(request, sink).await
                }
                Node::Route(by_method) => match by_method.get(request.method()) {
                    Some(callback) => {
                        trace!(%path, method = %request.method(), "dispatching to route");
                        request.set_params(params);
                        callback.serve(request, sink).await
                    }
                    None => Response::error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed").write(sink),
                },
            },
            None => match &self.fallback {
                Some(callback) => {
                    trace!(%path, "dispatching to fallback");
                    callback.serve(request, sink).await
                }
                None => Response::error(StatusCode::NOT_FOUND, "not found").write(sink),
            },
        }
    }
}

impl fmt::Debug for PatternMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternMux")
            .field("patterns", &self.by_path.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A [`SinkHandler`] that counts invocations and answers with a
    /// fixed label.
    pub(crate) struct Marker {
        pub(crate) label: &'static str,
        pub(crate) hits: Arc<AtomicUsize>,
    }

    impl Marker {
        pub(crate) fn new(label: &'static str) -> (Arc<dyn SinkHandler>, Arc<AtomicUsize>) {
            let hits = Arc::new(AtomicUsize::new(0));
            (Arc::new(Self { label, hits: Arc::clone(&hits) }), hits)
        }
    }

    #[async_trait]
    impl SinkHandler for Marker {
        async fn serve(&self, _request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Response::raw(StatusCode::OK, self.label).write(sink)
        }
    }
}
