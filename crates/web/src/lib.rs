//! A small routing and response-dispatch toolkit layered over a host
//! HTTP engine.
//!
//! The pieces, leaves first:
//!
//! - [`Response`]: a closed set of typed response variants, each
//!   knowing how to render itself onto a [`ResponseSink`];
//! - [`adapt`]: wraps a fallible, panicking-capable [`Handler`] into a
//!   [`SinkHandler`], the non-failing callback shape the engine drives;
//! - [`Router`]: maps `(method, path)` patterns to handlers through a
//!   [`Multiplexer`], and composes by linking sub-routers under path
//!   prefixes or merging them at the root;
//! - [`Server`]: the listen lifecycle, an ordered middleware chain and
//!   graceful/forced shutdown, with everything wire-level delegated to
//!   the engine.
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, StatusCode};
//! use junction_web::{handler_fn, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new().route(
//!         Method::GET,
//!         "/hello/{name}/",
//!         handler_fn(|request| async move {
//!             let name = request.params().get("name").unwrap_or("world").to_string();
//!             Ok(Response::raw(StatusCode::OK, name))
//!         }),
//!     );
//!
//!     let server = Server::new("127.0.0.1:8080").with_router(router);
//!     if let Err(e) = server.start().await {
//!         eprintln!("server failed: {e}");
//!     }
//! }
//! ```

mod handler;
mod middleware;
mod mux;
mod request;
mod response;
mod router;
mod server;
mod sink;

pub use handler::{adapt, handler_fn, AdaptedHandler, FnHandler, Handler, HandlerError, SinkHandler};
pub use middleware::Middleware;
pub use mux::{Multiplexer, PatternMux};
pub use request::{PathParams, Request};
pub use response::{Cause, ErasedJson, Response};
pub use router::Router;
pub use server::{Server, ServerError};
pub use sink::{BufferedSink, ResponseSink, SinkError};
