//! Handler traits and the adaptation layer.
//!
//! Application code implements [`Handler`] (or just writes an async fn
//! and wraps it with [`handler_fn`]): take a [`Request`], return a
//! [`Response`] or an error. The routing layer never talks to a
//! [`Handler`] directly; it talks to [`SinkHandler`], the engine-facing
//! callback shape, and [`adapt`] is the one place where a fallible,
//! panicking-capable handler is turned into a callback that always
//! renders something.

use crate::request::Request;
use crate::response::Response;
use crate::sink::{ResponseSink, SinkError};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// The error type application handlers return.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// An application request handler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response, HandlerError>;
}

/// Holder that lets a plain async fn or closure act as a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HandlerError>> + Send,
{
    async fn handle(&self, request: Request) -> Result<Response, HandlerError> {
        (self.f)(request).await
    }
}

/// Wraps an async fn into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HandlerError>> + Send,
{
    FnHandler { f }
}

/// The callback shape the host engine drives: consume a request, write
/// one response onto the sink.
///
/// Implementations must not fail for anything but a broken sink; in
/// particular they must not let handler faults escape. Routers,
/// middleware and adapted handlers all speak this trait, which is what
/// makes them composable.
#[async_trait]
pub trait SinkHandler: Send + Sync {
    async fn serve(&self, request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError>;
}

/// Adapts a [`Handler`] into a [`SinkHandler`].
///
/// The handler call runs inside a panic barrier. An error returned by
/// the handler and a panic raised during it both render a generic 500
/// whose body is exactly `internal server error`: the real failure is
/// logged here and deliberately kept off the wire. A failure while
/// rendering is returned to the engine untouched; at that point the
/// sink is broken and there is nothing left to answer with.
pub fn adapt(handler: impl Handler + 'static) -> AdaptedHandler {
    AdaptedHandler { inner: Box::new(handler) }
}

pub struct AdaptedHandler {
    inner: Box<dyn Handler>,
}

#[async_trait]
impl SinkHandler for AdaptedHandler {
    async fn serve(&self, request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        let outcome = AssertUnwindSafe(self.inner.handle(request)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(cause)) => {
                error!(cause = %cause, "handler failed");
                Response::InternalServerError { cause: None }
            }
            Err(panic) => {
                error!(cause = panic_message(panic.as_ref()), "handler panicked");
                Response::InternalServerError { cause: None }
            }
        };
        response.write(sink)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}
