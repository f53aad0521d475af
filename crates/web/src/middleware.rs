//! Middleware: wrappers around the server's request callback.
//!
//! A [`Middleware`] takes the next callback in the chain and returns a
//! new one, exactly like wrapping a function. The
//! [`Server`](crate::Server) folds its registered middleware around the
//! router when it starts, last-registered outermost, so the most
//! recently added middleware sees the request first and the response
//! last.
//!
//! Any `Fn(Arc<dyn SinkHandler>) -> Arc<dyn SinkHandler>` closure is a
//! middleware.

use crate::handler::SinkHandler;
use std::sync::Arc;

/// A wrapper producing a new request callback from the next one.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn SinkHandler>) -> Arc<dyn SinkHandler>;
}

impl<F> Middleware for F
where
    F: Fn(Arc<dyn SinkHandler>) -> Arc<dyn SinkHandler> + Send + Sync,
{
    fn wrap(&self, next: Arc<dyn SinkHandler>) -> Arc<dyn SinkHandler> {
        self(next)
    }
}
