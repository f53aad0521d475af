//! The server: listen lifecycle, middleware composition and the host
//! engine glue.
//!
//! [`Server`] owns one [`Router`] and an ordered middleware chain. At
//! [`Server::start`] the chain is folded around the router's serve
//! callback (last-registered middleware outermost) and every accepted
//! connection is driven by the host engine, hyper's HTTP/1.1
//! connection machinery over tokio. This is the only module that names
//! an engine type; the rest of the crate sees requests and sinks.
//!
//! Wire-level concerns (parsing, keep-alive, per-request concurrency)
//! belong to the engine. This layer decides what is served and when
//! serving stops.

use crate::handler::SinkHandler;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::sink::BufferedSink;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal failure of the listen loop.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },
}

/// An HTTP server wrapping the host engine and a [`Router`].
///
/// The server is not started automatically; routes and middleware are
/// registered first, then [`Server::start`] runs the listen loop until
/// [`Server::shutdown`] or [`Server::force_shutdown`] stops it.
/// Registration after start is unsupported.
pub struct Server {
    address: String,
    router: Arc<Router>,
    /// Front of the list is the last-registered, outermost middleware.
    middleware: Vec<Box<dyn Middleware>>,
    shutdown: CancellationToken,
    force: CancellationToken,
    stopped: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            router: Arc::new(Router::new()),
            middleware: Vec::new(),
            shutdown: CancellationToken::new(),
            force: CancellationToken::new(),
            stopped: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Replaces the active router wholesale; the last call wins.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Adds `middleware` to the chain. The last middleware registered
    /// becomes the outermost wrapper: it runs first on a request and
    /// last on the response.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.insert(0, Box::new(middleware));
        self
    }

    /// The address actually bound, available once `start` has bound
    /// the listener. Mostly interesting when listening on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    fn compose(&self) -> Arc<dyn SinkHandler> {
        let mut callback: Arc<dyn SinkHandler> = self.router.clone();
        for middleware in self.middleware.iter().rev() {
            callback = middleware.wrap(callback);
        }
        callback
    }

    /// Starts listening and blocks until the server stops.
    ///
    /// Returns the terminal failure of the listen loop (a bind error,
    /// typically "address in use") or `Ok(())` after a clean stop.
    /// Accept failures are logged and survived.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.address.as_str())
            .await
            .map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { address: self.address.clone(), source })?;
        let _ = self.local_addr.set(local_addr);
        info!(address = %local_addr, "listening");

        let callback = self.compose();
        let graceful = GracefulShutdown::new();

        let force_requested = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break false,
                _ = self.force.cancelled() => break true,
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };
                    debug!(%remote_addr, "accepted connection");

                    let callback = Arc::clone(&callback);
                    let service = service_fn(move |engine_request| {
                        let callback = Arc::clone(&callback);
                        async move { Ok::<_, Infallible>(serve_request(callback, engine_request).await) }
                    });

                    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                    let watched = graceful.watch(connection);
                    let force = self.force.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            result = watched => {
                                if let Err(e) = result {
                                    debug!(cause = %e, "connection ended with error");
                                }
                            }
                            _ = force.cancelled() => debug!(%remote_addr, "connection aborted"),
                        }
                    });
                }
            }
        };

        drop(listener);
        if force_requested {
            info!("force shutdown, aborting open connections");
        } else {
            info!("draining in-flight requests");
            graceful.shutdown().await;
        }
        self.stopped.cancel();
        info!("server stopped");
        Ok(())
    }

    /// Graceful stop: refuse new connections, let in-flight requests
    /// finish, and block until everything has drained.
    ///
    /// No timeout is imposed here; drain time is bounded only by the
    /// in-flight work. Callers wanting a deadline compose one outside.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if self.local_addr.get().is_some() {
            self.stopped.cancelled().await;
        }
    }

    /// Immediate stop: abort every connection, in-flight or not.
    ///
    /// Does not block. In-flight clients observe their connection die
    /// instead of receiving a response.
    pub fn force_shutdown(&self) {
        self.force.cancel();
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Bridges one engine request through the callback chain: snapshot the
/// request (collecting the body), run the callbacks against a buffered
/// sink, hand the buffered response back to the engine.
async fn serve_request(
    callback: Arc<dyn SinkHandler>,
    engine_request: http::Request<Incoming>,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = engine_request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(cause = %e, "failed to read request body");
            let mut sink = BufferedSink::new();
            let _ = Response::bad_request(e).write(&mut sink);
            return sink.into_response();
        }
    };

    let request = Request::new(parts.method, parts.uri, parts.headers, body);
    let mut sink = BufferedSink::new();
    if let Err(e) = callback.serve(request, &mut sink).await {
        error!(cause = %e, "failed to write response");
    }
    sink.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::test_support::tagging;
    use crate::request::test_support::request;
    use crate::sink::test_support::RecordingSink;
    use http::{Method, StatusCode};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::Notify;
    use tokio::task::JoinHandle;

    #[test]
    fn new_server_has_no_middleware_and_a_router() {
        let server = Server::new("localhost:8000");
        assert_eq!(server.address, "localhost:8000");
        assert!(server.middleware.is_empty());
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn with_router_replaces_the_router_wholesale() {
        let first = Router::new()
            .route(Method::GET, "/first/", handler_fn(|_| async { Ok(Response::raw(StatusCode::OK, "first")) }));
        let second = Router::new()
            .route(Method::GET, "/second/", handler_fn(|_| async { Ok(Response::raw(StatusCode::OK, "second")) }));
        let server = Server::new("unused").with_router(first).with_router(second);

        let callback = server.compose();
        let mut sink = RecordingSink::default();
        callback.serve(request(Method::GET, "/second/"), &mut sink).await.expect("serve should succeed");
        assert_eq!(sink.body_string(), "second");

        let mut sink = RecordingSink::default();
        callback.serve(request(Method::GET, "/first/"), &mut sink).await.expect("serve should succeed");
        assert_eq!(sink.status(), Some(404));
    }

    #[tokio::test]
    async fn last_registered_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let log = Arc::clone(&log);
            handler_fn(move |_request| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("handler".to_string());
                    Ok(Response::raw(StatusCode::OK, "ok"))
                }
            })
        };
        let server = Server::new("unused")
            .with_router(Router::new().route(Method::GET, "/", handler))
            .with_middleware(tagging("A", Arc::clone(&log)))
            .with_middleware(tagging("B", Arc::clone(&log)));

        let callback = server.compose();
        let mut sink = RecordingSink::default();
        callback.serve(request(Method::GET, "/"), &mut sink).await.expect("serve should succeed");

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "B in".to_string(),
                "A in".to_string(),
                "handler".to_string(),
                "A out".to_string(),
                "B out".to_string(),
            ]
        );
    }

    fn spawn_start(server: &Arc<Server>) -> JoinHandle<Result<(), ServerError>> {
        let server = Arc::clone(server);
        tokio::spawn(async move { server.start().await })
    }

    async fn wait_until_bound(server: &Server) -> SocketAddr {
        loop {
            if let Some(addr) = server.local_addr() {
                return addr;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn http_get(addr: SocketAddr, path: &str) -> io::Result<String> {
        let mut stream = TcpStream::connect(addr).await?;
        let request_text = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
        stream.write_all(request_text.as_bytes()).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    #[tokio::test]
    async fn serves_requests_through_middleware_and_router() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let log = Arc::clone(&log);
            handler_fn(move |_request| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("handler".to_string());
                    Ok(Response::raw(StatusCode::OK, "Hello, World!"))
                }
            })
        };
        let server = Arc::new(
            Server::new("127.0.0.1:0")
                .with_router(Router::new().route(Method::GET, "/", handler))
                .with_middleware(tagging("mw", Arc::clone(&log))),
        );

        let start_task = spawn_start(&server);
        let addr = wait_until_bound(&server).await;

        let response = http_get(addr, "/").await.expect("request should succeed");
        assert!(response.contains("200 OK"), "unexpected response: {response}");
        assert!(response.contains("Hello, World!"), "unexpected response: {response}");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["mw in".to_string(), "handler".to_string(), "mw out".to_string()],
        );

        server.shutdown().await;
        assert!(start_task.await.expect("start task should not panic").is_ok());
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_requests_and_refuses_new_connections() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let handler = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            handler_fn(move |_request| {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok(Response::raw(StatusCode::OK, "done"))
                }
            })
        };
        let server = Arc::new(Server::new("127.0.0.1:0").with_router(Router::new().route(Method::GET, "/", handler)));

        let start_task = spawn_start(&server);
        let addr = wait_until_bound(&server).await;

        let client = tokio::spawn(async move { http_get(addr, "/").await });
        entered.notified().await;

        let shutdown_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.shutdown().await })
        };

        // Give the accept loop time to observe the signal and close the
        // listener, then verify new connections are refused mid-drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(TcpStream::connect(addr).await.is_err(), "new connections should be refused during drain");

        release.notify_one();
        let response = client.await.expect("client task should not panic").expect("in-flight request should succeed");
        assert!(response.contains("200 OK"), "unexpected response: {response}");
        assert!(response.contains("done"), "unexpected response: {response}");

        shutdown_task.await.expect("shutdown task should not panic");
        assert!(start_task.await.expect("start task should not panic").is_ok());
    }

    #[tokio::test]
    async fn force_shutdown_aborts_in_flight_requests() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let handler = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            handler_fn(move |_request| {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok(Response::raw(StatusCode::OK, "done"))
                }
            })
        };
        let server = Arc::new(Server::new("127.0.0.1:0").with_router(Router::new().route(Method::GET, "/", handler)));

        let start_task = spawn_start(&server);
        let addr = wait_until_bound(&server).await;

        let client = tokio::spawn(async move { http_get(addr, "/").await });
        entered.notified().await;

        server.force_shutdown();

        match client.await.expect("client task should not panic") {
            Ok(response) => assert!(!response.contains("200 OK"), "aborted request should not succeed: {response}"),
            Err(_connection_failure) => {}
        }
        assert!(start_task.await.expect("start task should not panic").is_ok());
    }

    #[tokio::test]
    async fn start_reports_a_bind_failure() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("test listener should bind");
        let address = occupied.local_addr().expect("test listener should have an address").to_string();

        let server = Server::new(address);
        let result = server.start().await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn shutdown_of_a_never_started_server_returns_immediately() {
        let server = Server::new("127.0.0.1:0");
        server.shutdown().await;
    }
}
