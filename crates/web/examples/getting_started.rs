use async_trait::async_trait;
use http::{Method, StatusCode};
use junction_web::{handler_fn, HandlerError, Request, Response, ResponseSink, Router, Server, SinkError, SinkHandler};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Middleware that logs method, path and elapsed time per request.
struct Timing {
    next: Arc<dyn SinkHandler>,
}

#[async_trait]
impl SinkHandler for Timing {
    async fn serve(&self, request: Request, sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();
        let result = self.next.serve(request, sink).await;
        info!(%method, path, elapsed = ?started.elapsed(), "served");
        result
    }
}

// curl http://127.0.0.1:8080/
async fn hello(_request: Request) -> Result<Response, HandlerError> {
    Ok(Response::raw(StatusCode::OK, "Hello, World!\r\n"))
}

// curl http://127.0.0.1:8080/greet/rust/
async fn greet(request: Request) -> Result<Response, HandlerError> {
    let name = request.params().get("name").unwrap_or("world").to_string();
    Ok(Response::object(StatusCode::OK, json!({ "greeting": format!("hello, {name}") })))
}

// curl http://127.0.0.1:8080/admin/status/
async fn status(_request: Request) -> Result<Response, HandlerError> {
    let body = json!({ "healthy": true }).as_object().cloned().unwrap_or_default();
    Ok(Response::json(StatusCode::OK, body))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let admin = Router::new().route(Method::GET, "/status/", handler_fn(status));
    let router = Router::new()
        .route(Method::GET, "/", handler_fn(hello))
        .route(Method::GET, "/greet/{name}/", handler_fn(greet))
        .link("/admin/", admin);

    let server = Arc::new(
        Server::new("127.0.0.1:8080")
            .with_router(router)
            .with_middleware(|next: Arc<dyn SinkHandler>| -> Arc<dyn SinkHandler> { Arc::new(Timing { next }) }),
    );

    let stopper = Arc::clone(&server);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("ctrl-c listener should install");
        info!("ctrl-c received, shutting down");
        stopper.shutdown().await;
    });

    if let Err(e) = server.start().await {
        error!(cause = %e, "server failed");
    }
}
