//! Live-reload dev server.
//!
//! Serves the output root as static files and streams [`ReloadEvent`]s to
//! browsers over Server-Sent Events. Every HTML response gets a small client
//! script that listens on the event stream: style-only events re-fetch the
//! page's stylesheets, anything else reloads the page.
//!
//! Event streams never finish on their own, so shutdown ends them through a
//! [`ShutdownHandle`] before the server waits for open connections.

use crate::build::BuildContext;
use crate::reload::{ReloadEvent, ReloadSignal};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Path of the SSE event stream.
pub const EVENTS_PATH: &str = "/__frontpipe/events";
/// Path of the live-reload client script.
pub const CLIENT_PATH: &str = "/__frontpipe/client.js";

/// Tag inserted into served HTML.
pub const CLIENT_TAG: &str = "<script src=\"/__frontpipe/client.js\"></script>";

const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource("/__frontpipe/events");
  source.onmessage = function (message) {
    var event = JSON.parse(message.data);
    if (!event.css_only) {
      window.location.reload();
      return;
    }
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var url = new URL(links[i].href);
      url.searchParams.set("frontpipe", Date.now());
      links[i].href = url.toString();
    }
  };
})();
"#;

/// Dev server error
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid listen address
    #[error("invalid server address {0}")]
    Address(String),
    /// Failed to bind the listener
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared flag that ends open event streams once the server is stopping.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the server as stopping. Wakes every pending [`triggered`](Self::triggered).
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called, including before this call.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let stopping = *rx.borrow_and_update();
            if stopping || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ServerState {
    reload: ReloadSignal,
    shutdown: ShutdownHandle,
}

/// Create the router serving `dir` with live reload wired to `reload`.
///
/// Event streams end when `shutdown` is triggered.
pub fn router(reload: ReloadSignal, dir: PathBuf, shutdown: ShutdownHandle) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(events_handler))
        .route(CLIENT_PATH, get(client_handler))
        .with_state(ServerState { reload, shutdown })
        .fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        .layer(middleware::from_fn(inject_client))
        .layer(TraceLayer::new_for_http())
}

/// Serve the context's output root until `shutdown` resolves.
pub async fn serve(
    ctx: &BuildContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let server = &ctx.config().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|_| ServerError::Address(format!("{}:{}", server.host, server.port)))?;

    let dir = ctx.serve_dir();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(dir = %dir.display(), "serving on http://{}", addr);

    serve_listener(listener, ctx.reload().clone(), dir, shutdown).await
}

/// Serve `dir` on an already bound listener until `shutdown` resolves.
///
/// Open event streams are closed first so the graceful shutdown does not wait
/// on connected browsers.
pub async fn serve_listener(
    listener: TcpListener,
    reload: ReloadSignal,
    dir: PathBuf,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let handle = ShutdownHandle::new();
    let app = router(reload, dir, handle.clone());
    let stopping = async move {
        shutdown.await;
        handle.trigger();
    };

    axum::serve(listener, app).with_graceful_shutdown(stopping).await.map_err(ServerError::Serve)?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");

    // A second Ctrl+C exits without waiting for open connections
    tokio::spawn(async {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("forced shutdown");
            std::process::exit(130);
        }
    });
}

async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let shutdown = state.shutdown;
    let events = BroadcastStream::new(state.reload.subscribe())
        .filter_map(|result| result.ok())
        .map(|event: ReloadEvent| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                format!(r#"{{"error": "serialization failed: {}"}}"#, e)
            });
            Ok(Event::default().data(data))
        });
    let stream = futures::StreamExt::take_until(events, async move { shutdown.triggered().await });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

async fn client_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], CLIENT_JS)
}

/// Insert the client tag into successful HTML responses.
async fn inject_client(request: Request, next: Next) -> Response {
    let head = request.method() == Method::HEAD;
    let response = next.run(request).await;
    if head || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::ETAG);
    Response::from_parts(parts, Body::from(html))
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Insert [`CLIENT_TAG`] before the last `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + CLIENT_TAG.len());
            out.push_str(&html[..index]);
            out.push_str(CLIENT_TAG);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{}{}", html, CLIENT_TAG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_body_close() {
        let html = "<html><body><p>hi</p></body></html>";
        assert_eq!(
            inject_script(html),
            format!("<html><body><p>hi</p>{}</body></html>", CLIENT_TAG)
        );
    }

    #[test]
    fn test_inject_uppercase_body() {
        let out = inject_script("<BODY>x</BODY>");
        assert_eq!(out, format!("<BODY>x{}</BODY>", CLIENT_TAG));
    }

    #[test]
    fn test_inject_appends_without_body() {
        assert_eq!(inject_script("<p>fragment</p>"), format!("<p>fragment</p>{}", CLIENT_TAG));
    }

    #[tokio::test]
    async fn test_shutdown_handle_wakes_waiters() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_triggered());

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.triggered().await }
        });
        handle.trigger();

        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
        assert!(handle.is_triggered());
        // Already triggered: resolves immediately
        tokio::time::timeout(Duration::from_secs(1), handle.triggered()).await.unwrap();
    }

    #[test]
    fn test_client_script_targets_events_path() {
        assert!(CLIENT_JS.contains(EVENTS_PATH));
        assert!(CLIENT_TAG.contains(CLIENT_PATH));
    }
}
