//! Kiln Serve - live-reload development server
//!
//! Serves a directory over HTTP, injects the live-reload client into HTML
//! pages and pushes [`ReloadEvent`](kiln_tasks::ReloadEvent)s to connected
//! browsers over a websocket.

mod inject;
mod ws;

use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Router};
use futures::future::BoxFuture;
use futures::FutureExt;
use kiln_core::ServerConfig;
use kiln_tasks::{DevServer, ReloadChannel};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use inject::{client_script, inject_script};

/// Websocket endpoint
pub const WS_PATH: &str = "/__kiln/ws";
/// Client script endpoint
pub const CLIENT_PATH: &str = "/__kiln/client.js";

/// Shared handler state
pub(crate) struct ServeState {
    pub(crate) reload: ReloadChannel,
}

/// Build the application router
pub fn router(config: &ServerConfig, reload: ReloadChannel) -> Router {
    let state = Arc::new(ServeState { reload });
    let files = ServeDir::new(&config.base_dir).append_index_html_on_directories(true);

    Router::new()
        .route(WS_PATH, get(ws::ws_handler))
        .route(CLIENT_PATH, get(client))
        .fallback_service(files)
        .layer(middleware::from_fn(inject::inject_client))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn client() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/javascript; charset=utf-8")],
        client_script(),
    )
}

/// Serve on an already bound listener until the server stops
pub async fn serve_on(
    listener: TcpListener,
    config: &ServerConfig,
    reload: ReloadChannel,
) -> Result<(), ServeError> {
    info!(
        address = %listener.local_addr()?,
        base_dir = %config.base_dir.display(),
        "development server listening"
    );
    axum::serve(listener, router(config, reload)).await?;
    Ok(())
}

/// The development server used by `serve` tasks
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveServer;

impl LiveServer {
    /// Bind `host:port` and serve until the server stops
    pub async fn run(config: ServerConfig, reload: ReloadChannel) -> Result<(), ServeError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServeError::Bind { addr, source })?;
        serve_on(listener, &config, reload).await
    }
}

impl DevServer for LiveServer {
    fn serve(&self, config: ServerConfig, reload: ReloadChannel) -> BoxFuture<'static, std::io::Result<()>> {
        async move { Self::run(config, reload).await.map_err(std::io::Error::from) }.boxed()
    }
}

/// Development server errors
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an IO error
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ServeError> for std::io::Error {
    fn from(err: ServeError) -> Self {
        let kind = match &err {
            ServeError::Bind { source, .. } | ServeError::Io(source) => source.kind(),
        };
        std::io::Error::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start(base_dir: &std::path::Path) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            base_dir: base_dir.to_path_buf(),
            ..ServerConfig::default()
        };
        tokio::spawn(async move { serve_on(listener, &config, ReloadChannel::new()).await });
        addr
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_html_gets_client_script() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Hi</h1></body></html>",
        )
        .unwrap();
        let addr = start(temp.path()).await;

        let response = get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#"<h1>Hi</h1><script src="/__kiln/client.js"></script></body>"#));
    }

    #[tokio::test]
    async fn test_other_files_untouched() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("dist/css")).unwrap();
        std::fs::write(temp.path().join("dist/css/common.min.css"), "a{color:red}").unwrap();
        let addr = start(temp.path()).await;

        let response = get(addr, "/dist/css/common.min.css").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("a{color:red}"));
        assert!(!response.contains("<script"));
    }

    #[tokio::test]
    async fn test_client_script_served() {
        let temp = TempDir::new().unwrap();
        let addr = start(temp.path()).await;

        let response = get(addr, CLIENT_PATH).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("application/javascript"));
        assert!(response.contains("new WebSocket"));
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let temp = TempDir::new().unwrap();
        let addr = start(temp.path()).await;

        let response = get(addr, "/nope.html").await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_serve_error_into_io() {
        let err = ServeError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::AddrInUse);
        assert!(io.to_string().contains("127.0.0.1:1"));
    }
}
