//! HTTP surface: `/ws` for the snapshot stream, static viewer assets for the rest.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};

use axum::{response::Html, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::warn;

use crate::state::AppState;
use crate::ws::ws_handler;

/// Viewer page compiled into the binary, served when no static directory exists.
const EMBEDDED_INDEX: &str = include_str!("../static/index.html");

async fn embedded_index() -> Html<&'static str> {
    Html(EMBEDDED_INDEX)
}

pub fn router(state: AppState) -> Router {
    let app = Router::new().route("/ws", get(ws_handler));
    let app = if state.static_dir.is_dir() {
        let assets =
            ServeDir::new(state.static_dir.as_path()).append_index_html_on_directories(true);
        app.fallback_service(assets)
    } else {
        warn!(dir = %state.static_dir.display(), "static directory not found; serving the built-in viewer page");
        app.route("/", get(embedded_index))
            .route("/index.html", get(embedded_index))
    };
    app.with_state(state)
}

/// Bind on `interface`; port 0 picks an ephemeral port.
pub async fn bind(interface: IpAddr, port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::new(interface, port)).await
}

/// Serve until `shutdown` resolves, then drain open requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
