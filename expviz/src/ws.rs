//! WebSocket upgrade and per-viewer handler. Streams backlog then live snapshots.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Why a viewer session ended.
#[derive(Debug)]
enum Ended {
    ClientClosed,
    SendFailed(axum::Error),
    Encode(serde_json::Error),
    HubClosed,
    Dropped,
}

impl fmt::Display for Ended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ended::ClientClosed => f.write_str("client closed"),
            Ended::SendFailed(e) => write!(f, "send failed: {e}"),
            Ended::Encode(e) => write!(f, "encode failed: {e}"),
            Ended::HubClosed => f.write_str("hub closed"),
            Ended::Dropped => f.write_str("dropped as slow consumer"),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let mut sub = match state.hub.subscribe() {
        Ok(s) => s,
        Err(e) => {
            debug!(%peer, "rejecting viewer: {e}");
            return;
        }
    };

    let viewers = state.viewer_count.fetch_add(1, Ordering::Relaxed) + 1;
    info!(%peer, subscription = %sub.id(), viewers, "viewer connected");

    // Ensure we decrement on disconnect (drop).
    struct ViewerGuard(AppState);
    impl Drop for ViewerGuard {
        fn drop(&mut self) {
            self.0.viewer_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
    let _guard = ViewerGuard(state.clone());

    let (mut tx, mut rx) = socket.split();
    let ended = loop {
        tokio::select! {
            next = sub.next() => {
                let Some(snap) = next else {
                    break if state.hub.is_closed() { Ended::HubClosed } else { Ended::Dropped };
                };
                let js = match serde_json::to_string(&*snap) {
                    Ok(js) => js,
                    Err(e) => break Ended::Encode(e),
                };
                if let Err(e) = tx.send(Message::Text(js)).await {
                    break Ended::SendFailed(e);
                }
            }
            msg = rx.next() => match msg {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break Ended::ClientClosed,
                // Viewers have nothing to say; pings are answered by the transport.
                Some(Ok(_)) => {}
            },
        }
    };

    if matches!(ended, Ended::HubClosed | Ended::Dropped) {
        let _ = tx.send(Message::Close(None)).await;
    }
    sub.close();
    state.hub.unsubscribe(sub.id());
    debug!(%peer, subscription = %sub.id(), reason = %ended, "viewer disconnected");
}
