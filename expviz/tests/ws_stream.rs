//! End-to-end: hub -> axum server -> WebSocket viewer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use expviz::hub::SnapshotHub;
use expviz::server;
use expviz::state::AppState;
use expviz::types::Snapshot;

fn snap(seq: u32) -> Snapshot {
    let mut s = Snapshot::empty(Utc::now());
    s.cmdline = vec!["fixture".into()];
    s.numbers.insert("seq".into(), seq as f64);
    s
}

async fn start(hub: SnapshotHub, static_dir: &std::path::Path) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = server::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let state = AppState::new(hub, static_dir.to_path_buf());
    tokio::spawn(server::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx)
}

type Viewer = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_seq(ws: &mut Viewer) -> Option<u32> {
    loop {
        let msg = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("message within timeout");
        match msg {
            Some(Ok(Message::Text(js))) => {
                let s: Snapshot = serde_json::from_str(&js).expect("snapshot json");
                return Some(s.numbers["seq"] as u32);
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn wait_for_viewers(hub: &SnapshotHub, n: usize) {
    for _ in 0..200 {
        if hub.len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} viewers, have {}", hub.len());
}

#[tokio::test]
async fn viewer_gets_backlog_then_live_updates() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SnapshotHub::new(3);
    for seq in 1..=4 {
        hub.publish(snap(seq)).unwrap();
    }
    let (addr, _stop) = start(hub.clone(), dir.path()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect");
    for want in [2, 3, 4] {
        assert_eq!(next_seq(&mut ws).await, Some(want));
    }

    wait_for_viewers(&hub, 1).await;
    hub.publish(snap(5)).unwrap();
    hub.publish(snap(6)).unwrap();
    assert_eq!(next_seq(&mut ws).await, Some(5));
    assert_eq!(next_seq(&mut ws).await, Some(6));
}

#[tokio::test]
async fn two_viewers_receive_the_same_stream() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SnapshotHub::new(10);
    hub.publish(snap(0)).unwrap();
    let (addr, _stop) = start(hub.clone(), dir.path()).await;

    let url = format!("ws://{addr}/ws");
    let (mut a, _) = connect_async(&url).await.unwrap();
    let (mut b, _) = connect_async(&url).await.unwrap();
    wait_for_viewers(&hub, 2).await;
    for seq in 1..=3 {
        hub.publish(snap(seq)).unwrap();
    }
    let mut got_a = Vec::new();
    let mut got_b = Vec::new();
    for _ in 0..4 {
        got_a.push(next_seq(&mut a).await.unwrap());
        got_b.push(next_seq(&mut b).await.unwrap());
    }
    assert_eq!(got_a, vec![0, 1, 2, 3]);
    assert_eq!(got_a, got_b);
}

#[tokio::test]
async fn closing_the_hub_ends_every_viewer() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SnapshotHub::new(4);
    let (addr, _stop) = start(hub.clone(), dir.path()).await;

    let url = format!("ws://{addr}/ws");
    let (mut a, _) = connect_async(&url).await.unwrap();
    let (mut b, _) = connect_async(&url).await.unwrap();
    wait_for_viewers(&hub, 2).await;

    hub.close();
    assert_eq!(next_seq(&mut a).await, None);
    assert_eq!(next_seq(&mut b).await, None);
}

#[tokio::test]
async fn disconnecting_viewer_is_unsubscribed() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SnapshotHub::new(4);
    let (addr, _stop) = start(hub.clone(), dir.path()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    wait_for_viewers(&hub, 1).await;
    ws.close(None).await.unwrap();
    drop(ws);
    wait_for_viewers(&hub, 0).await;

    // Publishing keeps working with nobody listening.
    assert_eq!(hub.publish(snap(1)).unwrap(), 0);
}

#[tokio::test]
async fn serves_static_viewer_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>expviz viewer</h1>").unwrap();
    let hub = SnapshotHub::new(1);
    let (addr, _stop) = start(hub, dir.path()).await;

    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("expviz viewer"), "{body}");

    let missing = reqwest::get(format!("http://{addr}/nope.js")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_static_dir_falls_back_to_built_in_page() {
    let dir = tempfile::tempdir().unwrap();
    let hub = SnapshotHub::new(1);
    hub.publish(snap(7)).unwrap();
    let (addr, _stop) = start(hub, &dir.path().join("does-not-exist")).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let ctype = resp.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap().to_owned();
    assert!(ctype.starts_with("text/html"), "{ctype}");
    let body = resp.text().await.unwrap();
    assert!(body.contains("<title>expviz</title>"), "{body}");
    assert!(body.contains("/ws"));

    // The stream still works alongside the built-in page.
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    assert_eq!(next_seq(&mut ws).await, Some(7));
}
