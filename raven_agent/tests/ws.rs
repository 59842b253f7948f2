//! WebSocket feed against a real listener.
mod common;

use common::{state, CannedRunner, PS_ALL_UP};
use futures_util::{SinkExt, StreamExt};
use raven_agent::api::router;
use raven_agent::state::AppState;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn serve(interval: Duration) -> (SocketAddr, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let (state, _task) = state(tmp.path(), CannedRunner::default().with("ps", PS_ALL_UP), interval);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state, tmp)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn next_status(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("no message before timeout")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(v["type"], "system_status");
            return v["payload"].clone();
        }
    }
}

#[tokio::test]
async fn snapshot_arrives_on_connect_and_on_tick() {
    // tick far enough out that the first message can only be the join snapshot
    let (addr, _state, _tmp) = serve(Duration::from_millis(400)).await;
    let mut ws = connect(addr).await;

    let first = timeout(Duration::from_millis(300), next_status(&mut ws))
        .await
        .expect("join snapshot should not wait for a tick");
    assert_eq!(first["overallState"], "connected");
    assert_eq!(first["services"]["goflow2"], true);

    let second = next_status(&mut ws).await;
    assert!(second["timestampMs"].as_u64() >= first["timestampMs"].as_u64());
}

#[tokio::test]
async fn get_status_frame_answers_only_the_asker() {
    let (addr, _state, _tmp) = serve(Duration::from_secs(3600)).await;
    let mut asker = connect(addr).await;
    let mut other = connect(addr).await;
    next_status(&mut asker).await;
    next_status(&mut other).await;

    asker.send(Message::Text("get_status".into())).await.unwrap();
    let reply = next_status(&mut asker).await;
    assert!(reply["services"].is_object());

    let nothing = timeout(Duration::from_millis(300), other.next()).await;
    assert!(nothing.is_err(), "other client should not see the reply");
}

#[tokio::test]
async fn closing_a_client_removes_it() {
    let (addr, state, _tmp) = serve(Duration::from_millis(100)).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_status(&mut a).await;
    next_status(&mut b).await;
    assert_eq!(state.broadcaster.subscriber_count().await, 2);

    b.close(None).await.unwrap();
    drop(b);

    let removed = timeout(WAIT, async {
        loop {
            if state.broadcaster.subscriber_count().await == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(removed.is_ok(), "closed client still registered");

    // the survivor keeps receiving ticks
    next_status(&mut a).await;
}
