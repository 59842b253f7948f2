//! WebSocket upgrade and per-connection handler. Each connection is one broadcast
//! subscriber for as long as the socket stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Dropping the subscription on any exit path deregisters it.
    let mut sub = state.broadcaster.subscribe().await;
    let id = sub.id();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            payload = sub.recv() => {
                let Some(payload) = payload else { break };
                if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                    debug!("ws {id}: send failed: {e}");
                    break;
                }
            }
            msg = stream.next() => match msg {
                // answered through the subscription so it stays ordered with ticks
                Some(Ok(Message::Text(text))) if text.trim() == "get_status" => {
                    sub.request_snapshot();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("ws {id}: receive failed: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = sink.close().await;
}
