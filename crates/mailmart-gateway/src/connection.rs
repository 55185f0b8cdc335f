use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Relay outgoing messages to a bridge socket. The bearer token was already
/// checked at the HTTP upgrade, so there is no handshake here.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, remote: String) {
    let (mut sender, mut receiver) = socket.split();

    let conn_id = dispatcher.bridge_connected(remote.clone()).await;
    info!("Bridge {} ({}) connected to gateway", remote, conn_id);

    let mut outbox_rx = dispatcher.subscribe();

    // Anything published before this bridge arrived goes out first
    for message in dispatcher.drain_backlog() {
        let Ok(text) = serde_json::to_string(&message) else {
            continue;
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            dispatcher.bridge_disconnected(conn_id).await;
            return;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward outgoing messages -> bridge, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbox_rx.recv() => {
                    let message = match result {
                        Ok(message) => message,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Bridge receiver lagged, {} messages lost", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode message for chat {}: {}", message.chat_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping bridge", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Bridges only listen; anything but Pong/Close is ignored
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.bridge_disconnected(conn_id).await;
    info!("Bridge {} ({}) disconnected from gateway", remote, conn_id);
}
