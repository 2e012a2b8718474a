//! WebSocket endpoint feeding the hub.
//!
//! Each socket is two tasks: a writer draining the connection's outbound
//! queue (plus keep-alive pings) and a reader waiting for the peer to go
//! away. Whichever finishes first tears down the other, then the connection
//! is unregistered. Inbound frames carry no commands; sends go through the
//! HTTP API.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use courier_shared::protocol::Payload;
use courier_shared::types::UserId;

use crate::auth::Caller;
use crate::hub::LiveConnection;
use crate::state::AppState;

pub async fn ws_handler(
    Caller(user_id): Caller,
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, state: AppState) {
    let (connection, outbound) = LiveConnection::channel(state.config.outbound_buffer);
    let connection_id = connection.id();
    state.hub.register(user_id, connection);

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, state.config.ws_ping_interval));

    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(user = %user_id, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.hub.unregister(user_id, connection_id);
    info!(
        user = %user_id,
        connection = %connection_id,
        remaining = state.hub.connection_count(user_id),
        "WebSocket closed"
    );
}

/// Forward queued payloads as text frames until the queue closes (the hub
/// evicted this connection) or the socket refuses a write.
async fn write_loop<S>(mut sink: S, mut outbound: mpsc::Receiver<Payload>, ping_every: Duration)
where
    S: SinkExt<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_every);
    // The first tick completes immediately.
    ping.tick().await;

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(payload) = next else { break };
                if sink.send(Message::Text(payload.to_string())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    #[tokio::test]
    async fn test_writer_forwards_payloads_as_text() {
        let (sink, mut frames) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel::<Payload>(4);

        let writer = tokio::spawn(write_loop(sink, rx, Duration::from_secs(3600)));
        tx.send(Payload::from("{\"data\":1}")).await.unwrap();
        drop(tx);
        writer.await.unwrap();

        match frames.next().await {
            Some(Message::Text(text)) => assert_eq!(text, "{\"data\":1}"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_writer_pings_on_interval() {
        let (sink, mut frames) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel::<Payload>(4);

        let writer = tokio::spawn(write_loop(sink, rx, Duration::from_millis(20)));

        assert!(matches!(frames.next().await, Some(Message::Ping(_))));
        drop(tx);
        writer.await.unwrap();
    }
}
