//! Per-connection read/write workers: the two cooperative tasks that drive
//! one subscriber's WebSocket once it has been accepted.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mentisaid_core::SandboxId;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Hub, OUTBOUND_BUFFER_DEPTH, PING_PERIOD, READ_IDLE_DEADLINE, WRITE_DEADLINE};

/// Registers `socket` as a subscriber of `sandbox_id` and drives it until
/// either cooperative worker observes a close or error, then unregisters it.
///
/// This is the body of the `/v1/sandboxes/{sbid}/stream` upgrade handler.
pub async fn serve_connection(hub: Arc<Hub>, sandbox_id: SandboxId, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER_DEPTH);
    hub.subscribe(sandbox_id.clone(), conn_id, outbound_tx).await;

    let (sink, stream) = socket.split();

    let writer = tokio::spawn(writer_loop(sink, outbound_rx));
    let reader = tokio::spawn(reader_loop(stream));

    // Either worker finishing means the connection is done; the other is
    // aborted rather than awaited so a dead peer can't wedge teardown.
    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    hub.unsubscribe(&sandbox_id, conn_id).await;
    tracing::debug!(sandbox_id = %sandbox_id, %conn_id, "subscriber disconnected");
}

async fn writer_loop(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Bytes>,
) {
    let mut ping_tick = tokio::time::interval(PING_PERIOD);
    ping_tick.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            maybe_bytes = outbound_rx.recv() => {
                let Some(bytes) = maybe_bytes else { break };
                let frame = Message::Text(String::from_utf8_lossy(&bytes).into_owned());
                match tokio::time::timeout(WRITE_DEADLINE, sink.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "write failed, closing connection");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!("write deadline exceeded, closing connection");
                        break;
                    }
                }
            }
            _ = ping_tick.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn reader_loop(mut stream: futures::stream::SplitStream<WebSocket>) {
    loop {
        match tokio::time::timeout(READ_IDLE_DEADLINE, stream.next()).await {
            Ok(Some(Ok(Message::Pong(_)))) => {
                // Deadline refreshes implicitly: the next loop iteration
                // re-arms a fresh READ_IDLE_DEADLINE timeout.
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(other))) => {
                tracing::debug!(?other, "unexpected client message on observation stream, ignoring");
            }
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "read error, closing connection");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!("read idle deadline exceeded, closing connection");
                break;
            }
        }
    }
}
