//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pairline_core::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use pairline_session::EventRouter;

use super::connection::ClientConnection;
use super::hub::ConnectionHub;

/// How long the writer gets to flush queued frames after the reader stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat parameters for one session.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server pings.
    pub interval: Duration,
    /// Silence after which the client is dropped.
    pub timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub
/// 2. Forwards text and binary frames to the event router
/// 3. Writes queued outbound frames and periodic pings
/// 4. Closes on client close, heartbeat timeout, a full outbound queue, or
///    `shutdown`
/// 5. Removes the connection from its session
#[instrument(skip_all, fields(connection = tracing::field::Empty))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<ConnectionHub>,
    router: EventRouter,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let closing = shutdown.child_token();
    let (connection, send_rx) = hub.register(closing.clone());
    let id = connection.id.clone();
    let _ = tracing::Span::current().record("connection", id.as_str());

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (ws_tx, mut ws_rx) = ws.split();
    let outbound = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        connection.clone(),
        heartbeat,
        closing.clone(),
    ));

    loop {
        let frame = tokio::select! {
            () = closing.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        match msg {
            Message::Text(text) => router.handle_text(&id, text.as_str()),
            Message::Binary(data) => router.handle_binary(&id, data),
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    router.disconnect(&id);
    hub.unregister(&id);
    closing.cancel();
    if tokio::time::timeout(FLUSH_TIMEOUT, outbound).await.is_err() {
        warn!("outbound writer did not finish flushing");
    }

    info!(
        age_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Forward queued frames to the socket and keep the heartbeat.
///
/// On `closing`, drains whatever is already queued, sends a Close frame and
/// returns. A heartbeat timeout cancels `closing` so the reader stops too.
async fn write_loop<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Message>,
    connection: Arc<ClientConnection>,
    heartbeat: Heartbeat,
    closing: CancellationToken,
) where
    S: futures::Sink<Message> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            () = closing.cancelled() => {
                while let Ok(msg) = send_rx.try_recv() {
                    if ws_tx.send(msg).await.is_err() {
                        return;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
            msg = send_rx.recv() => {
                let Some(msg) = msg else { break };
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.last_seen_elapsed() > heartbeat.timeout {
                    warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(bytes::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    closing.cancel();
}
