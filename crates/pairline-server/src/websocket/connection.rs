//! WebSocket client connection state.
//!
//! The outbound queue is bounded. A client that lets it fill up is not
//! served a gapped stream: the frame that does not fit is refused, the
//! connection is marked closing, and every later frame is refused too.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use pairline_core::ConnectionId;

/// A connected WebSocket client, as seen by the outbound path.
pub struct ClientConnection {
    /// Connection ID.
    pub id: ConnectionId,
    /// Queue feeding the client's write task.
    tx: mpsc::Sender<Message>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether any frame arrived since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last frame arrived, on the tokio clock.
    last_seen: Mutex<tokio::time::Instant>,
    /// Frames dropped because the queue was full or closed.
    dropped_messages: AtomicU64,
    /// Cancelled when the connection must stop; shared with its socket tasks.
    closing: CancellationToken,
}

impl ClientConnection {
    /// Create a connection writing into `tx`, closed through `closing`.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Message>, closing: CancellationToken) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(tokio::time::Instant::now()),
            dropped_messages: AtomicU64::new(0),
            closing,
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `false` and counts the drop if the frame was not queued. A
    /// full queue also cancels the closing token, after which nothing more
    /// is accepted.
    pub fn send(&self, message: Message) -> bool {
        if self.closing.is_cancelled() {
            return self.refuse();
        }
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %self.id, "outbound queue full, closing connection");
                self.closing.cancel();
                self.refuse()
            }
            Err(TrySendError::Closed(_)) => self.refuse(),
        }
    }

    fn refuse(&self) -> bool {
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Whether the connection has been told to close.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = tokio::time::Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
