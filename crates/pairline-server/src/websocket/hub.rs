//! Connection table and outbound fan-out.
//!
//! Each outbound event is encoded once into a WebSocket [`Message`]. Chunk
//! payloads become binary frames carrying only the bytes; everything else is
//! a JSON text frame. Cloning a message shares its buffer, so fan-out costs
//! one queue push per recipient.
//!
//! Delivery runs with the session registry locked, so it only ever enqueues.

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use pairline_core::metrics::WS_DELIVERY_DROPS_TOTAL;
use pairline_core::{ConnectionId, OutboundEvent};
use pairline_session::Gateway;

use super::connection::ClientConnection;

/// Registry of open connections. Implements [`Gateway`] for the router.
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    queue_capacity: usize,
}

impl ConnectionHub {
    /// Hub whose connections buffer up to `queue_capacity` outbound frames.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection and return it with its outbound queue.
    ///
    /// `closing` is cancelled if the client falls a full queue behind.
    pub fn register(&self, closing: CancellationToken) -> (Arc<ClientConnection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx, closing));
        let _ = self
            .connections
            .insert(connection.id.clone(), connection.clone());
        (connection, rx)
    }

    /// Forget a connection. Later deliveries to it fail.
    pub fn unregister(&self, id: &ConnectionId) {
        let _ = self.connections.remove(id);
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Number of open connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

/// Encode an event as the frame sent to clients.
pub fn encode(event: &OutboundEvent) -> Result<Message, serde_json::Error> {
    match event {
        OutboundEvent::FileChunk(bytes) => Ok(Message::Binary(bytes.clone())),
        other => Ok(Message::Text(serde_json::to_string(other)?.into())),
    }
}

impl Gateway for ConnectionHub {
    fn deliver(&self, recipients: &[ConnectionId], event: &OutboundEvent) -> usize {
        let message = match encode(event) {
            Ok(message) => message,
            Err(err) => {
                warn!(event = event.name(), error = %err, "failed to encode outbound event");
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient in recipients {
            let sent = self
                .get(recipient)
                .is_some_and(|conn| conn.send(message.clone()));
            if sent {
                delivered += 1;
            } else {
                counter!(WS_DELIVERY_DROPS_TOTAL).increment(1);
                warn!(connection = %recipient, event = event.name(), "dropping outbound frame");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn text(message: Message) -> serde_json::Value {
        let Message::Text(text) = message else {
            panic!("expected text frame");
        };
        serde_json::from_str(text.as_str()).unwrap()
    }

    #[test]
    fn register_and_unregister() {
        let hub = ConnectionHub::new(8);
        let (conn, _rx) = hub.register(CancellationToken::new());
        assert_eq!(hub.count(), 1);
        assert!(conn.id.as_str().starts_with("conn_"));
        assert!(hub.get(&conn.id).is_some());
        hub.unregister(&conn.id);
        assert_eq!(hub.count(), 0);
    }

    #[test]
    fn json_events_encode_as_text() {
        let frame = encode(&OutboundEvent::ParticipantCount { count: 2 }).unwrap();
        let json = text(frame);
        assert_eq!(json["event"], "participant-count");
        assert_eq!(json["data"]["count"], 2);
    }

    #[test]
    fn chunks_encode_as_bare_binary() {
        let frame = encode(&OutboundEvent::FileChunk(Bytes::from_static(b"\x00\x01"))).unwrap();
        let Message::Binary(bytes) = frame else {
            panic!("expected binary frame");
        };
        assert_eq!(&bytes[..], b"\x00\x01");
    }

    #[tokio::test]
    async fn deliver_fans_out_and_counts() {
        let hub = ConnectionHub::new(8);
        let (a, mut rx_a) = hub.register(CancellationToken::new());
        let (b, mut rx_b) = hub.register(CancellationToken::new());
        let ghost = ConnectionId::from("conn_gone");

        let n = hub.deliver(
            &[a.id.clone(), b.id.clone(), ghost],
            &OutboundEvent::TransferComplete,
        );
        assert_eq!(n, 2);
        assert_eq!(text(rx_a.recv().await.unwrap())["event"], "transfer-complete");
        assert_eq!(text(rx_b.recv().await.unwrap())["event"], "transfer-complete");
    }

    #[test]
    fn full_queue_does_not_block_other_recipient() {
        let hub = ConnectionHub::new(1);
        let (a, _rx_a) = hub.register(CancellationToken::new());
        let (b, _rx_b) = hub.register(CancellationToken::new());
        assert_eq!(hub.deliver(&[a.id.clone()], &OutboundEvent::TransferComplete), 1);

        let n = hub.deliver(&[a.id.clone(), b.id.clone()], &OutboundEvent::TransferComplete);
        assert_eq!(n, 1);
        assert_eq!(a.drop_count(), 1);
        assert!(a.is_closing());
        assert_eq!(b.drop_count(), 0);
        assert!(!b.is_closing());
    }

    #[test]
    fn chunk_flood_closes_slow_reader() {
        let hub = ConnectionHub::new(256);
        let closing = CancellationToken::new();
        let (slow, mut rx) = hub.register(closing.clone());

        let delivered: usize = (0..300u16)
            .map(|i| {
                let chunk = OutboundEvent::FileChunk(Bytes::from(i.to_be_bytes().to_vec()));
                hub.deliver(std::slice::from_ref(&slow.id), &chunk)
            })
            .sum();
        assert_eq!(delivered, 256);
        assert!(closing.is_cancelled());
        assert_eq!(slow.drop_count(), 44);

        // What did arrive is an unbroken prefix.
        for i in 0..256u16 {
            let Ok(Message::Binary(bytes)) = rx.try_recv() else {
                panic!("expected chunk {i}");
            };
            assert_eq!(&bytes[..], &i.to_be_bytes());
        }
        let late = OutboundEvent::FileChunk(Bytes::from_static(b"late"));
        assert_eq!(hub.deliver(std::slice::from_ref(&slow.id), &late), 0);
        assert!(rx.try_recv().is_err());
    }
}
