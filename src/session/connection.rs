//! Connection handle shared by the read loop, the writer task and routers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::AsyncWrite;
use tracing::debug;

use super::Signal;
use crate::error::{RelayError, Result};
use crate::protocol::Frame;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A live link to a peer.
///
/// Clones share state. Equality is identity: two handles are equal only if
/// they refer to the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    writer: WriterHandle,
    closed: Signal,
    /// Peer identity, bound by the first REGISTER.
    client_id: OnceLock<String>,
}

impl Connection {
    /// Wrap the write half of a stream and start its writer task.
    pub fn spawn<W>(writer: W, config: WriterConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let closed = Signal::new();
        let (writer, _task) = spawn_writer_task(writer, config, closed.clone());

        Self {
            inner: Arc::new(Inner {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                writer,
                closed,
                client_id: OnceLock::new(),
            }),
        }
    }

    /// Process-unique connection number (for logs).
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        !self.inner.closed.is_fired()
    }

    /// Close the connection. Returns `true` if this call closed it.
    ///
    /// The writer task and read loop both stop, which drops the socket.
    pub fn close(&self) -> bool {
        let closed = self.inner.closed.fire();
        if closed {
            debug!("Connection {} closed", self.inner.id);
        }
        closed
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.inner.closed.fired().await
    }

    /// Encode a frame and queue it for the writer task.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        if !self.is_open() {
            return Err(RelayError::ConnectionClosed);
        }
        let outbound = OutboundFrame::encode(frame)?;
        self.inner.writer.send(outbound).await
    }

    /// Encode a frame and queue it without waiting on backpressure.
    ///
    /// For frames sent on behalf of another connection: a full queue fails
    /// with [`RelayError::BackpressureTimeout`] instead of stalling the
    /// sender.
    pub fn try_send(&self, frame: &Frame) -> Result<()> {
        if !self.is_open() {
            return Err(RelayError::ConnectionClosed);
        }
        let outbound = OutboundFrame::encode(frame)?;
        self.inner.writer.try_send(outbound)
    }

    /// Bind the peer identity.
    ///
    /// Returns `Ok(true)` on first bind, `Ok(false)` if the same id was
    /// already bound, and an error if a different id was bound.
    pub fn bind_client_id(&self, client_id: &str) -> Result<bool> {
        let mut newly_bound = false;
        let bound = self.inner.client_id.get_or_init(|| {
            newly_bound = true;
            client_id.to_string()
        });

        if bound != client_id {
            return Err(RelayError::Protocol(format!(
                "Connection {} already registered as '{}', refusing '{}'",
                self.inner.id, bound, client_id
            )));
        }

        Ok(newly_bound)
    }

    /// Peer identity, once registered.
    pub fn client_id(&self) -> Option<&str> {
        self.inner.client_id.get().map(String::as_str)
    }

    /// Queued-but-unwritten frames on this connection.
    pub fn pending_frames(&self) -> usize {
        self.inner.writer.pending_count()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("client_id", &self.client_id())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, HEADER_SIZE};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (local, mut remote) = duplex(4096);
        let conn = Connection::spawn(local, WriterConfig::default());

        conn.send(&Frame::heartbeat()).await.unwrap();

        let mut buf = [0u8; HEADER_SIZE];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf.to_vec(), encode_frame(&Frame::heartbeat()).unwrap());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_observable() {
        let (local, _remote) = duplex(4096);
        let conn = Connection::spawn(local, WriterConfig::default());
        let other = conn.clone();

        assert!(conn.is_open());
        assert!(other.close());
        assert!(!conn.close());
        assert!(!conn.is_open());

        tokio::time::timeout(Duration::from_millis(100), conn.closed())
            .await
            .unwrap();

        let err = conn.send(&Frame::heartbeat()).await.unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_drop_closes_after_failed_write() {
        let (local, remote) = duplex(64);
        let conn = Connection::spawn(local, WriterConfig::default());
        drop(remote);

        let _ = conn.send(&Frame::heartbeat()).await;
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_client_id_once() {
        let (local, _remote) = duplex(64);
        let conn = Connection::spawn(local, WriterConfig::default());

        assert_eq!(conn.client_id(), None);
        assert!(conn.bind_client_id("alpha").unwrap());
        assert!(!conn.bind_client_id("alpha").unwrap());
        assert!(conn.bind_client_id("beta").is_err());
        assert_eq!(conn.client_id(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_identity_equality() {
        let (a, _ra) = duplex(64);
        let (b, _rb) = duplex(64);
        let conn_a = Connection::spawn(a, WriterConfig::default());
        let conn_b = Connection::spawn(b, WriterConfig::default());

        assert_eq!(conn_a, conn_a.clone());
        assert_ne!(conn_a, conn_b);
        assert_ne!(conn_a.id(), conn_b.id());
    }

    #[tokio::test]
    async fn test_try_send_on_full_queue_fails_without_waiting() {
        // Smaller than one frame, and never read.
        let (local, _remote) = duplex(4);
        let config = WriterConfig {
            max_pending_frames: 1,
            channel_capacity: 1,
            backpressure_timeout: Duration::from_secs(60),
        };
        let conn = Connection::spawn(local, config);

        conn.try_send(&Frame::heartbeat()).unwrap();
        let err = conn.try_send(&Frame::heartbeat()).unwrap_err();
        assert!(matches!(err, RelayError::BackpressureTimeout));
        assert_eq!(conn.pending_frames(), 1);

        conn.close();
        let err = conn.try_send(&Frame::heartbeat()).unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));
    }
}
