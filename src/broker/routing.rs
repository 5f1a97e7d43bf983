//! Broker routing table.
//!
//! Two concurrent maps:
//!
//! - `clients`: client id → connection that registered it
//! - `pending_origins`: request id → connection that sent the INVOKE
//!
//! Map guards are never held across an `.await`; connections are cloned out
//! before sending. Frames for another connection are queued with
//! [`Connection::try_send`], so a stalled peer never blocks the read loop of
//! the connection doing the routing. A peer whose queue is full is closed.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::invocation::{error_types, InvocationRequest, InvocationResult};
use crate::protocol::Frame;
use crate::session::Connection;

/// What happened to an INVOKE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeRoute {
    /// FORWARD queued to the target; the origin is recorded.
    Forwarded,
    /// Target unavailable; the origin got a `ClientNotAvailable` failure.
    Rejected,
}

/// What happened to a RESULT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultRoute {
    /// Relayed to the origin.
    Delivered,
    /// No origin recorded, or the origin is gone. Dropped.
    Orphaned,
}

/// Client directory and pending-origin table.
///
/// Clones share the same maps.
#[derive(Clone, Default)]
pub struct RoutingTable {
    clients: Arc<DashMap<String, Connection>>,
    pending_origins: Arc<DashMap<String, Connection>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `client_id` to `conn`, replacing any previous connection.
    ///
    /// When `conn` closes the mapping is removed, but only if it still
    /// points at `conn`: a newer registration under the same id survives
    /// the old connection's disconnect.
    pub fn register_client(&self, client_id: &str, conn: &Connection) {
        if let Some(previous) = self.clients.insert(client_id.to_string(), conn.clone()) {
            if previous != *conn {
                info!(
                    "Client '{}' re-registered on connection {} (was {})",
                    client_id,
                    conn.id(),
                    previous.id()
                );
            }
        } else {
            info!("Client '{}' registered on connection {}", client_id, conn.id());
        }

        let table = self.clone();
        let client_id = client_id.to_string();
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.closed().await;
            if table.unregister_if(&client_id, &conn) {
                info!("Client '{}' disconnected", client_id);
            }
        });
    }

    /// Remove `client_id` only if it is mapped to `conn`.
    pub fn unregister_if(&self, client_id: &str, conn: &Connection) -> bool {
        self.clients
            .remove_if(client_id, |_, mapped| mapped == conn)
            .is_some()
    }

    /// Whether `client_id` is mapped to an open connection.
    pub fn is_active(&self, client_id: &str) -> bool {
        self.clients
            .get(client_id)
            .map_or(false, |conn| conn.is_open())
    }

    fn active_connection(&self, client_id: &str) -> Option<Connection> {
        self.clients
            .get(client_id)
            .map(|entry| entry.value().clone())
            .filter(Connection::is_open)
    }

    /// Route an INVOKE from `origin`.
    ///
    /// # Errors
    ///
    /// Only if the failure reply to `origin` itself cannot be sent.
    pub async fn route_invoke(
        &self,
        origin: &Connection,
        request: InvocationRequest,
    ) -> Result<InvokeRoute> {
        let target_id = request.client_id().to_string();
        let request_id = request.request_id().to_string();

        let Some(target) = self.active_connection(&target_id) else {
            debug!("Target '{}' not available for request {}", target_id, request_id);
            origin
                .send(&not_available(&request_id, &target_id))
                .await?;
            return Ok(InvokeRoute::Rejected);
        };

        debug!(
            "Routing {} from connection {} to '{}'",
            request.signature(),
            origin.id(),
            target_id
        );

        // Record before sending so a fast RESULT always finds its origin.
        self.pending_origins.insert(request_id.clone(), origin.clone());

        if let Err(e) = target.try_send(&Frame::forward(request)) {
            warn!("FORWARD {} to '{}' failed: {}", request_id, target_id, e);
            close_if_stalled(&target, &e);
            self.pending_origins.remove(&request_id);
            origin
                .send(&not_available(&request_id, &target_id))
                .await?;
            return Ok(InvokeRoute::Rejected);
        }

        Ok(InvokeRoute::Forwarded)
    }

    /// Relay a RESULT back to the connection that issued the request.
    pub async fn route_result(&self, result: InvocationResult) -> ResultRoute {
        let Some((request_id, origin)) = self.pending_origins.remove(result.request_id()) else {
            warn!("Dropping RESULT for unknown request {}", result.request_id());
            return ResultRoute::Orphaned;
        };

        match origin.try_send(&Frame::result(result)) {
            Ok(()) => {
                debug!("Delivered RESULT {} to connection {}", request_id, origin.id());
                ResultRoute::Delivered
            }
            Err(e) => {
                warn!(
                    "Dropping RESULT {}: origin connection {} unavailable: {}",
                    request_id,
                    origin.id(),
                    e
                );
                close_if_stalled(&origin, &e);
                ResultRoute::Orphaned
            }
        }
    }

    /// Wipe both maps.
    pub fn clear(&self) {
        self.clients.clear();
        self.pending_origins.clear();
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Requests forwarded and awaiting their RESULT.
    pub fn pending_count(&self) -> usize {
        self.pending_origins.len()
    }

    /// Registered client ids, sorted.
    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.clients.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// A full outbound queue means the peer is not draining its socket.
fn close_if_stalled(conn: &Connection, error: &RelayError) {
    if matches!(error, RelayError::BackpressureTimeout) && conn.close() {
        warn!("Closed connection {}: outbound queue full", conn.id());
    }
}

fn not_available(request_id: &str, client_id: &str) -> Frame {
    Frame::result(InvocationResult::failure(
        request_id,
        error_types::CLIENT_NOT_AVAILABLE,
        format!("client not available: {}", client_id),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameBuffer;
    use crate::writer::WriterConfig;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn peer() -> (Connection, DuplexStream) {
        let (local, remote) = duplex(64 * 1024);
        (Connection::spawn(local, WriterConfig::default()), remote)
    }

    /// A connection whose peer never reads: the duplex buffer is smaller
    /// than one frame, and the queue is already at capacity.
    fn stalled_peer() -> (Connection, DuplexStream) {
        let (local, remote) = duplex(4);
        let config = WriterConfig {
            max_pending_frames: 1,
            channel_capacity: 1,
            backpressure_timeout: Duration::from_secs(60),
        };
        let conn = Connection::spawn(local, config);
        conn.try_send(&Frame::heartbeat()).unwrap();
        (conn, remote)
    }

    async fn next_frame(stream: &mut DuplexStream, buffer: &mut FrameBuffer) -> Frame {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(frame) = buffer.next_frame().unwrap() {
                return frame;
            }
            let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut chunk))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0);
            buffer.extend(&chunk[..n]);
        }
    }

    async fn assert_silent(stream: &mut DuplexStream) {
        let mut chunk = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_millis(50), stream.read(&mut chunk)).await;
        assert!(read.is_err(), "unexpected bytes on stream");
    }

    fn request(id: &str, target: &str) -> InvocationRequest {
        InvocationRequest::builder()
            .request_id(id)
            .client_id(target)
            .target_class("Calculator")
            .target_method("add")
            .arg("int", json!(1))
            .arg("int", json!(2))
            .return_type("int")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_is_active() {
        let table = RoutingTable::new();
        let (conn, _remote) = peer();

        assert!(!table.is_active("b"));
        table.register_client("b", &conn);
        assert!(table.is_active("b"));
        assert_eq!(table.client_ids(), vec!["b".to_string()]);

        conn.close();
        assert!(!table.is_active("b"));
    }

    #[tokio::test]
    async fn test_disconnect_removes_mapping() {
        let table = RoutingTable::new();
        let (conn, _remote) = peer();
        table.register_client("b", &conn);

        conn.close();
        tokio::time::timeout(Duration::from_secs(1), async {
            while table.client_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_old_connection_close_keeps_new_mapping() {
        let table = RoutingTable::new();
        let (old, _r1) = peer();
        let (new, _r2) = peer();

        table.register_client("b", &old);
        table.register_client("b", &new);

        old.close();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(table.is_active("b"));
        assert!(!table.unregister_if("b", &old));
        assert!(table.unregister_if("b", &new));
    }

    #[tokio::test]
    async fn test_route_invoke_forwards_and_records_origin() {
        let table = RoutingTable::new();
        let (origin, mut origin_remote) = peer();
        let (target, mut target_remote) = peer();
        table.register_client("b", &target);

        let route = table.route_invoke(&origin, request("r-1", "b")).await.unwrap();
        assert_eq!(route, InvokeRoute::Forwarded);
        assert_eq!(table.pending_count(), 1);

        let mut buffer = FrameBuffer::new();
        let forwarded = next_frame(&mut target_remote, &mut buffer).await;
        assert_eq!(forwarded, Frame::forward(request("r-1", "b")));

        assert_silent(&mut origin_remote).await;
    }

    #[tokio::test]
    async fn test_route_invoke_unknown_target() {
        let table = RoutingTable::new();
        let (origin, mut origin_remote) = peer();

        let route = table
            .route_invoke(&origin, request("r-1", "ghost"))
            .await
            .unwrap();
        assert_eq!(route, InvokeRoute::Rejected);
        assert_eq!(table.pending_count(), 0);

        let mut buffer = FrameBuffer::new();
        let reply = next_frame(&mut origin_remote, &mut buffer).await;
        assert_eq!(
            reply.as_result().unwrap(),
            &InvocationResult::failure(
                "r-1",
                error_types::CLIENT_NOT_AVAILABLE,
                "client not available: ghost"
            )
        );
    }

    #[tokio::test]
    async fn test_route_invoke_closed_target() {
        let table = RoutingTable::new();
        let (origin, mut origin_remote) = peer();
        let (target, _target_remote) = peer();
        table.register_client("b", &target);
        target.close();

        let route = table.route_invoke(&origin, request("r-1", "b")).await.unwrap();
        assert_eq!(route, InvokeRoute::Rejected);
        assert_eq!(table.pending_count(), 0);

        let mut buffer = FrameBuffer::new();
        let reply = next_frame(&mut origin_remote, &mut buffer).await;
        assert!(reply.as_result().unwrap().is_failure());
    }

    #[tokio::test]
    async fn test_route_invoke_to_stalled_target_does_not_block() {
        let table = RoutingTable::new();
        let (origin, mut origin_remote) = peer();
        let (target, _target_remote) = stalled_peer();
        table.register_client("b", &target);

        let route = tokio::time::timeout(
            Duration::from_secs(1),
            table.route_invoke(&origin, request("r-1", "b")),
        )
        .await
        .expect("routing waited on the target's queue")
        .unwrap();
        assert_eq!(route, InvokeRoute::Rejected);
        assert_eq!(table.pending_count(), 0);
        assert!(!target.is_open());

        let mut buffer = FrameBuffer::new();
        let reply = next_frame(&mut origin_remote, &mut buffer).await;
        assert_eq!(
            reply.as_result().unwrap(),
            &InvocationResult::failure(
                "r-1",
                error_types::CLIENT_NOT_AVAILABLE,
                "client not available: b"
            )
        );

        tokio::time::timeout(Duration::from_secs(1), async {
            while table.client_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_route_result_to_stalled_origin_does_not_block() {
        let table = RoutingTable::new();
        let (origin, _origin_remote) = stalled_peer();
        let (target, _target_remote) = peer();
        table.register_client("b", &target);

        let route = table.route_invoke(&origin, request("r-1", "b")).await.unwrap();
        assert_eq!(route, InvokeRoute::Forwarded);

        let route = tokio::time::timeout(
            Duration::from_secs(1),
            table.route_result(InvocationResult::success("r-1", json!(3))),
        )
        .await
        .expect("routing waited on the origin's queue");
        assert_eq!(route, ResultRoute::Orphaned);
        assert_eq!(table.pending_count(), 0);
        assert!(!origin.is_open());
        assert!(target.is_open());
    }

    #[tokio::test]
    async fn test_route_result_returns_to_origin_once() {
        let table = RoutingTable::new();
        let (origin, mut origin_remote) = peer();
        let (target, _target_remote) = peer();
        table.register_client("b", &target);
        table.route_invoke(&origin, request("r-1", "b")).await.unwrap();

        let result = InvocationResult::success("r-1", json!(3));
        assert_eq!(table.route_result(result.clone()).await, ResultRoute::Delivered);
        assert_eq!(table.pending_count(), 0);

        let mut buffer = FrameBuffer::new();
        let relayed = next_frame(&mut origin_remote, &mut buffer).await;
        assert_eq!(relayed, Frame::result(result.clone()));

        assert_eq!(table.route_result(result).await, ResultRoute::Orphaned);
        assert_silent(&mut origin_remote).await;
    }

    #[tokio::test]
    async fn test_route_result_unknown_request() {
        let table = RoutingTable::new();
        let route = table
            .route_result(InvocationResult::success("nope", json!(null)))
            .await;
        assert_eq!(route, ResultRoute::Orphaned);
    }

    #[tokio::test]
    async fn test_route_result_to_closed_origin() {
        let table = RoutingTable::new();
        let (origin, _origin_remote) = peer();
        let (target, _target_remote) = peer();
        table.register_client("b", &target);
        table.route_invoke(&origin, request("r-1", "b")).await.unwrap();

        origin.close();
        let route = table
            .route_result(InvocationResult::success("r-1", json!(3)))
            .await;
        assert_eq!(route, ResultRoute::Orphaned);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let table = RoutingTable::new();
        let (origin, _r1) = peer();
        let (target, _r2) = peer();
        table.register_client("b", &target);
        table.route_invoke(&origin, request("r-1", "b")).await.unwrap();

        table.clear();
        assert_eq!(table.client_count(), 0);
        assert_eq!(table.pending_count(), 0);
    }
}
