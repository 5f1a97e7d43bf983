//! Broker - TCP accept loop and per-connection frame routing.
//!
//! Each accepted socket becomes a [`Connection`] driven by
//! [`run_session`]. Frames are handled as follows:
//!
//! | Frame     | Action                                                   |
//! |-----------|----------------------------------------------------------|
//! | REGISTER  | bind the connection's id, add to the directory, echo     |
//! | INVOKE    | [`RoutingTable::route_invoke`]                           |
//! | RESULT    | [`RoutingTable::route_result`]                           |
//! | FORWARD   | not expected from a client; logged and dropped           |
//! | HEARTBEAT | echoed by the session layer                              |
//!
//! # Example
//!
//! ```no_run
//! use switchboard::{Broker, BrokerConfig};
//!
//! # async fn run() -> switchboard::Result<()> {
//! let broker = Broker::bind(BrokerConfig::default()).await?;
//! let shutdown = broker.shutdown_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     shutdown.trigger();
//! });
//! broker.run().await
//! # }
//! ```

mod routing;

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub use routing::{InvokeRoute, ResultRoute, RoutingTable};

use crate::config::BrokerConfig;
use crate::error::Result;
use crate::handler::BoxFuture;
use crate::protocol::{Frame, MessageType, Payload};
use crate::session::{run_session, Connection, FrameHandler, Signal};
use crate::writer::WriterConfig;

/// A bound, not yet running broker.
pub struct Broker {
    listener: TcpListener,
    table: RoutingTable,
    writer_config: WriterConfig,
    shutdown: Signal,
}

/// Stops a running broker.
#[derive(Clone, Debug)]
pub struct BrokerShutdown {
    signal: Signal,
}

impl BrokerShutdown {
    /// Stop accepting, close every connection and clear the routing table.
    pub fn trigger(&self) {
        if self.signal.fire() {
            info!("Broker shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.signal.is_fired()
    }
}

impl Broker {
    /// Bind the listening socket.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Broker listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            table: RoutingTable::new(),
            writer_config: config.writer,
            shutdown: Signal::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.table.clone()
    }

    pub fn shutdown_handle(&self) -> BrokerShutdown {
        BrokerShutdown {
            signal: self.shutdown.clone(),
        }
    }

    /// Accept connections until shutdown is triggered.
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.fired() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            self.table.clone(),
                            self.writer_config.clone(),
                            self.shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }

        self.table.clear();
        info!("Broker stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    table: RoutingTable,
    writer_config: WriterConfig,
    shutdown: Signal,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed for {}: {}", peer, e);
    }

    let (reader, writer) = stream.into_split();
    let conn = Connection::spawn(writer, writer_config);
    debug!("Connection {} accepted from {}", conn.id(), peer);

    let router = BrokerSession { table };
    let result = tokio::select! {
        result = run_session(reader, conn.clone(), &router) => result,
        _ = shutdown.fired() => Ok(()),
    };
    conn.close();

    match result {
        Ok(()) => debug!("Connection {} from {} closed", conn.id(), peer),
        Err(e) => warn!("Connection {} from {} dropped: {}", conn.id(), peer, e),
    }
}

/// Routes frames arriving on one broker-side connection.
struct BrokerSession {
    table: RoutingTable,
}

impl FrameHandler for BrokerSession {
    fn handle_frame<'a>(
        &'a self,
        conn: &'a Connection,
        frame: Frame,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let message_type = frame.message_type();
            match (message_type, frame.into_payload()) {
                (MessageType::Register, Some(Payload::Registration(registration))) => {
                    if conn.bind_client_id(registration.client_id())? {
                        self.table.register_client(registration.client_id(), conn);
                    }
                    conn.send(&Frame::register(registration)).await
                }
                (MessageType::Invoke, Some(Payload::Request(request))) => {
                    self.table.route_invoke(conn, request).await.map(|_| ())
                }
                (MessageType::Result, Some(Payload::Result(result))) => {
                    self.table.route_result(result).await;
                    Ok(())
                }
                (other, _) => {
                    warn!(
                        "Ignoring unexpected {} frame on connection {}",
                        other,
                        conn.id()
                    );
                    Ok(())
                }
            }
        })
    }
}
