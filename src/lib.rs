//! # switchboard
//!
//! Broker-routed method invocation between peers over TCP.
//!
//! Clients register with a central broker under a client id. Any client can
//! then ask the broker to invoke a method on another client and await the
//! result:
//!
//! ```text
//! caller ──INVOKE──► broker ──FORWARD──► target
//! caller ◄──RESULT── broker ◄──RESULT─── target
//! ```
//!
//! ## Wire format
//!
//! Every frame is a 1-byte type, a big-endian `i32` length and that many
//! bytes of UTF-8 JSON. See [`protocol`].
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use switchboard::invocation::MethodDescriptor;
//! use switchboard::{Broker, BrokerConfig, Client, MethodCall};
//!
//! #[tokio::main]
//! async fn main() -> switchboard::Result<()> {
//!     let broker = Broker::bind(BrokerConfig::new("127.0.0.1", 0)).await?;
//!     let port = broker.local_addr()?.port();
//!     tokio::spawn(broker.run());
//!
//!     let calc = Client::builder("calc")
//!         .broker("127.0.0.1", port)
//!         .handle(
//!             MethodDescriptor::new("Calculator", "add").param("int").param("int").returns("int"),
//!             |(a, b): (i64, i64)| async move { Ok(a + b) },
//!         )
//!         .start()
//!         .await?;
//!     let app = Client::builder("app").broker("127.0.0.1", port).start().await?;
//!
//!     calc.wait_registered(Duration::from_secs(5)).await?;
//!     app.wait_registered(Duration::from_secs(5)).await?;
//!
//!     let call = MethodCall::new("Calculator", "add")
//!         .arg("int", json!(2))
//!         .arg("int", json!(3))
//!         .returns("int");
//!     assert_eq!(app.invoke("calc", call).await?, json!(5));
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod invocation;
pub mod protocol;
pub mod session;
pub mod writer;

mod client;
mod stub;

pub use broker::{Broker, BrokerShutdown, RoutingTable};
pub use client::{Client, ClientBuilder, MethodCall, PendingCalls};
pub use config::{BrokerConfig, ClientConfig};
pub use error::{RelayError, Result};
pub use handler::{Dispatcher, HandlerRegistry, MethodRegistry};
pub use stub::RemoteService;
