//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] collects configuration and local method handlers.
//! [`ClientBuilder::start`] spawns a supervisor that keeps one connection
//! to the broker alive:
//! 1. Connect to the broker
//! 2. Send REGISTER with the client id
//! 3. Read frames: resolve RESULTs, execute FORWARDs, echo heartbeats
//! 4. On disconnect wait the reconnect delay and start over
//!
//! The [`Client`] handle issues calls. Calls in flight when the connection
//! drops are not retried; they complete if their RESULT still arrives or
//! fail with [`RelayError::Timeout`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use switchboard::invocation::MethodDescriptor;
//! use switchboard::{Client, MethodCall};
//!
//! #[tokio::main]
//! async fn main() -> switchboard::Result<()> {
//!     let client = Client::builder("calculator")
//!         .broker("127.0.0.1", 8888)
//!         .handle(
//!             MethodDescriptor::new("Calculator", "add").param("int").param("int").returns("int"),
//!             |(a, b): (i64, i64)| async move { Ok(a + b) },
//!         )
//!         .start()
//!         .await?;
//!
//!     client.wait_registered(Duration::from_secs(5)).await?;
//!
//!     let sum = client
//!         .invoke(
//!             "calculator",
//!             MethodCall::new("Calculator", "add")
//!                 .arg("int", json!(2))
//!                 .arg("int", json!(3))
//!                 .returns("int"),
//!         )
//!         .await?;
//!     assert_eq!(sum, json!(5));
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```

mod call;
mod pending;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use call::MethodCall;
pub use pending::PendingCalls;

use crate::config::ClientConfig;
use crate::error::{RelayError, Result};
use crate::handler::{
    BoxFuture, Dispatcher, HandlerRegistry, HandlerResult, MethodRegistry,
};
use crate::invocation::{
    error_types, InvocationError, InvocationRequest, InvocationResult, MethodDescriptor,
    Registration,
};
use crate::protocol::{Frame, MessageType, Payload};
use crate::session::{run_session, Connection, FrameHandler, Signal};

/// Builder for configuring and starting a client.
pub struct ClientBuilder {
    config: ClientConfig,
    registry: HandlerRegistry,
    collaborators: Option<(Arc<dyn MethodRegistry>, Arc<dyn Dispatcher>)>,
}

impl ClientBuilder {
    /// Create a builder for a client announcing itself as `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(client_id))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            collaborators: None,
        }
    }

    /// Broker address. Default: `127.0.0.1:8888`.
    pub fn broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.host = host.into();
        self.config.port = port;
        self
    }

    /// Default timeout for calls. Default: 30 seconds.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Delay before reconnecting after the connection is lost.
    ///
    /// Default: 5 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the maximum number of concurrently executing FORWARDs.
    ///
    /// When this limit is reached, new FORWARDs are answered with an
    /// `Overloaded` failure.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Expose a method to other clients.
    ///
    /// Arguments arrive as a tuple decoded from the JSON params array.
    pub fn handle<F, T, R, Fut>(mut self, descriptor: MethodDescriptor, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, InvocationError>> + Send + 'static,
    {
        self.registry.register(descriptor, handler);
        self
    }

    /// Expose a method that takes its JSON arguments untouched.
    pub fn handle_raw<F, Fut>(mut self, descriptor: MethodDescriptor, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_raw(descriptor, handler);
        self
    }

    /// Use an external method registry and dispatcher instead of the
    /// handlers registered on this builder.
    pub fn dispatch_with(
        mut self,
        registry: Arc<dyn MethodRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        self.collaborators = Some((registry, dispatcher));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the connection supervisor and return the client handle.
    ///
    /// Returns once the supervisor is running, not once connected; use
    /// [`Client::wait_registered`] to wait for the handshake.
    pub async fn start(self) -> Result<Client> {
        // Fail early on a blank id.
        Registration::new(self.config.client_id.clone())?;

        let (registry, dispatcher) = match self.collaborators {
            Some(pair) => pair,
            None => {
                let local = Arc::new(self.registry);
                let registry: Arc<dyn MethodRegistry> = local.clone();
                let dispatcher: Arc<dyn Dispatcher> = local;
                (registry, dispatcher)
            }
        };

        let (link, _) = watch::channel(None);
        let inner = Arc::new(ClientInner {
            handler_slots: Arc::new(Semaphore::new(self.config.max_concurrent_handlers)),
            config: self.config,
            pending: PendingCalls::new(),
            registry,
            dispatcher,
            link,
            shutdown: Signal::new(),
        });

        tokio::spawn(inner.clone().supervise());

        Ok(Client { inner })
    }
}

/// Handle to a running client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    pending: PendingCalls,
    registry: Arc<dyn MethodRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    handler_slots: Arc<Semaphore>,
    /// Current broker connection, `None` while disconnected. Re-sent when
    /// the REGISTER echo arrives so waiters can observe registration.
    link: watch::Sender<Option<Connection>>,
    shutdown: Signal,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(client_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(client_id)
    }

    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The open broker connection, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.inner
            .link
            .borrow()
            .as_ref()
            .filter(|conn| conn.is_open())
            .cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// Connected and acknowledged by the broker.
    pub fn is_registered(&self) -> bool {
        self.connection().map_or(false, |conn| is_registered(&conn))
    }

    /// Wait until the broker has echoed REGISTER on the current connection.
    pub async fn wait_registered(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.link.subscribe();
        let registered = async move {
            loop {
                let ready = rx
                    .borrow_and_update()
                    .as_ref()
                    .map_or(false, is_registered);
                if ready || rx.changed().await.is_err() {
                    return;
                }
            }
        };

        tokio::time::timeout(timeout, registered)
            .await
            .map_err(|_| RelayError::Timeout(timeout))
    }

    /// Invoke `call` on `target` with the configured call timeout.
    pub async fn invoke(&self, target: &str, call: MethodCall) -> Result<Value> {
        self.invoke_with_timeout(target, call, self.inner.config.call_timeout)
            .await
    }

    /// Invoke `call` on `target`.
    ///
    /// A `void` call returns `Value::Null` as soon as the INVOKE is queued.
    /// Otherwise waits for the RESULT:
    /// - success → the value
    /// - failure → [`RelayError::Remote`]
    /// - nothing within `timeout` → [`RelayError::Timeout`]; a RESULT
    ///   arriving later is dropped
    pub async fn invoke_with_timeout(
        &self,
        target: &str,
        call: MethodCall,
        timeout: Duration,
    ) -> Result<Value> {
        let conn = self.connection().ok_or(RelayError::NotConnected)?;

        let request_id = Uuid::new_v4().to_string();
        let fire_and_forget = call.is_fire_and_forget();
        let request = call.into_request(request_id.clone(), target)?;
        debug!("Invoking {} on '{}' as {}", request.signature(), target, request_id);
        let frame = Frame::invoke(request);

        if fire_and_forget {
            conn.send(&frame).await?;
            return Ok(Value::Null);
        }

        let pending = &self.inner.pending;
        let rx = pending.register(&request_id);

        if let Err(e) = conn.send(&frame).await {
            pending.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.into_value(),
            // Table cleared by shutdown.
            Ok(Err(_)) => Err(RelayError::ConnectionClosed),
            Err(_) => {
                pending.remove(&request_id);
                debug!("Request {} timed out after {:?}", request_id, timeout);
                Err(RelayError::Timeout(timeout))
            }
        }
    }

    /// Calls awaiting a RESULT.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stop reconnecting, close the connection and fail waiting calls with
    /// [`RelayError::ConnectionClosed`].
    pub fn shutdown(&self) {
        if self.inner.shutdown.fire() {
            info!("Client '{}' shutting down", self.inner.config.client_id);
        }
        if let Some(conn) = self.inner.link.send_replace(None) {
            conn.close();
        }
        self.inner.pending.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_fired()
    }
}

fn is_registered(conn: &Connection) -> bool {
    conn.is_open() && conn.client_id().is_some()
}

impl ClientInner {
    /// Connect, serve, wait, repeat until shutdown.
    async fn supervise(self: Arc<Self>) {
        let addr = self.config.broker_addr();

        loop {
            match self.connect_and_serve(&addr).await {
                Ok(()) if self.shutdown.is_fired() => {}
                Ok(()) => info!("Disconnected from broker at {}", addr),
                Err(e) => warn!("Connection to broker at {} failed: {}", addr, e),
            }
            self.link.send_replace(None);

            if self.shutdown.is_fired() {
                break;
            }

            debug!("Reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                _ = self.shutdown.fired() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }

        debug!("Supervisor for '{}' stopped", self.config.client_id);
    }

    async fn connect_and_serve(&self, addr: &str) -> Result<()> {
        let stream = tokio::select! {
            _ = self.shutdown.fired() => return Ok(()),
            stream = TcpStream::connect(addr) => stream?,
        };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let conn = Connection::spawn(writer, self.config.writer.clone());

        let registration = Registration::new(self.config.client_id.clone())?;
        conn.send(&Frame::register(registration)).await?;
        info!("Connected to broker at {} as '{}'", addr, self.config.client_id);

        self.link.send_replace(Some(conn.clone()));

        let result = tokio::select! {
            result = run_session(reader, conn.clone(), self) => result,
            _ = self.shutdown.fired() => Ok(()),
        };
        conn.close();

        result
    }

    /// Run a FORWARD on its own task and send exactly one RESULT.
    async fn execute(&self, conn: &Connection, request: InvocationRequest) -> Result<()> {
        let permit = match self.handler_slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "Handler capacity reached, rejecting request {} for {}",
                    request.request_id(),
                    request.method_id()
                );
                let failure = InvocationResult::failure(
                    request.request_id(),
                    error_types::OVERLOADED,
                    format!(
                        "handler capacity reached ({} concurrent calls)",
                        self.config.max_concurrent_handlers
                    ),
                );
                return conn.send(&Frame::result(failure)).await;
            }
        };

        let registry = self.registry.clone();
        let dispatcher = self.dispatcher.clone();
        let conn = conn.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let request_id = request.request_id().to_string();
            let signature = request.signature();

            // A separate task so a panicking handler still yields a RESULT.
            let result = match tokio::spawn(execute_local(registry, dispatcher, request)).await {
                Ok(result) => result,
                Err(e) => InvocationResult::failure(
                    request_id,
                    error_types::INTERNAL,
                    format!("handler panicked: {}", e),
                ),
            };

            match &result {
                InvocationResult::Success { .. } => debug!("Executed {}", signature),
                InvocationResult::Failure {
                    error_type,
                    error_message,
                    ..
                } => error!(
                    "Execution of {} failed: {}: {}",
                    signature, error_type, error_message
                ),
            }

            if let Err(e) = conn.send(&Frame::result(result)).await {
                error!("Failed to send RESULT for {}: {}", signature, e);
            }
        });

        Ok(())
    }
}

async fn execute_local(
    registry: Arc<dyn MethodRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    request: InvocationRequest,
) -> InvocationResult {
    let method_id = request.method_id();
    if registry.lookup(&method_id).is_none() {
        return InvocationResult::failure(
            request.request_id(),
            error_types::METHOD_NOT_FOUND,
            format!("method not found: {}", method_id),
        );
    }

    let outcome = dispatcher
        .invoke(
            request.target_class(),
            request.target_method(),
            request.param_types(),
            request.params().to_vec(),
        )
        .await;

    match outcome {
        Ok(value) => InvocationResult::success(request.request_id(), value),
        Err(e) => InvocationResult::from_error(request.request_id(), e),
    }
}

impl FrameHandler for ClientInner {
    fn handle_frame<'a>(
        &'a self,
        conn: &'a Connection,
        frame: Frame,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let message_type = frame.message_type();
            match (message_type, frame.into_payload()) {
                (MessageType::Result, Some(Payload::Result(result))) => {
                    let request_id = result.request_id().to_string();
                    if !self.pending.resolve(result) {
                        warn!("Dropping RESULT for unknown request {}", request_id);
                    }
                    Ok(())
                }
                (MessageType::Forward, Some(Payload::Request(request))) => {
                    self.execute(conn, request).await
                }
                (MessageType::Register, Some(Payload::Registration(registration))) => {
                    if registration.client_id() != self.config.client_id {
                        return Err(RelayError::Protocol(format!(
                            "Broker acknowledged '{}', expected '{}'",
                            registration.client_id(),
                            self.config.client_id
                        )));
                    }
                    if conn.bind_client_id(registration.client_id())? {
                        info!("Registered with broker as '{}'", registration.client_id());
                        self.link.send_modify(|_| {});
                    }
                    Ok(())
                }
                (other, _) => {
                    warn!("Ignoring unexpected {} frame from broker", other);
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder("calc")
            .broker("10.0.0.1", 9000)
            .call_timeout(Duration::from_secs(2))
            .reconnect_delay(Duration::from_millis(100))
            .max_concurrent_handlers(8)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10));

        let config = builder.config();
        assert_eq!(config.client_id, "calc");
        assert_eq!(config.broker_addr(), "10.0.0.1:9000");
        assert_eq!(config.call_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
        assert_eq!(config.max_concurrent_handlers, 8);
        assert_eq!(config.writer.max_pending_frames, 2048);
        assert_eq!(config.writer.channel_capacity, 512);
        assert_eq!(config.writer.backpressure_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_registers_handlers() {
        let builder = Client::builder("calc")
            .handle(
                MethodDescriptor::new("Calculator", "add").param("int").param("int"),
                |(a, b): (i64, i64)| async move { Ok(a + b) },
            )
            .handle_raw(MethodDescriptor::new("Echo", "raw"), |params| async move {
                Ok(Value::Array(params))
            });

        assert!(builder.registry.contains("Calculator#add(int,int)"));
        assert!(builder.registry.contains("Echo#raw()"));
    }

    #[tokio::test]
    async fn test_start_rejects_blank_id() {
        assert!(Client::builder("  ").start().await.is_err());
    }

    #[tokio::test]
    async fn test_invoke_without_connection() {
        // Nothing listens on port 1; the supervisor keeps failing.
        let client = Client::builder("lonely")
            .broker("127.0.0.1", 1)
            .reconnect_delay(Duration::from_secs(60))
            .start()
            .await
            .unwrap();

        let err = client
            .invoke("other", MethodCall::new("Svc", "run").returns("int"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotConnected));
        assert!(!client.is_connected());
        assert_eq!(client.pending_count(), 0);

        let err = client
            .wait_registered(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));

        client.shutdown();
        assert!(client.is_shut_down());
    }

    #[tokio::test]
    async fn test_execute_local_outcomes() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            MethodDescriptor::new("Calculator", "add").param("int").param("int"),
            |(a, b): (i64, i64)| async move { Ok(a + b) },
        );
        let registry = Arc::new(registry);

        let request = |method: &str| {
            InvocationRequest::builder()
                .request_id("r-1")
                .client_id("calc")
                .target_class("Calculator")
                .target_method(method)
                .arg("int", json!(2))
                .arg("int", json!(3))
                .return_type("int")
                .build()
                .unwrap()
        };

        let ok = execute_local(registry.clone(), registry.clone(), request("add")).await;
        assert_eq!(ok, InvocationResult::success("r-1", json!(5)));

        let missing = execute_local(registry.clone(), registry, request("mul")).await;
        assert_eq!(
            missing,
            InvocationResult::failure(
                "r-1",
                error_types::METHOD_NOT_FOUND,
                "method not found: Calculator#mul(int,int)"
            )
        );
    }
}
