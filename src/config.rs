//! Process configuration for brokers and clients.

use std::time::Duration;

use crate::writer::WriterConfig;

/// Default broker port.
pub const DEFAULT_PORT: u16 = 8888;

/// Default broker host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default time a caller waits for a RESULT.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default maximum concurrent FORWARD handlers per client.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Client settings. Usually filled in through [`ClientBuilder`](crate::ClientBuilder).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Identity announced in REGISTER.
    pub client_id: String,
    /// Timeout for calls that don't set their own.
    pub call_timeout: Duration,
    /// Wait between losing the connection and reconnecting.
    pub reconnect_delay: Duration,
    /// FORWARDs executing at once; excess ones get an `Overloaded` failure.
    pub max_concurrent_handlers: usize,
    pub writer: WriterConfig,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: client_id.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            writer: WriterConfig::default(),
        }
    }

    /// `host:port` of the broker.
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    /// Listen port; `0` picks a free one.
    pub port: u16,
    pub writer: WriterConfig,
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            writer: WriterConfig::default(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}
