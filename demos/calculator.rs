//! Calculator - two clients talking through an in-process broker.
//!
//! This example demonstrates:
//! - Starting a broker on an ephemeral port
//! - Exposing typed methods with `ClientBuilder::handle`
//! - Calling them through a hand-written stub over `RemoteService`
//! - Remote failures surfacing as `RelayError::Remote`
//!
//! ```text
//! cargo run --example calculator
//! ```

use std::time::Duration;

use serde_json::json;
use switchboard::invocation::{InvocationError, MethodDescriptor};
use switchboard::{Broker, BrokerConfig, Client, RelayError, RemoteService, Result};
use tracing_subscriber::EnvFilter;

/// Stub for the `Calculator` class exposed by the `calculator` client.
struct CalculatorStub {
    remote: RemoteService,
}

impl CalculatorStub {
    fn new(client: Client) -> Self {
        Self {
            remote: RemoteService::new(client, "calculator", "Calculator")
                .with_timeout(Duration::from_secs(5)),
        }
    }

    async fn add(&self, a: i64, b: i64) -> Result<i64> {
        self.remote
            .call("add", &[("int", json!(a)), ("int", json!(b))], "int")
            .await
    }

    async fn divide(&self, a: i64, b: i64) -> Result<i64> {
        self.remote
            .call("divide", &[("int", json!(a)), ("int", json!(b))], "int")
            .await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let broker = Broker::bind(BrokerConfig::new("127.0.0.1", 0)).await?;
    let port = broker.local_addr()?.port();
    let shutdown = broker.shutdown_handle();
    tokio::spawn(broker.run());

    let calculator = Client::builder("calculator")
        .broker("127.0.0.1", port)
        .handle(
            MethodDescriptor::new("Calculator", "add")
                .param("int")
                .param("int")
                .returns("int"),
            |(a, b): (i64, i64)| async move { Ok(a + b) },
        )
        .handle(
            MethodDescriptor::new("Calculator", "divide")
                .param("int")
                .param("int")
                .returns("int"),
            |(a, b): (i64, i64)| async move {
                if b == 0 {
                    return Err(InvocationError::new("ArithmeticException", "/ by zero"));
                }
                Ok(a / b)
            },
        )
        .start()
        .await?;

    let app = Client::builder("app").broker("127.0.0.1", port).start().await?;

    calculator.wait_registered(Duration::from_secs(5)).await?;
    app.wait_registered(Duration::from_secs(5)).await?;

    let stub = CalculatorStub::new(app.clone());

    println!("2 + 3 = {}", stub.add(2, 3).await?);
    println!("10 / 4 = {}", stub.divide(10, 4).await?);

    match stub.divide(1, 0).await {
        Err(RelayError::Remote {
            error_type,
            error_message,
        }) => println!("1 / 0 failed remotely: {}: {}", error_type, error_message),
        other => println!("unexpected: {:?}", other),
    }

    app.shutdown();
    calculator.shutdown();
    shutdown.trigger();
    Ok(())
}
