//! Notify - fire-and-forget calls and an unavailable target.
//!
//! A `void` call returns as soon as the INVOKE is queued; nothing waits for
//! the RESULT. A call to a client that never registered fails with
//! `ClientNotAvailable`.
//!
//! ```text
//! cargo run --example notify
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard::invocation::MethodDescriptor;
use switchboard::{Broker, BrokerConfig, Client, MethodCall, RelayError, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .compact()
        .init();

    let broker = Broker::bind(BrokerConfig::new("127.0.0.1", 0)).await?;
    let port = broker.local_addr()?.port();
    let shutdown = broker.shutdown_handle();
    tokio::spawn(broker.run());

    let received = Arc::new(AtomicUsize::new(0));
    let logger = {
        let received = received.clone();
        Client::builder("logger")
            .broker("127.0.0.1", port)
            .handle(
                MethodDescriptor::new("Log", "write").param("string"),
                move |(line,): (String,)| {
                    let received = received.clone();
                    async move {
                        received.fetch_add(1, Ordering::SeqCst);
                        println!("[logger] {}", line);
                        Ok(())
                    }
                },
            )
            .start()
            .await?
    };

    let app = Client::builder("app").broker("127.0.0.1", port).start().await?;
    logger.wait_registered(Duration::from_secs(5)).await?;
    app.wait_registered(Duration::from_secs(5)).await?;

    for i in 0..3 {
        let call = MethodCall::new("Log", "write").arg("string", json!(format!("event {}", i)));
        app.invoke("logger", call).await?;
    }
    println!("sent 3 notifications, {} calls pending", app.pending_count());

    let ghost = MethodCall::new("Log", "write")
        .arg("string", json!("hello?"))
        .returns("boolean");
    match app.invoke("ghost", ghost).await {
        Err(RelayError::Remote { error_type, .. }) => println!("ghost call failed: {}", error_type),
        other => println!("unexpected: {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("logger received {} lines", received.load(Ordering::SeqCst));

    app.shutdown();
    logger.shutdown();
    shutdown.trigger();
    Ok(())
}
