//! Typed building block for hand-written remote service stubs.
//!
//! A stub wraps [`RemoteService`] and exposes one method per remote
//! operation:
//!
//! ```no_run
//! use serde_json::json;
//! use switchboard::{Client, RemoteService, Result};
//!
//! struct CalculatorStub {
//!     remote: RemoteService,
//! }
//!
//! impl CalculatorStub {
//!     fn new(client: Client) -> Self {
//!         Self { remote: RemoteService::new(client, "calculator", "Calculator") }
//!     }
//!
//!     async fn add(&self, a: i64, b: i64) -> Result<i64> {
//!         self.remote
//!             .call("add", &[("int", json!(a)), ("int", json!(b))], "int")
//!             .await
//!     }
//! }
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::{Client, MethodCall};
use crate::error::Result;
use crate::invocation::VOID_TYPE;

/// Calls into one class on one remote client.
#[derive(Clone)]
pub struct RemoteService {
    client: Client,
    target: String,
    class_name: String,
    timeout: Option<Duration>,
}

impl RemoteService {
    pub fn new(client: Client, target: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            client,
            target: target.into(),
            class_name: class_name.into(),
            timeout: None,
        }
    }

    /// Override the client's default call timeout for this stub.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Call `method` and decode its result as `R`.
    ///
    /// `args` pairs each value with its type identifier.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        args: &[(&str, Value)],
        return_type: &str,
    ) -> Result<R> {
        let value = self.send(self.method_call(method, args, return_type)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fire-and-forget call to a `void` method.
    pub async fn notify(&self, method: &str, args: &[(&str, Value)]) -> Result<()> {
        self.send(self.method_call(method, args, VOID_TYPE)).await?;
        Ok(())
    }

    fn method_call(&self, method: &str, args: &[(&str, Value)], return_type: &str) -> MethodCall {
        args.iter().fold(
            MethodCall::new(self.class_name.as_str(), method),
            |call, (param_type, value)| call.arg(*param_type, value.clone()),
        )
        .returns(return_type)
    }

    async fn send(&self, call: MethodCall) -> Result<Value> {
        match self.timeout {
            Some(timeout) => self.client.invoke_with_timeout(&self.target, call, timeout).await,
            None => self.client.invoke(&self.target, call).await,
        }
    }
}
