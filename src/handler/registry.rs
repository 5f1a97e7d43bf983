//! Handler registry for dispatching FORWARD requests by method id.
//!
//! Handlers are keyed by `Class#method(T1,T2)`. A typed handler receives
//! its arguments deserialized from the JSON `params` array as a tuple, so
//! `(i64, i64)` accepts `[1, 2]` and `()` accepts `[]`.
//!
//! # Example
//!
//! ```
//! use switchboard::handler::{HandlerRegistry, MethodRegistry};
//! use switchboard::invocation::MethodDescriptor;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(
//!     MethodDescriptor::new("Calculator", "add").param("int").param("int").returns("int"),
//!     |(a, b): (i64, i64)| async move { Ok(a + b) },
//! );
//!
//! assert!(registry.lookup("Calculator#add(int,int)").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::invocation::{error_types, method_id, InvocationError, MethodDescriptor};

/// Outcome of a local method call.
pub type HandlerResult = std::result::Result<Value, InvocationError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Looks up locally invocable methods by id.
pub trait MethodRegistry: Send + Sync {
    fn lookup(&self, method_id: &str) -> Option<MethodDescriptor>;
}

/// Executes a method the caller decided to run locally.
pub trait Dispatcher: Send + Sync {
    fn invoke<'a>(
        &'a self,
        class_name: &'a str,
        method_name: &'a str,
        param_types: &'a [String],
        params: Vec<Value>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a call with its raw JSON arguments.
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that deserializes the argument tuple and serializes the return
/// value around a user closure.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, InvocationError>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, InvocationError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, InvocationError>> + Send + 'static,
{
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        let args: T = match decode_args(params) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(args);
        Box::pin(async move {
            let value = fut.await?;
            serde_json::to_value(value).map_err(|e| {
                InvocationError::new(
                    error_types::SERIALIZATION,
                    format!("Failed to serialize result: {}", e),
                )
            })
        })
    }
}

fn decode_args<T: DeserializeOwned>(params: Vec<Value>) -> std::result::Result<T, InvocationError> {
    let empty = params.is_empty();
    match serde_json::from_value(Value::Array(params)) {
        Ok(args) => Ok(args),
        // `()` only deserializes from null.
        Err(_) if empty => serde_json::from_value(Value::Null).map_err(bad_args),
        Err(e) => Err(bad_args(e)),
    }
}

fn bad_args(e: serde_json::Error) -> InvocationError {
    InvocationError::illegal_argument(format!("Cannot decode arguments: {}", e))
}

/// Handler over the raw JSON argument list.
struct RawHandler<F>(F);

impl<F, Fut> Handler for RawHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(params))
    }
}

struct MethodEntry {
    descriptor: MethodDescriptor,
    handler: Box<dyn Handler>,
}

/// Registry mapping method ids to handlers.
///
/// Implements both [`MethodRegistry`] and [`Dispatcher`].
#[derive(Default)]
pub struct HandlerRegistry {
    methods: HashMap<String, MethodEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler.
    ///
    /// A second registration under the same method id replaces the first.
    pub fn register<F, T, R, Fut>(&mut self, descriptor: MethodDescriptor, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, InvocationError>> + Send + 'static,
    {
        self.insert(descriptor, Box::new(TypedHandler::new(handler)));
    }

    /// Register a handler that receives the JSON arguments untouched.
    pub fn register_raw<F, Fut>(&mut self, descriptor: MethodDescriptor, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(descriptor, Box::new(RawHandler(handler)));
    }

    fn insert(&mut self, descriptor: MethodDescriptor, handler: Box<dyn Handler>) {
        let id = descriptor.method_id();
        if self
            .methods
            .insert(id.clone(), MethodEntry { descriptor, handler })
            .is_some()
        {
            warn!("Handler for {} replaced", id);
        }
    }

    /// Whether a handler is registered under `method_id`.
    pub fn contains(&self, method_id: &str) -> bool {
        self.methods.contains_key(method_id)
    }

    /// All registered descriptors, sorted by method id.
    pub fn descriptors(&self) -> Vec<&MethodDescriptor> {
        let mut descriptors: Vec<_> = self.methods.values().map(|e| &e.descriptor).collect();
        descriptors.sort_by_key(|d| d.method_id());
        descriptors
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl MethodRegistry for HandlerRegistry {
    fn lookup(&self, method_id: &str) -> Option<MethodDescriptor> {
        self.methods.get(method_id).map(|e| e.descriptor.clone())
    }
}

impl Dispatcher for HandlerRegistry {
    fn invoke<'a>(
        &'a self,
        class_name: &'a str,
        method_name: &'a str,
        param_types: &'a [String],
        params: Vec<Value>,
    ) -> BoxFuture<'a, HandlerResult> {
        let id = method_id(class_name, method_name, param_types);
        match self.methods.get(&id) {
            Some(entry) => entry.handler.call(params),
            None => Box::pin(async move {
                Err(InvocationError::new(
                    error_types::METHOD_NOT_FOUND,
                    format!("method not found: {}", id),
                ))
            }),
        }
    }
}
