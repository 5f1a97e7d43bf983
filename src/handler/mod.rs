//! Handler module - local method lookup and dispatch.
//!
//! Provides:
//! - [`MethodRegistry`] - lookup of a method by id
//! - [`Dispatcher`] - execution of a method by class, name and types
//! - [`HandlerRegistry`] - in-process implementation of both, backed by
//!   async closures
//!
//! A FORWARD is answered with exactly one RESULT: the handler's value, its
//! [`InvocationError`](crate::invocation::InvocationError), or a
//! `MethodNotFound` failure.

mod registry;

pub use registry::{
    BoxFuture, Dispatcher, Handler, HandlerRegistry, HandlerResult, MethodRegistry, TypedHandler,
};
