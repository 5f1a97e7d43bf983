//! Invocation data model - request, result and registration payloads.
//!
//! - [`InvocationRequest`] - payload of INVOKE and FORWARD
//! - [`InvocationResult`] - payload of RESULT (success or failure)
//! - [`Registration`] - payload of REGISTER
//! - [`MethodDescriptor`] - local method identity used for lookup

mod descriptor;
mod registration;
mod request;
mod result;

pub use descriptor::MethodDescriptor;
pub use registration::Registration;
pub use request::{InvocationRequest, RequestBuilder};
pub use result::{error_types, InvocationError, InvocationResult};

/// Return type marking a fire-and-forget call.
pub const VOID_TYPE: &str = "void";

/// Derive the lookup key `Class#method(T1,T2)`.
///
/// Order-sensitive over `param_types`.
pub fn method_id(class_name: &str, method_name: &str, param_types: &[String]) -> String {
    format!("{}#{}({})", class_name, method_name, param_types.join(","))
}
