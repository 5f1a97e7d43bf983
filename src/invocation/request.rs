//! Invocation request (payload of INVOKE and FORWARD frames).
//!
//! The request id is generated by the caller and stays the same across all
//! three hops (caller → broker → target → broker → caller).
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use switchboard::invocation::InvocationRequest;
//!
//! let request = InvocationRequest::builder()
//!     .request_id("req-1")
//!     .client_id("calc")
//!     .target_class("Calculator")
//!     .target_method("add")
//!     .arg("int", json!(2))
//!     .arg("int", json!(3))
//!     .return_type("int")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.method_id(), "Calculator#add(int,int)");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{method_id, VOID_TYPE};
use crate::error::{RelayError, Result};

/// A request to invoke `target_class#target_method` on client `client_id`.
///
/// Always valid: construction and deserialization both check that
/// `params` and `param_types` have the same length and that the
/// identifying strings are non-blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RequestFields")]
pub struct InvocationRequest {
    request_id: String,
    client_id: String,
    target_class: String,
    target_method: String,
    params: Vec<Value>,
    param_types: Vec<String>,
    return_type: String,
}

/// Unchecked wire form, validated into [`InvocationRequest`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFields {
    request_id: String,
    client_id: String,
    target_class: String,
    target_method: String,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    param_types: Vec<String>,
    #[serde(default = "void_type")]
    return_type: String,
}

fn void_type() -> String {
    VOID_TYPE.to_string()
}

impl TryFrom<RequestFields> for InvocationRequest {
    type Error = RelayError;

    fn try_from(fields: RequestFields) -> Result<Self> {
        require("requestId", &fields.request_id)?;
        require("clientId", &fields.client_id)?;
        require("targetClass", &fields.target_class)?;
        require("targetMethod", &fields.target_method)?;

        if fields.params.len() != fields.param_types.len() {
            return Err(RelayError::InvalidRequest(format!(
                "params has {} entries but paramTypes has {}",
                fields.params.len(),
                fields.param_types.len()
            )));
        }

        Ok(Self {
            request_id: fields.request_id,
            client_id: fields.client_id,
            target_class: fields.target_class,
            target_method: fields.target_method,
            params: fields.params,
            param_types: fields.param_types,
            return_type: fields.return_type,
        })
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(())
}

impl InvocationRequest {
    /// Start building a request.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Correlation token shared by INVOKE, FORWARD and RESULT.
    #[inline]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The client the call is destined for.
    #[inline]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[inline]
    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    #[inline]
    pub fn target_method(&self) -> &str {
        &self.target_method
    }

    /// Argument values, in declaration order.
    #[inline]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Argument type identifiers, same length as `params`.
    #[inline]
    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    #[inline]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Number of arguments.
    #[inline]
    pub fn argument_count(&self) -> usize {
        self.params.len()
    }

    /// True when the caller does not wait for a result.
    #[inline]
    pub fn is_fire_and_forget(&self) -> bool {
        self.return_type == VOID_TYPE
    }

    /// Stable lookup key: `Class#method(T1,T2)`.
    pub fn method_id(&self) -> String {
        method_id(&self.target_class, &self.target_method, &self.param_types)
    }

    /// Human-readable form for logs: `Class.method(T1, T2):R`.
    pub fn signature(&self) -> String {
        format!(
            "{}.{}({}):{}",
            self.target_class,
            self.target_method,
            self.param_types.join(", "),
            self.return_type
        )
    }

    /// Take the argument values, dropping the rest of the request.
    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

/// Fluent builder for [`InvocationRequest`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    request_id: String,
    client_id: String,
    target_class: String,
    target_method: String,
    params: Vec<Value>,
    param_types: Vec<String>,
    return_type: Option<String>,
}

impl RequestBuilder {
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn target_class(mut self, target_class: impl Into<String>) -> Self {
        self.target_class = target_class.into();
        self
    }

    pub fn target_method(mut self, target_method: impl Into<String>) -> Self {
        self.target_method = target_method.into();
        self
    }

    /// Append one argument with its type identifier.
    pub fn arg(mut self, param_type: impl Into<String>, value: Value) -> Self {
        self.param_types.push(param_type.into());
        self.params.push(value);
        self
    }

    /// Replace all arguments at once.
    pub fn args(mut self, params: Vec<Value>, param_types: Vec<String>) -> Self {
        self.params = params;
        self.param_types = param_types;
        self
    }

    /// Return type identifier. Defaults to `"void"`.
    pub fn return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<InvocationRequest> {
        InvocationRequest::try_from(RequestFields {
            request_id: self.request_id,
            client_id: self.client_id,
            target_class: self.target_class,
            target_method: self.target_method,
            params: self.params,
            param_types: self.param_types,
            return_type: self.return_type.unwrap_or_else(void_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_request() -> InvocationRequest {
        InvocationRequest::builder()
            .request_id("r-1")
            .client_id("calc")
            .target_class("Calculator")
            .target_method("add")
            .arg("int", json!(1))
            .arg("int", json!(2))
            .return_type("int")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_populates_fields() {
        let request = add_request();

        assert_eq!(request.request_id(), "r-1");
        assert_eq!(request.client_id(), "calc");
        assert_eq!(request.params(), &[json!(1), json!(2)]);
        assert_eq!(request.param_types(), &["int", "int"]);
        assert_eq!(request.argument_count(), 2);
        assert!(!request.is_fire_and_forget());
    }

    #[test]
    fn test_return_type_defaults_to_void() {
        let request = InvocationRequest::builder()
            .request_id("r-2")
            .client_id("logger")
            .target_class("Log")
            .target_method("write")
            .arg("string", json!("hi"))
            .build()
            .unwrap();

        assert_eq!(request.return_type(), VOID_TYPE);
        assert!(request.is_fire_and_forget());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let result = InvocationRequest::builder()
            .request_id("r-3")
            .client_id("calc")
            .target_class("Calculator")
            .target_method("add")
            .args(vec![json!(1)], vec!["int".into(), "int".into()])
            .build();

        assert!(matches!(result, Err(RelayError::InvalidRequest(_))));
    }

    #[test]
    fn test_blank_fields_rejected() {
        let result = InvocationRequest::builder()
            .request_id("r-4")
            .client_id("  ")
            .target_class("Calculator")
            .target_method("add")
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("clientId"));
    }

    #[test]
    fn test_method_id_and_signature() {
        let request = add_request();

        assert_eq!(request.method_id(), "Calculator#add(int,int)");
        assert_eq!(request.signature(), "Calculator.add(int, int):int");
    }

    #[test]
    fn test_json_field_names_are_camel_case() {
        let value = serde_json::to_value(add_request()).unwrap();

        assert_eq!(value["requestId"], "r-1");
        assert_eq!(value["clientId"], "calc");
        assert_eq!(value["targetClass"], "Calculator");
        assert_eq!(value["targetMethod"], "add");
        assert_eq!(value["paramTypes"], json!(["int", "int"]));
        assert_eq!(value["returnType"], "int");
    }

    #[test]
    fn test_deserialize_validates() {
        let bad = json!({
            "requestId": "r-5",
            "clientId": "calc",
            "targetClass": "Calculator",
            "targetMethod": "add",
            "params": [1, 2],
            "paramTypes": ["int"],
            "returnType": "int"
        });

        let result: std::result::Result<InvocationRequest, _> = serde_json::from_value(bad);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_params() {
        assert_eq!(add_request().into_params(), vec![json!(1), json!(2)]);
    }
}
