//! Description of a remote method call, before it is addressed.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::invocation::{method_id, InvocationRequest, VOID_TYPE};

/// Target method plus arguments.
///
/// ```
/// use serde_json::json;
/// use switchboard::MethodCall;
///
/// let call = MethodCall::new("Calculator", "add")
///     .arg("int", json!(2))
///     .arg("int", json!(3))
///     .returns("int");
///
/// assert_eq!(call.method_id(), "Calculator#add(int,int)");
/// assert!(!call.is_fire_and_forget());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    target_class: String,
    target_method: String,
    params: Vec<Value>,
    param_types: Vec<String>,
    return_type: String,
}

impl MethodCall {
    /// A call with no arguments returning `void`.
    pub fn new(target_class: impl Into<String>, target_method: impl Into<String>) -> Self {
        Self {
            target_class: target_class.into(),
            target_method: target_method.into(),
            params: Vec::new(),
            param_types: Vec::new(),
            return_type: VOID_TYPE.to_string(),
        }
    }

    pub fn arg(mut self, param_type: impl Into<String>, value: Value) -> Self {
        self.param_types.push(param_type.into());
        self.params.push(value);
        self
    }

    /// Append an argument, serializing it to JSON.
    pub fn arg_serialized<T: Serialize>(self, param_type: impl Into<String>, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.arg(param_type, value))
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn target_method(&self) -> &str {
        &self.target_method
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn is_fire_and_forget(&self) -> bool {
        self.return_type == VOID_TYPE
    }

    pub fn method_id(&self) -> String {
        method_id(&self.target_class, &self.target_method, &self.param_types)
    }

    /// Address the call to `client_id` under `request_id`.
    pub(crate) fn into_request(self, request_id: String, client_id: &str) -> Result<InvocationRequest> {
        InvocationRequest::builder()
            .request_id(request_id)
            .client_id(client_id)
            .target_class(self.target_class)
            .target_method(self.target_method)
            .args(self.params, self.param_types)
            .return_type(self.return_type)
            .build()
    }
}
