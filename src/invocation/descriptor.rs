//! Descriptor of a locally invocable method.

use super::{method_id, VOID_TYPE};

/// Identifies a method a client exposes to its peers.
///
/// ```
/// use switchboard::invocation::MethodDescriptor;
///
/// let desc = MethodDescriptor::new("Calculator", "add")
///     .param("int")
///     .param("int")
///     .returns("int");
///
/// assert_eq!(desc.method_id(), "Calculator#add(int,int)");
/// assert_eq!(desc.signature(), "add(int, int): int");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    class_name: String,
    method_name: String,
    param_types: Vec<String>,
    return_type: String,
}

impl MethodDescriptor {
    /// Descriptor for a method with no parameters returning `void`.
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            param_types: Vec::new(),
            return_type: VOID_TYPE.to_string(),
        }
    }

    /// Append a parameter type.
    pub fn param(mut self, param_type: impl Into<String>) -> Self {
        self.param_types.push(param_type.into());
        self
    }

    /// Set the return type.
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    pub fn parameter_count(&self) -> usize {
        self.param_types.len()
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn has_return_value(&self) -> bool {
        self.return_type != VOID_TYPE
    }

    pub fn method_id(&self) -> String {
        method_id(&self.class_name, &self.method_name, &self.param_types)
    }

    pub fn signature(&self) -> String {
        format!(
            "{}({}): {}",
            self.method_name,
            self.param_types.join(", "),
            self.return_type
        )
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.method_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_void() {
        let desc = MethodDescriptor::new("Log", "flush");
        assert!(!desc.has_return_value());
        assert_eq!(desc.parameter_count(), 0);
        assert_eq!(desc.method_id(), "Log#flush()");
    }

    #[test]
    fn test_display_is_method_id() {
        let desc = MethodDescriptor::new("Greeter", "greet").param("string").returns("string");
        assert_eq!(desc.to_string(), "Greeter#greet(string)");
        assert!(desc.has_return_value());
    }
}
