//! Typed access to tool call arguments.

use crate::error::ConvoyError;
use crate::types::ToolArgs;

/// Wrapper around a call's argument map with typed extraction.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    args: ToolArgs,
}

impl ToolArguments {
    pub fn new(args: ToolArgs) -> Self {
        Self { args }
    }

    pub fn raw(&self) -> &ToolArgs {
        &self.args
    }

    fn missing(kind: &str, key: &str) -> ConvoyError {
        ConvoyError::InvalidArgument(format!("missing {kind} argument '{key}'"))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConvoyError> {
        self.get_str_opt(key).ok_or_else(|| Self::missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ConvoyError> {
        self.args
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Self::missing("integer", key))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Deserialize the whole map into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConvoyError> {
        serde_json::from_value(serde_json::Value::Object(self.args.clone())).map_err(|e| {
            ConvoyError::InvalidArgument(format!("failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArguments {
        match value {
            serde_json::Value::Object(map) => ToolArguments::new(map),
            _ => unreachable!("test helper expects an object"),
        }
    }

    #[test]
    fn typed_getters_report_missing_keys() {
        let a = args(json!({"file_path": "a.txt", "limit": 3}));
        assert_eq!(a.get_str("file_path").unwrap(), "a.txt");
        assert_eq!(a.get_i64("limit").unwrap(), 3);
        let err = a.get_str("content").unwrap_err();
        assert!(err.to_string().contains("missing string argument 'content'"));
        assert!(a.get_bool_or("recursive", true));
    }

    #[test]
    fn deserializes_into_struct() {
        #[derive(Deserialize)]
        struct Params {
            file_path: String,
        }
        let params: Params = args(json!({"file_path": "x"})).deserialize().unwrap();
        assert_eq!(params.file_path, "x");
    }
}
