//! Tool parameter schemas and tool classification.

use serde::{Deserialize, Serialize};

/// JSON Schema describing a tool's parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    pub schema: serde_json::Value,
}

impl ToolParameters {
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// A schema accepting an empty object.
    pub fn empty() -> Self {
        Self::object().build()
    }

    pub fn object() -> ParameterBuilder {
        ParameterBuilder::default()
    }
}

/// Builder for flat object schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    pub fn property(
        mut self,
        name: impl Into<String>,
        json_type: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            serde_json::json!({ "type": json_type, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "string", description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "integer", description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "boolean", description, required)
    }

    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// Coarse tool classification driving the approval requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Search,
    Fetch,
    Edit,
    Execute,
    Mcp,
    Other,
}

impl ToolKind {
    /// Classify well-known tool names; everything else is `Other`.
    pub fn for_tool_name(name: &str) -> Self {
        match name {
            "read_file" | "read_many_files" | "list_directory" | "ls" => Self::Read,
            "glob" | "search_file_content" | "grep" | "google_web_search" => Self::Search,
            "web_fetch" => Self::Fetch,
            "write_file" | "replace" | "edit" => Self::Edit,
            "run_shell_command" | "shell" | "exec" => Self::Execute,
            _ => Self::Other,
        }
    }

    /// Edits and command execution need the user's approval.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::Edit | Self::Execute | Self::Mcp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_object_schema_with_required_list() {
        let params = ToolParameters::object()
            .string("file_path", "Target file", true)
            .boolean("dry_run", "Only preview", false)
            .build();
        assert_eq!(params.schema["type"], "object");
        assert_eq!(params.schema["properties"]["file_path"]["type"], "string");
        assert_eq!(params.schema["required"], serde_json::json!(["file_path"]));
    }

    #[test]
    fn only_mutating_kinds_need_confirmation() {
        assert!(ToolKind::for_tool_name("write_file").requires_confirmation());
        assert!(ToolKind::for_tool_name("run_shell_command").requires_confirmation());
        assert!(!ToolKind::for_tool_name("read_file").requires_confirmation());
        assert!(!ToolKind::for_tool_name("something_else").requires_confirmation());
    }
}
