//! Parameter-name aliasing for file tools.

use crate::types::ToolArgs;

/// Tools whose target file is named `file_path`.
pub const FILE_PATH_TOOLS: &[&str] = &["read_file", "write_file", "replace", "edit"];

/// Rewrite `path` to `file_path` for file tools when `file_path` is absent.
///
/// Providers disagree on the parameter name. Idempotent; other tools pass through.
pub fn normalize_tool_params(tool_name: &str, mut args: ToolArgs) -> ToolArgs {
    if !FILE_PATH_TOOLS.contains(&tool_name) || args.contains_key("file_path") {
        return args;
    }
    if let Some(path) = args.remove("path") {
        args.insert("file_path".to_string(), path);
    }
    args
}
