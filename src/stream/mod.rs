//! Model stream consumption and tool-call dispatch.

pub mod dispatch;
pub mod params;
pub mod processor;

pub use dispatch::{dispatch_function_calls, DispatchContext, DispatchProgress};
pub use params::{normalize_tool_params, FILE_PATH_TOOLS};
pub use processor::{
    process_stream, NormalizedEvent, StreamContext, StreamProcessingResult, StreamStatus,
};
