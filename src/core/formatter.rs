//! Provider-aware error text for the UI.

use crate::auth::AuthType;
use crate::error::ConvoyError;
use crate::types::StructuredError;

/// Turns model errors into user-facing text, tailored to the active auth mode.
pub trait ErrorFormatter: Send + Sync {
    fn format(&self, error: &StructuredError, auth_type: AuthType) -> String;

    /// Format a transport failure that never made it into an `error` event.
    fn format_error(&self, error: &ConvoyError, auth_type: AuthType) -> String {
        let status = match error {
            ConvoyError::RateLimited { .. } | ConvoyError::QuotaExhausted(_) => Some(429),
            ConvoyError::Authentication(_) => Some(401),
            _ => None,
        };
        self.format(
            &StructuredError {
                message: error.to_string(),
                status,
            },
            auth_type,
        )
    }
}

/// Formatter used when the agent-core supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorFormatter;

impl ErrorFormatter for DefaultErrorFormatter {
    fn format(&self, error: &StructuredError, auth_type: AuthType) -> String {
        let base = match error.status {
            Some(status) => format!("[API Error: {} (Status: {status})]", error.message),
            None => format!("[API Error: {}]", error.message),
        };
        if error.status != Some(429) {
            return base;
        }
        let advice = match auth_type {
            AuthType::LoginWithGoogle => {
                "Possible quota limitations in place or slow response times detected. \
                 Switching to the fallback model for the rest of this session."
            }
            AuthType::UseVertexAi => {
                "Please wait and try again later. To increase your limits, request a \
                 quota increase through Vertex, or switch to another auth method."
            }
            _ => {
                "Please wait and try again later. To increase your limits, request a \
                 quota increase with your provider, or add more API keys."
            }
        };
        format!("{base}\n{advice}")
    }
}
