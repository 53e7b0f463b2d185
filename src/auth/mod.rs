//! Auth strategy selection and multi-key rotation.

pub mod keys;

pub use keys::{parse_keys, ApiKeyManager, EnvWriter, KeyStatus};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the agent-core authenticates against the model provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AuthType {
    /// Gemini API key.
    UseGemini,
    /// Vertex AI API key.
    UseVertexAi,
    /// Google account OAuth; no API key involved.
    LoginWithGoogle,
    /// Any OpenAI-compatible endpoint.
    UseOpenAi,
    UseAnthropic,
}

impl AuthType {
    /// Derive the auth strategy from a provider alias.
    ///
    /// Unknown providers are treated as OpenAI-compatible endpoints.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Self::UseGemini,
            "gemini-vertex-ai" | "vertex" | "vertex-ai" => Self::UseVertexAi,
            "gemini-with-google-auth" | "google-login" => Self::LoginWithGoogle,
            "anthropic" | "claude" => Self::UseAnthropic,
            _ => Self::UseOpenAi,
        }
    }

    /// Environment variable the agent-core reads the active key from.
    pub const fn env_key(self) -> Option<&'static str> {
        match self {
            Self::UseGemini => Some("GEMINI_API_KEY"),
            Self::UseVertexAi => Some("GOOGLE_API_KEY"),
            Self::LoginWithGoogle => None,
            Self::UseOpenAi => Some("OPENAI_API_KEY"),
            Self::UseAnthropic => Some("ANTHROPIC_API_KEY"),
        }
    }

    pub const fn uses_api_key(self) -> bool {
        self.env_key().is_some()
    }
}
