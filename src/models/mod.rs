//! Model selection (`provider:model`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::AuthType;
use crate::error::ConvoyError;

/// The provider and model a conversation talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

impl ModelSelection {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn auth_type(&self) -> AuthType {
        AuthType::from_provider(&self.provider)
    }
}

impl FromStr for ModelSelection {
    type Err = ConvoyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (provider, model) = raw.split_once(':').ok_or_else(|| {
            ConvoyError::Configuration(format!(
                "invalid model '{raw}': expected provider:model (e.g. gemini:gemini-2.5-pro)"
            ))
        })?;
        let (provider, model) = (provider.trim(), model.trim());
        if provider.is_empty() || model.is_empty() {
            return Err(ConvoyError::Configuration(format!(
                "invalid model '{raw}': provider and model must be non-empty"
            )));
        }
        Ok(Self::new(provider, model))
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_and_model() {
        let selection: ModelSelection = "gemini:gemini-2.5-pro".parse().unwrap();
        assert_eq!(selection.provider, "gemini");
        assert_eq!(selection.model, "gemini-2.5-pro");
        assert_eq!(selection.auth_type(), AuthType::UseGemini);
        assert_eq!(selection.to_string(), "gemini:gemini-2.5-pro");
    }

    #[test]
    fn model_ids_may_contain_colons() {
        let selection: ModelSelection = "openai:ft:gpt-4o:acme".parse().unwrap();
        assert_eq!(selection.model, "ft:gpt-4o:acme");
    }

    #[test]
    fn rejects_missing_separator_or_parts() {
        assert!("gemini".parse::<ModelSelection>().is_err());
        assert!(":model".parse::<ModelSelection>().is_err());
        assert!("openai: ".parse::<ModelSelection>().is_err());
    }
}
