//! Reaction to capacity exhaustion reported by the agent-core.

use std::sync::{Arc, Mutex};

use crate::auth::ApiKeyManager;
use crate::core::{FallbackDecision, FallbackHandler, FallbackRequest};

/// Decide whether the core should retry after a capacity error.
///
/// Without a key manager the failure is assumed transient. With one, the next
/// key is selected; once every key was tried in this pass the answer is `Stop`.
/// A poisoned key lock answers `RetryOnce`.
pub fn decide(keys: Option<&Mutex<ApiKeyManager>>, request: &FallbackRequest) -> FallbackDecision {
    let Some(keys) = keys else {
        return FallbackDecision::RetryOnce;
    };
    match keys.lock() {
        Ok(mut manager) => {
            if manager.rotate_key() {
                tracing::info!(failed_model = %request.failed_model, "retrying with next api key");
                FallbackDecision::RetryOnce
            } else {
                tracing::warn!(failed_model = %request.failed_model, "api keys exhausted");
                FallbackDecision::Stop
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "fallback handler failed; retrying once");
            FallbackDecision::RetryOnce
        }
    }
}

/// Handler to register with the agent-core.
pub fn fallback_handler(keys: Option<Arc<Mutex<ApiKeyManager>>>) -> FallbackHandler {
    Arc::new(move |request| decide(keys.as_deref(), request))
}
