//! `convoy keys` handlers.

use std::sync::Arc;

use crate::auth::{parse_keys, ApiKeyManager, AuthType, EnvWriter};

/// Handle `convoy keys inspect`.
pub fn handle_inspect(keys: &str, provider: &str) -> Result<(), Box<dyn std::error::Error>> {
    let auth_type = AuthType::from_provider(provider);
    // Inspection must not touch this process's environment.
    let writer: EnvWriter = Arc::new(|_, _| {});
    let manager = ApiKeyManager::with_env_writer(keys, auth_type, writer);
    let status = manager.status();

    println!("Auth type:     {auth_type}");
    println!(
        "Env variable:  {}",
        status.env_key.unwrap_or("(none; this auth type does not use api keys)")
    );
    println!("Keys parsed:   {}", parse_keys(keys).len());
    println!(
        "Rotation:      {}",
        if manager.has_multiple_keys() {
            "enabled"
        } else {
            "disabled (single key)"
        }
    );
    Ok(())
}
