//! Rotation among several API keys on quota exhaustion.
//!
//! The active key is published through the process environment variable the
//! agent-core reads for the current auth type. This is only sound because each
//! conversation runs in its own worker process.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::AuthType;

/// Cooldown applied to a key after it was rotated away from.
const DEFAULT_KEY_COOLDOWN: Duration = Duration::from_secs(90);

/// Sink for `(env var, value)` writes. Defaults to the process environment.
pub type EnvWriter = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Snapshot of rotation state. Never contains key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub env_key: Option<&'static str>,
    pub auth_type: AuthType,
    pub total_keys: usize,
    pub current_index: usize,
    pub available_keys: usize,
    pub tried_in_pass: usize,
}

/// Ordered list of API keys with a current index and per-key cooldowns.
pub struct ApiKeyManager {
    keys: Vec<String>,
    current: usize,
    auth_type: AuthType,
    cooldown_until: HashMap<usize, Instant>,
    tried: HashSet<usize>,
    cooldown: Duration,
    env_writer: EnvWriter,
}

impl fmt::Debug for ApiKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyManager")
            .field("keys", &self.keys.len())
            .field("current", &self.current)
            .field("auth_type", &self.auth_type)
            .field("tried", &self.tried.len())
            .finish()
    }
}

/// Split a raw key string on commas and new lines, trimming and dropping empties.
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn process_env_writer() -> EnvWriter {
    Arc::new(|name, value| std::env::set_var(name, value))
}

impl ApiKeyManager {
    /// Parse `raw` and publish the first key to the process environment.
    pub fn new(raw: &str, auth_type: AuthType) -> Self {
        Self::with_env_writer(raw, auth_type, process_env_writer())
    }

    /// Like [`ApiKeyManager::new`] with a custom environment sink.
    pub fn with_env_writer(raw: &str, auth_type: AuthType, env_writer: EnvWriter) -> Self {
        let manager = Self {
            keys: parse_keys(raw),
            current: 0,
            auth_type,
            cooldown_until: HashMap::new(),
            tried: HashSet::from([0]),
            cooldown: DEFAULT_KEY_COOLDOWN,
            env_writer,
        };
        manager.publish_current();
        manager
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Whether a raw key string holds more than one key.
    pub fn is_multi_key(raw: &str) -> bool {
        parse_keys(raw).len() > 1
    }

    pub fn has_multiple_keys(&self) -> bool {
        self.keys.len() > 1
    }

    pub fn current_key(&self) -> Option<&str> {
        self.keys.get(self.current).map(String::as_str)
    }

    /// Advance to the next usable key and publish it.
    ///
    /// Returns `false` once every key has been tried in the current pass; the
    /// current key then stays selected. Keys still cooling down are skipped.
    pub fn rotate_key(&mut self) -> bool {
        if !self.has_multiple_keys() {
            return false;
        }
        let now = Instant::now();
        self.cooldown_until.insert(self.current, now + self.cooldown);

        let total = self.keys.len();
        for step in 1..total {
            let candidate = (self.current + step) % total;
            if self.tried.contains(&candidate) || self.is_cooling_down(candidate, now) {
                continue;
            }
            self.current = candidate;
            self.tried.insert(candidate);
            self.publish_current();
            tracing::info!(
                key_index = candidate,
                total_keys = total,
                env_key = ?self.auth_type.env_key(),
                "rotated api key"
            );
            return true;
        }
        tracing::warn!(total_keys = total, "all api keys tried in this rotation pass");
        false
    }

    /// Start a new rotation pass from the current key.
    pub fn reset_pass(&mut self) {
        self.tried.clear();
        self.tried.insert(self.current);
    }

    pub fn status(&self) -> KeyStatus {
        let now = Instant::now();
        KeyStatus {
            env_key: self.auth_type.env_key(),
            auth_type: self.auth_type,
            total_keys: self.keys.len(),
            current_index: self.current,
            available_keys: (0..self.keys.len())
                .filter(|index| !self.is_cooling_down(*index, now))
                .count(),
            tried_in_pass: self.tried.len(),
        }
    }

    fn is_cooling_down(&self, index: usize, now: Instant) -> bool {
        self.cooldown_until
            .get(&index)
            .is_some_and(|until| *until > now)
    }

    fn publish_current(&self) {
        if let (Some(env_key), Some(key)) = (self.auth_type.env_key(), self.current_key()) {
            (self.env_writer)(env_key, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_writer() -> (EnvWriter, Arc<Mutex<Vec<(String, String)>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let sink = writes.clone();
        let writer: EnvWriter = Arc::new(move |name, value| {
            sink.lock()
                .unwrap()
                .push((name.to_string(), value.to_string()));
        });
        (writer, writes)
    }

    #[test]
    fn parses_commas_and_newlines_dropping_blanks() {
        assert_eq!(
            parse_keys(" k1, k2\n\nk3 ,, "),
            vec!["k1".to_string(), "k2".to_string(), "k3".to_string()]
        );
        assert!(ApiKeyManager::is_multi_key("a,b"));
        assert!(!ApiKeyManager::is_multi_key("a, "));
    }

    #[test]
    fn construction_publishes_first_key() {
        let (writer, writes) = recording_writer();
        let manager = ApiKeyManager::with_env_writer("k1,k2", AuthType::UseGemini, writer);
        assert_eq!(manager.current_key(), Some("k1"));
        assert_eq!(
            writes.lock().unwrap().as_slice(),
            &[("GEMINI_API_KEY".to_string(), "k1".to_string())]
        );
    }

    #[test]
    fn rotation_stops_once_every_key_was_tried() {
        let (writer, writes) = recording_writer();
        let mut manager = ApiKeyManager::with_env_writer("k1,k2,k3", AuthType::UseOpenAi, writer);

        assert!(manager.rotate_key());
        assert_eq!(manager.current_key(), Some("k2"));
        assert!(manager.rotate_key());
        assert_eq!(manager.current_key(), Some("k3"));
        assert!(!manager.rotate_key());
        assert_eq!(manager.current_key(), Some("k3"));

        let written: Vec<String> = writes.lock().unwrap().iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(written, vec!["k1", "k2", "k3"]);
        assert!(writes
            .lock()
            .unwrap()
            .iter()
            .all(|(name, _)| name == "OPENAI_API_KEY"));
    }

    #[test]
    fn new_pass_skips_keys_still_cooling_down() {
        let (writer, _) = recording_writer();
        let mut manager = ApiKeyManager::with_env_writer("k1,k2", AuthType::UseGemini, writer);
        assert!(manager.rotate_key());
        manager.reset_pass();
        // k1 was rotated away from moments ago and is still cooling down.
        assert!(!manager.rotate_key());
    }

    #[test]
    fn expired_cooldown_makes_key_available_again() {
        let (writer, _) = recording_writer();
        let mut manager = ApiKeyManager::with_env_writer("k1,k2", AuthType::UseGemini, writer)
            .with_cooldown(Duration::ZERO);
        assert!(manager.rotate_key());
        manager.reset_pass();
        assert!(manager.rotate_key());
        assert_eq!(manager.current_key(), Some("k1"));
    }

    #[test]
    fn single_key_never_rotates() {
        let (writer, _) = recording_writer();
        let mut manager = ApiKeyManager::with_env_writer("only", AuthType::UseGemini, writer);
        assert!(!manager.has_multiple_keys());
        assert!(!manager.rotate_key());
    }

    #[test]
    fn status_reports_env_key_without_key_material() {
        let (writer, _) = recording_writer();
        let mut manager = ApiKeyManager::with_env_writer("k1,k2", AuthType::UseVertexAi, writer);
        manager.rotate_key();
        let status = manager.status();
        assert_eq!(status.env_key, Some("GOOGLE_API_KEY"));
        assert_eq!(status.total_keys, 2);
        assert_eq!(status.current_index, 1);
        assert_eq!(status.available_keys, 1);
        assert_eq!(status.tried_in_pass, 2);
        assert!(!format!("{manager:?}").contains("k1"));
    }
}
