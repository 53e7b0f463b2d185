//! Quota / rate-limit detection for user-facing error messages.

use std::sync::OnceLock;

use regex::RegexSet;

/// Hint appended to provider errors that look like quota exhaustion.
pub const QUOTA_HINT: &str = "Tip: the API quota for this key appears to be exhausted. \
Configure several API keys separated by commas or new lines to rotate automatically, \
or wait a moment and try again.";

fn quota_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)quota",
            r"(?i)resource[_ ]exhausted",
            r"(?i)rate[ _-]?limit",
            r"(?i)too many requests",
            r"\b429\b",
        ])
        .unwrap_or_else(|_| RegexSet::empty())
    })
}

/// Whether the message matches one of the known quota phrases.
pub fn is_quota_error(message: &str) -> bool {
    quota_patterns().is_match(message)
}

/// Append the quota hint when the message matches a quota phrase.
///
/// Idempotent: a message that already carries the hint is returned unchanged.
pub fn enrich_error_message(message: &str) -> String {
    if message.contains(QUOTA_HINT) || !is_quota_error(message) {
        return message.to_string();
    }
    format!("{message}\n\n{QUOTA_HINT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_quota_phrases() {
        assert!(is_quota_error("You exceeded your current quota"));
        assert!(is_quota_error("status: RESOURCE_EXHAUSTED"));
        assert!(is_quota_error("Rate limit reached for requests"));
        assert!(is_quota_error("HTTP 429"));
        assert!(is_quota_error("Too Many Requests"));
    }

    #[test]
    fn ignores_unrelated_errors() {
        assert!(!is_quota_error("connection reset by peer"));
        assert!(!is_quota_error("status 4290 is not a real code"));
        assert_eq!(enrich_error_message("network down"), "network down");
    }

    #[test]
    fn enrichment_is_applied_once() {
        let once = enrich_error_message("quota exceeded");
        assert!(once.ends_with(QUOTA_HINT));
        assert_eq!(enrich_error_message(&once), once);
    }
}
