//! Stderr fatal-error detection: a fixed pattern family plus a
//! repeat-threshold counter for CLIs stuck retrying a timestamped message.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn ignorable_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"reconnect", r"retry(ing)?", r"rate limit", r"429", r"temporarily unavailable"]
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
            .collect()
    })
}

/// Ordered, first-match-wins fatal patterns. Order matters: the explicit
/// `FATAL:` tag is checked before the more specific phrase families so a
/// line that happens to contain both still reports the tag-based reason.
fn fatal_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"(?i)FATAL:").unwrap(), "explicit FATAL tag"),
            (
                Regex::new(
                    r"(?i)invalid api key|api key not found|authentication failed|unauthorized|401|please run .* login|not logged in",
                )
                .unwrap(),
                "authentication/credential failure",
            ),
            (
                Regex::new(r"(?i)invalid session|session not found|error resuming session|no conversation found").unwrap(),
                "session/resume failure",
            ),
            (
                Regex::new(r"(?i)config(uration)? error|missing required (config|environment)").unwrap(),
                "configuration error",
            ),
        ]
    })
}

/// Whether a stdout-stream `System { severity: Error }` message is a
/// transient the run should keep going through, reusing the same
/// reconnect/retry/rate-limit family the stderr detector ignores.
pub fn is_ignorable_stdout_error(message: &str) -> bool {
    ignorable_patterns().iter().any(|re| re.is_match(message))
}

fn digit_mask() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Stateful detector: one instance per running child, fed every stderr
/// line as it's drained.
pub struct FatalDetector {
    repeat_counts: HashMap<String, usize>,
    threshold: usize,
}

impl Default for FatalDetector {
    fn default() -> Self {
        FatalDetector::new(3)
    }
}

impl FatalDetector {
    pub fn new(threshold: usize) -> Self {
        FatalDetector { repeat_counts: HashMap::new(), threshold }
    }

    /// Feeds one stderr line. Returns `Some(reason)` the moment the line
    /// (or its repeat count) trips the detector, `None` otherwise.
    pub fn check_line(&mut self, line: &str) -> Option<String> {
        if ignorable_patterns().iter().any(|re| re.is_match(line)) {
            return None;
        }

        for (pattern, reason) in fatal_patterns() {
            if pattern.is_match(line) {
                return Some((*reason).to_string());
            }
        }

        let normalised = digit_mask().replace_all(line.trim(), "#").into_owned();
        let count = self.repeat_counts.entry(normalised).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            return Some(format!("line repeated {} times", *count));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignorable_lines_never_trip() {
        let mut d = FatalDetector::default();
        for _ in 0..10 {
            assert_eq!(d.check_line("retrying request, rate limit hit (429)"), None);
        }
    }

    #[test]
    fn explicit_fatal_tag_trips_immediately() {
        let mut d = FatalDetector::default();
        let reason = d.check_line("FATAL: disk full").unwrap();
        assert_eq!(reason, "explicit FATAL tag");
    }

    #[test]
    fn auth_failure_trips() {
        let mut d = FatalDetector::default();
        assert!(d.check_line("Error: authentication failed for user").is_some());
    }

    #[test]
    fn session_failure_trips() {
        let mut d = FatalDetector::default();
        assert!(d.check_line("invalid session: xyz").is_some());
    }

    #[test]
    fn config_error_trips() {
        let mut d = FatalDetector::default();
        assert!(d.check_line("configuration error: missing field").is_some());
    }

    #[test]
    fn repeated_timestamped_line_trips_after_threshold() {
        let mut d = FatalDetector::default();
        assert_eq!(d.check_line("[2024-01-01T00:00:01] waiting for response"), None);
        assert_eq!(d.check_line("[2024-01-01T00:00:02] waiting for response"), None);
        let tripped = d.check_line("[2024-01-01T00:00:03] waiting for response");
        assert!(tripped.is_some());
    }

    #[test]
    fn distinct_non_numeric_lines_never_accumulate() {
        let mut d = FatalDetector::default();
        assert_eq!(d.check_line("doing thing A"), None);
        assert_eq!(d.check_line("doing thing B"), None);
        assert_eq!(d.check_line("doing thing C"), None);
    }

    #[test]
    fn stdout_retry_message_is_ignorable() {
        assert!(is_ignorable_stdout_error("reconnecting after rate limit (429)"));
    }

    #[test]
    fn stdout_unrelated_error_is_not_ignorable() {
        assert!(!is_ignorable_stdout_error("tool crashed with a null pointer"));
    }
}
