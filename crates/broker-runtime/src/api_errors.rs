//! Extraction of known API-retry error signatures from stdout lines a
//! parser couldn't deserialize as JSON. A zero-exit run that printed one of
//! these is not a silent success: the line is surfaced to the caller
//! instead of being dropped along with the rest of `non_json_stdout`.

use std::sync::OnceLock;

use regex::Regex;

fn api_error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"Attempt \d+ failed with status (\d+)\..*ApiError: (.+)",
            r"Error executing tool (\w+): (.+)",
            r"ApiError: (.+)",
            r"(\w+Error): (.+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Returns the lines of `non_json_stdout` that match a known API-retry
/// signature, in their original order.
pub fn extract(non_json_stdout: &[String]) -> Vec<String> {
    let patterns = api_error_patterns();
    non_json_stdout.iter().filter(|line| patterns.iter().any(|re| re.is_match(line))).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_gemini_style_retry_line() {
        let lines = vec!["Attempt 3 failed with status 429. Retrying... ApiError: rate limited".to_string()];
        assert_eq!(extract(&lines), lines);
    }

    #[test]
    fn matches_bare_api_error_line() {
        let lines = vec!["ApiError: upstream unavailable".to_string()];
        assert_eq!(extract(&lines), lines);
    }

    #[test]
    fn ordinary_output_lines_never_match() {
        let lines = vec!["just some plain progress text".to_string()];
        assert!(extract(&lines).is_empty());
    }

    #[test]
    fn preserves_input_order_and_skips_non_matching_lines() {
        let lines = vec![
            "noise".to_string(),
            "ApiError: first".to_string(),
            "more noise".to_string(),
            "TypeError: second".to_string(),
        ];
        assert_eq!(extract(&lines), vec!["ApiError: first".to_string(), "TypeError: second".to_string()]);
    }
}
