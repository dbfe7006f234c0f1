//! Structured diagnostics extraction from query-engine error text. A
//! missing-column error is recoverable (surfaces as a rule `FAIL`, never
//! aborts the run); every other error class is fatal.

use std::sync::LazyLock;

use regex::Regex;

/// Ordered regexes tried, in order, against a query-engine error message to
/// pull out the name of a column the engine could not resolve. Order
/// matters only in that the first pattern to match wins; DuckDB's own
/// wording has varied across versions, so several shapes are tried.
static MISSING_COLUMN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#"Column with name "?([A-Za-z0-9_]+)"? does not exist"#).unwrap(),
        Regex::new(r#"Binder Error:.*column "?([A-Za-z0-9_]+)"?"#).unwrap(),
        Regex::new(r#""([A-Za-z0-9_]+)" not found"#).unwrap(),
    ]
});

/// If `message` looks like a missing-column error, returns the sorted,
/// deduplicated set of column names the engine reported. Empty means the
/// error did not match any known missing-column shape, and should be
/// treated as an unclassified engine error.
pub fn extract_missing_columns(message: &str) -> Vec<String> {
    let mut found: Vec<String> = MISSING_COLUMN_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(message))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    found.sort();
    found.dedup();
    found
}

/// `true` if `message` matches any missing-column diagnostic pattern.
pub fn is_missing_column_error(message: &str) -> bool {
    !extract_missing_columns(message).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_column_with_name_variant() {
        let msg = r#"Binder Error: Column with name "RegionId" does not exist!"#;
        assert_eq!(extract_missing_columns(msg), vec!["RegionId".to_string()]);
    }

    #[test]
    fn extracts_not_found_variant() {
        let msg = r#""AvailabilityZone" not found in FROM clause"#;
        assert_eq!(extract_missing_columns(msg), vec!["AvailabilityZone".to_string()]);
    }

    #[test]
    fn deduplicates_and_sorts() {
        let msg = r#"Column with name "Zed" does not exist. Column with name "Abe" does not exist."#;
        assert_eq!(extract_missing_columns(msg), vec!["Abe".to_string(), "Zed".to_string()]);
    }

    #[test]
    fn non_matching_message_is_not_a_missing_column_error() {
        assert!(!is_missing_column_error("out of memory"));
    }
}
