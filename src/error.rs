//! Error taxonomy for the FOCUS validation core.
//!
//! Error construction functions create context-specific [`AppError`]
//! instances, grouped by the taxonomy the core design lays out:
//!
//! - **Catalog errors** (fatal at load): unknown check type, missing
//!   parameter, malformed composite, dangling reference, duplicate id,
//!   cycle.
//! - **Plan errors** (fatal at plan build): nodes left unresolved after
//!   Kahn's algorithm — always an internal invariant violation, since the
//!   resolver should have already rejected any cycle.
//! - **Engine errors** (fatal at run): query-engine failures that could
//!   not be classified as a missing-column check failure.
//!
//! Check-level and data-level failures are never represented as `Err`
//! values here — a rule failing its check is an expected outcome
//! ([`crate::result::Outcome::Fail`]), not an exceptional one.

pub use masterror::{AppError, AppResult};

/// Unknown `check_type` referenced by a rule in the catalog.
pub fn unknown_check_type(rule_id: &str, check_type: &str) -> AppError {
    AppError::bad_request(format!(
        "rule '{rule_id}' references unknown check_type '{check_type}'"
    ))
}

/// A required parameter is missing from `validation_criteria`.
pub fn missing_parameter(rule_id: &str, key: &str) -> AppError {
    AppError::bad_request(format!(
        "rule '{rule_id}' is missing required parameter '{key}'"
    ))
}

/// A composite rule's requirement list is malformed (empty, or mixes
/// unsupported shapes).
pub fn malformed_composite(rule_id: &str, reason: impl Into<String>) -> AppError {
    AppError::bad_request(format!(
        "rule '{rule_id}' has a malformed composite requirement: {}",
        reason.into()
    ))
}

/// A `model_rule_reference` points at a `rule_id` absent from the catalog.
pub fn dangling_reference(parent_rule_id: &str, referenced_rule_id: &str) -> AppError {
    AppError::bad_request(format!(
        "rule '{parent_rule_id}' references unknown rule '{referenced_rule_id}'"
    ))
}

/// Duplicate `rule_id` encountered while loading a catalog.
pub fn duplicate_rule_id(rule_id: &str) -> AppError {
    AppError::bad_request(format!("duplicate rule_id '{rule_id}' in catalog"))
}

/// A cycle was detected in the dependency graph.
///
/// `cycle` is the concrete shortest cycle found by DFS path tracking, e.g.
/// `["A", "B", "A"]`.
pub fn cycle_detected(cycle: &[String]) -> AppError {
    AppError::bad_request(format!("dependency cycle detected: {}", cycle.join(" -> ")))
}

/// Kahn's algorithm left nodes unscheduled after the resolver reported no
/// cycle: an internal invariant violation, not user-facing catalog
/// malformation.
pub fn plan_invariant_violation(remaining: &[String]) -> AppError {
    AppError::internal(format!(
        "plan builder invariant violated: {} node(s) unresolved after layering: {}",
        remaining.len(),
        remaining.join(", ")
    ))
}

/// The query engine failed in a way that could not be classified as a
/// missing-column check failure (see `diagnostics`): syntax error, type
/// mismatch, resource exhaustion, connection loss.
pub fn engine_error(rule_id: &str, source: impl std::fmt::Display) -> AppError {
    AppError::internal(format!(
        "query engine error while running '{rule_id}': {source}"
    ))
}

/// Failed to read a catalog source from disk.
pub fn catalog_io_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("failed to read catalog source '{path}': {source}"))
}

/// Failed to parse catalog JSON.
pub fn catalog_parse_error(source: impl std::fmt::Display) -> AppError {
    AppError::bad_request(format!("failed to parse rule catalog: {source}"))
}

/// Failed to load or parse run configuration.
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// An identifier (column name) failed validation against
/// `[A-Za-z_][A-Za-z0-9_]*` before SQL interpolation.
pub fn invalid_identifier(value: &str) -> AppError {
    AppError::bad_request(format!("'{value}' is not a valid SQL identifier"))
}

/// A rule's identifier-typed parameter (e.g. a column name) failed
/// validation against `[A-Za-z_][A-Za-z0-9_]*` at catalog-load time. The
/// rule is rejected rather than loaded with an unsafe value, so
/// `generate_sql`'s own identifier validation is infallible.
pub fn invalid_identifier_param(rule_id: &str, key: &str, value: &str) -> AppError {
    AppError::bad_request(format!(
        "rule '{rule_id}' parameter '{key}' = '{value}' is not a valid SQL identifier"
    ))
}
