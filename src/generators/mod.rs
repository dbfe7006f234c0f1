//! Closed check-generator registry.
//!
//! Each leaf `check_type` has exactly one [`CheckGenerator`] implementation,
//! reached through a fixed [`Registry`] built once at first use — the
//! registry is extended by adding a generator variant here, never by
//! evaluating catalog-supplied SQL. A fixed set keyed by `check_type`
//! rather than scanned linearly, because the registry must also answer
//! "does this check_type exist" during catalog loading, before any rule
//! has run.

mod escape_hatch;
mod schema_checks;
mod type_checks;
mod value_checks;

use std::{collections::HashMap, sync::LazyLock};

use crate::{
    error::{AppResult, invalid_identifier},
    model::{CheckType, FrozenParams, LeafParams, ParamValue}
};

/// One generator per leaf `check_type`.
///
/// `required_keys`/`defaults`/`validate` run once, at catalog-load time:
/// missing keys cause rule-load failure. `generate_sql` runs once per
/// leaf, at plan-compile time, and must be a pure function of its frozen
/// parameters and inherited condition — the same compiled string for the
/// same catalog every time.
pub trait CheckGenerator: Send + Sync {
    /// Parameter names that must be present in `validation_criteria`.
    fn required_keys(&self) -> &'static [&'static str];

    /// Parameter names and default values applied when absent.
    fn defaults(&self) -> Vec<(&'static str, ParamValue)> {
        Vec::new()
    }

    /// Parameter names that `generate_sql` interpolates as raw SQL
    /// identifiers (column names) rather than escaped literals. The
    /// catalog loader validates every one of these, when present, against
    /// `[A-Za-z_][A-Za-z0-9_]*` before the rule is accepted — this is what
    /// makes `generate_sql`'s own `validate_identifier` call infallible.
    fn identifier_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Extra catalog-load-time validation beyond key presence (e.g. the
    /// `sql_query` escape hatch validates its `template_id` against the
    /// closed set of registered templates).
    fn validate(&self, _params: &LeafParams) -> AppResult<()> {
        Ok(())
    }

    /// Produces a SQL string with a literal `{table_name}` placeholder,
    /// evaluating to a single row `(violations BIGINT, error_message
    /// VARCHAR NULLABLE)`.
    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String;
}

/// The closed mapping from `check_type` to generator.
pub struct Registry(HashMap<CheckType, Box<dyn CheckGenerator>>);

impl Registry {
    pub fn get(&self, check_type: &CheckType) -> Option<&dyn CheckGenerator> {
        self.0.get(check_type).map(Box::as_ref)
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut map: HashMap<CheckType, Box<dyn CheckGenerator>> = HashMap::new();
    map.insert(CheckType::ColumnRequired, Box::new(schema_checks::ColumnRequired));
    map.insert(CheckType::ColumnAllowed, Box::new(schema_checks::ColumnAllowed));
    map.insert(
        CheckType::ColumnImmutableMetadata,
        Box::new(schema_checks::ColumnImmutableMetadata)
    );
    map.insert(CheckType::TypeString, Box::new(type_checks::TypeString));
    map.insert(CheckType::TypeDecimal, Box::new(type_checks::TypeDecimal));
    map.insert(CheckType::TypeDatetime, Box::new(type_checks::TypeDatetime));
    map.insert(CheckType::TypeBoolean, Box::new(type_checks::TypeBoolean));
    map.insert(CheckType::FormatDatetime, Box::new(type_checks::FormatDatetime));
    map.insert(CheckType::AllowedValues, Box::new(value_checks::AllowedValues));
    map.insert(CheckType::ValueIn, Box::new(value_checks::ValueIn));
    map.insert(CheckType::ValueNotNull, Box::new(value_checks::ValueNotNull));
    map.insert(CheckType::RegexMatch, Box::new(value_checks::RegexMatch));
    map.insert(CheckType::DimensionValues, Box::new(value_checks::DimensionValues));
    map.insert(CheckType::NumericNonNegative, Box::new(value_checks::NumericNonNegative));
    map.insert(CheckType::SqlQuery, Box::new(escape_hatch::SqlQuery));
    Registry(map)
});

/// Returns the process-wide closed generator registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Quotes and escapes a string for safe interpolation as a SQL string
/// literal: wraps in single quotes and doubles any embedded single quote.
/// This is the only path by which catalog-supplied values reach generated
/// SQL text.
pub fn lit(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes and escapes a list of strings as a SQL `IN (...)` literal list
/// body, e.g. `'a', 'b', 'c'`.
pub fn lit_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(lit)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validates a catalog-supplied identifier (a column name) against
/// `[A-Za-z_][A-Za-z0-9_]*` before it is interpolated unquoted into SQL.
/// This is the step that makes SQL injection via rule JSON impossible: no
/// identifier reaches generated SQL without passing this check.
pub fn validate_identifier(name: &str) -> AppResult<&str> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if first_ok && rest_ok {
        Ok(name)
    } else {
        Err(invalid_identifier(name))
    }
}

/// Wraps `own_condition` with any `inherited_condition`, conjoined with
/// boolean AND: each generator wraps its core predicate inside
/// `WHERE (<inherited_condition>) AND <own_condition>` when an inherited
/// condition is present.
pub fn where_clause(inherited_condition: Option<&str>, own_condition: &str) -> String {
    match inherited_condition {
        Some(cond) if !cond.trim().is_empty() => {
            format!("WHERE ({cond}) AND {own_condition}")
        }
        _ => format!("WHERE {own_condition}")
    }
}

/// Builds the standard single-row `(violations, error_message)` count
/// query every leaf generator except `column_required`/`column_allowed`
/// produces.
pub fn count_query(where_clause: &str, error_message: &str) -> String {
    format!(
        "SELECT COUNT(*)::BIGINT AS violations, CASE WHEN COUNT(*) > 0 THEN {} ELSE NULL END AS error_message FROM {{table_name}} {}",
        lit(error_message),
        where_clause
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lit_escapes_single_quotes() {
        assert_eq!(lit("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn validate_identifier_accepts_and_rejects() {
        assert!(validate_identifier("BilledCost").is_ok());
        assert!(validate_identifier("_private").is_ok());
        assert!(validate_identifier("1Bad").is_err());
        assert!(validate_identifier("bad; DROP TABLE x").is_err());
    }

    #[test]
    fn where_clause_conjoins_inherited_condition() {
        assert_eq!(
            where_clause(Some("BilledCurrency IS NOT NULL"), "col IS NULL"),
            "WHERE (BilledCurrency IS NOT NULL) AND col IS NULL"
        );
        assert_eq!(where_clause(None, "col IS NULL"), "WHERE col IS NULL");
    }

    #[test]
    fn registry_contains_all_leaf_kinds() {
        let reg = registry();
        assert!(reg.get(&CheckType::TypeString).is_some());
        assert!(reg.get(&CheckType::SqlQuery).is_some());
        assert!(reg.get(&CheckType::CompositeAnd).is_none());
    }
}
