//! Column-presence and schema-shape check generators: `column_required`,
//! `column_allowed`, plus the `column_immutable_metadata` supplement.

use super::{CheckGenerator, lit, validate_identifier};
use crate::model::{FrozenParams, ParamValue};

/// Queries `information_schema.columns` for presence; violation count is 0
/// or 1.
pub struct ColumnRequired;

impl CheckGenerator for ColumnRequired {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, _inherited_condition: Option<&str>) -> String {
        let column = params
            .get("column")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        format!(
            "SELECT CASE WHEN COUNT(*) = 0 THEN 1 ELSE 0 END::BIGINT AS violations, \
             CASE WHEN COUNT(*) = 0 THEN {msg} ELSE NULL END AS error_message \
             FROM information_schema.columns \
             WHERE table_name = '{{table_name}}' AND column_name = {col}",
            msg = lit(&format!("required column '{column}' does not exist")),
            col = lit(column)
        )
    }
}

/// Verifies that any column present beyond the mandatory/recommended set
/// follows the FOCUS extension naming convention.
pub struct ColumnAllowed;

impl CheckGenerator for ColumnAllowed {
    fn required_keys(&self) -> &'static [&'static str] {
        &["pattern"]
    }

    fn defaults(&self) -> Vec<(&'static str, ParamValue)> {
        vec![("pattern", ParamValue::Str("^[A-Za-z][A-Za-z0-9]*$".to_string()))]
    }

    fn generate_sql(&self, params: &FrozenParams, _inherited_condition: Option<&str>) -> String {
        let pattern = params
            .get("pattern")
            .and_then(ParamValue::as_str)
            .unwrap_or("^[A-Za-z][A-Za-z0-9]*$");
        format!(
            "SELECT COUNT(*)::BIGINT AS violations, \
             CASE WHEN COUNT(*) > 0 THEN 'one or more column names do not match the FOCUS naming convention' ELSE NULL END AS error_message \
             FROM information_schema.columns \
             WHERE table_name = '{{table_name}}' AND NOT regexp_matches(column_name, {pattern})",
            pattern = lit(pattern)
        )
    }
}

/// All rows sharing `group_column` must agree on `value_column`, e.g. one
/// `BillingAccountId` must map to exactly one `BillingAccountName`.
pub struct ColumnImmutableMetadata;

impl CheckGenerator for ColumnImmutableMetadata {
    fn required_keys(&self) -> &'static [&'static str] {
        &["group_column", "value_column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["group_column", "value_column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let group_column = params
            .get("group_column")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        let value_column = params
            .get("value_column")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        let group_col =
            validate_identifier(group_column).expect("identifier params are validated at catalog load");
        let value_col =
            validate_identifier(value_column).expect("identifier params are validated at catalog load");
        let filter = match inherited_condition {
            Some(cond) if !cond.trim().is_empty() => format!("WHERE {cond}"),
            _ => String::new()
        };
        format!(
            "SELECT COUNT(*)::BIGINT AS violations, \
             CASE WHEN COUNT(*) > 0 THEN {msg} ELSE NULL END AS error_message \
             FROM (SELECT {group_col} FROM {{table_name}} {filter} \
             GROUP BY {group_col} HAVING COUNT(DISTINCT {value_col}) > 1) AS inconsistent",
            msg = lit(&format!(
                "{value_column} MUST be identical for every row sharing the same {group_column}."
            ))
        )
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::model::LeafParams;

    fn frozen(pairs: Vec<(&str, ParamValue)>) -> FrozenParams {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v);
        }
        FrozenParams::freeze(LeafParams(map))
    }

    #[test]
    fn column_required_queries_information_schema() {
        let params = frozen(vec![("column", ParamValue::Str("RegionId".into()))]);
        let sql = ColumnRequired.generate_sql(&params, None);
        assert!(sql.contains("information_schema.columns"));
        assert!(sql.contains("'RegionId'"));
    }

    #[test]
    fn column_immutable_metadata_groups_and_checks_distinct_count() {
        let params = frozen(vec![
            ("group_column", ParamValue::Str("BillingAccountId".into())),
            ("value_column", ParamValue::Str("BillingAccountName".into())),
        ]);
        let sql = ColumnImmutableMetadata.generate_sql(&params, None);
        assert!(sql.contains("GROUP BY BillingAccountId"));
        assert!(sql.contains("HAVING COUNT(DISTINCT BillingAccountName) > 1"));
    }
}
