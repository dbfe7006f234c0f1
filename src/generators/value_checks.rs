//! Value, membership, and cross-column check generators: `allowed_values`,
//! `value_in`, `value_not_null`, `regex_match`, `dimension_values`, plus
//! the `numeric_non_negative` supplement.

use super::{CheckGenerator, count_query, lit, lit_list, validate_identifier, where_clause};
use crate::model::{FrozenParams, ParamValue};

fn column_of(params: &FrozenParams) -> &str {
    params
        .get("column")
        .and_then(ParamValue::as_str)
        .unwrap_or_default()
}

fn string_list(params: &FrozenParams, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(ParamValue::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

pub struct AllowedValues;

impl CheckGenerator for AllowedValues {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column", "values"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let values = string_list(params, "values");
        let list = lit_list(values.iter().map(String::as_str));
        let own = format!("{col} IS NOT NULL AND {col} NOT IN ({list})");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be one of the allowed values.")
        )
    }
}

/// Distinct from [`AllowedValues`] in intent: this checks membership in a
/// dynamically supplied value set (e.g. resolved from a companion
/// dimension at catalog-build time) rather than a fixed enumeration baked
/// into the rule text, but compiles to the same membership predicate.
pub struct ValueIn;

impl CheckGenerator for ValueIn {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column", "values"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let values = string_list(params, "values");
        let list = lit_list(values.iter().map(String::as_str));
        let own = format!("{col} IS NOT NULL AND {col} NOT IN ({list})");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be in the permitted value set.")
        )
    }
}

pub struct ValueNotNull;

impl CheckGenerator for ValueNotNull {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let own = format!("{col} IS NULL");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST NOT be null.")
        )
    }
}

pub struct RegexMatch;

impl CheckGenerator for RegexMatch {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column", "pattern"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let pattern = params
            .get("pattern")
            .and_then(ParamValue::as_str)
            .unwrap_or("");
        let own = format!(
            "{col} IS NOT NULL AND NOT regexp_matches({col}, {pattern})",
            pattern = lit(pattern)
        );
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST match pattern '{pattern}'.")
        )
    }
}

/// Cross-column check: when `when_column = when_value`, `column` is
/// restricted to `allowed`, e.g. `ChargeClass` is only meaningful when
/// `ChargeCategory = 'Adjustment'`.
pub struct DimensionValues;

impl CheckGenerator for DimensionValues {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column", "when_column", "when_value", "allowed"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column", "when_column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let when_column = params
            .get("when_column")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        let when_col =
            validate_identifier(when_column).expect("identifier params are validated at catalog load");
        let when_value = params
            .get("when_value")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        let allowed = string_list(params, "allowed");
        let list = lit_list(allowed.iter().map(String::as_str));
        let own = format!(
            "{when_col} = {wv} AND ({col} IS NULL OR {col} NOT IN ({list}))",
            wv = lit(when_value)
        );
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be one of the allowed values when {when_column} = '{when_value}'.")
        )
    }
}

/// Forbids negative values unless a sibling category column flags the row
/// as a credit/refund.
pub struct NumericNonNegative;

impl CheckGenerator for NumericNonNegative {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column", "unless_category_column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let exemption = match (
            params.get("unless_category_column").and_then(ParamValue::as_str),
            params.get("unless_category_value").and_then(ParamValue::as_str)
        ) {
            (Some(cat_col), Some(cat_val)) => {
                let cat =
                    validate_identifier(cat_col).expect("identifier params are validated at catalog load");
                format!(" AND NOT ({cat} = {val})", val = lit(cat_val))
            }
            _ => String::new()
        };
        let own = format!("{col} IS NOT NULL AND {col} < 0{exemption}");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST NOT be negative.")
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
    fn allowed_values_generates_in_clause() {
        let params = frozen(vec![
            ("column", ParamValue::Str("ChargeCategory".into())),
            (
                "values",
                ParamValue::List(vec!["Usage".into(), "Purchase".into(), "Tax".into()])
            ),
        ]);
        let sql = AllowedValues.generate_sql(&params, None);
        assert!(sql.contains("NOT IN ('Usage', 'Purchase', 'Tax')"));
    }

    #[test]
    fn value_not_null_checks_nullness() {
        let params = frozen(vec![("column", ParamValue::Str("BilledCost".into()))]);
        let sql = ValueNotNull.generate_sql(&params, None);
        assert!(sql.contains("BilledCost IS NULL"));
    }

    #[test]
    fn numeric_non_negative_without_exemption() {
        let params = frozen(vec![("column", ParamValue::Str("BilledCost".into()))]);
        let sql = NumericNonNegative.generate_sql(&params, None);
        assert!(sql.contains("BilledCost < 0"));
        assert!(!sql.contains("unless"));
    }

    #[test]
    fn numeric_non_negative_with_exemption() {
        let params = frozen(vec![
            ("column", ParamValue::Str("BilledCost".into())),
            ("unless_category_column", ParamValue::Str("ChargeCategory".into())),
            ("unless_category_value", ParamValue::Str("Refund".into())),
        ]);
        let sql = NumericNonNegative.generate_sql(&params, None);
        assert!(sql.contains("NOT (ChargeCategory = 'Refund')"));
    }
}
