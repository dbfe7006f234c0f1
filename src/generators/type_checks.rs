//! Type and format check generators: `type_string`, `type_decimal`,
//! `type_datetime`, `format_datetime`, plus the `type_boolean` supplement.

use super::{CheckGenerator, count_query, lit, validate_identifier, where_clause};
use crate::model::{FrozenParams, ParamValue};

fn column_of(params: &FrozenParams) -> &str {
    params
        .get("column")
        .and_then(ParamValue::as_str)
        .unwrap_or_default()
}

pub struct TypeString;

impl CheckGenerator for TypeString {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let own = format!("{col} IS NOT NULL AND typeof({col}) <> 'VARCHAR'");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be of type VARCHAR (string).")
        )
    }
}

pub struct TypeDecimal;

impl CheckGenerator for TypeDecimal {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let own = format!(
            "{col} IS NOT NULL AND typeof({col}) NOT IN ('DECIMAL', 'DOUBLE', 'BIGINT')"
        );
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be of a numeric decimal type.")
        )
    }
}

pub struct TypeDatetime;

impl CheckGenerator for TypeDatetime {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let own = format!(
            "{col} IS NOT NULL AND typeof({col}) NOT IN ('TIMESTAMP', 'TIMESTAMP WITH TIME ZONE', 'DATE')"
        );
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be of type datetime.")
        )
    }
}

pub struct TypeBoolean;

impl CheckGenerator for TypeBoolean {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let own = format!("{col} IS NOT NULL AND typeof({col}) <> 'BOOLEAN'");
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST be of type boolean.")
        )
    }
}

pub struct FormatDatetime;

impl CheckGenerator for FormatDatetime {
    fn required_keys(&self) -> &'static [&'static str] {
        &["column", "format"]
    }

    fn defaults(&self) -> Vec<(&'static str, ParamValue)> {
        vec![("format", ParamValue::Str("%Y-%m-%dT%H:%M:%SZ".to_string()))]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["column"]
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let column = column_of(params);
        let col = validate_identifier(column).expect("identifier params are validated at catalog load");
        let format = params
            .get("format")
            .and_then(ParamValue::as_str)
            .unwrap_or("%Y-%m-%dT%H:%M:%SZ");
        let own = format!(
            "try_strptime({col}, {fmt}) IS NULL AND {col} IS NOT NULL",
            fmt = lit(format)
        );
        count_query(
            &where_clause(inherited_condition, &own),
            &format!("{column} MUST match datetime format '{format}'.")
        )
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::model::LeafParams;

    fn frozen(pairs: &[(&str, &str)]) -> FrozenParams {
        let mut map = IndexMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), ParamValue::Str(v.to_string()));
        }
        FrozenParams::freeze(LeafParams(map))
    }

    #[test]
    fn type_string_sql_has_no_inherited_clause_when_none_given() {
        let params = frozen(&[("column", "AvailabilityZone")]);
        let sql = TypeString.generate_sql(&params, None);
        assert!(sql.contains("WHERE AvailabilityZone IS NOT NULL"));
        assert!(!sql.contains("AND AvailabilityZone IS NOT NULL AND ("));
    }

    #[test]
    fn type_string_sql_conjoins_inherited_condition() {
        let params = frozen(&[("column", "AvailabilityZone")]);
        let sql = TypeString.generate_sql(&params, Some("BilledCurrency IS NOT NULL"));
        assert!(sql.starts_with("SELECT"));
        assert!(sql.contains("WHERE (BilledCurrency IS NOT NULL) AND"));
    }

    #[test]
    fn format_datetime_uses_default_format_when_absent() {
        let params = frozen(&[("column", "ChargePeriodStart")]);
        let sql = FormatDatetime.generate_sql(&params, None);
        assert!(sql.contains("try_strptime"));
        assert!(sql.contains("%Y-%m-%dT%H:%M:%SZ"));
    }
}
