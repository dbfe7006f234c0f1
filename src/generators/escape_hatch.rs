//! The `sql_query` escape hatch: a named, pre-registered SQL template keyed
//! by `template_id`, never raw catalog-supplied SQL. This is the mechanism
//! by which a check that the closed leaf-kind set cannot express gets
//! added — by registering a new template id here, not by accepting
//! arbitrary SQL text from the catalog.

use std::collections::HashMap;

use super::{CheckGenerator, validate_identifier};
use crate::{
    error::{AppResult, config_error},
    model::{FrozenParams, LeafParams, ParamValue}
};

fn templates() -> &'static HashMap<&'static str, &'static str> {
    use std::sync::LazyLock;
    static TEMPLATES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
        let mut map = HashMap::new();
        map.insert(
            "no_duplicate_primary_key",
            "SELECT COUNT(*)::BIGINT AS violations, \
             CASE WHEN COUNT(*) > 0 THEN 'duplicate primary key rows detected' ELSE NULL END AS error_message \
             FROM (SELECT {primary_key}, COUNT(*) AS n FROM {table_name} GROUP BY {primary_key} HAVING COUNT(*) > 1) d"
        );
        map.insert(
            "non_empty_table",
            "SELECT CASE WHEN COUNT(*) = 0 THEN 1 ELSE 0 END::BIGINT AS violations, \
             CASE WHEN COUNT(*) = 0 THEN 'dataset contains zero rows' ELSE NULL END AS error_message \
             FROM {table_name}"
        );
        map
    });
    &TEMPLATES
}

pub struct SqlQuery;

impl CheckGenerator for SqlQuery {
    fn required_keys(&self) -> &'static [&'static str] {
        &["template_id"]
    }

    fn identifier_keys(&self) -> &'static [&'static str] {
        &["primary_key"]
    }

    fn validate(&self, params: &LeafParams) -> AppResult<()> {
        let template_id = params
            .get("template_id")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        if !templates().contains_key(template_id) {
            return Err(config_error(format!(
                "sql_query template_id '{template_id}' is not registered"
            )));
        }
        if template_id == "no_duplicate_primary_key" && params.get("primary_key").and_then(ParamValue::as_str).is_none() {
            return Err(config_error(
                "sql_query template 'no_duplicate_primary_key' requires parameter 'primary_key'"
            ));
        }
        Ok(())
    }

    fn generate_sql(&self, params: &FrozenParams, inherited_condition: Option<&str>) -> String {
        let template_id = params
            .get("template_id")
            .and_then(ParamValue::as_str)
            .unwrap_or_default();
        let filter = match inherited_condition {
            Some(cond) if !cond.trim().is_empty() => format!("WHERE {cond}"),
            _ => String::new()
        };
        match template_id {
            "no_duplicate_primary_key" => {
                let primary_key = params
                    .get("primary_key")
                    .and_then(ParamValue::as_str)
                    .unwrap_or("");
                let primary_key =
                    validate_identifier(primary_key).expect("identifier params are validated at catalog load");
                format!(
                    "SELECT COUNT(*)::BIGINT AS violations, \
                     CASE WHEN COUNT(*) > 0 THEN 'duplicate primary key rows detected' ELSE NULL END AS error_message \
                     FROM (SELECT {primary_key}, COUNT(*) AS n FROM {{table_name}} {filter} \
                     GROUP BY {primary_key} HAVING COUNT(*) > 1) d"
                )
            }
            "non_empty_table" => {
                format!(
                    "SELECT CASE WHEN COUNT(*) = 0 THEN 1 ELSE 0 END::BIGINT AS violations, \
                     CASE WHEN COUNT(*) = 0 THEN 'dataset contains zero rows' ELSE NULL END AS error_message \
                     FROM {{table_name}} {filter}"
                )
            }
            _ => "SELECT 0::BIGINT AS violations, NULL AS error_message".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::model::LeafParams;

    #[test]
    fn validate_rejects_unknown_template() {
        let mut map = IndexMap::new();
        map.insert("template_id".to_string(), ParamValue::Str("nope".into()));
        let params = LeafParams(map);
        assert!(SqlQuery.validate(&params).is_err());
    }

    #[test]
    fn validate_accepts_known_template() {
        let mut map = IndexMap::new();
        map.insert(
            "template_id".to_string(),
            ParamValue::Str("non_empty_table".into())
        );
        let params = LeafParams(map);
        assert!(SqlQuery.validate(&params).is_ok());
    }
}
