//! Rule catalog loader: parses versioned rule JSON into typed [`Rule`]
//! records.
//!
//! The loader is a pure function over bytes already in memory — fetching a
//! FOCUS version from disk or network is an external collaborator's
//! concern; this module only ever turns a `serde_json::Value` into
//! `Vec<Rule>`, or fails with a catalog error that names the offending
//! `rule_id`.
//!
//! `check_type` is parsed from its raw JSON string rather than leaning on
//! `serde`'s enum derive directly, so that an unrecognized value produces
//! [`crate::error::unknown_check_type`] with the owning rule's id attached,
//! instead of an opaque "unknown variant" parse error.

use std::{collections::HashSet, fs, path::Path};

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::{
    error::{
        AppResult, catalog_io_error, catalog_parse_error, duplicate_rule_id, invalid_identifier_param,
        malformed_composite, missing_parameter, unknown_check_type
    },
    generators,
    model::{CheckType, LeafParams, ParamValue, Requirement, Rule, RuleStatus}
};

/// Where catalog JSON comes from. Both variants are in-memory parses; the
/// caller is responsible for reading the file(s) first.
pub enum CatalogSource<'a> {
    /// A single aggregated JSON document: either a top-level array of rule
    /// objects, or an object with a `"rules"` array.
    Json(&'a str),
    /// A directory containing one JSON file per rule.
    JsonDir(&'a Path)
}

/// Parse a versioned rule catalog into typed rules.
///
/// `version` is carried through only for diagnostics; the loader does not
/// branch on it — schema drift between versions is expressed as different
/// JSON documents, not different parsing code paths.
pub fn load_catalog(version: &str, source: CatalogSource<'_>) -> AppResult<Vec<Rule>> {
    let documents = match source {
        CatalogSource::Json(text) => vec![
            serde_json::from_str::<Value>(text).map_err(catalog_parse_error)?,
        ],
        CatalogSource::JsonDir(dir) => {
            let mut docs = Vec::new();
            let entries = fs::read_dir(dir)
                .map_err(|e| catalog_io_error(&dir.display().to_string(), e))?;
            let mut paths: Vec<_> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();
            for path in paths {
                let content = fs::read_to_string(&path)
                    .map_err(|e| catalog_io_error(&path.display().to_string(), e))?;
                docs.push(serde_json::from_str::<Value>(&content).map_err(catalog_parse_error)?);
            }
            docs
        }
    };

    let _ = version;

    let mut rule_objects = Vec::new();
    for doc in documents {
        match doc {
            Value::Array(items) => rule_objects.extend(items),
            Value::Object(mut obj) => {
                if let Some(Value::Array(items)) = obj.remove("rules") {
                    rule_objects.extend(items);
                } else {
                    rule_objects.push(Value::Object(obj));
                }
            }
            other => return Err(catalog_parse_error(format!(
                "expected a rule object or array, found {other}"
            )))
        }
    }

    let mut rules = Vec::with_capacity(rule_objects.len());
    let mut seen = HashSet::with_capacity(rule_objects.len());
    for value in rule_objects {
        let rule = parse_rule(&value)?;
        if !seen.insert(rule.rule_id.clone()) {
            return Err(duplicate_rule_id(&rule.rule_id));
        }
        rules.push(rule);
    }
    Ok(rules)
}

fn parse_rule(value: &Value) -> AppResult<Rule> {
    let obj = value
        .as_object()
        .ok_or_else(|| catalog_parse_error("rule entries must be JSON objects"))?;

    let rule_id: CompactString = obj
        .get("rule_id")
        .and_then(Value::as_str)
        .ok_or_else(|| catalog_parse_error("rule entry is missing string field 'rule_id'"))?
        .into();

    let column_id = obj
        .get("column_id")
        .and_then(Value::as_str)
        .map(CompactString::from);

    let check_type_str = obj
        .get("check_type")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_parameter(&rule_id, "check_type"))?;
    let check_type = check_type_from_str(&rule_id, check_type_str)?;

    let criteria_value = obj
        .get("validation_criteria")
        .ok_or_else(|| missing_parameter(&rule_id, "validation_criteria"))?;
    let validation_criteria = parse_requirement(&rule_id, check_type, criteria_value)?;

    let applicability_criteria: IndexSet<CompactString> = obj
        .get("applicability_criteria")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(CompactString::from)
                .collect()
        })
        .unwrap_or_default();

    let row_condition = obj
        .get("row_condition")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let must_satisfy = obj
        .get("must_satisfy")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let status = match obj.get("status").and_then(Value::as_str) {
        Some("Draft") | Some("draft") => RuleStatus::Draft,
        _ => RuleStatus::Active
    };

    let is_dynamic = obj
        .get("is_dynamic")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Rule {
        rule_id,
        column_id,
        check_type,
        validation_criteria,
        applicability_criteria,
        row_condition,
        must_satisfy,
        status,
        is_dynamic
    })
}

/// Parses `validation_criteria` into a [`Requirement`] tree, dispatching on
/// the owning rule's `check_type` at the top level and on each nested
/// item's own `check_type`/`rule_id`/`and`/`or` key further down.
fn parse_requirement(rule_id: &str, check_type: CheckType, value: &Value) -> AppResult<Requirement> {
    if let Some(logic) = check_type.logic() {
        let children_value = value
            .get("children")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed_composite(rule_id, "composite rule has no 'children' array"))?;
        if children_value.is_empty() {
            return Err(malformed_composite(rule_id, "composite rule has zero children"));
        }
        let children = children_value
            .iter()
            .map(|child| parse_requirement_item(rule_id, child))
            .collect::<AppResult<Vec<_>>>()?;
        return Ok(match logic {
            crate::model::Logic::And => Requirement::And {
                children
            },
            crate::model::Logic::Or => Requirement::Or {
                children
            }
        });
    }

    if check_type == CheckType::ModelRuleReference {
        let referenced = value
            .get("rule_id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed_composite(rule_id, "model_rule_reference missing 'rule_id'"))?;
        return Ok(Requirement::Ref {
            rule_id: referenced.into()
        });
    }

    let params = parse_leaf_params(rule_id, check_type, value)?;
    Ok(Requirement::Leaf {
        check_type,
        params
    })
}

/// Parses one entry of a composite's `children` array: a nested composite
/// (its own `check_type` of `composite_and`/`composite_or`), a reference
/// (`{"check_type": "model_rule_reference", "rule_id": "..."}` or the
/// shorthand `{"rule_id": "..."}`), or an inline leaf (`{"check_type": ...,
/// params...}`).
fn parse_requirement_item(rule_id: &str, value: &Value) -> AppResult<Requirement> {
    if let Some(referenced) = value.get("rule_id").and_then(Value::as_str)
        && value.get("check_type").is_none()
    {
        return Ok(Requirement::Ref {
            rule_id: referenced.into()
        });
    }

    let item_check_type = value
        .get("check_type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            malformed_composite(rule_id, "composite child has neither 'check_type' nor 'rule_id'")
        })?;
    let child_check_type = check_type_from_str(rule_id, item_check_type)?;
    parse_requirement(rule_id, child_check_type, value)
}

fn parse_leaf_params(rule_id: &str, check_type: CheckType, value: &Value) -> AppResult<LeafParams> {
    let mut map = IndexMap::new();
    if let Some(params_obj) = value.get("params").and_then(Value::as_object) {
        for (key, raw) in params_obj {
            map.insert(key.clone(), json_to_param_value(raw));
        }
    }
    // Allow params to be inlined directly alongside check_type, e.g.
    // {"check_type": "type_string", "column": "AvailabilityZone"} as well
    // as the nested {"params": {"column": "..."}} shape.
    if let Some(obj) = value.as_object() {
        for (key, raw) in obj {
            if matches!(key.as_str(), "check_type" | "params" | "kind") {
                continue;
            }
            map.entry(key.clone()).or_insert_with(|| json_to_param_value(raw));
        }
    }

    let mut params = LeafParams(map);
    let generator = generators::registry()
        .get(&check_type)
        .ok_or_else(|| unknown_check_type(rule_id, &format!("{check_type:?}")))?;
    for (key, default) in generator.defaults() {
        params.with_default(key, default.clone());
    }
    if let Err(missing) = params.require_keys(generator.required_keys()) {
        return Err(missing_parameter(rule_id, missing));
    }
    for key in generator.identifier_keys() {
        if let Some(value) = params.get(key).and_then(ParamValue::as_str) {
            generators::validate_identifier(value)
                .map_err(|_| invalid_identifier_param(rule_id, key, value))?;
        }
    }
    generator.validate(&params)?;
    Ok(params)
}

fn json_to_param_value(value: &Value) -> ParamValue {
    match value {
        Value::String(s) => ParamValue::Str(s.clone()),
        Value::Number(n) => ParamValue::Number(n.as_f64().unwrap_or_default()),
        Value::Bool(b) => ParamValue::Bool(*b),
        Value::Array(items) => ParamValue::List(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        ),
        other => ParamValue::Str(other.to_string())
    }
}

fn check_type_from_str(rule_id: &str, raw: &str) -> AppResult<CheckType> {
    Ok(match raw {
        "column_required" => CheckType::ColumnRequired,
        "column_allowed" => CheckType::ColumnAllowed,
        "type_string" => CheckType::TypeString,
        "type_decimal" => CheckType::TypeDecimal,
        "type_datetime" => CheckType::TypeDatetime,
        "type_boolean" => CheckType::TypeBoolean,
        "format_datetime" => CheckType::FormatDatetime,
        "allowed_values" => CheckType::AllowedValues,
        "value_in" => CheckType::ValueIn,
        "value_not_null" => CheckType::ValueNotNull,
        "regex_match" => CheckType::RegexMatch,
        "dimension_values" => CheckType::DimensionValues,
        "column_immutable_metadata" => CheckType::ColumnImmutableMetadata,
        "numeric_non_negative" => CheckType::NumericNonNegative,
        "sql_query" => CheckType::SqlQuery,
        "composite_and" => CheckType::CompositeAnd,
        "composite_or" => CheckType::CompositeOr,
        "model_rule_reference" => CheckType::ModelRuleReference,
        other => return Err(unknown_check_type(rule_id, other))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> String {
        json.to_string()
    }

    #[test]
    fn loads_simple_leaf_rule() {
        let json = doc(
            r#"[{
                "rule_id": "AvailabilityZone-C-001-M",
                "column_id": "AvailabilityZone",
                "check_type": "type_string",
                "validation_criteria": {"column": "AvailabilityZone"},
                "must_satisfy": "AvailabilityZone MUST be of type string."
            }]"#
        );
        let rules = load_catalog("2024", CatalogSource::Json(&json)).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_id, "AvailabilityZone-C-001-M");
        assert!(matches!(rules[0].validation_criteria, Requirement::Leaf { .. }));
    }

    #[test]
    fn rejects_unknown_check_type() {
        let json = doc(
            r#"[{
                "rule_id": "X-1",
                "check_type": "frobnicate",
                "validation_criteria": {},
                "must_satisfy": "n/a"
            }]"#
        );
        let err = load_catalog("2024", CatalogSource::Json(&json)).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn rejects_missing_required_parameter() {
        let json = doc(
            r#"[{
                "rule_id": "X-2",
                "check_type": "type_string",
                "validation_criteria": {},
                "must_satisfy": "n/a"
            }]"#
        );
        let err = load_catalog("2024", CatalogSource::Json(&json)).unwrap_err();
        assert!(err.to_string().contains("column"));
    }

    #[test]
    fn rejects_invalid_identifier_in_column_param() {
        let json = doc(
            r#"[{
                "rule_id": "X-3",
                "check_type": "value_not_null",
                "validation_criteria": {"column": "x) OR 1=1 --"},
                "must_satisfy": "n/a"
            }]"#
        );
        let err = load_catalog("2024", CatalogSource::Json(&json)).unwrap_err();
        assert!(err.to_string().contains("X-3"));
        assert!(err.to_string().contains("column"));
    }

    #[test]
    fn rejects_duplicate_rule_id() {
        let json = doc(
            r#"[
                {"rule_id": "Dup-1", "check_type": "value_not_null",
                 "validation_criteria": {"column": "A"}, "must_satisfy": "n/a"},
                {"rule_id": "Dup-1", "check_type": "value_not_null",
                 "validation_criteria": {"column": "A"}, "must_satisfy": "n/a"}
            ]"#
        );
        let err = load_catalog("2024", CatalogSource::Json(&json)).unwrap_err();
        assert!(err.to_string().contains("Dup-1"));
    }

    #[test]
    fn parses_composite_and_with_reference_and_inline_leaf_children() {
        let json = doc(
            r#"[{
                "rule_id": "BilledCost-C-000-M",
                "check_type": "composite_and",
                "validation_criteria": {
                    "children": [
                        {"rule_id": "BilledCost-C-001-M"},
                        {"check_type": "value_not_null", "column": "BilledCost"}
                    ]
                },
                "must_satisfy": "all of the above"
            }]"#
        );
        let rules = load_catalog("2024", CatalogSource::Json(&json)).unwrap();
        match &rules[0].validation_criteria {
            Requirement::And { children
            } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Requirement::Ref { .. }));
                assert!(matches!(children[1], Requirement::Leaf { .. }));
            }
            _ => panic!("expected And")
        }
    }
}
