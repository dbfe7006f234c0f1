//! Offline explain mode: describes a compiled plan without consulting the
//! query engine. `explain` never opens a `TableHandle` and never executes
//! SQL — it only reads back what `plan::build` already compiled.

use serde::Serialize;

use crate::{
    model::{CheckType, Logic, RuleId, RuleIdVec},
    plan::{CompiledNode, Plan}
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainKind {
    Leaf {
        check_type: CheckType,
        sql:        String
    },
    Composite {
        logic:    Logic,
        children: RuleIdVec
    },
    Reference {
        referenced: RuleId
    },
    SkippedNonApplicable,
    SkippedDynamic
}

/// One rule's explanation.
#[derive(Debug, Clone, Serialize)]
pub struct RuleExplanation {
    pub rule_id:      RuleId,
    pub must_satisfy: String,
    pub kind:         ExplainKind
}

/// Explains every rule in `plan`, ordered alphabetically by `rule_id`,
/// regardless of the plan's own layer order. Idempotent and order-stable
/// across calls for the same plan.
pub fn explain(plan: &Plan) -> Vec<RuleExplanation> {
    let mut out: Vec<RuleExplanation> = plan
        .layers
        .iter()
        .flatten()
        .map(|entry| RuleExplanation {
            rule_id:      entry.rule_id.clone(),
            must_satisfy: entry.must_satisfy.clone(),
            kind:         match &entry.node {
                CompiledNode::Leaf {
                    check_type,
                    sql
                } => ExplainKind::Leaf {
                    check_type: *check_type,
                    sql:        sql.clone()
                },
                CompiledNode::Composite {
                    logic,
                    children
                } => ExplainKind::Composite {
                    logic:    *logic,
                    children: children.clone()
                },
                CompiledNode::Reference {
                    referenced
                } => ExplainKind::Reference {
                    referenced: referenced.clone()
                },
                CompiledNode::SkippedNonApplicable => ExplainKind::SkippedNonApplicable,
                CompiledNode::SkippedDynamic => ExplainKind::SkippedDynamic
            }
        })
        .collect();
    out.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{graph::resolve, model::{LeafParams, ParamValue, Requirement, Rule, RuleStatus}};

    fn leaf(id: &str) -> Rule {
        let mut map = indexmap::IndexMap::new();
        map.insert("column".to_string(), ParamValue::Str("BilledCost".into()));
        Rule {
            rule_id: id.into(),
            column_id: None,
            check_type: CheckType::ValueNotNull,
            validation_criteria: Requirement::Leaf {
                check_type: CheckType::ValueNotNull,
                params:     LeafParams(map)
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        }
    }

    #[test]
    fn explain_output_is_sorted_alphabetically() {
        let catalog = vec![leaf("Zebra"), leaf("Apple")];
        let graph = resolve(&catalog, None).unwrap();
        let plan = crate::plan::build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        let explained = explain(&plan);
        assert_eq!(explained[0].rule_id, "Apple");
        assert_eq!(explained[1].rule_id, "Zebra");
    }
}
