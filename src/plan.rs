//! Plan builder: applicability marking, forest construction, Kahn's
//! algorithm layering with lexicographic tie-breaking, and per-leaf
//! compilation against the generator registry.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    config::DraftPolicy,
    error::{AppResult, plan_invariant_violation},
    generators,
    graph::ResolvedGraph,
    model::{CheckType, FrozenParams, Logic, Requirement, RuleId, RuleIdVec, RuleStatus}
};

/// What a plan node does when its layer is reached.
pub enum CompiledNode {
    Leaf {
        check_type: CheckType,
        sql:        String
    },
    Composite {
        logic:    Logic,
        children: RuleIdVec
    },
    /// A rule whose own `validation_criteria` is a bare
    /// `model_rule_reference` rather than a composite or leaf.
    Reference {
        referenced: RuleId
    },
    SkippedNonApplicable,
    SkippedDynamic
}

pub struct PlanEntry {
    pub rule_id:      RuleId,
    pub must_satisfy: String,
    pub node:         CompiledNode
}

/// A layered, totally ordered execution plan. Layer order is stable and
/// deterministic: identical catalog input always yields an identical
/// plan.
pub struct Plan {
    pub layers: Vec<Vec<PlanEntry>>
}

impl Plan {
    pub fn total_len(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }
}

fn conjoin(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(format!("({x}) AND ({y})"))
    }
}

/// Computes, for every node, whether it is reached from a root by at least
/// one path along which every node (including itself) individually
/// satisfies its own `applicability_criteria`. Nodes for which this is
/// false are marked `SKIPPED_NON_APPLICABLE`.
fn mark_applicability(graph: &ResolvedGraph, available: &HashSet<String>) -> HashMap<RuleId, bool> {
    let mut in_degree: HashMap<RuleId, usize> = graph.rules.keys().map(|k| (k.clone(), 0)).collect();
    for children in graph.forward.values() {
        for child in children {
            *in_degree.entry(child.clone()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<RuleId> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(k, _)| k.clone())
        .collect();
    let mut remaining = in_degree.clone();
    let mut order = Vec::with_capacity(graph.rules.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        if let Some(children) = graph.forward.get(&node) {
            for child in children {
                if let Some(d) = remaining.get_mut(child) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
    }

    let mut reachable_applicable: HashMap<RuleId, bool> = HashMap::new();
    for node_id in &order {
        let Some(rule) = graph.rules.get(node_id) else {
            continue;
        };
        let own_ok = crate::applicability::is_applicable(rule, available);
        let is_root = !graph.reverse.get(node_id).is_some_and(|parents| !parents.is_empty());
        let via_parent = graph
            .reverse
            .get(node_id)
            .map(|parents| parents.iter().any(|p| reachable_applicable.get(p).copied().unwrap_or(false)))
            .unwrap_or(false);
        reachable_applicable.insert(node_id.clone(), own_ok && (is_root || via_parent));
    }
    reachable_applicable
}

/// Builds the layered execution plan from a resolved dependency graph.
/// `draft_policy` governs whether `Draft`-status rules participate like
/// `Active` ones or are excluded: under [`DraftPolicy::Skip`] (the
/// default) a draft rule is compiled as a no-op node whose predetermined
/// outcome is `SKIPPED_NON_APPLICABLE` — the closed outcome set has no
/// separate "draft" variant, and a rule excluded because its lifecycle
/// status gates it out is, from a report reader's perspective, exactly as
/// not-applicable to this run as one excluded by an applicability token.
pub fn build(
    graph: &ResolvedGraph,
    available_applicability: &HashSet<String>,
    draft_policy: DraftPolicy
) -> AppResult<Plan> {
    let reachable_applicable = mark_applicability(graph, available_applicability);

    // Scheduling in-degree counts each node's *unresolved children* (leaves
    // and sub-composites that still need to run before this node), not the
    // structural "is some composite's child" count `graph.in_degree` holds
    // (that in-degree is defined over the `parent -> child` forward edge
    // itself and answers a different question). A composite must be
    // scheduled only after every child it aggregates has a recorded
    // outcome, so the node that starts at in-degree zero here is a leaf
    // with no children, not a root composite nobody references.
    let mut in_degree: HashMap<RuleId, usize> = graph
        .rules
        .keys()
        .map(|k| (k.clone(), graph.forward.get(k).map_or(0, Vec::len)))
        .collect();

    let mut scheduled: HashSet<RuleId> = HashSet::new();
    let mut layers: Vec<Vec<PlanEntry>> = Vec::new();

    loop {
        let mut ready: Vec<RuleId> = in_degree
            .iter()
            .filter(|(id, &d)| d == 0 && !scheduled.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort();

        let mut layer = Vec::with_capacity(ready.len());
        for rule_id in &ready {
            scheduled.insert(rule_id.clone());
            let Some(rule) = graph.rules.get(rule_id) else {
                continue;
            };

            let node = if rule.is_dynamic {
                CompiledNode::SkippedDynamic
            } else if draft_policy == DraftPolicy::Skip && rule.status == RuleStatus::Draft {
                CompiledNode::SkippedNonApplicable
            } else if !reachable_applicable.get(rule_id).copied().unwrap_or(true) {
                CompiledNode::SkippedNonApplicable
            } else {
                match &rule.validation_criteria {
                    Requirement::And { .. } => CompiledNode::Composite {
                        logic:    Logic::And,
                        children: graph
                            .forward
                            .get(rule_id)
                            .map(|ids| ids.iter().cloned().collect())
                            .unwrap_or_default()
                    },
                    Requirement::Or { .. } => CompiledNode::Composite {
                        logic:    Logic::Or,
                        children: graph
                            .forward
                            .get(rule_id)
                            .map(|ids| ids.iter().cloned().collect())
                            .unwrap_or_default()
                    },
                    Requirement::Ref {
                        rule_id: referenced
                    } => CompiledNode::Reference {
                        referenced: referenced.clone()
                    },
                    Requirement::Leaf {
                        check_type,
                        params
                    } => {
                        let generator = generators::registry().get(check_type).expect(
                            "catalog loader rejects rules whose check_type has no registered generator"
                        );
                        let inherited = conjoin(
                            graph.inherited_from_ancestors.get(rule_id).cloned().flatten(),
                            rule.row_condition.clone()
                        );
                        let frozen = FrozenParams::freeze(params.clone());
                        let sql = generator.generate_sql(&frozen, inherited.as_deref());
                        CompiledNode::Leaf {
                            check_type: *check_type,
                            sql
                        }
                    }
                }
            };

            layer.push(PlanEntry {
                rule_id: rule_id.clone(),
                must_satisfy: rule.must_satisfy.clone(),
                node
            });
        }

        // A node's scheduling in-degree is resolved by its children
        // completing, so finishing `rule_id` only unblocks its *parents*
        // (found via reverse adjacency), not its children.
        for rule_id in &ready {
            if let Some(parents) = graph.reverse.get(rule_id) {
                for parent in parents {
                    if let Some(d) = in_degree.get_mut(parent) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }

        layers.push(layer);
    }

    if scheduled.len() != graph.rules.len() {
        let remaining: Vec<String> = graph
            .rules
            .keys()
            .filter(|id| !scheduled.contains(*id))
            .map(|id| id.to_string())
            .collect();
        return Err(plan_invariant_violation(&remaining));
    }

    Ok(Plan {
        layers
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::resolve, model::{CheckType, LeafParams, Rule, RuleStatus}};

    fn leaf(id: &str) -> Rule {
        Rule {
            rule_id: id.into(),
            column_id: None,
            check_type: CheckType::ValueNotNull,
            validation_criteria: Requirement::Leaf {
                check_type: CheckType::ValueNotNull,
                params:     {
                    let mut map = indexmap::IndexMap::new();
                    map.insert("column".to_string(), crate::model::ParamValue::Str("BilledCost".into()));
                    LeafParams(map)
                }
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        }
    }

    #[test]
    fn single_leaf_plan_has_one_layer() {
        let catalog = vec![leaf("A")];
        let graph = resolve(&catalog, None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        assert_eq!(plan.layers.len(), 1);
        assert_eq!(plan.total_len(), 1);
    }

    #[test]
    fn composite_is_scheduled_after_its_children() {
        let parent = Rule {
            rule_id: "Parent".into(),
            column_id: None,
            check_type: CheckType::CompositeAnd,
            validation_criteria: Requirement::And {
                children: vec![Requirement::Ref {
                    rule_id: "Child".into()
                }]
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let catalog = vec![parent, leaf("Child")];
        let graph = resolve(&catalog, None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        let layer_of = |id: &str| {
            plan.layers
                .iter()
                .position(|l| l.iter().any(|e| e.rule_id == id))
                .unwrap()
        };
        assert!(layer_of("Child") < layer_of("Parent"));
    }

    #[test]
    fn non_applicable_rule_is_skipped() {
        let mut rule = leaf("A");
        rule.applicability_criteria = indexmap::IndexSet::from([compact_str::CompactString::from("NEEDS_X")]);
        let graph = resolve(&[rule], None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        assert!(matches!(plan.layers[0][0].node, CompiledNode::SkippedNonApplicable));
    }

    #[test]
    fn dynamic_rule_is_skipped_without_generating_sql() {
        let mut rule = leaf("A");
        rule.is_dynamic = true;
        let graph = resolve(&[rule], None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        assert!(matches!(plan.layers[0][0].node, CompiledNode::SkippedDynamic));
    }

    #[test]
    fn draft_rule_is_skipped_under_default_policy() {
        let mut rule = leaf("A");
        rule.status = RuleStatus::Draft;
        let graph = resolve(&[rule], None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Skip).unwrap();
        assert!(matches!(plan.layers[0][0].node, CompiledNode::SkippedNonApplicable));
    }

    #[test]
    fn draft_rule_runs_under_include_policy() {
        let mut rule = leaf("A");
        rule.status = RuleStatus::Draft;
        let graph = resolve(&[rule], None).unwrap();
        let plan = build(&graph, &HashSet::new(), crate::config::DraftPolicy::Include).unwrap();
        assert!(matches!(plan.layers[0][0].node, CompiledNode::Leaf { .. }));
    }
}
