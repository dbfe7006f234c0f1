//! Dependency resolver: builds the forward/reverse adjacency and
//! in-degree maps over a rule catalog, propagates composite row
//! conditions, and detects cycles via Tarjan's strongly connected
//! components.
//!
//! The graph owns its nodes by `rule_id` key; edges hold `rule_id` strings,
//! never node pointers, so there is no possibility of cyclic Rust
//! ownership even when the *logical* rule graph itself contains a cycle —
//! that is reported as a catalog error, not a memory safety hazard.
//!
//! Composite children that are inline (a nested `And`/`Or`, or an inline
//! leaf embedded directly in a `children` array rather than a
//! `model_rule_reference`) do not carry their own catalog `rule_id`. To
//! keep every node in the resolved graph addressable by a stable id (the
//! report is indexed by `rule_id`), such a child is assigned a
//! deterministic synthetic id `"{parent_rule_id}::child{index}"` and
//! promoted to a full graph node. See `DESIGN.md` for the reasoning
//! behind this choice.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::{
    error::{AppResult, cycle_detected, dangling_reference},
    model::{DependencyEdge, EdgeKind, Logic, Requirement, Rule, RuleId, RuleStatus}
};

/// The resolved dependency graph over a rule catalog's closure.
pub struct ResolvedGraph {
    /// Every rule reachable from the seed set, including synthesized
    /// inline-child nodes, keyed in discovery order.
    pub rules: IndexMap<RuleId, Rule>,
    /// `rule_id -> ordered list of child rule_id`.
    pub forward: IndexMap<RuleId, Vec<RuleId>>,
    /// `rule_id -> ordered list of parent rule_id`, ordered by insertion
    /// for determinism.
    pub reverse: IndexMap<RuleId, Vec<RuleId>>,
    /// Structural in-degree over the `parent -> child` forward edge
    /// itself: how many composite/reference edges point *into* this
    /// node. Exposed for diagnostics/explain use; the plan builder's own
    /// Kahn layering computes a different, execution-order in-degree from
    /// `forward`/`reverse` directly (a node's children must finish before
    /// the node itself, the reverse of this field's direction) rather than
    /// reusing this one.
    pub in_degree: IndexMap<RuleId, usize>,
    pub edges: Vec<DependencyEdge>,
    /// The condition inherited from ancestors only — does not include a
    /// node's own `row_condition`. The plan builder conjoins this with the
    /// node's own `row_condition` to get the final compiled condition.
    pub inherited_from_ancestors: HashMap<RuleId, Option<String>>
}

impl ResolvedGraph {
    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.get(rule_id)
    }
}

fn synthetic_child_id(parent: &RuleId, index: usize) -> RuleId {
    format!("{parent}::child{index}").into()
}

fn synthesize_rule(id: RuleId, parent: &Rule, requirement: Requirement) -> Rule {
    let check_type = match &requirement {
        Requirement::Leaf {
            check_type, ..
        } => *check_type,
        Requirement::And { .. } => crate::model::CheckType::CompositeAnd,
        Requirement::Or { .. } => crate::model::CheckType::CompositeOr,
        Requirement::Ref { .. } => crate::model::CheckType::ModelRuleReference
    };
    Rule {
        rule_id: id,
        column_id: parent.column_id.clone(),
        check_type,
        validation_criteria: requirement,
        applicability_criteria: Default::default(),
        row_condition: None,
        must_satisfy: parent.must_satisfy.clone(),
        status: RuleStatus::Active,
        is_dynamic: false
    }
}

/// Resolves the dependency graph rooted at every rule whose `rule_id`
/// starts with `target_prefix` (or every rule, if `None`) over the given
/// catalog.
pub fn resolve(catalog: &[Rule], target_prefix: Option<&str>) -> AppResult<ResolvedGraph> {
    let by_id: HashMap<&str, &Rule> = catalog.iter().map(|r| (r.rule_id.as_str(), r)).collect();

    let seed: Vec<RuleId> = catalog
        .iter()
        .filter(|r| match target_prefix {
            Some(prefix) => r.rule_id.starts_with(prefix),
            None => true
        })
        .map(|r| r.rule_id.clone())
        .collect();

    let mut rules: IndexMap<RuleId, Rule> = IndexMap::new();
    let mut forward: IndexMap<RuleId, Vec<RuleId>> = IndexMap::new();
    let mut reverse: IndexMap<RuleId, Vec<RuleId>> = IndexMap::new();
    let mut in_degree: IndexMap<RuleId, usize> = IndexMap::new();
    let mut edges: Vec<DependencyEdge> = Vec::new();

    let mut queue: VecDeque<RuleId> = VecDeque::new();
    let mut visited: HashSet<RuleId> = HashSet::new();

    for id in &seed {
        if visited.insert(id.clone()) {
            queue.push_back(id.clone());
        }
    }

    while let Some(id) = queue.pop_front() {
        let rule = if let Some(existing) = rules.get(&id) {
            existing.clone()
        } else if let Some(found) = by_id.get(id.as_str()) {
            let r = (*found).clone();
            rules.insert(id.clone(), r.clone());
            r
        } else {
            continue;
        };

        forward.entry(id.clone()).or_default();
        in_degree.entry(id.clone()).or_insert(0);

        match &rule.validation_criteria {
            Requirement::And {
                children
            }
            | Requirement::Or {
                children
            } => {
                let logic = rule.validation_criteria.logic().expect("and/or has logic");
                for (index, child) in children.iter().enumerate() {
                    let (child_id, newly_synthesized) = match child {
                        Requirement::Ref {
                            rule_id
                        } => {
                            if !by_id.contains_key(rule_id.as_str()) {
                                return Err(dangling_reference(&id, rule_id));
                            }
                            (rule_id.clone(), None)
                        }
                        other => {
                            let synthetic_id = synthetic_child_id(&id, index);
                            (synthetic_id.clone(), Some(synthesize_rule(synthetic_id, &rule, other.clone())))
                        }
                    };

                    if let Some(synthetic_rule) = newly_synthesized {
                        rules.entry(child_id.clone()).or_insert(synthetic_rule);
                    }
                    if visited.insert(child_id.clone()) {
                        queue.push_back(child_id.clone());
                    }

                    forward.entry(id.clone()).or_default().push(child_id.clone());
                    reverse.entry(child_id.clone()).or_default().push(id.clone());
                    *in_degree.entry(child_id.clone()).or_insert(0) += 1;
                    in_degree.entry(id.clone()).or_insert(0);

                    edges.push(DependencyEdge {
                        parent: id.clone(),
                        child: child_id,
                        kind: EdgeKind::CompositeChild,
                        logic: Some(logic),
                        inherited_condition: None
                    });
                }
            }
            Requirement::Ref {
                rule_id
            } => {
                if !by_id.contains_key(rule_id.as_str()) {
                    return Err(dangling_reference(&id, rule_id));
                }
                let child_id = rule_id.clone();
                if visited.insert(child_id.clone()) {
                    queue.push_back(child_id.clone());
                }
                forward.entry(id.clone()).or_default().push(child_id.clone());
                reverse.entry(child_id.clone()).or_default().push(id.clone());
                *in_degree.entry(child_id.clone()).or_insert(0) += 1;
                in_degree.entry(id.clone()).or_insert(0);

                edges.push(DependencyEdge {
                    parent: id.clone(),
                    child: child_id,
                    kind: EdgeKind::ModelRuleReference,
                    logic: None,
                    inherited_condition: None
                });
            }
            Requirement::Leaf {
                ..
            } => {}
        }
    }

    detect_cycles(&rules, &forward)?;

    let inherited_from_ancestors = propagate_composite_conditions(&rules, &forward, &edges);

    Ok(ResolvedGraph {
        rules,
        forward,
        reverse,
        in_degree,
        edges,
        inherited_from_ancestors
    })
}

fn edge_propagates(edge: &DependencyEdge) -> bool {
    match edge.kind {
        EdgeKind::ModelRuleReference => true,
        EdgeKind::CompositeChild => edge.logic == Some(Logic::And)
    }
}

fn conjoin_opt(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(format!("({x}) AND ({y})"))
    }
}

/// Conjoins the transitive AND of every ancestor path that reached a node
/// through AND-composites or reference edges. OR-composites are a
/// propagation boundary: a condition above an
/// OR still propagates into it, but does not cross from one OR branch into
/// another, since each branch is its own edge and only `And`-logic /
/// reference edges are marked as propagating.
fn propagate_composite_conditions(
    rules: &IndexMap<RuleId, Rule>,
    forward: &IndexMap<RuleId, Vec<RuleId>>,
    edges: &[DependencyEdge]
) -> HashMap<RuleId, Option<String>> {
    let mut edges_from: HashMap<&RuleId, Vec<&DependencyEdge>> = HashMap::new();
    for edge in edges {
        edges_from.entry(&edge.parent).or_default().push(edge);
    }

    let mut in_degree: HashMap<RuleId, usize> = rules.keys().map(|k| (k.clone(), 0)).collect();
    for children in forward.values() {
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
    let mut order = Vec::with_capacity(rules.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        if let Some(children) = forward.get(&node) {
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

    let mut accumulated: HashMap<RuleId, Option<String>> = HashMap::new();
    let mut result: HashMap<RuleId, Option<String>> = HashMap::new();

    for node_id in &order {
        let inherited_in = accumulated.get(node_id).cloned().unwrap_or(None);
        result.insert(node_id.clone(), inherited_in.clone());

        let Some(rule) = rules.get(node_id) else {
            continue;
        };
        let push_value = conjoin_opt(inherited_in, rule.row_condition.clone());

        if let Some(out_edges) = edges_from.get(node_id) {
            for edge in out_edges {
                if edge_propagates(edge) {
                    let entry = accumulated.entry(edge.child.clone()).or_insert(None);
                    *entry = conjoin_opt(entry.take(), push_value.clone());
                }
            }
        }
    }

    result
}

/// Tarjan's strongly connected components. Any SCC of size > 1, or any
/// self-loop, is a cycle. On detection, returns a catalog error naming a
/// concrete shortest cycle found by DFS path tracking from one of the
/// offending nodes.
fn detect_cycles(rules: &IndexMap<RuleId, Rule>, forward: &IndexMap<RuleId, Vec<RuleId>>) -> AppResult<()> {
    struct Tarjan<'a> {
        forward: &'a IndexMap<RuleId, Vec<RuleId>>,
        index_counter: usize,
        indices: HashMap<RuleId, usize>,
        lowlink: HashMap<RuleId, usize>,
        on_stack: HashSet<RuleId>,
        stack: Vec<RuleId>,
        sccs: Vec<Vec<RuleId>>
    }

    impl<'a> Tarjan<'a> {
        fn strongconnect(&mut self, v: &RuleId) {
            self.indices.insert(v.clone(), self.index_counter);
            self.lowlink.insert(v.clone(), self.index_counter);
            self.index_counter += 1;
            self.stack.push(v.clone());
            self.on_stack.insert(v.clone());

            if let Some(children) = self.forward.get(v) {
                for w in children.clone() {
                    if !self.indices.contains_key(&w) {
                        self.strongconnect(&w);
                        let w_low = self.lowlink[&w];
                        let v_low = self.lowlink[v];
                        self.lowlink.insert(v.clone(), v_low.min(w_low));
                    } else if self.on_stack.contains(&w) {
                        let w_idx = self.indices[&w];
                        let v_low = self.lowlink[v];
                        self.lowlink.insert(v.clone(), v_low.min(w_idx));
                    }
                }
            }

            if self.lowlink[v] == self.indices[v] {
                let mut component = Vec::new();
                loop {
                    let w = self.stack.pop().expect("stack non-empty while unwinding scc");
                    self.on_stack.remove(&w);
                    let is_v = w == *v;
                    component.push(w);
                    if is_v {
                        break;
                    }
                }
                self.sccs.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        forward,
        index_counter: 0,
        indices: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        sccs: Vec::new()
    };

    for node in rules.keys() {
        if !tarjan.indices.contains_key(node) {
            tarjan.strongconnect(node);
        }
    }

    for component in &tarjan.sccs {
        let is_self_loop = component.len() == 1
            && forward
                .get(&component[0])
                .is_some_and(|children| children.contains(&component[0]));
        if component.len() > 1 || is_self_loop {
            let cycle = shortest_cycle(forward, &component[0]);
            return Err(cycle_detected(&cycle));
        }
    }

    Ok(())
}

/// DFS with path tracking to find a concrete shortest cycle starting from
/// `start`, for diagnostics.
fn shortest_cycle(forward: &IndexMap<RuleId, Vec<RuleId>>, start: &RuleId) -> Vec<String> {
    let mut best: Option<Vec<String>> = None;
    let mut path = vec![start.clone()];
    let mut on_path: HashSet<RuleId> = HashSet::from([start.clone()]);
    dfs_cycle(forward, start, start, &mut path, &mut on_path, &mut best);
    best.unwrap_or_else(|| vec![start.to_string(), start.to_string()])
}

fn dfs_cycle(
    forward: &IndexMap<RuleId, Vec<RuleId>>,
    start: &RuleId,
    current: &RuleId,
    path: &mut Vec<RuleId>,
    on_path: &mut HashSet<RuleId>,
    best: &mut Option<Vec<String>>
) {
    let Some(children) = forward.get(current) else {
        return;
    };
    for child in children {
        if child == start {
            let mut cycle: Vec<String> = path.iter().map(|r| r.to_string()).collect();
            cycle.push(start.to_string());
            if best.as_ref().is_none_or(|b| cycle.len() < b.len()) {
                *best = Some(cycle);
            }
            continue;
        }
        if on_path.contains(child) {
            continue;
        }
        if best.as_ref().is_some_and(|b| path.len() + 1 >= b.len()) {
            continue;
        }
        path.push(child.clone());
        on_path.insert(child.clone());
        dfs_cycle(forward, start, child, path, on_path, best);
        on_path.remove(child);
        path.pop();
    }
}

/// Renders the resolved graph as a Graphviz DOT document, for diagnostics
/// when a cycle (or any other structural issue) needs visualizing. Offline
/// and pure — never touches the query engine.
pub fn to_dot(graph: &ResolvedGraph) -> String {
    let mut out = String::from("digraph rules {\n");
    for (parent, children) in &graph.forward {
        for child in children {
            out.push_str(&format!("  \"{parent}\" -> \"{child}\";\n"));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckType, LeafParams};

    fn leaf_rule(id: &str, row_condition: Option<&str>) -> Rule {
        Rule {
            rule_id: id.into(),
            column_id: None,
            check_type: CheckType::ValueNotNull,
            validation_criteria: Requirement::Leaf {
                check_type: CheckType::ValueNotNull,
                params:     LeafParams::default()
            },
            applicability_criteria: Default::default(),
            row_condition: row_condition.map(str::to_owned),
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        }
    }

    #[test]
    fn resolves_composite_and_with_reference_children() {
        let parent = Rule {
            rule_id: "Parent".into(),
            column_id: None,
            check_type: CheckType::CompositeAnd,
            validation_criteria: Requirement::And {
                children: vec![
                    Requirement::Ref {
                        rule_id: "Child-A".into()
                    },
                    Requirement::Ref {
                        rule_id: "Child-B".into()
                    },
                ]
            },
            applicability_criteria: Default::default(),
            row_condition: Some("BilledCurrency IS NOT NULL".into()),
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let catalog = vec![parent, leaf_rule("Child-A", None), leaf_rule("Child-B", None)];
        let graph = resolve(&catalog, None).unwrap();
        assert_eq!(graph.rules.len(), 3);
        assert_eq!(
            graph.inherited_from_ancestors.get("Child-A").cloned().flatten(),
            Some("BilledCurrency IS NOT NULL".to_string())
        );
    }

    #[test]
    fn or_composite_does_not_propagate_into_children() {
        let parent = Rule {
            rule_id: "Parent".into(),
            column_id: None,
            check_type: CheckType::CompositeOr,
            validation_criteria: Requirement::Or {
                children: vec![Requirement::Ref {
                    rule_id: "Child-A".into()
                }]
            },
            applicability_criteria: Default::default(),
            row_condition: Some("Should not propagate".into()),
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let catalog = vec![parent, leaf_rule("Child-A", None)];
        let graph = resolve(&catalog, None).unwrap();
        assert_eq!(graph.inherited_from_ancestors.get("Child-A").cloned().flatten(), None);
    }

    #[test]
    fn detects_self_loop() {
        let rule = Rule {
            rule_id: "A".into(),
            column_id: None,
            check_type: CheckType::ModelRuleReference,
            validation_criteria: Requirement::Ref {
                rule_id: "A".into()
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let err = resolve(&[rule], None).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn detects_two_node_cycle() {
        let a = Rule {
            rule_id: "A".into(),
            column_id: None,
            check_type: CheckType::ModelRuleReference,
            validation_criteria: Requirement::Ref {
                rule_id: "B".into()
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let b = Rule {
            rule_id: "B".into(),
            column_id: None,
            check_type: CheckType::ModelRuleReference,
            validation_criteria: Requirement::Ref {
                rule_id: "A".into()
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let err = resolve(&[a, b], None).unwrap_err();
        assert!(err.to_string().contains('A'));
        assert!(err.to_string().contains('B'));
    }

    #[test]
    fn rejects_dangling_reference() {
        let rule = Rule {
            rule_id: "A".into(),
            column_id: None,
            check_type: CheckType::CompositeAnd,
            validation_criteria: Requirement::And {
                children: vec![Requirement::Ref {
                    rule_id: "Ghost".into()
                }]
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let err = resolve(&[rule], None).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn inline_leaf_children_get_synthetic_ids() {
        let parent = Rule {
            rule_id: "Parent".into(),
            column_id: None,
            check_type: CheckType::CompositeAnd,
            validation_criteria: Requirement::And {
                children: vec![Requirement::Leaf {
                    check_type: CheckType::ValueNotNull,
                    params:     LeafParams::default()
                }]
            },
            applicability_criteria: Default::default(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        };
        let graph = resolve(&[parent], None).unwrap();
        assert!(graph.rules.contains_key("Parent::child0"));
    }
}
