//! Execution engine: runs a plan layer by layer against a loaded table,
//! aggregates composite outcomes, classifies query-engine errors, and
//! honors a run-level deadline.

use std::time::Instant;

use rayon::prelude::*;

use crate::{
    config::EngineConfig,
    diagnostics,
    error::AppResult,
    model::{Logic, RuleId},
    plan::{CompiledNode, Plan, PlanEntry},
    result::{Outcome, Report},
    table::TableHandle
};

/// Runs `plan` against `table`, honoring `config`'s parallelism and
/// deadline knobs.
///
/// Returns `Ok(report)` for every run that completes or is cleanly
/// cancelled by its deadline — cancellation produces `ABORTED` outcomes
/// for unscheduled rules, it is not an `Err`. An `Err` is returned only
/// for an unclassified query-engine failure (engine errors abort the
/// run), and the partial report built so far is
/// discarded by the caller along with it — callers that want the partial
/// report on a fatal engine error should catch it at the layer boundary
/// themselves.
pub fn run(plan: &Plan, table: &TableHandle, config: &EngineConfig) -> AppResult<Report> {
    run_with_progress(plan, table, config, |_completed| {})
}

/// Same as [`run`], but invokes `on_layer` with the number of entries just
/// completed after each layer finishes (including aborted/cancelled
/// layers), so a caller can drive a progress indicator.
pub fn run_with_progress(
    plan: &Plan,
    table: &TableHandle,
    config: &EngineConfig,
    mut on_layer: impl FnMut(usize)
) -> AppResult<Report> {
    let mut report = Report::default();
    let deadline = config.deadline().map(|d| Instant::now() + d);
    let mut cancelled = false;

    for layer in &plan.layers {
        if !cancelled {
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    cancelled = true;
                }
            }
        }

        if cancelled {
            for entry in layer {
                report.insert(entry.rule_id.clone(), Outcome::Aborted);
            }
            on_layer(layer.len());
            continue;
        }

        let outcomes: Vec<(RuleId, AppResult<Outcome>)> = if config.parallelism > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.parallelism)
                .build()
                .map_err(|e| crate::error::engine_error("<layer>", e))?;
            pool.install(|| {
                layer
                    .par_iter()
                    .map(|entry| (entry.rule_id.clone(), evaluate_entry(entry, table, &report)))
                    .collect()
            })
        } else {
            layer
                .iter()
                .map(|entry| (entry.rule_id.clone(), evaluate_entry(entry, table, &report)))
                .collect()
        };

        for (rule_id, outcome) in outcomes {
            report.insert(rule_id, outcome?);
        }
        on_layer(layer.len());
    }

    Ok(report)
}

fn evaluate_entry(entry: &PlanEntry, table: &TableHandle, report: &Report) -> AppResult<Outcome> {
    match &entry.node {
        CompiledNode::SkippedNonApplicable => Ok(Outcome::SkippedNonApplicable),
        CompiledNode::SkippedDynamic => Ok(Outcome::SkippedDynamic),
        CompiledNode::Leaf {
            sql, ..
        } => run_leaf(&entry.rule_id, sql, &entry.must_satisfy, table),
        CompiledNode::Reference {
            referenced
        } => Ok(mirror_reference(referenced, report)),
        CompiledNode::Composite {
            logic,
            children
        } => Ok(aggregate_composite(*logic, children, report))
    }
}

fn run_leaf(rule_id: &str, sql: &str, must_satisfy: &str, table: &TableHandle) -> AppResult<Outcome> {
    match table.run_check(rule_id, sql) {
        Ok(result) if result.violations == 0 => Ok(Outcome::Pass),
        Ok(result) => Ok(Outcome::Fail {
            violation_count:         result.violations,
            sample_offending_values: Vec::new(),
            error_message:           result.error_message.unwrap_or_else(|| must_satisfy.to_string())
        }),
        Err(err) => {
            let message = err.to_string();
            let missing = diagnostics::extract_missing_columns(&message);
            if missing.is_empty() {
                Err(crate::error::engine_error(rule_id, message))
            } else {
                Ok(Outcome::Fail {
                    violation_count:         1,
                    sample_offending_values: Vec::new(),
                    error_message:           format!("missing column(s): {}", missing.join(", "))
                })
            }
        }
    }
}

/// A reference (alias) rule mirrors its target's outcome when the target
/// reached a terminal `PASS`/`FAIL`; otherwise it is `SKIPPED_UPSTREAM`,
/// citing the target. Reference children follow their upstream;
/// independent sibling leaves do not.
fn mirror_reference(referenced: &str, report: &Report) -> Outcome {
    match report.get(referenced) {
        Some(outcome) if outcome.is_terminal_pass_or_fail() => outcome.clone(),
        Some(_) => Outcome::SkippedUpstream {
            reason: format!("referenced rule '{referenced}' did not reach PASS/FAIL")
        },
        None => Outcome::SkippedUpstream {
            reason: format!("referenced rule '{referenced}' has no recorded outcome")
        }
    }
}

/// Aggregates a composite's children outcomes.
/// `SKIPPED_NON_APPLICABLE`/`SKIPPED_DYNAMIC`/`SKIPPED_UPSTREAM`/`ABORTED`
/// children never count as `FAIL` for either combinator.
fn aggregate_composite(logic: Logic, children: &[RuleId], report: &Report) -> Outcome {
    let child_outcomes: Vec<&Outcome> = children.iter().filter_map(|c| report.get(c)).collect();
    match logic {
        Logic::And => {
            if child_outcomes.iter().any(|o| o.is_fail()) {
                Outcome::Fail {
                    violation_count:         child_outcomes.iter().filter(|o| o.is_fail()).count() as u64,
                    sample_offending_values: Vec::new(),
                    error_message:           "one or more AND-composite children failed".to_string()
                }
            } else {
                Outcome::Pass
            }
        }
        Logic::Or => {
            if child_outcomes.iter().any(|o| o.is_pass()) {
                Outcome::Pass
            } else if child_outcomes.iter().any(|o| o.is_fail()) {
                Outcome::Fail {
                    violation_count:         child_outcomes.iter().filter(|o| o.is_fail()).count() as u64,
                    sample_offending_values: Vec::new(),
                    error_message:           "no OR-composite child passed".to_string()
                }
            } else {
                Outcome::SkippedNonApplicable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(entries: &[(&str, Outcome)]) -> Report {
        let mut report = Report::default();
        for (id, outcome) in entries {
            report.insert((*id).into(), outcome.clone());
        }
        report
    }

    #[test]
    fn and_composite_fails_if_any_child_fails() {
        let report = report_with(&[
            ("A", Outcome::Pass),
            (
                "B",
                Outcome::Fail {
                    violation_count:         1,
                    sample_offending_values: vec![],
                    error_message:           "bad".into()
                }
            ),
        ]);
        let ids: Vec<RuleId> = vec!["A".into(), "B".into()];
        assert!(aggregate_composite(Logic::And, &ids, &report).is_fail());
    }

    #[test]
    fn and_composite_passes_when_skipped_children_are_not_counted_as_fail() {
        let report = report_with(&[("A", Outcome::Pass), ("B", Outcome::SkippedNonApplicable)]);
        let ids: Vec<RuleId> = vec!["A".into(), "B".into()];
        assert!(aggregate_composite(Logic::And, &ids, &report).is_pass());
    }

    #[test]
    fn or_composite_passes_if_any_child_passes() {
        let report = report_with(&[
            (
                "A",
                Outcome::Fail {
                    violation_count:         1,
                    sample_offending_values: vec![],
                    error_message:           "bad".into()
                }
            ),
            ("B", Outcome::Pass),
        ]);
        let ids: Vec<RuleId> = vec!["A".into(), "B".into()];
        assert!(aggregate_composite(Logic::Or, &ids, &report).is_pass());
    }

    #[test]
    fn reference_mirrors_terminal_outcome() {
        let report = report_with(&[("Target", Outcome::Pass)]);
        assert_eq!(mirror_reference("Target", &report), Outcome::Pass);
    }

    #[test]
    fn reference_is_skipped_upstream_when_target_not_terminal() {
        let report = report_with(&[("Target", Outcome::SkippedNonApplicable)]);
        assert!(matches!(mirror_reference("Target", &report), Outcome::SkippedUpstream { .. }));
    }
}
