//! The outcome state machine and run report.

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::RuleId;

/// The result of evaluating one rule. A rule is never both a
/// catalog-level `Err` and an `Outcome` — by the time a rule reaches
/// execution, the catalog and graph have already accepted it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Pass,
    Fail {
        violation_count:          u64,
        sample_offending_values:  Vec<String>,
        error_message:            String
    },
    SkippedNonApplicable,
    SkippedDynamic,
    /// A reference child (only reference children propagate skips, not
    /// independent sibling leaves) whose parent did not reach a
    /// `Pass`/`Fail` outcome.
    SkippedUpstream {
        reason: String
    },
    /// Execution was cancelled by the run-level deadline before this rule's
    /// layer was reached.
    Aborted
}

impl Outcome {
    pub fn is_terminal_pass_or_fail(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail { .. })
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// Counts of each outcome kind across a report, for summary display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub pass:                 usize,
    pub fail:                 usize,
    pub skipped_non_applicable: usize,
    pub skipped_dynamic:      usize,
    pub skipped_upstream:     usize,
    pub aborted:              usize
}

impl Summary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::Fail { .. } => self.fail += 1,
            Outcome::SkippedNonApplicable => self.skipped_non_applicable += 1,
            Outcome::SkippedDynamic => self.skipped_dynamic += 1,
            Outcome::SkippedUpstream { .. } => self.skipped_upstream += 1,
            Outcome::Aborted => self.aborted += 1
        }
    }
}

/// A full validation run's results, keyed by `rule_id` in plan order. The
/// report contains exactly one outcome per rule in the catalog closure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub by_rule_id: IndexMap<RuleId, Outcome>,
    pub summary:    Summary
}

impl Report {
    pub fn insert(&mut self, rule_id: RuleId, outcome: Outcome) {
        self.summary.record(&outcome);
        self.by_rule_id.insert(rule_id, outcome);
    }

    pub fn get(&self, rule_id: &str) -> Option<&Outcome> {
        self.by_rule_id.get(rule_id)
    }

    /// Iterates `(rule_id, outcome)` pairs in lexicographic `rule_id`
    /// order, independent of execution/layer order. `by_rule_id` itself
    /// keeps insertion (plan/layer) order since that is cheaper to build
    /// and nothing internal depends on its order; external consumers
    /// should use this method rather than iterating the map directly.
    pub fn sorted_iter(&self) -> impl Iterator<Item = (&RuleId, &Outcome)> {
        let mut entries: Vec<(&RuleId, &Outcome)> = self.by_rule_id.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }

    /// `true` if every outcome is `Pass`, `SkippedNonApplicable`, or
    /// `SkippedDynamic` — i.e. nothing actually failed or was aborted.
    pub fn all_clean(&self) -> bool {
        self.summary.fail == 0 && self.summary.aborted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome_kind() {
        let mut report = Report::default();
        report.insert("A".into(), Outcome::Pass);
        report.insert(
            "B".into(),
            Outcome::Fail {
                violation_count:         3,
                sample_offending_values: vec!["x".into()],
                error_message:           "bad".into()
            }
        );
        report.insert("C".into(), Outcome::SkippedNonApplicable);
        assert_eq!(report.summary.pass, 1);
        assert_eq!(report.summary.fail, 1);
        assert_eq!(report.summary.skipped_non_applicable, 1);
        assert!(!report.all_clean());
    }

    #[test]
    fn all_clean_true_when_nothing_failed_or_aborted() {
        let mut report = Report::default();
        report.insert("A".into(), Outcome::Pass);
        report.insert("B".into(), Outcome::SkippedDynamic);
        assert!(report.all_clean());
    }

    #[test]
    fn sorted_iter_is_lexicographic_regardless_of_insertion_order() {
        let mut report = Report::default();
        report.insert("Zebra".into(), Outcome::Pass);
        report.insert("Apple".into(), Outcome::Pass);
        report.insert("Mango".into(), Outcome::Pass);
        let ids: Vec<&str> = report.sorted_iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["Apple", "Mango", "Zebra"]);
    }
}
