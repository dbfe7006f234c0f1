//! Applicability evaluation: does the dataset being validated satisfy the
//! tokens a rule declares it needs?
//!
//! A rule's `applicability_criteria` is a set of dataset-global tokens
//! (e.g. `AVAILABILITY_ZONE_SUPPORTED`) supplied once per run via
//! [`crate::config::RulesSelectionConfig::applicability`], not derived by
//! inspecting the data itself — that distinguishes a statically
//! `SkippedNonApplicable` rule from a `SkippedDynamic` one.

use std::collections::HashSet;

use crate::model::Rule;

/// `true` if every token `rule` requires is present in `available`. A rule
/// with no `applicability_criteria` is always applicable.
pub fn is_applicable(rule: &Rule, available: &HashSet<String>) -> bool {
    rule.applicability_criteria
        .iter()
        .all(|token| available.contains(token.as_str()))
}

#[cfg(test)]
mod tests {
    use compact_str::CompactString;
    use indexmap::IndexSet;

    use super::*;
    use crate::model::{CheckType, LeafParams, Requirement, RuleStatus};

    fn rule_with_criteria(tokens: &[&str]) -> Rule {
        Rule {
            rule_id: "R".into(),
            column_id: None,
            check_type: CheckType::ValueNotNull,
            validation_criteria: Requirement::Leaf {
                check_type: CheckType::ValueNotNull,
                params:     LeafParams::default()
            },
            applicability_criteria: tokens.iter().map(|t| CompactString::from(*t)).collect::<IndexSet<_>>(),
            row_condition: None,
            must_satisfy: "n/a".into(),
            status: RuleStatus::Active,
            is_dynamic: false
        }
    }

    #[test]
    fn rule_with_no_criteria_is_always_applicable() {
        let rule = rule_with_criteria(&[]);
        assert!(is_applicable(&rule, &HashSet::new()));
    }

    #[test]
    fn rule_is_applicable_only_when_every_token_present() {
        let rule = rule_with_criteria(&["A", "B"]);
        let mut available = HashSet::new();
        available.insert("A".to_string());
        assert!(!is_applicable(&rule, &available));
        available.insert("B".to_string());
        assert!(is_applicable(&rule, &available));
    }
}
