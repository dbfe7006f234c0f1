//! Typed entities for the FOCUS rule catalog: rules, validation criteria,
//! composite requirements, applicability predicates, and dependency edges.
//!
//! The composite requirement type is a tagged sum,
//! `Leaf(params) | And(children) | Or(children) | Ref(rule_id)`, replacing
//! the dynamic dictionary dispatch a less strongly typed implementation
//! would reach for: [`Requirement`] is recursive, so a composite's children
//! are themselves `Requirement` values — a nested composite, a reference to
//! another top-level rule, or an inline leaf, the three shapes a composite
//! child can take.

use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Stable textual rule identifier, e.g. `BilledCost-C-005-C`.
pub type RuleId = CompactString;

/// A composite's child-id list. Most composites combine a handful of
/// checks, so this stays inline rather than allocating on the heap for
/// the common case.
pub type RuleIdVec = smallvec::SmallVec<[RuleId; 8]>;

/// The closed set of check kinds the registry can dispatch on. Leaf kinds
/// each have exactly one generator; `CompositeAnd`, `CompositeOr`, and
/// `ModelRuleReference` are structural and never reach the generator
/// registry directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    ColumnRequired,
    ColumnAllowed,
    TypeString,
    TypeDecimal,
    TypeDatetime,
    TypeBoolean,
    FormatDatetime,
    AllowedValues,
    ValueIn,
    ValueNotNull,
    RegexMatch,
    DimensionValues,
    ColumnImmutableMetadata,
    NumericNonNegative,
    SqlQuery,
    CompositeAnd,
    CompositeOr,
    ModelRuleReference
}

impl CheckType {
    /// `true` for the structural kinds that never reach the generator
    /// registry (composites and references are resolved by the graph, not
    /// compiled to SQL directly).
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::CompositeAnd | Self::CompositeOr | Self::ModelRuleReference
        )
    }

    pub fn logic(self) -> Option<Logic> {
        match self {
            Self::CompositeAnd => Some(Logic::And),
            Self::CompositeOr => Some(Logic::Or),
            _ => None
        }
    }
}

/// A single leaf-check parameter value. The catalog JSON carries
/// heterogeneous parameter shapes (a column name, a format string, a list
/// of allowed values, a numeric threshold) so the value is a small closed
/// union rather than a single scalar type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>)
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None
        }
    }
}

/// Parameters for one leaf check, keyed by parameter name. Iteration order
/// follows JSON source order (`IndexMap`), which matters nowhere
/// functionally but keeps `explain()` output stable byte-for-byte.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeafParams(pub indexmap::IndexMap<String, ParamValue>);

impl LeafParams {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Validates that every key in `required` is present, returning the
    /// first missing key as an error-friendly `Err`.
    pub fn require_keys<'a>(&self, required: &'a [&'a str]) -> Result<(), &'a str> {
        for key in required {
            if !self.0.contains_key(*key) {
                return Err(key);
            }
        }
        Ok(())
    }

    pub fn with_default(&mut self, key: &str, value: ParamValue) {
        self.0.entry(key.to_string()).or_insert(value);
    }
}

/// An immutable, shared view over a leaf's parameters, passed to
/// `generate_sql`. Cloning a `FrozenParams` is an `Arc` bump: once frozen,
/// nothing can mutate the underlying map.
#[derive(Debug, Clone)]
pub struct FrozenParams(Arc<LeafParams>);

impl FrozenParams {
    pub fn freeze(params: LeafParams) -> Self {
        Self(Arc::new(params))
    }
}

impl std::ops::Deref for FrozenParams {
    type Target = LeafParams;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Combinator for a composite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or
}

/// A tagged composite/leaf/reference requirement. `Rule::validation_criteria`
/// is one `Requirement`; composite children are themselves `Requirement`
/// values, so nesting is expressed directly by the type rather than by a
/// side table of indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// A concrete predicate: `check_type` selects the generator,
    /// `params` are its arguments.
    Leaf {
        check_type: CheckType,
        #[serde(default)]
        params:     LeafParams
    },
    And {
        children: Vec<Requirement>
    },
    Or {
        children: Vec<Requirement>
    },
    /// References another rule by id rather than inlining its definition.
    Ref {
        rule_id: RuleId
    }
}

impl Requirement {
    pub fn logic(&self) -> Option<Logic> {
        match self {
            Self::And { .. } => Some(Logic::And),
            Self::Or { .. } => Some(Logic::Or),
            _ => None
        }
    }
}

/// Lifecycle status of a rule. Draft rules are loaded but, under the
/// default [`crate::config::DraftPolicy`], excluded from the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    Draft
}

/// A single FOCUS validation rule, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: RuleId,
    #[serde(default)]
    pub column_id: Option<CompactString>,
    pub check_type: CheckType,
    pub validation_criteria: Requirement,
    /// Dataset-global applicability tokens this rule requires.
    #[serde(default)]
    pub applicability_criteria: IndexSet<CompactString>,
    /// Row-level SQL predicate restricting which rows this rule applies
    /// to, before any inherited condition is conjoined.
    #[serde(default)]
    pub row_condition: Option<String>,
    pub must_satisfy: String,
    #[serde(default)]
    pub status: RuleStatus,
    /// When `true`, the rule requires inspecting data content to decide
    /// applicability and cannot be statically compiled; it always yields
    /// `SKIPPED_DYNAMIC`.
    #[serde(default)]
    pub is_dynamic: bool
}

impl Rule {
    pub fn is_composite(&self) -> bool {
        matches!(
            self.validation_criteria,
            Requirement::And { .. } | Requirement::Or { .. }
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.validation_criteria, Requirement::Ref { .. })
    }
}

/// The directed-edge kind in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    CompositeChild,
    ModelRuleReference
}

/// A directed `parent -> child` dependency edge. `logic` is `Some` only
/// for `CompositeChild` edges; `inherited_condition` is the row-level SQL
/// fragment propagated down from ancestor AND-composites, already
/// conjoined with every condition on the path.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub parent: RuleId,
    pub child: RuleId,
    pub kind: EdgeKind,
    pub logic: Option<Logic>,
    pub inherited_condition: Option<String>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_params_detects_missing_required_key() {
        let mut map = indexmap::IndexMap::new();
        map.insert("column".to_string(), ParamValue::Str("BilledCost".into()));
        let params = LeafParams(map);
        assert!(params.require_keys(&["column"]).is_ok());
        assert_eq!(params.require_keys(&["format"]), Err("format"));
    }

    #[test]
    fn requirement_logic_matches_variant() {
        let and = Requirement::And {
            children: vec![]
        };
        assert_eq!(and.logic(), Some(Logic::And));
        let leaf = Requirement::Leaf {
            check_type: CheckType::TypeString,
            params:     LeafParams::default()
        };
        assert_eq!(leaf.logic(), None);
    }

    #[test]
    fn check_type_structural_flags() {
        assert!(CheckType::CompositeAnd.is_structural());
        assert!(CheckType::ModelRuleReference.is_structural());
        assert!(!CheckType::TypeString.is_structural());
    }
}
