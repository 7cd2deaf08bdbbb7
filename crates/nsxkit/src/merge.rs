//! Criteria merge.
//!
//! Folds remote rule keys and comparators onto the desired membership. The
//! desired side decides the shape (sets, rules, operators); the remote side
//! decides `key` and `comparator` of every rule it can pair by value.

use crate::types::{CriteriaSet, Criterion, DynamicMembership};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How desired rules are paired with remote ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Pair sets by index, then rules by value inside the paired set.
    #[default]
    Positional,
    /// Pair each rule with the first remote rule of equal value in any set.
    ByValue,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::ByValue => write!(f, "by_value"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positional" => Ok(Self::Positional),
            "by_value" => Ok(Self::ByValue),
            other => Err(crate::error::Error::validation(
                "merge_strategy",
                format!("{:?} must be \"positional\" or \"by_value\"", other),
            )),
        }
    }
}

/// Merge `remote` onto the `desired` skeleton.
///
/// Unpaired desired sets and rules come back untouched; surplus remote sets
/// are ignored.
#[must_use]
pub fn merge_criteria(
    desired: &DynamicMembership,
    remote: &DynamicMembership,
    strategy: MergeStrategy,
) -> DynamicMembership {
    let sets = desired
        .sets
        .iter()
        .enumerate()
        .map(|(i, set)| {
            let candidates: Vec<&Criterion> = match strategy {
                MergeStrategy::Positional => remote
                    .sets
                    .get(i)
                    .map(|r| r.criteria.iter().collect())
                    .unwrap_or_default(),
                MergeStrategy::ByValue => remote.sets.iter().flat_map(|r| &r.criteria).collect(),
            };
            merge_set(set, &candidates)
        })
        .collect();
    DynamicMembership { sets }
}

fn merge_set(set: &CriteriaSet, candidates: &[&Criterion]) -> CriteriaSet {
    let criteria = set
        .criteria
        .iter()
        .map(|rule| match candidates.iter().find(|c| c.value == rule.value) {
            Some(remote) => Criterion {
                key: remote.key.clone(),
                value: rule.value.clone(),
                comparator: remote.comparator.clone(),
            },
            None => rule.clone(),
        })
        .collect();
    CriteriaSet {
        operator: set.operator,
        rules_operator: set.rules_operator,
        criteria,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Comparator, MatchKey, Operator};

    fn set(operator: Operator, criteria: Vec<Criterion>) -> CriteriaSet {
        CriteriaSet {
            operator,
            rules_operator: operator,
            criteria,
        }
    }

    #[test]
    fn test_positional_merge_copies_key_and_comparator() {
        let desired = DynamicMembership::new(vec![set(
            Operator::And,
            vec![Criterion::new(MatchKey::VmName, "v1", Comparator::Equals)],
        )]);
        let remote = DynamicMembership::new(vec![set(
            Operator::Or,
            vec![Criterion::new(
                MatchKey::SecurityTag,
                "v1",
                Comparator::Contains,
            )],
        )]);

        let merged = merge_criteria(&desired, &remote, MergeStrategy::Positional);
        let rule = &merged.sets[0].criteria[0];
        assert_eq!(rule.key, MatchKey::SecurityTag);
        assert_eq!(rule.comparator, Comparator::Contains);
        assert_eq!(rule.value, "v1");
        // shape stays desired
        assert_eq!(merged.sets[0].operator, Operator::And);
    }

    #[test]
    fn test_unmatched_rule_is_untouched() {
        let desired = DynamicMembership::new(vec![set(
            Operator::And,
            vec![Criterion::new(MatchKey::VmName, "v1", Comparator::Equals)],
        )]);
        let remote = DynamicMembership::new(vec![set(
            Operator::And,
            vec![Criterion::new(MatchKey::Entity, "v2", Comparator::BelongsTo)],
        )]);
        let merged = merge_criteria(&desired, &remote, MergeStrategy::Positional);
        assert_eq!(merged, desired);
    }

    #[test]
    fn test_bounds_safe() {
        let desired = DynamicMembership::new(vec![
            set(
                Operator::Or,
                vec![Criterion::new(MatchKey::VmName, "a", Comparator::Equals)],
            ),
            set(
                Operator::Or,
                vec![Criterion::new(MatchKey::VmName, "b", Comparator::Equals)],
            ),
        ]);
        let remote = DynamicMembership::new(vec![set(
            Operator::Or,
            vec![Criterion::new(MatchKey::VmName, "a", Comparator::StartsWith)],
        )]);

        let merged = merge_criteria(&desired, &remote, MergeStrategy::Positional);
        assert_eq!(merged.sets.len(), 2);
        assert_eq!(merged.sets[0].criteria[0].comparator, Comparator::StartsWith);
        assert_eq!(merged.sets[1], desired.sets[1]);

        // surplus remote sets are ignored
        let merged = merge_criteria(
            &DynamicMembership::default(),
            &remote,
            MergeStrategy::Positional,
        );
        assert!(merged.is_empty());
    }

    #[test]
    fn test_positional_does_not_cross_sets() {
        let desired = DynamicMembership::new(vec![set(
            Operator::Or,
            vec![Criterion::new(MatchKey::VmName, "b", Comparator::Equals)],
        )]);
        let remote = DynamicMembership::new(vec![
            set(
                Operator::Or,
                vec![Criterion::new(MatchKey::VmName, "a", Comparator::Equals)],
            ),
            set(
                Operator::Or,
                vec![Criterion::new(MatchKey::GuestHostName, "b", Comparator::EndsWith)],
            ),
        ]);

        let positional = merge_criteria(&desired, &remote, MergeStrategy::Positional);
        assert_eq!(positional, desired);

        let by_value = merge_criteria(&desired, &remote, MergeStrategy::ByValue);
        assert_eq!(by_value.sets[0].criteria[0].key, MatchKey::GuestHostName);
        assert_eq!(by_value.sets[0].criteria[0].comparator, Comparator::EndsWith);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("by_value".parse::<MergeStrategy>().unwrap(), MergeStrategy::ByValue);
        assert_eq!(MergeStrategy::default().to_string(), "positional");
        assert!("fuzzy".parse::<MergeStrategy>().is_err());
    }
}
