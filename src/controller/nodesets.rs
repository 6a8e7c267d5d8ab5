//! Distribution of Elasticsearch nodes across node sets
//!
//! The total node count is split evenly; the remainder goes to the earliest
//! node sets in declaration order. The split is expressed as an ordered rule
//! table so the tie-breaking is explicit rather than a side effect of
//! iteration.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm};
use serde_json::Value;

use crate::crd::{NodeSet, NodeSetSelectionAttribute};
use crate::error::{Error, Result};

pub const AWARENESS_ATTRIBUTES_KEY: &str = "cluster.routing.allocation.awareness.attributes";

/// Even share of the node count across the requested node sets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Share {
    pub base: i32,
    pub remainder: usize,
}

/// A rule deciding the node count of the node set at a given position
pub struct PartitionRule {
    pub name: &'static str,
    pub applies: fn(usize, &Share) -> bool,
    pub count: fn(&Share) -> i32,
}

fn absorbs_remainder(index: usize, share: &Share) -> bool {
    index < share.remainder
}

fn always(_: usize, _: &Share) -> bool {
    true
}

fn base_plus_one(share: &Share) -> i32 {
    share.base + 1
}

fn base(share: &Share) -> i32 {
    share.base
}

/// Evaluated top to bottom; the first rule that applies wins.
pub const PARTITION_RULES: &[PartitionRule] = &[
    PartitionRule {
        name: "earliest-absorb-remainder",
        applies: absorbs_remainder,
        count: base_plus_one,
    },
    PartitionRule {
        name: "even-share",
        applies: always,
        count: base,
    },
];

/// A node set after the node count has been distributed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedNodeGroup {
    /// Position of the node set in the request
    pub index: usize,
    pub count: i32,
    pub selection_attributes: Vec<NodeSetSelectionAttribute>,
}

/// Split `count` nodes across `node_sets`.
///
/// An empty `node_sets` is one implicit node set without placement
/// constraints. Node sets left with zero nodes are dropped.
pub fn partition(count: i64, node_sets: &[NodeSet]) -> Result<Vec<ResolvedNodeGroup>> {
    if count < 0 {
        return Err(Error::validation(
            "spec.nodes.count",
            format!("node count must not be negative, got {count}"),
            "Set spec.nodes.count to zero or a positive number of Elasticsearch nodes.",
        ));
    }
    let total = i32::try_from(count).map_err(|_| {
        Error::validation(
            "spec.nodes.count",
            format!("node count {count} is out of range"),
            "Lower spec.nodes.count.",
        )
    })?;

    let implicit = [NodeSet::default()];
    let requested: &[NodeSet] = if node_sets.is_empty() {
        &implicit
    } else {
        node_sets
    };

    let groups = i32::try_from(requested.len())
        .map_err(|_| Error::ConfigError("too many node sets".to_string()))?;
    let share = Share {
        base: total / groups,
        remainder: (total % groups) as usize,
    };

    let resolved = requested
        .iter()
        .enumerate()
        .filter_map(|(index, node_set)| {
            let count = PARTITION_RULES
                .iter()
                .find(|rule| (rule.applies)(index, &share))
                .map(|rule| (rule.count)(&share))
                .unwrap_or(share.base);
            (count > 0).then(|| ResolvedNodeGroup {
                index,
                count,
                selection_attributes: node_set.selection_attributes.clone(),
            })
        })
        .collect();

    Ok(resolved)
}

impl ResolvedNodeGroup {
    /// Required node affinity matching every selection attribute, if any
    pub fn node_affinity(&self) -> Option<NodeAffinity> {
        if self.selection_attributes.is_empty() {
            return None;
        }

        let match_expressions = self
            .selection_attributes
            .iter()
            .map(|attr| NodeSelectorRequirement {
                key: attr.node_label.clone(),
                operator: "In".to_string(),
                values: Some(vec![attr.value.clone()]),
            })
            .collect();

        Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(match_expressions),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        })
    }

    /// `node.attr.*` settings and the awareness attribute list for Elasticsearch
    pub fn awareness_config(&self) -> BTreeMap<String, Value> {
        let mut config = BTreeMap::new();
        if self.selection_attributes.is_empty() {
            return config;
        }

        for attr in &self.selection_attributes {
            config.insert(
                format!("node.attr.{}", attr.name),
                Value::String(attr.value.clone()),
            );
        }
        let names: Vec<&str> = self
            .selection_attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        config.insert(
            AWARENESS_ATTRIBUTES_KEY.to_string(),
            Value::String(names.join(",")),
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_sets(n: usize) -> Vec<NodeSet> {
        vec![NodeSet::default(); n]
    }

    fn counts(count: i64, sets: usize) -> Vec<i32> {
        partition(count, &empty_sets(sets))
            .unwrap()
            .iter()
            .map(|g| g.count)
            .collect()
    }

    fn attr(name: &str, label: &str, value: &str) -> NodeSetSelectionAttribute {
        NodeSetSelectionAttribute {
            name: name.to_string(),
            node_label: label.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_remainder_goes_to_earliest_sets() {
        assert_eq!(counts(5, 3), vec![2, 2, 1]);
        assert_eq!(counts(6, 3), vec![2, 2, 2]);
        assert_eq!(counts(3, 3), vec![1, 1, 1]);
        assert_eq!(counts(7, 2), vec![4, 3]);
    }

    #[test]
    fn test_empty_sets_are_elided() {
        assert_eq!(counts(2, 3), vec![1, 1]);
        assert!(counts(0, 3).is_empty());
    }

    #[test]
    fn test_counts_always_sum_to_total() {
        for total in 0..20 {
            for sets in 1..6 {
                let c = counts(total, sets);
                assert_eq!(c.iter().map(|&n| i64::from(n)).sum::<i64>(), total);
                let base = (total / sets as i64) as i32;
                assert!(c.iter().all(|&n| n == base || n == base + 1));
            }
        }
    }

    #[test]
    fn test_no_node_sets_means_one_implicit_set() {
        let groups = partition(2, &[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert!(groups[0].node_affinity().is_none());
        assert!(groups[0].awareness_config().is_empty());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        assert!(matches!(partition(-1, &[]), Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_selection_attributes_keep_declaration_order() {
        let sets = vec![NodeSet {
            selection_attributes: vec![
                attr("zone", "failure-domain.beta.kubernetes.io/zone", "us-west-2a"),
                attr("rack", "some-rack-label.kubernetes.io/rack", "rack1"),
            ],
        }];
        let groups = partition(1, &sets).unwrap();

        let affinity = groups[0].node_affinity().unwrap();
        let terms = affinity
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 1);
        let keys: Vec<String> = terms[0]
            .match_expressions
            .clone()
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "failure-domain.beta.kubernetes.io/zone".to_string(),
                "some-rack-label.kubernetes.io/rack".to_string()
            ]
        );

        let config = groups[0].awareness_config();
        assert_eq!(config[AWARENESS_ATTRIBUTES_KEY], Value::from("zone,rack"));
        assert_eq!(config["node.attr.zone"], Value::from("us-west-2a"));
        assert_eq!(config["node.attr.rack"], Value::from("rack1"));
    }

    #[test]
    fn test_rule_table_order() {
        let names: Vec<&str> = PARTITION_RULES.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["earliest-absorb-remainder", "even-share"]);
    }
}
