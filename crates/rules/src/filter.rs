//! Structured filter tree evaluation.
//!
//! Filters are boolean combinators (`and`/`or`/`not`) over field
//! comparisons. All string comparisons are lower-cased. A leaf whose field
//! has no values fails both positive and negative operators, so rules are
//! never satisfied by absent data.

use faultline_core::{FilterField, FilterGroup, FilterLeaf, FilterNode, FilterOperator};

use crate::metrics::RuleMetrics;

/// Evaluate a filter tree against the metrics block.
#[must_use]
pub fn evaluate_filter(node: &FilterNode, metrics: &RuleMetrics) -> bool {
    match node {
        FilterNode::Group(group) => match group {
            FilterGroup::And { conditions } => {
                conditions.iter().all(|c| evaluate_filter(c, metrics))
            }
            FilterGroup::Or { conditions } => {
                conditions.iter().any(|c| evaluate_filter(c, metrics))
            }
            FilterGroup::Not { condition } => !evaluate_filter(condition, metrics),
        },
        FilterNode::Leaf(leaf) => evaluate_leaf(leaf, metrics),
    }
}

fn evaluate_leaf(leaf: &FilterLeaf, metrics: &RuleMetrics) -> bool {
    let operands: Vec<String> = leaf
        .operands()
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    if operands.is_empty() {
        return false;
    }

    let values = field_values(leaf.field, metrics);
    if values.is_empty() {
        return false;
    }

    match leaf.operator {
        FilterOperator::Equals | FilterOperator::In => values
            .iter()
            .any(|value| operands.iter().any(|op| value == op)),
        FilterOperator::Contains => values
            .iter()
            .any(|value| operands.iter().any(|op| value.contains(op.as_str()))),
        FilterOperator::NotEquals | FilterOperator::NotIn => values
            .iter()
            .all(|value| operands.iter().all(|op| value != op)),
        FilterOperator::NotContains => values
            .iter()
            .all(|value| operands.iter().all(|op| !value.contains(op.as_str()))),
    }
}

/// Lower-cased candidate values for a filter field.
fn field_values(field: FilterField, metrics: &RuleMetrics) -> Vec<String> {
    let raw: Vec<&str> = match field {
        FilterField::Environment => metrics.environment.as_deref().into_iter().collect(),
        FilterField::File => {
            let mut files: Vec<&str> = Vec::new();
            for candidate in [metrics.file.as_deref(), metrics.source_file.as_deref()] {
                if let Some(value) = candidate
                    && !value.is_empty()
                    && !files.contains(&value)
                {
                    files.push(value);
                }
            }
            files
        }
        FilterField::UserSegment => metrics.user_segments.iter().map(String::as_str).collect(),
    };

    raw.into_iter()
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
        .collect()
}
