//! Wire filter tree.

use serde::Serialize;
use serde_json::Value;

use crate::models::{PropertyPath, ViewReference};

/// `{"equals": {"property": [...], "value": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EqualsFilter {
    pub property: PropertyPath,
    pub value: Value,
}

/// `{"in": {"property": [...], "values": [...]}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFilter {
    pub property: PropertyPath,
    pub values: Vec<Value>,
}

/// `{"prefix": {"property": [...], "value": "..."}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrefixFilter {
    pub property: PropertyPath,
    pub value: Value,
}

/// `{"range": {"property": [...], "gt": .., "gte": .., "lt": .., "lte": ..}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeFilter {
    pub property: PropertyPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
}

impl RangeFilter {
    pub fn new(property: PropertyPath) -> Self {
        Self {
            property,
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }
}

/// Boolean operator joining sibling filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoolOp {
    #[default]
    And,
    Or,
}

/// A node of the wire filter tree.
///
/// Serializes externally tagged by operator name, which is exactly the shape
/// the service expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterNode {
    Equals(EqualsFilter),
    In(InFilter),
    Prefix(PrefixFilter),
    Range(RangeFilter),
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    HasData(Vec<ViewReference>),
}

impl FilterNode {
    pub fn equals(property: PropertyPath, value: impl Into<Value>) -> Self {
        FilterNode::Equals(EqualsFilter {
            property,
            value: value.into(),
        })
    }

    pub fn in_values(property: PropertyPath, values: Vec<Value>) -> Self {
        FilterNode::In(InFilter { property, values })
    }

    pub fn prefix(property: PropertyPath, value: impl Into<Value>) -> Self {
        FilterNode::Prefix(PrefixFilter {
            property,
            value: value.into(),
        })
    }

    pub fn has_data(views: Vec<ViewReference>) -> Self {
        FilterNode::HasData(views)
    }

    /// Join `nodes` under `op`, collapsing the degenerate cases: no nodes
    /// gives `None` and a single node is returned unwrapped.
    pub fn combine(op: BoolOp, mut nodes: Vec<FilterNode>) -> Option<FilterNode> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(match op {
                BoolOp::And => FilterNode::And(nodes),
                BoolOp::Or => FilterNode::Or(nodes),
            }),
        }
    }

    /// AND together any number of optional filters.
    pub fn all<I>(filters: I) -> Option<FilterNode>
    where
        I: IntoIterator<Item = Option<FilterNode>>,
    {
        Self::combine(BoolOp::And, filters.into_iter().flatten().collect())
    }
}
