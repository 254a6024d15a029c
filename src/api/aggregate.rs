//! Aggregation specs and result shapes.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Count => "count",
            AggregationKind::Sum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
        }
    }
}

/// One aggregate function applied to one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub kind: AggregationKind,
    pub property: String,
}

impl Aggregation {
    pub fn new(kind: AggregationKind, property: impl Into<String>) -> Self {
        Self {
            kind,
            property: property.into(),
        }
    }

    /// Count of instances, counted over `externalId`.
    pub fn count() -> Self {
        Self::new(AggregationKind::Count, "externalId")
    }

    pub fn sum(property: impl Into<String>) -> Self {
        Self::new(AggregationKind::Sum, property)
    }

    pub fn avg(property: impl Into<String>) -> Self {
        Self::new(AggregationKind::Avg, property)
    }

    pub fn min(property: impl Into<String>) -> Self {
        Self::new(AggregationKind::Min, property)
    }

    pub fn max(property: impl Into<String>) -> Self {
        Self::new(AggregationKind::Max, property)
    }
}

impl Serialize for Aggregation {
    /// `{"<kind>": {"property": "<property>"}}`
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut inner = Map::new();
        inner.insert("property".into(), Value::String(self.property.clone()));
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.kind.as_str(), &inner)?;
        map.end()
    }
}

/// One aggregated value in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedValue {
    #[serde(rename = "aggregate")]
    pub kind: AggregationKind,
    pub property: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// One row of an aggregate response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Map<String, Value>>,
    pub aggregates: Vec<AggregatedValue>,
}

/// Values for one group of a grouped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAggregate {
    pub group: Map<String, Value>,
    pub values: Vec<AggregatedValue>,
}

/// Result of an aggregate call, shaped by the request: one value, several
/// values, or values per group.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    Single(AggregatedValue),
    Many(Vec<AggregatedValue>),
    Grouped(Vec<GroupedAggregate>),
}

impl AggregateResult {
    /// The single value, when the result has that shape.
    pub fn value(&self) -> Option<f64> {
        match self {
            AggregateResult::Single(v) => v.value,
            _ => None,
        }
    }
}
