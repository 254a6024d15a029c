//! Typed leaf filters for scalar properties.
//!
//! One generic [`ScalarFilter`] is specialised per value kind through the
//! [`FilterKind`] marker types. The kind decides which Rust type the typed
//! methods accept and how JSON supplied through the dynamic `try_*` methods is
//! validated. Prefix matching is only available on [`Textual`] kinds and range
//! bounds only on [`Ordered`] kinds, so misuse is a compile error.

use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;

use super::node::{FilterNode, RangeFilter};
use super::Dump;
use crate::error::{ClientError, Result};
use crate::models::{PropertyPath, ViewDescriptor};

/// Value kind of a scalar filter.
pub trait FilterKind {
    /// Rust type accepted by the typed methods.
    type Value;
    /// Human readable kind name used in type errors.
    const NAME: &'static str;

    fn to_json(value: Self::Value) -> Value;

    /// Validate a dynamically supplied value, normalising it to wire form.
    fn check(value: &Value) -> Option<Value>;
}

/// Kinds that support `prefix`.
pub trait Textual: FilterKind {}

/// Kinds that support range bounds.
pub trait Ordered: FilterKind {}

#[derive(Debug, Clone, Copy)]
pub struct Text;

#[derive(Debug, Clone, Copy)]
pub struct Boolean;

#[derive(Debug, Clone, Copy)]
pub struct Int;

#[derive(Debug, Clone, Copy)]
pub struct Float;

#[derive(Debug, Clone, Copy)]
pub struct Date;

#[derive(Debug, Clone, Copy)]
pub struct Timestamp;

impl FilterKind for Text {
    type Value = String;
    const NAME: &'static str = "text";

    fn to_json(value: String) -> Value {
        Value::String(value)
    }

    fn check(value: &Value) -> Option<Value> {
        value.is_string().then(|| value.clone())
    }
}

impl FilterKind for Boolean {
    type Value = bool;
    const NAME: &'static str = "boolean";

    fn to_json(value: bool) -> Value {
        Value::Bool(value)
    }

    fn check(value: &Value) -> Option<Value> {
        value.is_boolean().then(|| value.clone())
    }
}

impl FilterKind for Int {
    type Value = i64;
    const NAME: &'static str = "integer";

    fn to_json(value: i64) -> Value {
        Value::from(value)
    }

    fn check(value: &Value) -> Option<Value> {
        value.as_i64().map(Value::from)
    }
}

impl FilterKind for Float {
    type Value = f64;
    const NAME: &'static str = "float";

    fn to_json(value: f64) -> Value {
        Value::from(value)
    }

    fn check(value: &Value) -> Option<Value> {
        value.as_f64().map(Value::from)
    }
}

impl FilterKind for Date {
    type Value = NaiveDate;
    const NAME: &'static str = "date";

    fn to_json(value: NaiveDate) -> Value {
        Value::String(value.format("%Y-%m-%d").to_string())
    }

    fn check(value: &Value) -> Option<Value> {
        let parsed = NaiveDate::parse_from_str(value.as_str()?, "%Y-%m-%d").ok()?;
        Some(Self::to_json(parsed))
    }
}

impl FilterKind for Timestamp {
    type Value = DateTime<Utc>;
    const NAME: &'static str = "timestamp";

    fn to_json(value: DateTime<Utc>) -> Value {
        Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, false))
    }

    fn check(value: &Value) -> Option<Value> {
        let parsed = DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
        Some(Self::to_json(parsed.with_timezone(&Utc)))
    }
}

impl Textual for Text {}
impl Ordered for Int {}
impl Ordered for Float {}
impl Ordered for Date {}
impl Ordered for Timestamp {}

pub type TextFilter = ScalarFilter<Text>;
pub type BooleanFilter = ScalarFilter<Boolean>;
pub type IntFilter = ScalarFilter<Int>;
pub type FloatFilter = ScalarFilter<Float>;
pub type DateFilter = ScalarFilter<Date>;
pub type TimestampFilter = ScalarFilter<Timestamp>;

/// A single value or a list of values for `equals_or_in`.
#[derive(Debug, Clone, PartialEq)]
pub enum Match<T> {
    One(T),
    Many(Vec<T>),
}

/// Name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
    .to_string()
}

/// Typed filter on one scalar property.
///
/// Every method consumes and returns the filter so constraints chain:
///
/// ```
/// use viewgraph::filters::FloatFilter;
/// use viewgraph::models::ViewReference;
///
/// let view = ViewReference::new("shop", "Product", "v1");
/// let price = FloatFilter::new(view.property_path("price"))
///     .greater_than(1.0)
///     .less_than(10.0);
/// assert!(price.dump().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ScalarFilter<K> {
    property: PropertyPath,
    matching: Option<Match<Value>>,
    prefix: Option<Value>,
    range: RangeFilter,
    _kind: PhantomData<K>,
}

impl<K: FilterKind> ScalarFilter<K> {
    pub fn new(property: PropertyPath) -> Self {
        Self {
            range: RangeFilter::new(property.clone()),
            property,
            matching: None,
            prefix: None,
            _kind: PhantomData,
        }
    }

    /// Filter on `field` of the described view; unknown fields are rejected.
    pub fn for_view(descriptor: &ViewDescriptor, field: &str) -> Result<Self> {
        Ok(Self::new(descriptor.path(field)?))
    }

    pub fn property(&self) -> &PropertyPath {
        &self.property
    }

    pub fn equals(mut self, value: impl Into<K::Value>) -> Self {
        self.matching = Some(Match::One(K::to_json(value.into())));
        self
    }

    /// Match any of `values`. An empty list sets no constraint.
    pub fn is_in<V: Into<K::Value>>(mut self, values: Vec<V>) -> Self {
        self.matching = if values.is_empty() {
            None
        } else {
            Some(Match::Many(
                values.into_iter().map(|v| K::to_json(v.into())).collect(),
            ))
        };
        self
    }

    /// `None` or an empty list clears the equality constraint; a single value
    /// becomes `equals`, a list becomes `in`.
    pub fn equals_or_in(self, value: Option<Match<K::Value>>) -> Self {
        match value {
            None => self.clear_matching(),
            Some(Match::One(v)) => self.equals(v),
            Some(Match::Many(values)) => self.is_in(values),
        }
    }

    /// Dynamic counterpart of [`equals`](Self::equals); the value must be of
    /// this filter's kind.
    pub fn try_equals(mut self, value: Value) -> Result<Self> {
        let checked = self.check(&value)?;
        self.matching = Some(Match::One(checked));
        Ok(self)
    }

    /// Dynamic counterpart of [`equals_or_in`](Self::equals_or_in): `null`
    /// and `[]` clear, arrays become `in`, anything else `equals`.
    pub fn try_equals_or_in(mut self, value: Option<Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(self.clear_matching()),
            Some(Value::Array(items)) if items.is_empty() => Ok(self.clear_matching()),
            Some(Value::Array(items)) => {
                let checked = items
                    .iter()
                    .map(|item| self.check(item))
                    .collect::<Result<Vec<_>>>()?;
                self.matching = Some(Match::Many(checked));
                Ok(self)
            }
            Some(value) => self.try_equals(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matching.is_none() && self.prefix.is_none() && self.range.is_empty()
    }

    fn clear_matching(mut self) -> Self {
        self.matching = None;
        self
    }

    fn check(&self, value: &Value) -> Result<Value> {
        K::check(value).ok_or_else(|| ClientError::TypeMismatch {
            property: self.property.to_string(),
            expected: K::NAME,
            found: json_kind(value),
        })
    }

    /// Wire node for the constraints set so far, `None` when unconstrained.
    pub fn dump(&self) -> Option<FilterNode> {
        let mut nodes = Vec::new();
        match &self.matching {
            Some(Match::One(value)) => {
                nodes.push(FilterNode::equals(self.property.clone(), value.clone()))
            }
            Some(Match::Many(values)) => {
                nodes.push(FilterNode::in_values(self.property.clone(), values.clone()))
            }
            None => {}
        }
        if let Some(prefix) = &self.prefix {
            nodes.push(FilterNode::prefix(self.property.clone(), prefix.clone()));
        }
        if !self.range.is_empty() {
            nodes.push(FilterNode::Range(self.range.clone()));
        }
        FilterNode::all(nodes.into_iter().map(Some))
    }
}

impl<K: Textual> ScalarFilter<K> {
    pub fn prefix(mut self, value: impl Into<K::Value>) -> Self {
        self.prefix = Some(K::to_json(value.into()));
        self
    }
}

impl<K: Ordered> ScalarFilter<K> {
    pub fn greater_than(mut self, value: impl Into<K::Value>) -> Self {
        self.range.gt = Some(K::to_json(value.into()));
        self
    }

    pub fn greater_than_or_equals(mut self, value: impl Into<K::Value>) -> Self {
        self.range.gte = Some(K::to_json(value.into()));
        self
    }

    pub fn less_than(mut self, value: impl Into<K::Value>) -> Self {
        self.range.lt = Some(K::to_json(value.into()));
        self
    }

    pub fn less_than_or_equals(mut self, value: impl Into<K::Value>) -> Self {
        self.range.lte = Some(K::to_json(value.into()));
        self
    }

    /// Inclusive range between `min` and `max`.
    pub fn between(self, min: impl Into<K::Value>, max: impl Into<K::Value>) -> Self {
        self.greater_than_or_equals(min).less_than_or_equals(max)
    }
}

impl<K: FilterKind> Dump for ScalarFilter<K> {
    fn dump(&self) -> Option<FilterNode> {
        ScalarFilter::dump(self)
    }
}
