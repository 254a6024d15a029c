//! Identity types: instance ids, view references and property paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Unique key of a node or edge: `(space, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceId {
    pub space: String,
    pub external_id: String,
}

impl InstanceId {
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
        }
    }

    /// Wire form used as a direct relation value or a join key.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "space": self.space, "externalId": self.external_id })
    }

    /// Parse the `{space, externalId}` wire form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let space = value.get("space")?.as_str()?;
        let external_id = value.get("externalId")?.as_str()?;
        Some(Self::new(space, external_id))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)
    }
}

/// Identifies a versioned schema view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename = "view", rename_all = "camelCase")]
pub struct ViewReference {
    pub space: String,
    pub external_id: String,
    pub version: String,
}

impl ViewReference {
    pub fn new(
        space: impl Into<String>,
        external_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: version.into(),
        }
    }

    /// `externalId/version`, the middle segment of a property path.
    pub fn identifier(&self) -> String {
        format!("{}/{}", self.external_id, self.version)
    }

    /// Path of `property` inside this view.
    pub fn property_path(&self, property: &str) -> PropertyPath {
        PropertyPath::view(self, property)
    }
}

impl fmt::Display for ViewReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.space, self.external_id, self.version)
    }
}

/// Wire address of a property.
///
/// View properties use `[space, "externalId/version", property]`; built-in
/// instance properties use `["node" | "edge", property]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn view(view: &ViewReference, property: &str) -> Self {
        Self(vec![
            view.space.clone(),
            view.identifier(),
            property.to_string(),
        ])
    }

    pub fn node(property: &str) -> Self {
        Self(vec!["node".to_string(), property.to_string()])
    }

    pub fn edge(property: &str) -> Self {
        Self(vec!["edge".to_string(), property.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, the property name itself.
    pub fn property(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Caller-side spelling of a relation target before it is resolved to an
/// [`InstanceId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationRef {
    /// Bare external id; the space comes from the ambient default.
    ExternalId(String),
    /// Explicit `(space, external_id)` pair.
    Pair(String, String),
    /// Already typed identity.
    Id(InstanceId),
}

/// Representation class of a [`RelationRef`], used to reject mixed lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationShape {
    Bare,
    Qualified,
}

impl RelationRef {
    pub fn shape(&self) -> RelationShape {
        match self {
            RelationRef::ExternalId(_) => RelationShape::Bare,
            RelationRef::Pair(..) | RelationRef::Id(_) => RelationShape::Qualified,
        }
    }

    /// Resolve to a full identity, combining bare ids with `default_space`.
    pub fn resolve(&self, default_space: Option<&str>) -> Result<InstanceId> {
        match self {
            RelationRef::ExternalId(external_id) => match default_space {
                Some(space) => Ok(InstanceId::new(space, external_id.as_str())),
                None => Err(ClientError::Validation(format!(
                    "'{external_id}' needs a space: pass a (space, external_id) pair or set a default space"
                ))),
            },
            RelationRef::Pair(space, external_id) => {
                Ok(InstanceId::new(space.as_str(), external_id.as_str()))
            }
            RelationRef::Id(id) => Ok(id.clone()),
        }
    }
}

impl From<&str> for RelationRef {
    fn from(value: &str) -> Self {
        RelationRef::ExternalId(value.to_string())
    }
}

impl From<String> for RelationRef {
    fn from(value: String) -> Self {
        RelationRef::ExternalId(value)
    }
}

impl<S: Into<String>, X: Into<String>> From<(S, X)> for RelationRef {
    fn from((space, external_id): (S, X)) -> Self {
        RelationRef::Pair(space.into(), external_id.into())
    }
}

impl From<InstanceId> for RelationRef {
    fn from(value: InstanceId) -> Self {
        RelationRef::Id(value)
    }
}

impl From<&InstanceId> for RelationRef {
    fn from(value: &InstanceId) -> Self {
        RelationRef::Id(value.clone())
    }
}
