//! Filter on a direct relation property.

use serde_json::Value;

use super::Dump;
use super::node::FilterNode;
use super::scalar::Match;
use crate::error::{ClientError, Result};
use crate::models::{PropertyPath, RelationRef, ViewDescriptor};

/// Filter matching the identity a direct relation points at.
///
/// Targets may be bare external ids (combined with the default space), explicit
/// `(space, external_id)` pairs or [`InstanceId`](crate::models::InstanceId)s.
/// A list must not mix bare ids with qualified ones.
#[derive(Debug, Clone)]
pub struct DirectRelationFilter {
    property: PropertyPath,
    default_space: Option<String>,
    matching: Option<Match<Value>>,
}

impl DirectRelationFilter {
    pub fn new(property: PropertyPath, default_space: Option<&str>) -> Self {
        Self {
            property,
            default_space: default_space.map(str::to_string),
            matching: None,
        }
    }

    pub fn for_view(
        descriptor: &ViewDescriptor,
        field: &str,
        default_space: Option<&str>,
    ) -> Result<Self> {
        Ok(Self::new(descriptor.path(field)?, default_space))
    }

    pub fn equals(mut self, target: impl Into<RelationRef>) -> Result<Self> {
        let id = target.into().resolve(self.default_space.as_deref())?;
        self.matching = Some(Match::One(id.to_json()));
        Ok(self)
    }

    pub fn equals_or_in(mut self, value: Option<Match<RelationRef>>) -> Result<Self> {
        match value {
            None => {
                self.matching = None;
                Ok(self)
            }
            Some(Match::One(target)) => self.equals(target),
            Some(Match::Many(targets)) if targets.is_empty() => {
                self.matching = None;
                Ok(self)
            }
            Some(Match::Many(targets)) => {
                let shape = targets[0].shape();
                if targets.iter().any(|t| t.shape() != shape) {
                    return Err(ClientError::MixedRelationShapes {
                        property: self.property.to_string(),
                    });
                }
                let values = targets
                    .iter()
                    .map(|t| {
                        t.resolve(self.default_space.as_deref())
                            .map(|id| id.to_json())
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.matching = Some(Match::Many(values));
                Ok(self)
            }
        }
    }

    pub fn dump(&self) -> Option<FilterNode> {
        match &self.matching {
            Some(Match::One(value)) => Some(FilterNode::equals(self.property.clone(), value.clone())),
            Some(Match::Many(values)) => Some(FilterNode::in_values(
                self.property.clone(),
                values.clone(),
            )),
            None => None,
        }
    }
}

impl Dump for DirectRelationFilter {
    fn dump(&self) -> Option<FilterNode> {
        DirectRelationFilter::dump(self)
    }
}
