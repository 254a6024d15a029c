//! View descriptors: the schema metadata typed domain objects carry.
//!
//! A descriptor pairs a [`ViewReference`] with the mapping from field names to
//! wire property names, and with the edge connections the view declares. Both
//! the query builder and the write serializer consult it so that an unknown
//! property fails before any request is sent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::{InstanceId, PropertyPath, ViewReference};
use crate::error::{ClientError, Result};

/// Direction of an edge connection relative to the declaring node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    #[default]
    Outwards,
    Inwards,
}

/// An edge-typed relation declared on a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeConnection {
    pub edge_type: InstanceId,
    pub direction: EdgeDirection,
    /// View holding edge properties, if the edge carries any.
    pub edge_view: Option<ViewReference>,
    /// Views the far-end node may have. Empty accepts any node.
    pub end_views: Vec<ViewReference>,
}

impl EdgeConnection {
    pub fn outwards(edge_type: InstanceId) -> Self {
        Self {
            edge_type,
            direction: EdgeDirection::Outwards,
            edge_view: None,
            end_views: Vec::new(),
        }
    }

    pub fn inwards(edge_type: InstanceId) -> Self {
        Self {
            direction: EdgeDirection::Inwards,
            ..Self::outwards(edge_type)
        }
    }

    pub fn with_edge_view(mut self, view: ViewReference) -> Self {
        self.edge_view = Some(view);
        self
    }

    pub fn with_end_view(mut self, view: ViewReference) -> Self {
        self.end_views.push(view);
        self
    }

    /// Whether a node of `view` may sit at the far end of this connection.
    pub fn accepts(&self, view: &ViewReference) -> bool {
        self.end_views.is_empty() || self.end_views.contains(view)
    }
}

/// Schema metadata for one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDescriptor {
    view: ViewReference,
    properties: BTreeMap<String, String>,
    connections: BTreeMap<String, EdgeConnection>,
}

impl ViewDescriptor {
    pub fn new(view: ViewReference) -> Self {
        Self {
            view,
            properties: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }

    /// Declare a property whose field name equals its wire name.
    pub fn property(self, name: &str) -> Self {
        self.property_as(name, name)
    }

    /// Declare a property with a distinct wire name.
    pub fn property_as(mut self, field: &str, wire_name: &str) -> Self {
        self.properties
            .insert(field.to_string(), wire_name.to_string());
        self
    }

    /// Declare an edge connection under `field`.
    pub fn connection(mut self, field: &str, connection: EdgeConnection) -> Self {
        self.connections.insert(field.to_string(), connection);
        self
    }

    pub fn view(&self) -> &ViewReference {
        &self.view
    }

    pub fn has_property(&self, field: &str) -> bool {
        self.properties.contains_key(field)
    }

    /// Wire name for `field`.
    pub fn wire_name(&self, field: &str) -> Result<&str> {
        self.properties
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| self.unknown(field))
    }

    pub fn path(&self, field: &str) -> Result<PropertyPath> {
        Ok(self.view.property_path(self.wire_name(field)?))
    }

    pub fn edge_connection(&self, field: &str) -> Result<&EdgeConnection> {
        self.connections.get(field).ok_or_else(|| self.unknown(field))
    }

    /// All wire property names, in field order.
    pub fn wire_names(&self) -> impl Iterator<Item = &str> {
        self.properties.values().map(String::as_str)
    }

    fn unknown(&self, field: &str) -> ClientError {
        ClientError::UnknownProperty {
            view: self.view.to_string(),
            property: field.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ViewDescriptor {
        ViewDescriptor::new(ViewReference::new("shop", "Product", "v1"))
            .property("name")
            .property_as("unit_price", "unitPrice")
            .connection(
                "suppliers",
                EdgeConnection::outwards(InstanceId::new("shop", "Product.suppliers"))
                    .with_end_view(ViewReference::new("shop", "Supplier", "v1")),
            )
    }

    #[test]
    fn test_wire_names_and_paths() {
        let desc = product();
        assert_eq!(desc.wire_name("unit_price").unwrap(), "unitPrice");
        assert_eq!(desc.path("name").unwrap().property(), "name");
        assert!(matches!(
            desc.wire_name("colour"),
            Err(ClientError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_connection_acceptance() {
        let desc = product();
        let conn = desc.edge_connection("suppliers").unwrap();
        assert!(conn.accepts(&ViewReference::new("shop", "Supplier", "v1")));
        assert!(!conn.accepts(&ViewReference::new("shop", "Product", "v1")));
        assert!(EdgeConnection::inwards(InstanceId::new("s", "t")).accepts(desc.view()));
    }
}
