//! Query steps and the builder that links them.

use std::collections::HashMap;

use crate::api::DEFAULT_LIMIT;
use crate::error::{ClientError, Result};
use crate::filters::{Dump, FilterNode};
use crate::models::{
    EdgeDirection, InstanceId, InstanceSort, InstanceType, ViewDescriptor, ViewReference,
};

/// How far relations are resolved when results are unpacked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrieveDepth {
    /// Leave relations as the raw property values.
    Skip,
    /// Resolve relations to identities and edges, without far-end nodes.
    Identifier,
    /// Resolve relations to fully populated nested nodes.
    #[default]
    Full,
}

/// How a step's rows are found from its upstream step's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKind {
    /// The upstream view's `property` holds the identities to fetch.
    DirectRelation { property: String },
    /// This step's view's `property` points back at upstream rows.
    ReverseRelation { property: String },
    /// Edges of `edge_type` with upstream rows on the near side.
    Edge {
        edge_type: InstanceId,
        direction: EdgeDirection,
    },
    /// Far-end nodes of the upstream edge step.
    EdgeTarget,
}

/// Link from a step to the step it reads its join key from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLink {
    pub from: String,
    pub join: JoinKind,
}

/// One request sequence of a graph query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStep {
    pub name: String,
    /// Field on the upstream node under which these rows are attached.
    pub field: Option<String>,
    /// View the rows are read through. Edge steps without edge properties
    /// have none.
    pub view: Option<ViewReference>,
    pub instance_type: InstanceType,
    pub filter: Option<FilterNode>,
    pub sort: Vec<InstanceSort>,
    /// `None` reads every matching row.
    pub limit: Option<usize>,
    /// Properties to return (wire names); empty returns all.
    pub select: Vec<String>,
    /// Type of the edges read by an edge root.
    pub edge_type: Option<InstanceId>,
    pub link: Option<StepLink>,
}

impl QueryStep {
    /// A root node step over `view`.
    pub fn root(name: &str, view: &ViewReference) -> Self {
        Self {
            name: name.to_string(),
            field: None,
            view: Some(view.clone()),
            instance_type: InstanceType::Node,
            filter: None,
            sort: Vec::new(),
            limit: Some(DEFAULT_LIMIT),
            select: Vec::new(),
            edge_type: None,
            link: None,
        }
    }

    /// A root step over edges of `edge_type`, read through `view` when the
    /// edges carry properties.
    pub fn edge_root(name: &str, edge_type: InstanceId, view: Option<ViewReference>) -> Self {
        Self {
            name: name.to_string(),
            field: None,
            view,
            instance_type: InstanceType::Edge,
            filter: None,
            sort: Vec::new(),
            limit: Some(DEFAULT_LIMIT),
            select: Vec::new(),
            edge_type: Some(edge_type),
            link: None,
        }
    }

    fn linked(name: String, field: &str, view: Option<ViewReference>, from: &str, join: JoinKind) -> Self {
        let instance_type = match join {
            JoinKind::Edge { .. } => InstanceType::Edge,
            _ => InstanceType::Node,
        };
        Self {
            name,
            field: Some(field.to_string()),
            view,
            instance_type,
            filter: None,
            sort: Vec::new(),
            limit: None,
            select: Vec::new(),
            edge_type: None,
            link: Some(StepLink {
                from: from.to_string(),
                join,
            }),
        }
    }

    pub fn join(&self) -> Option<&JoinKind> {
        self.link.as_ref().map(|link| &link.join)
    }

    pub fn upstream(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.from.as_str())
    }
}

/// Builds a multi-step graph query rooted at one view, or at the edges of
/// one type.
///
/// Every traversal is checked against the view descriptors when it is added,
/// so an unknown property fails here rather than at execution.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    steps: Vec<QueryStep>,
    descriptors: HashMap<String, ViewDescriptor>,
    depth: RetrieveDepth,
}

impl QueryBuilder {
    pub fn new(root: &str, descriptor: &ViewDescriptor) -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert(root.to_string(), descriptor.clone());
        Self {
            steps: vec![QueryStep::root(root, descriptor.view())],
            descriptors,
            depth: RetrieveDepth::default(),
        }
    }

    /// A query rooted at edges of `edge_type`. `descriptor` describes the
    /// edge property view, if the edges have one.
    ///
    /// Root filters may address `edge.startNode`, `edge.endNode` and the edge
    /// properties. The only traversal from an edge root is [`Self::end_nodes`].
    pub fn edges(root: &str, edge_type: InstanceId, descriptor: Option<&ViewDescriptor>) -> Self {
        let mut descriptors = HashMap::new();
        if let Some(descriptor) = descriptor {
            descriptors.insert(root.to_string(), descriptor.clone());
        }
        Self {
            steps: vec![QueryStep::edge_root(
                root,
                edge_type,
                descriptor.map(|d| d.view().clone()),
            )],
            descriptors,
            depth: RetrieveDepth::default(),
        }
    }

    /// Filter the root step
    pub fn filter(mut self, filter: &dyn Dump) -> Self {
        self.steps[0].filter = filter.dump();
        self
    }

    pub fn sort(mut self, sort: Vec<InstanceSort>) -> Self {
        self.steps[0].sort = sort;
        self
    }

    /// Limit the root step
    pub fn limit(mut self, limit: usize) -> Self {
        self.steps[0].limit = Some(limit);
        self
    }

    /// Read every root row.
    pub fn unbounded(mut self) -> Self {
        self.steps[0].limit = None;
        self
    }

    pub fn depth(mut self, depth: RetrieveDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn root(&self) -> &QueryStep {
        &self.steps[0]
    }

    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&QueryStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn retrieve_depth(&self) -> RetrieveDepth {
        self.depth
    }

    /// Register a step. Its upstream step must already be registered and
    /// its name must be new.
    pub fn add_step(mut self, step: QueryStep) -> Result<Self> {
        if self.step(&step.name).is_some() {
            return Err(ClientError::DuplicateStep(step.name));
        }
        match &step.link {
            Some(link) if self.step(&link.from).is_none() => {
                return Err(ClientError::UnknownStep(link.from.clone()));
            }
            None => {
                return Err(ClientError::Validation(format!(
                    "step '{}' has no upstream step; only the root may stand alone",
                    step.name
                )));
            }
            Some(_) => {}
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Filter the rows of an already registered list-backed step (the root,
    /// reverse relations and edges).
    pub fn filter_step(mut self, name: &str, filter: &dyn Dump) -> Result<Self> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.name == name)
            .ok_or_else(|| ClientError::UnknownStep(name.to_string()))?;
        if matches!(
            step.join(),
            Some(JoinKind::DirectRelation { .. } | JoinKind::EdgeTarget)
        ) {
            return Err(ClientError::Validation(format!(
                "step '{name}' is fetched by identity and cannot be filtered"
            )));
        }
        step.filter = filter.dump();
        Ok(self)
    }

    fn descriptor(&self, step: &str) -> Result<&ViewDescriptor> {
        if self.steps[0].name == step && self.steps[0].instance_type == InstanceType::Edge {
            return Err(ClientError::Validation(format!(
                "edge root '{step}' can only be traversed to its end nodes"
            )));
        }
        self.descriptors.get(step).ok_or_else(|| {
            if self.step(step).is_some() {
                ClientError::Validation(format!("step '{step}' does not read nodes"))
            } else {
                ClientError::UnknownStep(step.to_string())
            }
        })
    }

    /// Follow the direct relation `field` of step `from` to nodes of `target`.
    /// The new step is named `"{from}.{field}"`.
    pub fn direct_relation(self, from: &str, field: &str, target: &ViewDescriptor) -> Result<Self> {
        let property = self.descriptor(from)?.wire_name(field)?.to_string();
        let name = format!("{from}.{field}");
        let step = QueryStep::linked(
            name.clone(),
            field,
            Some(target.view().clone()),
            from,
            JoinKind::DirectRelation { property },
        );
        self.register(step, target)
    }

    /// Fetch `source` nodes whose `through` relation points at rows of step
    /// `from`, attaching them under `field`.
    pub fn reverse_relation(
        self,
        from: &str,
        field: &str,
        source: &ViewDescriptor,
        through: &str,
    ) -> Result<Self> {
        self.descriptor(from)?;
        let property = source.wire_name(through)?.to_string();
        let name = format!("{from}.{field}");
        let step = QueryStep::linked(
            name.clone(),
            field,
            Some(source.view().clone()),
            from,
            JoinKind::ReverseRelation { property },
        );
        self.register(step, source)
    }

    /// Traverse the edge connection `field` of step `from`.
    ///
    /// Adds the edge step `"{from}.{field}"` and the far-end node step
    /// `"{from}.{field}.end"`.
    pub fn edge(self, from: &str, field: &str, target: &ViewDescriptor) -> Result<Self> {
        let connection = self.descriptor(from)?.edge_connection(field)?.clone();
        if !connection.accepts(target.view()) {
            return Err(ClientError::IncompatibleEdge {
                edge_type: connection.edge_type.to_string(),
                expected: connection
                    .end_views
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                found: target.view().to_string(),
            });
        }

        let edge_name = format!("{from}.{field}");
        let edge_step = QueryStep::linked(
            edge_name.clone(),
            field,
            connection.edge_view.clone(),
            from,
            JoinKind::Edge {
                edge_type: connection.edge_type.clone(),
                direction: connection.direction,
            },
        );
        let end_step = QueryStep::linked(
            format!("{edge_name}.end"),
            field,
            Some(target.view().clone()),
            &edge_name,
            JoinKind::EdgeTarget,
        );

        let builder = self.add_step(edge_step)?;
        builder.register(end_step, target)
    }

    /// Fetch the end nodes of an edge root as `target` rows, in the step
    /// `"{root}.end"`.
    pub fn end_nodes(self, target: &ViewDescriptor) -> Result<Self> {
        let root = self.root();
        if root.instance_type != InstanceType::Edge {
            return Err(ClientError::Validation(format!(
                "query root '{}' reads nodes, not edges",
                root.name
            )));
        }
        let from = root.name.clone();
        let step = QueryStep::linked(
            format!("{from}.end"),
            "end",
            Some(target.view().clone()),
            &from,
            JoinKind::EdgeTarget,
        );
        self.register(step, target)
    }

    fn register(self, step: QueryStep, descriptor: &ViewDescriptor) -> Result<Self> {
        let name = step.name.clone();
        let mut builder = self.add_step(step)?;
        builder.descriptors.insert(name, descriptor.clone());
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::TextFilter;
    use crate::models::EdgeConnection;
    use assert_matches::assert_matches;

    fn category() -> ViewDescriptor {
        ViewDescriptor::new(ViewReference::new("shop", "Category", "v1"))
            .property("name")
            .property("parent")
    }

    fn product() -> ViewDescriptor {
        ViewDescriptor::new(ViewReference::new("shop", "Product", "v1"))
            .property("name")
            .property("category")
            .connection(
                "parts",
                EdgeConnection::outwards(InstanceId::new("shop", "Product.parts"))
                    .with_end_view(ViewReference::new("shop", "Product", "v1")),
            )
    }

    #[test]
    fn test_traversal_steps_are_linked() {
        let builder = QueryBuilder::new("product", &product())
            .limit(10)
            .direct_relation("product", "category", &category())
            .unwrap()
            .edge("product", "parts", &product())
            .unwrap();

        let names: Vec<_> = builder.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["product", "product.category", "product.parts", "product.parts.end"]
        );
        assert_eq!(builder.root().limit, Some(10));
        assert_eq!(builder.steps()[2].instance_type, InstanceType::Edge);
        assert_eq!(builder.steps()[3].upstream(), Some("product.parts"));
        assert_matches!(
            builder.steps()[1].join(),
            Some(JoinKind::DirectRelation { property }) if property == "category"
        );
    }

    #[test]
    fn test_unknown_property_fails_at_construction() {
        let err = QueryBuilder::new("product", &product())
            .direct_relation("product", "supplier", &category())
            .unwrap_err();
        assert_matches!(err, ClientError::UnknownProperty { .. });

        let err = QueryBuilder::new("category", &category())
            .reverse_relation("category", "products", &product(), "categories")
            .unwrap_err();
        assert_matches!(err, ClientError::UnknownProperty { .. });
    }

    #[test]
    fn test_links_must_reference_registered_steps() {
        let err = QueryBuilder::new("product", &product())
            .direct_relation("missing", "category", &category())
            .unwrap_err();
        assert_matches!(err, ClientError::UnknownStep(name) if name == "missing");

        let err = QueryBuilder::new("product", &product())
            .direct_relation("product", "category", &category())
            .unwrap()
            .direct_relation("product", "category", &category())
            .unwrap_err();
        assert_matches!(err, ClientError::DuplicateStep(_));
    }

    #[test]
    fn test_edge_end_view_is_checked() {
        let err = QueryBuilder::new("product", &product())
            .edge("product", "parts", &category())
            .unwrap_err();
        assert_matches!(err, ClientError::IncompatibleEdge { .. });
    }

    #[test]
    fn test_edge_root_reads_edges_of_one_type() {
        let parts = InstanceId::new("shop", "Product.parts");
        let builder = QueryBuilder::edges("parts", parts.clone(), None)
            .limit(5)
            .end_nodes(&product())
            .unwrap();

        let root = builder.root();
        assert_eq!(root.instance_type, InstanceType::Edge);
        assert_eq!(root.edge_type, Some(parts));
        assert_eq!(root.view, None);
        assert_eq!(root.limit, Some(5));
        assert_eq!(builder.steps()[1].name, "parts.end");
        assert_eq!(builder.steps()[1].join(), Some(&JoinKind::EdgeTarget));
    }

    #[test]
    fn test_edge_root_only_traverses_to_end_nodes() {
        let parts = InstanceId::new("shop", "Product.parts");
        let err = QueryBuilder::edges("parts", parts, Some(&product()))
            .direct_relation("parts", "category", &category())
            .unwrap_err();
        assert_matches!(err, ClientError::Validation(_));

        let err = QueryBuilder::new("product", &product())
            .end_nodes(&product())
            .unwrap_err();
        assert_matches!(err, ClientError::Validation(_));
    }

    #[test]
    fn test_root_filter_is_dumped() {
        let name = TextFilter::for_view(&product(), "name").unwrap().prefix("wid");
        let builder = QueryBuilder::new("product", &product()).filter(&name);
        assert!(builder.root().filter.is_some());
    }
}
