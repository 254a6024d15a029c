//! Composition of leaf filters under a boolean operator.

use super::Dump;
use super::node::{BoolOp, FilterNode};

/// Ordered list of child filters joined by `and` or `or`.
///
/// Children that carry no constraint are dropped when the container is
/// dumped; an empty result is "no filter" and a single surviving child is
/// returned without a wrapping operator.
pub struct FilterContainer {
    operator: BoolOp,
    children: Vec<Box<dyn Dump + Send + Sync>>,
}

impl FilterContainer {
    pub fn new(operator: BoolOp) -> Self {
        Self {
            operator,
            children: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(BoolOp::And)
    }

    pub fn or() -> Self {
        Self::new(BoolOp::Or)
    }

    pub fn with(mut self, child: impl Dump + Send + Sync + 'static) -> Self {
        self.push(child);
        self
    }

    pub fn push(&mut self, child: impl Dump + Send + Sync + 'static) {
        self.children.push(Box::new(child));
    }

    pub fn operator(&self) -> BoolOp {
        self.operator
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn as_filter(&self) -> Option<FilterNode> {
        let nodes = self.children.iter().filter_map(|c| c.dump()).collect();
        FilterNode::combine(self.operator, nodes)
    }
}

impl Default for FilterContainer {
    fn default() -> Self {
        Self::and()
    }
}

impl Dump for FilterContainer {
    fn dump(&self) -> Option<FilterNode> {
        self.as_filter()
    }
}
