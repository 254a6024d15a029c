//! Typed filter predicate DSL
//!
//! Leaf filters produce wire [`FilterNode`]s with operators:
//! - equals / in (scalar and direct-relation filters)
//! - prefix (text filters)
//! - range with gt / gte / lt / lte (integer, float, date and timestamp filters)
//!
//! [`FilterContainer`] joins leaves with `and` / `or` and hands the result to
//! the list, search, aggregate and query entry points.

mod container;
mod node;
mod relation;
mod scalar;

pub use container::FilterContainer;
pub use node::*;
pub use relation::DirectRelationFilter;
pub use scalar::*;

/// Anything that can produce an optional wire filter.
///
/// `None` means "no constraint" and is dropped by containers.
pub trait Dump {
    fn dump(&self) -> Option<FilterNode>;
}

impl Dump for FilterNode {
    fn dump(&self) -> Option<FilterNode> {
        Some(self.clone())
    }
}

impl Dump for Option<FilterNode> {
    fn dump(&self) -> Option<FilterNode> {
        self.clone()
    }
}
