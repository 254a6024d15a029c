//! Graph-shaped reads
//!
//! A query is a root step plus traversal steps, each linked to the step it
//! takes its join key from:
//! - direct relation: follow identities stored on the upstream rows
//! - reverse relation: find rows whose relation points back upstream
//! - edge: edges of a type touching the upstream rows, then their far ends
//!
//! A query may instead be rooted at the edges of one type
//! ([`QueryBuilder::edges`]), optionally followed by their end nodes.
//!
//! ```rust,ignore
//! let products = QueryBuilder::new("product", &product)
//!     .filter(&filters)
//!     .direct_relation("product", "category", &category)?
//!     .edge("product", "parts", &product)?
//!     .execute(&transport)
//!     .await?;
//! ```
//!
//! Steps run one at a time in registration order. A failure in any step
//! fails the whole query; there are no partial results.

mod builder;
mod executor;
mod unpack;

pub use builder::{JoinKind, QueryBuilder, QueryStep, RetrieveDepth, StepLink};
pub use executor::StepResults;
pub use unpack::{FromResolved, Related, Relation, ResolvedEdge, ResolvedNode};

use tracing::debug;

use crate::error::{ClientError, Result};
use crate::models::InstanceType;
use crate::transport::Transport;

impl QueryBuilder {
    /// Run all steps and return the raw rows per step.
    pub async fn fetch_rows(&self, transport: &dyn Transport) -> Result<StepResults> {
        debug!(root = %self.root().name, steps = self.steps().len(), "Executing query");
        executor::run(self, transport).await
    }

    /// Run the query and assemble the root rows into result trees.
    pub async fn execute(&self, transport: &dyn Transport) -> Result<Vec<ResolvedNode>> {
        self.expect_root(InstanceType::Node)?;
        let results = self.fetch_rows(transport).await?;
        Ok(unpack::Unpacker::new(self, &results).unpack())
    }

    /// Run an edge-rooted query and return its edges, each with its end node
    /// as the target.
    pub async fn execute_edges(&self, transport: &dyn Transport) -> Result<Vec<ResolvedEdge>> {
        self.expect_root(InstanceType::Edge)?;
        let results = self.fetch_rows(transport).await?;
        Ok(unpack::Unpacker::new(self, &results).unpack_edges())
    }

    fn expect_root(&self, instance_type: InstanceType) -> Result<()> {
        let root = self.root();
        if root.instance_type == instance_type {
            return Ok(());
        }
        let (reads, method) = match root.instance_type {
            InstanceType::Node => ("nodes", "execute"),
            InstanceType::Edge => ("edges", "execute_edges"),
        };
        Err(ClientError::Validation(format!(
            "query root '{}' reads {reads}; use {method}",
            root.name
        )))
    }

    /// Run the query and convert each root into `T`.
    pub async fn execute_as<T: FromResolved>(&self, transport: &dyn Transport) -> Result<Vec<T>> {
        self.execute(transport)
            .await?
            .into_iter()
            .map(T::from_resolved)
            .collect()
    }
}
