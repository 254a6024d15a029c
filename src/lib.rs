//! Typed client for a graph-shaped data modeling service.
//!
//! - [`filters`]: typed predicates that compile to the wire filter tree
//! - [`api`]: cursor-paginated list, search, aggregate and retrieve
//! - [`query`]: multi-step graph reads over direct relations, reverse
//!   relations and edges
//! - [`write`]: object graphs flattened into deduplicated node and edge applies
//!
//! All remote calls go through the [`transport::Transport`] trait;
//! [`transport::HttpTransport`] is the HTTPS implementation.

pub mod api;
pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod query;
pub mod transport;
pub mod write;

pub use error::{ClientError, Result};
