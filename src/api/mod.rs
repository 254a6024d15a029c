//! Flat read entry points: list, search, aggregate and retrieve.

mod aggregate;
mod instances;

pub use aggregate::*;
pub use instances::{AggregateQuery, DEFAULT_LIMIT, InstancesApi, ListQuery, Page, SearchQuery};
pub(crate) use instances::{collect_pages, source_selector};
