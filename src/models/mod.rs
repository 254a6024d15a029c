//! Core data model: identities, wire instances and view descriptors.

mod identity;
mod instance;
mod view;

pub use identity::*;
pub use instance::*;
pub use view::*;
