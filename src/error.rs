//! Error types for the viewgraph client.

use thiserror::Error;

/// Error type for every fallible client operation.
///
/// Construction-time failures (`TypeMismatch`, `MixedRelationShapes`,
/// `Validation`, `UnknownProperty`, `UnknownStep`, `DuplicateStep`,
/// `IncompatibleEdge`) are raised before any request is built. The remaining
/// variants only occur once a request has been dispatched.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A filter value of the wrong kind was supplied.
    #[error("type mismatch for '{property}': expected {expected}, got {found}")]
    TypeMismatch {
        /// Property the filter targets.
        property: String,
        /// Kind the filter accepts.
        expected: &'static str,
        /// Kind that was supplied.
        found: String,
    },

    /// A relation filter list mixed bare external ids with space-qualified ids.
    #[error("relation values for '{property}' mix bare external ids and (space, external_id) pairs")]
    MixedRelationShapes {
        /// Property the filter targets.
        property: String,
    },

    /// Malformed input, e.g. a bare external id where no default space is known.
    #[error("validation error: {0}")]
    Validation(String),

    /// A property name that the view does not declare.
    #[error("view '{view}' has no property '{property}'")]
    UnknownProperty {
        /// View identifier in `space:externalId/version` form.
        view: String,
        /// The unknown property name.
        property: String,
    },

    /// A query step links to a step that was never registered.
    #[error("query step '{0}' is not registered")]
    UnknownStep(String),

    /// Two query steps were registered under the same name.
    #[error("query step '{0}' is already registered")]
    DuplicateStep(String),

    /// An edge connects a node whose view is not expected by the connection.
    #[error("edge '{edge_type}' cannot point at a '{found}' node, expected one of [{expected}]")]
    IncompatibleEdge {
        /// Edge type identifier.
        edge_type: String,
        /// Comma separated expected views.
        expected: String,
        /// View of the far-end node.
        found: String,
    },

    /// The service answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Network or protocol failure in the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request or response body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the failure is worth retrying (rate limits, timeouts, 5xx, network).
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Remote { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
