use thiserror::Error;

/// Errors from the resource manager client
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("resource manager returned {status}: {body}")]
    Status {
        status: http::StatusCode,
        body: String,
    },

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("invalid resource URI: {0}")]
    InvalidResourceUri(String),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status {
        status: http::StatusCode,
        body: String,
    },

    #[error("invalid token endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Terminal failure of a single-resource reconciliation.
///
/// Messages are surfaced to the event sender and end up in deployment
/// error maps, so they stay short.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Tags are not supported: {0}")]
    UnsupportedResourceKind(String),

    #[error("Valid AppId tag not found")]
    MissingAppIdTag,

    #[error("Could not find metadata for AppId {app_id}: {reason}")]
    MetadataLookupFailed { app_id: String, reason: String },

    #[error("Tag update error: {0}")]
    TagWriteFailed(String),
}

impl ReconcileError {
    /// Short label used to tag failure metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::UnsupportedResourceKind(_) => "unsupported_resource_kind",
            ReconcileError::MissingAppIdTag => "missing_app_id_tag",
            ReconcileError::MetadataLookupFailed { .. } => "metadata_lookup_failed",
            ReconcileError::TagWriteFailed(_) => "tag_write_failed",
        }
    }
}

/// Reasons an incoming event batch cannot be processed at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Event batch is empty")]
    EmptyBatch,

    #[error("Event carries no operation name")]
    MissingOperationName,

    #[error("Event carries no resource URI")]
    MissingResourceUri,
}
