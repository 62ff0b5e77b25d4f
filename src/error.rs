//! Error types for the Function controller

use kube::runtime::finalizer;
use thiserror::Error;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A cluster call for one owned resource kind failed
    #[error("{kind} {name}: {source}")]
    Resource {
        kind: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// Finalizer bookkeeping failed, or the apply or cleanup it wrapped did
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<finalizer::Error<Error>>),

    /// Runtime id not present in the runtime registry
    #[error("Unknown runtime: {0}")]
    UnknownRuntime(String),

    /// Spec that can never be satisfied without an edit
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed `namespace/name` key
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// Optimistic-concurrency retries ran out
    #[error("Conflict retries exhausted updating {kind} {name}")]
    ConflictRetriesExhausted { kind: String, name: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid spec error
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Error::InvalidSpec(msg.into())
    }

    /// Attach the resource kind and name a cluster call was made for
    pub fn resource(kind: impl Into<String>, name: impl Into<String>, source: Error) -> Self {
        Error::Resource {
            kind: kind.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The API error response underneath any wrapping, if there is one
    fn api_response(&self) -> Option<&kube::core::ErrorResponse> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp),
            Error::Resource { source, .. } => source.api_response(),
            Error::Finalizer(e) => match e.as_ref() {
                finalizer::Error::ApplyFailed(inner) | finalizer::Error::CleanupFailed(inner) => {
                    inner.api_response()
                }
                finalizer::Error::AddFinalizer(kube::Error::Api(resp))
                | finalizer::Error::RemoveFinalizer(kube::Error::Api(resp)) => Some(resp),
                _ => None,
            },
            _ => None,
        }
    }

    /// HTTP status code of the underlying API error, if any
    fn api_code(&self) -> Option<u16> {
        self.api_response().map(|resp| resp.code)
    }

    /// Reason string of the underlying API error, if any
    fn api_reason(&self) -> Option<&str> {
        self.api_response().map(|resp| resp.reason.as_str())
    }

    /// The object does not exist
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// A create collided with an existing object
    pub fn is_already_exists(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() == Some("AlreadyExists")
    }

    /// An update was rejected because the stored object changed underneath it
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409) && self.api_reason() != Some("AlreadyExists")
    }

    /// Errors that no amount of retrying will fix; a spec edit is required
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::UnknownRuntime(_) | Error::InvalidSpec(_) | Error::InvalidKey(_) => true,
            Error::Resource { source, .. } => source.is_permanent(),
            Error::Finalizer(e) => match e.as_ref() {
                finalizer::Error::ApplyFailed(inner) | finalizer::Error::CleanupFailed(inner) => {
                    inner.is_permanent()
                }
                finalizer::Error::UnnamedObject | finalizer::Error::InvalidFinalizer => true,
                _ => false,
            },
            _ => false,
        }
    }
}
