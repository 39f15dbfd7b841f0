//! Error types for the Kubegres Restore Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic concurrency conflict on update
    #[error("Conflict while updating {0}, the object was modified concurrently")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A create, update or delete issued by an enforcer failed
    #[error("{message}")]
    Enforcement {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Error::Template(msg.into())
    }

    /// Map a write error, turning HTTP 409 into [`Error::Conflict`]
    pub fn from_write(err: kube::Error, what: impl Into<String>) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(what.into()),
            other => Error::Kube(other),
        }
    }

    /// Wrap an enforcer failure with the message reported to the user
    pub fn enforcement(message: impl Into<String>, source: Error) -> Self {
        Error::Enforcement {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// The underlying error, looking through enforcement wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Enforcement { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error is a version conflict that should be retried quickly
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Conflict(_))
    }
}
