//! Error types shared across loading, generation and output.
use std::path::PathBuf;
use thiserror::Error;

/// Anything that stops an application definition from being accepted.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Json(String),
    #[error("schema at {schema_path}: \"{field}\" is declared as both a required and an optional property")]
    DuplicateProperty { schema_path: String, field: String },
    #[error("schema at {schema_path}: mapping member \"{member}\" redeclares the discriminator \"{discriminator}\"")]
    DiscriminatorRedeclared {
        schema_path: String,
        member: String,
        discriminator: String,
    },
    #[error("procedure \"{path}\" collides with a service of the same name")]
    ProcedureConflict { path: String },
}

/// Failure while rendering a target.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to render source text")]
    Render(#[from] std::fmt::Error),
}

/// Failure while persisting generated source.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A wire value did not match the schema it was decoded against.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("at {path}: {message}")]
pub struct DecodeError {
    pub path: String,
    pub message: String,
}

impl DecodeError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A typed value cannot be written under the schema it was paired with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("at {path}: {message}")]
pub struct EncodeError {
    pub path: String,
    pub message: String,
}

impl EncodeError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Terminal outcome of an event-stream subscription.
#[derive(Debug, Error)]
pub enum SseError {
    /// The transport could not get a response.
    #[error("request failed: {0}")]
    Request(String),
    /// A response body broke off mid-read; yielded by the transport's body stream.
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("gave up after {attempts} consecutive failed attempts")]
    RetriesExhausted { attempts: u32 },
}
