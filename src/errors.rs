use std::time::Duration;

use mongodb::bson;
use mongodb::error::Error as MongoError;

use crate::enums::Operation;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    #[error("{0}")]
    Mongo(#[from] MongoError),

    #[error("Error parsing ObjectID {0}")]
    ParseObjectID(String),

    #[error("{0}")]
    SerializeMongoResponse(#[from] bson::de::Error),

    #[error("{0}")]
    SerializeDocument(#[from] bson::ser::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error("{0}")]
    BadRequest(#[from] BadRequest),

    #[error("{0}")]
    Internal(#[from] Internal),
}

impl Error {
    /// Failures the calling layer should surface loudly instead of retrying:
    /// a latched connection failure, or a delete or update that did not go
    /// through. `operation` labels driver errors; a timeout carries its own.
    pub fn is_unrecoverable(&self, operation: Operation) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Timeout { operation, .. } => operation.escalates_on_failure(),
            Error::Mongo(_) => operation.escalates_on_failure(),
            _ => false,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Error::BadRequest(BadRequest {
            message: message.to_string(),
        })
    }

    pub fn internal_err(message: &str) -> Self {
        Error::Internal(Internal {
            message: message.to_string(),
        })
    }
}

/// Outcome of a failed connection setup. Latched by the connection manager and
/// handed out to every later caller, hence `Clone`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("Failed to initialize MongoDB client: {0}")]
    Connect(MongoError),

    #[error("MongoDB did not answer ping: {0}")]
    Ping(MongoError),

    #[error("MongoDB connection setup did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(thiserror::Error, Debug)]
#[error("Bad Request: {message}")]
pub struct BadRequest {
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
#[error("Internal error: {message}")]
pub struct Internal {
    pub message: String,
}
