//! Error types of the CouchDB stats store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Building the HTTP client failed.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Client failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a request against the database itself.
    #[error("failed to reach CouchDB database `{database}`")]
    Database {
        /// Database name.
        database: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Returned status.
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Document path.
        path: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Document path.
        path: String,
        /// Returned status.
        status: StatusCode,
    },
    /// The document was written concurrently (HTTP 409).
    #[error("conflicting CouchDB revision for `{path}`")]
    Conflict {
        /// Document path.
        path: String,
    },
    /// Response payload could not be decoded.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Document path.
        path: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        StorageError::unavailable("CouchDB stats store".into(), err)
    }
}
