use bson::document::ValueAccessError;
use bson::{Bson, Document};
use mongodb::error::Error as MongoError;
use std::result::Result as StdResult;
use thiserror::Error;

/// Errors which can stop a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Any error reported by the mongodb driver which is not a command failure.
    #[error("Mongodb connection error")]
    MongoError(#[from] MongoError),
    /// The server executed a command and reported a failure.
    #[error("Command failed with code {code} ({code_name}): {message}")]
    Command {
        /// server error code, 0 when the server didn't send one.
        code: i32,
        /// server error code name, may be empty.
        code_name: String,
        /// server error message.
        message: String,
    },
    /// The server replied to `applyOps` without `ok: 1`.
    #[error("Server gave error applying ops: {0:?}")]
    ApplyOplogError(Document),
    /// A document key is missing or has an unexpected type.
    #[error("Bson value access error")]
    BsonError(#[from] ValueAccessError),
    /// A document can't be deserialized.
    #[error("Bson deserialize error")]
    BsonDeError(#[from] bson::de::Error),
    /// The source oplog has no entry, so there is no starting point.
    #[error("Source oplog is empty, can't find oplog head")]
    EmptyOplog,
    /// None of the source databases match the configured database.
    #[error("No databases found")]
    NoDatabases,
    /// An update oplog targets a document which no longer exists on the source.
    #[error("Source document {id} in namespace {ns:?} not found")]
    SourceDocMissing {
        /// source namespace of the document.
        ns: String,
        /// identifier of the document.
        id: Bson,
    },
    /// An oplog can't be used for the requested operation.
    #[error("Invalid oplog: {0}")]
    InvalidOplog(String),
    /// Permission check failed for a database.
    #[error("Check permission for database {db:?} failed, connection string: {uri:?}, detailed: {detail:?}")]
    PermissionError {
        /// connection string.
        uri: String,
        /// database name.
        db: String,
        /// detailed error.
        detail: MongoError,
    },
    /// Configuration is incomplete or invalid.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    /// Configuration file can't be parsed.
    #[error("Configuration file parse error")]
    ConfigParseError(#[from] toml::de::Error),
    /// Interrupt handler can't be installed.
    #[error("Install interrupt handler failed")]
    SignalError(#[from] ctrlc::Error),
    /// Configuration file can't be read.
    #[error("Io error")]
    IoError(#[from] std::io::Error),
}

/// Result type of oplog sync.
pub type Result<T> = StdResult<T, SyncError>;
