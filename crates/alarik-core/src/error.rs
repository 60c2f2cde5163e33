//! Error types for the metadata store and configuration layer.

/// Errors produced by the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The underlying SQLite operation failed.
    #[error("metadata store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record that was expected to exist was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record (user, bucket, access key, version).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A uniqueness constraint was violated.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// The kind of record.
        entity: &'static str,
        /// The conflicting identifier.
        id: String,
    },

    /// A filesystem step interleaved with a metadata transaction failed.
    /// The transaction has been rolled back.
    #[error("storage publish failed, transaction rolled back: {0}")]
    PublishFailed(#[source] std::io::Error),

    /// The transaction commit failed after the filesystem publish had
    /// already happened. The caller must delete the published file.
    #[error("metadata commit failed after publish: {0}")]
    CommitFailedAfterPublish(#[source] rusqlite::Error),

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

/// Errors produced while reading the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable holds an unparseable value.
    #[error("invalid value for {var}: {value}")]
    InvalidVar {
        /// The variable name.
        var: &'static str,
        /// The offending value.
        value: String,
    },
}
