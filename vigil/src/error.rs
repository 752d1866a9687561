//! Error types for the vigil metrics store.

use std::time::Duration;

use thiserror::Error;

/// The main error type for all vigil operations.
///
/// Nothing in the store retries on error. Every variant propagates to the
/// immediate caller, who owns retry policy.
#[derive(Error, Debug)]
pub enum VigilError {
    /// The caller's cancellation token was already cancelled on entry.
    #[error("operation cancelled")]
    Cancelled,

    /// Error opening or initializing the store file.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transaction, table, or storage operation failed inside the engine.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A sample could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A stored record could not be deserialized. Signals corruption.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A latest-value query found no samples.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// The caller supplied a value the store cannot key or container.
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    /// The on-disk schema is not one this build understands.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Store configuration is invalid or unreadable.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl VigilError {
    /// Returns `true` if the operation was rejected because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for the expected "no history yet" outcome of a
    /// latest-value query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if a stored record failed to decode.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Errors that can occur when opening or creating a store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file could not be created or opened.
    #[error("failed to access store file '{path}': {source}")]
    FileAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The engine refused to open the file.
    #[error("failed to open store '{path}': {source}")]
    Open {
        /// The store file path.
        path: String,
        /// The underlying engine error.
        #[source]
        source: redb::DatabaseError,
    },

    /// Another handle kept the file locked for longer than the open timeout.
    #[error("store '{path}' is locked by another handle (waited {timeout:?})")]
    LockTimeout {
        /// The store file path.
        path: String,
        /// How long the open waited for the lock.
        timeout: Duration,
    },
}

/// An engine failure, with the operation and container it happened in.
#[derive(Error, Debug)]
#[error("{operation} on '{container}' failed: {source}")]
pub struct EngineError {
    /// The store operation that was running.
    pub operation: &'static str,
    /// The container (table) being accessed.
    pub container: String,
    /// The underlying engine error.
    #[source]
    pub source: redb::Error,
}

impl EngineError {
    /// Wraps an engine error with operation and container context.
    pub fn new(
        operation: &'static str,
        container: impl Into<String>,
        source: impl Into<redb::Error>,
    ) -> Self {
        Self {
            operation,
            container: container.into(),
            source: source.into(),
        }
    }
}

/// A sample failed to serialize.
#[derive(Error, Debug)]
#[error("failed to encode {kind} sample: {source}")]
pub struct EncodeError {
    /// The sample kind being encoded.
    pub kind: &'static str,
    /// The underlying serialization error.
    #[source]
    pub source: bincode::Error,
}

/// A stored record failed to deserialize.
#[derive(Error, Debug)]
#[error("failed to decode {kind} record: {source}")]
pub struct DecodeError {
    /// The sample kind the record was expected to hold.
    pub kind: &'static str,
    /// The underlying deserialization error.
    #[source]
    pub source: bincode::Error,
}

/// A latest-value query found an empty or absent container.
#[derive(Error, Debug)]
#[error("no samples found in '{container}'")]
pub struct NotFoundError {
    /// The container (or service sub-container) that was queried.
    pub container: String,
}

/// Errors for caller-supplied values the store rejects.
#[derive(Error, Debug)]
pub enum InputError {
    /// Process samples need a service name to select their sub-container.
    #[error("service name cannot be empty")]
    EmptyServiceName,

    /// The timestamp cannot be represented as nanoseconds since the epoch.
    #[error("invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Why the timestamp was rejected.
        reason: String,
    },
}

/// Errors about the persisted schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The store was written by a newer schema version.
    #[error("unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedVersion {
        /// The version stamped in the store metadata.
        found: u64,
        /// The newest version this build can read.
        supported: u64,
    },
}

/// Errors for store configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what is invalid.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// The config file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::StoreConfig`].
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        /// The config file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, VigilError>`.
pub type Result<T> = std::result::Result<T, VigilError>;
