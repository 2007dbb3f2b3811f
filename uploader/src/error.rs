//! Error types for the upload pipeline.
//!
//! Errors are grouped by the layer that raises them:
//!
//! - [`ConfigError`] - configuration file, rule lookup and connect options
//! - [`CsvError`] - row reader errors
//! - [`DatabaseError`] - connection, DDL and insert errors
//! - [`SchemaError`] - target table missing or already present
//! - [`InvalidValue`] - a single field rejected by a validator (recoverable)
//! - [`UploadError`] - top-level errors returned by the pipeline
//!
//! Conversions are provided via `From` so `?` works across layers.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading configuration or building connect options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Cannot read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Driver name is not one of mysql, pgsql, sqlite.
    #[error("Unknown database driver [{0}]")]
    UnknownDriver(String),

    /// A connect option required by the driver is missing or empty.
    #[error("[{driver}] option '{option}' must be non empty string")]
    MissingOption { driver: String, option: String },

    /// A connect option has a value the driver cannot use.
    #[error("[{driver}] invalid value for option '{option}': {message}")]
    InvalidOption {
        driver: String,
        option: String,
        message: String,
    },

    /// Table or column name is not a plain SQL identifier.
    #[error("Invalid identifier '{0}': expected letters, digits and '_' only")]
    InvalidIdentifier(String),

    /// A global log subscriber is already installed.
    #[error("Logging is already initialised: {0}")]
    LoggerInstalled(String),

    /// Any other semantic problem with the configuration.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// CSV Reader Errors
// =============================================================================

/// Errors raised by the row reader.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed CSV content.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CsvError::IoError(io),
            _ => CsvError::ParseError { line, message },
        }
    }
}

// =============================================================================
// Database Errors
// =============================================================================

/// Errors raised by the database backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connect options could not be built.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The driver rejected the connection.
    #[error("Could not connect to the database: {0}")]
    Connection(String),

    /// An operation needing a connection was called before `open`.
    #[error("No database connection")]
    NotConnected,

    /// A batch violated a uniqueness constraint.
    #[error("{message}")]
    Duplicate {
        /// Driver specific error code (1062 for MySQL, 23505 for PostgreSQL, ...)
        code: Option<String>,
        /// Driver message
        message: String,
    },

    /// Rows of one batch do not share the field set of the first row.
    #[error("Row {index} of the batch has fields [{found}], expected [{expected}]")]
    MismatchedBatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// Any other query failure.
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Whether the error is a duplicate-key condition the pipeline recovers from.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate { .. })
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Target table state does not allow the requested operation.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Table \"{0}\" not exists")]
    TableMissing(String),

    #[error("The table \"{0}\" already exists")]
    TableExists(String),
}

// =============================================================================
// Validation
// =============================================================================

/// A field value rejected by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvalidValue {
    /// Name of the failing validator (`email`, `string`, ...)
    pub validator: &'static str,
    /// Human readable reason
    pub message: String,
}

impl InvalidValue {
    pub fn new(validator: &'static str, message: impl Into<String>) -> Self {
        Self {
            validator,
            message: message.into(),
        }
    }
}

// =============================================================================
// Upload Errors (top-level)
// =============================================================================

/// Fatal errors of an upload or table creation call.
///
/// Any of these aborts the call; no partial result is returned.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Configuration or connect option error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input file does not exist.
    #[error("A CSV file not found \"{}\"", .0.display())]
    FileNotFound(PathBuf),

    /// Database connection failed.
    #[error("Could not connect to the database, please check connection options. {0}")]
    Connection(String),

    /// Table missing or already present.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Row reader failed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Non-recoverable database error.
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for UploadError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Config(e) => UploadError::Config(e),
            DatabaseError::Connection(msg) => UploadError::Connection(msg),
            other => UploadError::Database(other),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for reader operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
