//! # csvload - CSV to relational table uploader
//!
//! csvload reads a delimited file, transforms and validates every field
//! according to a declarative column mapping, and inserts the surviving rows
//! into a MySQL, PostgreSQL or SQLite table in batches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│  RowReader  │────▶│  Transform / │────▶│  TableStore │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │   Validate   │     │  (batched)  │
//! └─────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use csvload::{Config, ConnectOptions, Uploader};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("config.json").unwrap();
//!     let mut uploader = Uploader::with_database(config);
//!     let result = uploader
//!         .upload("users.csv", &ConnectOptions::sqlite("users.db"), false)
//!         .await
//!         .unwrap();
//!     println!("{}", result);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Column mapping, rows, records and the upload report
//! - [`config`] - JSON configuration
//! - [`parser`] - CSV reading with encoding and delimiter detection
//! - [`transform`] - Transformer registry
//! - [`validation`] - Validator registry
//! - [`database`] - Connect options, SQL generation, `sqlx` backend
//! - [`pipeline`] - The upload pipeline
//! - [`logging`] - `tracing` subscriber setup

// Core modules
pub mod error;
pub mod models;
pub mod config;

// Input
pub mod parser;

// Field rules
pub mod transform;
pub mod validation;

// Storage
pub mod database;

// Orchestration
pub mod pipeline;
pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, DatabaseError, InvalidValue, SchemaError, UploadError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ColumnMapping, ColumnSpec, ColumnType, Record, Row, SqlValue, UploadResult,
};

// =============================================================================
// Re-exports - Components
// =============================================================================

pub use config::Config;
pub use database::{ConnectOptions, Database, Driver, TableStore};
pub use parser::RowReader;
pub use pipeline::Uploader;
pub use transform::{transform, Transformer};
pub use validation::{validate, Validator};

/// Markdown overview of every transformer and validator.
pub fn operations_description() -> String {
    format!(
        "{}\n\n{}",
        transform::transformers_description(),
        validation::validators_description()
    )
}
