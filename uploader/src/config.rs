//! Uploader configuration.
//!
//! A single JSON document names the target table, the CSV separator, the
//! batch size, the column mapping, log settings and default connect options:
//!
//! ```json
//! {
//!   "table": "users",
//!   "csv_separator": ",",
//!   "batch_size": 100,
//!   "columns": {
//!     "name":  {"type": "string", "nullable": false, "transformer": ["lower", "ucfirst"]},
//!     "email": {"type": "string", "unique": true, "validator": ["email"]}
//!   },
//!   "log": {"dir": "./logs", "filename": "uploader.log", "level": "info"},
//!   "database": {"driver": "mysql", "host": "localhost", "dbname": "users"}
//! }
//! ```
//!
//! Rules are resolved while the document is deserialized, so an unknown
//! transformer or validator name is reported here and never mid-upload.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::ConnectOptions;
use crate::error::{ConfigError, ConfigResult};
use crate::models::ColumnMapping;

/// Default log file name inside `log.dir`
pub const DEFAULT_LOG_FILENAME: &str = "uploader.log";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid embedded identifier pattern"));

/// Whether `name` can be used as a table or column name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Complete uploader configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target table
    #[serde(alias = "importTableName")]
    pub table: String,

    /// Single-byte separator, `\t`/`tab`, or `auto`
    #[serde(default = "default_separator", alias = "csvSeparator")]
    pub csv_separator: String,

    /// Rows per INSERT statement
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: usize,

    /// Column declarations, in DDL order
    #[serde(default, alias = "columnMapping")]
    pub columns: ColumnMapping,

    #[serde(default)]
    pub log: LogConfig,

    /// Defaults for connect options, overridden from the command line
    #[serde(default)]
    pub database: ConnectOptions,
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_batch_size() -> usize {
    1
}

/// Log output settings
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory of the log file. No file is written when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_log_filename")]
    pub filename: String,

    /// Default filter directive, `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_filename() -> String {
    DEFAULT_LOG_FILENAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filename: default_log_filename(),
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Full path of the log file, if file logging is enabled.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(&self.filename))
    }
}

impl Config {
    /// Configuration with defaults for everything but the table and columns.
    pub fn new(table: impl Into<String>, columns: ColumnMapping) -> Self {
        Self {
            table: table.into(),
            csv_separator: default_separator(),
            batch_size: default_batch_size(),
            columns,
            log: LogConfig::default(),
            database: ConnectOptions::default(),
        }
    }

    /// Read, parse and check a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and check a configuration document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.csv_separator = separator.into();
        self
    }

    /// Check identifiers, batch size and separator.
    pub fn validate(&self) -> ConfigResult<()> {
        if !is_identifier(&self.table) {
            return Err(ConfigError::InvalidIdentifier(self.table.clone()));
        }
        if let Some(name) = self.columns.names().find(|n| !is_identifier(n)) {
            return Err(ConfigError::InvalidIdentifier(name.to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        self.delimiter()?;
        Ok(())
    }

    /// Delimiter byte, or `None` to detect it from the header line.
    pub fn delimiter(&self) -> ConfigResult<Option<u8>> {
        parse_delimiter(&self.csv_separator)
    }

    /// Connect options from the file, overlaid with `overrides`.
    pub fn connect_options(&self, overrides: ConnectOptions) -> ConnectOptions {
        self.database.clone().merge(overrides)
    }
}

/// Parse a separator setting: one ASCII character, `\t`, `tab` or `auto`.
pub fn parse_delimiter(value: &str) -> ConfigResult<Option<u8>> {
    match value {
        "auto" => Ok(None),
        "\\t" | "tab" | "\t" => Ok(Some(b'\t')),
        s if s.len() == 1 && s.is_ascii() && s != "\"" && s != "\n" && s != "\r" => Ok(Some(s.as_bytes()[0])),
        other => Err(ConfigError::Invalid(format!(
            "csv_separator must be a single ASCII character or \"auto\", got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use std::io::Write;

    const CAMEL_CASE_KEYS: &str = r#"{
        "importTableName": "users",
        "csvSeparator": ";",
        "columnMapping": {
            "name": {
                "type": "string",
                "nullable": false,
                "validator": {"string": {"min_length": 1, "max_length": 255}},
                "transformer": ["lower", "ucfirst"]
            },
            "surname": {
                "type": "string",
                "nullable": false,
                "validator": {"string": {"min_length": 1, "max_length": 255}},
                "transformer": ["lower", "ucfirst"]
            },
            "email": {
                "type": "string",
                "nullable": false,
                "unique": true,
                "validator": ["email"],
                "transformer": ["lower"]
            }
        },
        "log": {"dir": "./", "filename": "uploader.log"}
    }"#;

    #[test]
    fn test_camel_case_keys() {
        let config = Config::from_json(CAMEL_CASE_KEYS).unwrap();
        assert_eq!(config.table, "users");
        assert_eq!(config.delimiter().unwrap(), Some(b';'));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.columns.names().collect::<Vec<_>>(), vec!["name", "surname", "email"]);

        let email = config.columns.get("email").unwrap();
        assert_eq!(email.column_type, ColumnType::String);
        assert!(email.unique);
        assert_eq!(email.validator[0].name(), "email");

        assert_eq!(config.log.file_path(), Some(PathBuf::from("./uploader.log")));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_json(r#"{"table": "t", "columns": {"a": {}}}"#).unwrap();
        assert_eq!(config.csv_separator, ",");
        assert_eq!(config.batch_size, 1);
        assert!(config.log.file_path().is_none());
        assert_eq!(config.database, ConnectOptions::default());
    }

    #[test]
    fn test_invalid_identifiers() {
        let err = Config::from_json(r#"{"table": "users; DROP TABLE x", "columns": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier(_)));

        let err = Config::from_json(r#"{"table": "users", "columns": {"e-mail": {}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier(ref n) if n == "e-mail"));

        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1st"));
    }

    #[test]
    fn test_batch_size_must_be_positive() {
        let err = Config::from_json(r#"{"table": "t", "batch_size": 0}"#).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_unknown_rule_fails_at_load() {
        let err = Config::from_json(r#"{"table": "t", "columns": {"a": {"validator": ["phone"]}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("auto").unwrap(), None);
        assert_eq!(parse_delimiter("\\t").unwrap(), Some(b'\t'));
        assert_eq!(parse_delimiter("|").unwrap(), Some(b'|'));
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("é").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn test_connect_options_overlay() {
        let config = Config::from_json(
            r#"{"table": "t", "database": {"driver": "mysql", "host": "localhost", "dbname": "users"}}"#,
        )
        .unwrap();
        let merged = config.connect_options(ConnectOptions::default().user("loader").password("pw"));
        assert_eq!(merged.driver, "mysql");
        assert_eq!(merged.host, "localhost");
        assert_eq!(merged.user, "loader");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::File::create(&path).unwrap().write_all(CAMEL_CASE_KEYS.as_bytes()).unwrap();
        assert!(Config::load(&path).is_ok());

        let err = Config::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_example_config() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json")).unwrap();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.database.driver().unwrap(), crate::database::Driver::Sqlite);
    }
}
