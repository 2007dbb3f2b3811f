//! Domain models for the uploader.
//!
//! - [`ColumnSpec`] / [`ColumnMapping`] - declarative per-column rules
//! - [`Row`] - one raw input record as produced by the reader
//! - [`Record`] / [`SqlValue`] - a processed row ready for insertion
//! - [`UploadResult`] - final report of an upload run

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::transform::Transformer;
use crate::validation::Validator;

// =============================================================================
// Column mapping
// =============================================================================

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Integer,
}

impl From<String> for ColumnType {
    /// Unknown type names fall back to `string`.
    fn from(name: String) -> Self {
        match name.trim().to_lowercase().as_str() {
            "int" | "integer" => ColumnType::Integer,
            _ => ColumnType::String,
        }
    }
}

impl ColumnType {
    /// Convert a transformed field value into the value bound for this type.
    ///
    /// Integer columns bind `NULL` for blank input and keep unparsable input
    /// as text so the database reports the problem.
    pub fn convert(&self, value: String) -> SqlValue {
        match self {
            ColumnType::String => SqlValue::Text(value),
            ColumnType::Integer => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    SqlValue::Null
                } else {
                    trimmed
                        .parse::<i64>()
                        .map(SqlValue::Integer)
                        .unwrap_or(SqlValue::Text(value))
                }
            }
        }
    }
}

/// Declaration of one column: type, constraints and processing rules.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub unique: bool,

    /// Applied in order, output of one feeds the next.
    #[serde(default, alias = "transformers", deserialize_with = "deserialize_rules")]
    pub transformer: Vec<Transformer>,

    /// Checked in order against the raw value, first failure wins.
    #[serde(default, alias = "validators", deserialize_with = "deserialize_rules")]
    pub validator: Vec<Validator>,
}

fn default_nullable() -> bool {
    true
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            column_type: ColumnType::String,
            nullable: true,
            unique: false,
            transformer: Vec::new(),
            validator: Vec::new(),
        }
    }
}

impl ColumnSpec {
    pub fn string() -> Self {
        Self::default()
    }

    pub fn integer() -> Self {
        Self {
            column_type: ColumnType::Integer,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer.push(transformer);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator.push(validator);
        self
    }
}

/// Ordered mapping from column name to [`ColumnSpec`].
///
/// Keeps the order of the configuration document so generated DDL lists
/// columns the way they were declared.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    columns: Vec<(String, ColumnSpec)>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a column, keeping its first position.
    pub fn insert(&mut self, name: impl Into<String>, spec: ColumnSpec) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = spec,
            None => self.columns.push((name, spec)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.insert(name, spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnSpec)> {
        self.columns.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<'de> Deserialize<'de> for ColumnMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ColumnMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of column name to column specification")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut mapping = ColumnMapping::new();
                while let Some((name, spec)) = access.next_entry::<String, ColumnSpec>()? {
                    if mapping.get(&name).is_some() {
                        return Err(serde::de::Error::custom(format!("duplicate column '{}'", name)));
                    }
                    mapping.columns.push((name, spec));
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Deserialize an ordered rule list (transformers or validators).
///
/// Accepts three spellings per entry:
///
/// ```json
/// ["email", {"type": "string", "min_length": 1}, {"string": {"max_length": 255}}]
/// ```
///
/// A single object keyed by rule name (`{"string": {...}, "email": {}}`) is
/// read as a list in document order.
fn deserialize_rules<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    use serde_json::{Map, Value};

    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .into_iter()
            .map(|(name, params)| {
                let mut single = Map::new();
                single.insert(name, params);
                Value::Object(single)
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    entries
        .into_iter()
        .map(|entry| serde_json::from_value(normalize_rule(entry)).map_err(serde::de::Error::custom))
        .collect()
}

fn normalize_rule(entry: serde_json::Value) -> serde_json::Value {
    use serde_json::{Map, Value};

    match entry {
        Value::String(name) => {
            let mut obj = Map::new();
            obj.insert("type".into(), Value::String(name));
            Value::Object(obj)
        }
        Value::Object(obj) if obj.len() == 1 && !obj.contains_key("type") => {
            let (name, params) = obj.into_iter().next().unwrap_or_default();
            let mut out = match params {
                Value::Object(params) => params,
                _ => Map::new(),
            };
            out.insert("type".into(), Value::String(name));
            Value::Object(out)
        }
        other => other,
    }
}

/// A compiled regular expression read from configuration.
///
/// Invalid patterns fail while the configuration is loaded.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: regex::Regex,
    whole: regex::Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: regex::Regex::new(pattern)?,
            whole: regex::Regex::new(&format!(r"\A(?:{})\z", pattern))?,
        })
    }

    /// Unanchored expression, matching anywhere in a value.
    pub fn regex(&self) -> &regex::Regex {
        &self.regex
    }

    /// Whether the entire value matches, whatever anchors the pattern has.
    pub fn is_full_match(&self, value: &str) -> bool {
        self.whole.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pattern::new(&raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Rows and records
// =============================================================================

/// One raw input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based data line number (header excluded).
    pub number: u64,
    /// Line of the source file the record starts on (header is line 1).
    pub line: u64,
    /// (column, raw value) pairs in header order.
    pub fields: Vec<(String, String)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }
}

/// A value bound into an INSERT statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Null,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

/// A transformed row waiting in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.fields.push((column.into(), value.into()));
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when both records list the same columns in the same order.
    pub fn same_columns(&self, other: &Record) -> bool {
        self.columns().eq(other.columns())
    }
}

// =============================================================================
// Upload report
// =============================================================================

/// Summary of one upload run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    inserted: u64,
    processed: u64,
    skipped: u64,
    errors: Vec<String>,
}

impl UploadResult {
    pub fn new(inserted: u64, processed: u64, skipped: u64, errors: Vec<String>) -> Self {
        Self {
            inserted,
            processed,
            skipped,
            errors,
        }
    }

    /// Rows written to the table.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Data lines seen (line number of the last row).
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Rows rejected by a validator plus failed batches.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl fmt::Display for UploadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processed: {}", self.processed)?;
        writeln!(f, "Inserted:  {}", self.inserted)?;
        write!(f, "Skipped:   {}", self.skipped)?;
        if !self.errors.is_empty() {
            write!(f, "\nErrors ({}):", self.errors.len())?;
            for err in &self.errors {
                write!(f, "\n  - {}", err)?;
            }
        }
        Ok(())
    }
}
