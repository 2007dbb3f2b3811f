//! Transformer operations
//!
//! Named string-to-string functions that can be chained per column. Every
//! operation is total: it never fails, whatever the input.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Pattern;

/// All available transformations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformer {
    /// Remove leading and trailing whitespace
    Trim,

    /// Convert to lowercase
    #[serde(alias = "lowercase")]
    Lower,

    /// Convert to uppercase
    #[serde(alias = "uppercase")]
    Upper,

    /// Uppercase the first character
    Ucfirst,

    /// Uppercase the first character of every word
    Ucwords,

    /// Replace runs of whitespace with a single space
    CollapseWhitespace,

    /// Replace using regex pattern
    Replace {
        pattern: Pattern,
        #[serde(default)]
        value: String,
    },

    /// Pad string at start to reach target length
    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    /// Pad string at end to reach target length
    PadEnd {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    /// Take `length` characters from `start`
    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    /// Ensure string starts with given prefix
    EnsurePrefix { value: String },

    /// Ensure string ends with given suffix
    EnsureSuffix { value: String },

    /// Map values using a lookup table
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        /// Replacement for values missing from the table (unchanged when absent)
        #[serde(default)]
        default_unmapped: Option<String>,
    },

    /// Remove all non-alphanumeric characters
    Alphanumeric,

    /// Remove all non-digit characters
    DigitsOnly,
}

fn default_pad_char() -> String {
    "0".to_string()
}

impl Transformer {
    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Transformer::Trim => "trim",
            Transformer::Lower => "lower",
            Transformer::Upper => "upper",
            Transformer::Ucfirst => "ucfirst",
            Transformer::Ucwords => "ucwords",
            Transformer::CollapseWhitespace => "collapse_whitespace",
            Transformer::Replace { .. } => "replace",
            Transformer::PadStart { .. } => "pad_start",
            Transformer::PadEnd { .. } => "pad_end",
            Transformer::Substring { .. } => "substring",
            Transformer::EnsurePrefix { .. } => "ensure_prefix",
            Transformer::EnsureSuffix { .. } => "ensure_suffix",
            Transformer::Map { .. } => "map",
            Transformer::Alphanumeric => "alphanumeric",
            Transformer::DigitsOnly => "digits_only",
        }
    }

    /// Apply this transformation to a value
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transformer::Trim => value.trim().to_string(),
            Transformer::Lower => value.to_lowercase(),
            Transformer::Upper => value.to_uppercase(),
            Transformer::Ucfirst => ucfirst(value),
            Transformer::Ucwords => ucwords(value),
            Transformer::CollapseWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
            Transformer::Replace { pattern, value: replacement } => {
                pattern.regex().replace_all(value, replacement.as_str()).into_owned()
            }
            Transformer::PadStart { length, char } => pad(value, *length, char, true),
            Transformer::PadEnd { length, char } => pad(value, *length, char, false),
            Transformer::Substring { start, length } => substring(value, *start, *length),
            Transformer::EnsurePrefix { value: prefix } => {
                if value.starts_with(prefix.as_str()) {
                    value.to_string()
                } else {
                    format!("{}{}", prefix, value)
                }
            }
            Transformer::EnsureSuffix { value: suffix } => {
                if value.ends_with(suffix.as_str()) {
                    value.to_string()
                } else {
                    format!("{}{}", value, suffix)
                }
            }
            Transformer::Map {
                mapping,
                case_insensitive,
                default_unmapped,
            } => map_value(value, mapping, *case_insensitive, default_unmapped.as_deref()),
            Transformer::Alphanumeric => value.chars().filter(|c| c.is_alphanumeric()).collect(),
            Transformer::DigitsOnly => value.chars().filter(|c| c.is_ascii_digit()).collect(),
        }
    }
}

fn ucfirst(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn ucwords(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

fn pad(value: &str, length: usize, pad_char: &str, at_start: bool) -> String {
    let len = value.chars().count();
    if len >= length {
        return value.to_string();
    }
    let pad = pad_char.chars().next().unwrap_or('0');
    let padding: String = std::iter::repeat(pad).take(length - len).collect();
    if at_start {
        format!("{}{}", padding, value)
    } else {
        format!("{}{}", value, padding)
    }
}

fn substring(value: &str, start: usize, length: Option<usize>) -> String {
    let chars = value.chars().skip(start);
    match length {
        Some(l) => chars.take(l).collect(),
        None => chars.collect(),
    }
}

fn map_value(
    value: &str,
    mapping: &HashMap<String, String>,
    case_insensitive: bool,
    default_unmapped: Option<&str>,
) -> String {
    let found = if case_insensitive {
        let key = value.to_lowercase();
        mapping.iter().find(|(k, _)| k.to_lowercase() == key).map(|(_, v)| v)
    } else {
        mapping.get(value)
    };

    match (found, default_unmapped) {
        (Some(v), _) => v.clone(),
        (None, Some(d)) => d.to_string(),
        (None, None) => value.to_string(),
    }
}

/// Get a description of all available transformers
pub fn transformers_description() -> String {
    r#"Available transformers:

| Transformer | Description | Parameters |
|-------------|-------------|------------|
| trim | Remove leading/trailing whitespace | - |
| lower | Convert to lowercase | - |
| upper | Convert to uppercase | - |
| ucfirst | Uppercase the first character | - |
| ucwords | Uppercase the first character of each word | - |
| collapse_whitespace | Squeeze whitespace runs to one space | - |
| replace | Regex pattern replacement | pattern: regex, value: replacement |
| pad_start | Pad string at start | length: target length, char: pad character (default "0") |
| pad_end | Pad string at end | length: target length, char: pad character (default "0") |
| substring | Extract substring | start: start index, length: optional length |
| ensure_prefix | Add prefix if not present | value: prefix string |
| ensure_suffix | Add suffix if not present | value: suffix string |
| map | Map values using lookup table | mapping: {source: target}, case_insensitive: bool, default_unmapped: string |
| alphanumeric | Keep only alphanumeric chars | - |
| digits_only | Keep only digits | - |

Parameterless transformers can be written as a bare name:
  "transformer": ["lower", "ucfirst", {"type": "replace", "pattern": "\\s+", "value": " "}]"#
        .to_string()
}
