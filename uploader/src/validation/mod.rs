//! Validator registry.
//!
//! Columns declare an ordered list of [`Validator`]s. [`validate`] runs them
//! against the *raw* field value and stops at the first failure, reporting
//! the failing validator's name and a human readable reason.
//!
//! # Example
//!
//! ```rust
//! use csvload::validation::{validate, Validator};
//!
//! let rules = [Validator::Required, Validator::Email];
//! assert!(validate("john@example.com", &rules).is_ok());
//!
//! let err = validate("not-an-email", &rules).unwrap_err();
//! assert_eq!(err.validator, "email");
//! assert_eq!(err.message, "invalid email");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InvalidValue;
use crate::models::Pattern;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("Invalid embedded email pattern")
});

/// All available validation rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Validator {
    /// Length bounds, counted in characters
    String {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
    },

    /// E-mail address format
    Email,

    /// Signed integer, optionally bounded
    #[serde(alias = "int")]
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },

    /// Non-blank value
    #[serde(alias = "not_empty")]
    Required,

    /// Whole value must match a regular expression
    Regex { pattern: Pattern },

    /// Value must be one of a fixed list
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        case_insensitive: bool,
    },
}

impl Validator {
    /// Name used in configuration files and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Validator::String { .. } => "string",
            Validator::Email => "email",
            Validator::Integer { .. } => "integer",
            Validator::Required => "required",
            Validator::Regex { .. } => "regex",
            Validator::OneOf { .. } => "one_of",
        }
    }

    /// Check a single value against this rule.
    pub fn check(&self, value: &str) -> Result<(), InvalidValue> {
        let ok = match self {
            Validator::String { min_length, max_length } => {
                let len = value.chars().count();
                min_length.map_or(true, |min| len >= min) && max_length.map_or(true, |max| len <= max)
            }
            Validator::Email => EMAIL_RE.is_match(value),
            Validator::Integer { min, max } => match value.trim().parse::<i64>() {
                Ok(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
                Err(_) => return Err(InvalidValue::new(self.name(), "invalid integer")),
            },
            Validator::Required => !value.trim().is_empty(),
            Validator::Regex { pattern } => pattern.is_full_match(value),
            Validator::OneOf { values, case_insensitive } => {
                if *case_insensitive {
                    let lower = value.to_lowercase();
                    values.iter().any(|v| v.to_lowercase() == lower)
                } else {
                    values.iter().any(|v| v == value)
                }
            }
        };

        if ok {
            Ok(())
        } else {
            Err(InvalidValue::new(self.name(), self.failure_message()))
        }
    }

    fn failure_message(&self) -> String {
        match self {
            Validator::String { min_length, max_length } => match (min_length, max_length) {
                (Some(min), Some(max)) => format!("string length must be between {} and {}", min, max),
                (Some(min), None) => format!("string length must be at least {}", min),
                (None, Some(max)) => format!("string length must be at most {}", max),
                (None, None) => "invalid string".to_string(),
            },
            Validator::Email => "invalid email".to_string(),
            Validator::Integer { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("integer must be between {} and {}", min, max),
                (Some(min), None) => format!("integer must be at least {}", min),
                (None, Some(max)) => format!("integer must be at most {}", max),
                (None, None) => "invalid integer".to_string(),
            },
            Validator::Required => "value is required".to_string(),
            Validator::Regex { pattern } => format!("value does not match pattern {}", pattern.as_str()),
            Validator::OneOf { values, .. } => format!("value must be one of {}", values.join(", ")),
        }
    }
}

/// Run every validator in order, stopping at the first failure.
pub fn validate(value: &str, validators: &[Validator]) -> Result<(), InvalidValue> {
    validators.iter().try_for_each(|v| v.check(value))
}

/// Get a description of all available validators
pub fn validators_description() -> String {
    r#"Available validators:

| Validator | Description | Parameters |
|-----------|-------------|------------|
| string | Length bounds in characters | min_length, max_length (both optional) |
| email | E-mail address format | - |
| integer | Signed integer | min, max (both optional) |
| required | Value must not be blank | - |
| regex | Whole value must match | pattern: regex |
| one_of | Value must be in a list | values: [..], case_insensitive: bool |

Validators run against the raw value, before transformers."#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(min: Option<usize>, max: Option<usize>) -> Validator {
        Validator::String { min_length: min, max_length: max }
    }

    #[test]
    fn test_email() {
        assert!(Validator::Email.check("john@x.com").is_ok());
        assert!(Validator::Email.check("first.last+tag@sub.example.org").is_ok());
        let err = Validator::Email.check("not-an-email").unwrap_err();
        assert_eq!(err.validator, "email");
        assert_eq!(err.message, "invalid email");
        assert!(Validator::Email.check("a@b").is_err());
        assert!(Validator::Email.check("").is_err());
    }

    #[test]
    fn test_string_bounds() {
        let rule = string(Some(1), Some(5));
        assert!(rule.check("abc").is_ok());
        // counted in characters, not bytes
        assert!(rule.check("ééééé").is_ok());
        let err = rule.check("").unwrap_err();
        assert_eq!(err.message, "string length must be between 1 and 5");
        assert!(rule.check("abcdef").is_err());
        assert_eq!(string(Some(2), None).check("a").unwrap_err().message, "string length must be at least 2");
    }

    #[test]
    fn test_integer() {
        let rule = Validator::Integer { min: Some(0), max: Some(150) };
        assert!(rule.check("42").is_ok());
        assert_eq!(rule.check("abc").unwrap_err().message, "invalid integer");
        assert_eq!(rule.check("-1").unwrap_err().message, "integer must be between 0 and 150");
    }

    #[test]
    fn test_regex_and_one_of() {
        let rule = Validator::Regex { pattern: Pattern::new(r"^[A-Z]{2}$").unwrap() };
        assert!(rule.check("FR").is_ok());
        assert!(rule.check("FRA").is_err());

        // unanchored patterns still have to cover the whole value
        let rule = Validator::Regex { pattern: Pattern::new(r"[A-Z]{2}").unwrap() };
        assert!(rule.check("FR").is_ok());
        assert_eq!(
            rule.check("xxFRyy").unwrap_err().message,
            "value does not match pattern [A-Z]{2}"
        );
        let rule = Validator::Regex { pattern: Pattern::new(r"[A-Z]{2}|[A-Z]{3}").unwrap() };
        assert!(rule.check("FRA").is_ok());

        let rule = Validator::OneOf { values: vec!["M".into(), "F".into()], case_insensitive: true };
        assert!(rule.check("f").is_ok());
        assert_eq!(rule.check("x").unwrap_err().message, "value must be one of M, F");
    }

    #[test]
    fn test_first_failure_wins() {
        let rules = [Validator::Required, string(None, Some(3)), Validator::Email];
        let err = validate("", &rules).unwrap_err();
        assert_eq!(err.validator, "required");
        let err = validate("long value", &rules).unwrap_err();
        assert_eq!(err.validator, "string");
        assert!(validate("anything", &[]).is_ok());
    }
}
