//! Transformer registry.
//!
//! Columns declare an ordered list of [`Transformer`]s; [`transform`] threads
//! a value through them. Names are resolved when the configuration is
//! deserialized, so an unknown transformer is a startup error and never a
//! per-row one.

pub mod operations;

pub use operations::{transformers_description, Transformer};

/// Apply each transformer in order, feeding the output of one into the next.
pub fn transform(value: &str, transformers: &[Transformer]) -> String {
    transformers
        .iter()
        .fold(value.to_string(), |acc, t| t.apply(&acc))
}
