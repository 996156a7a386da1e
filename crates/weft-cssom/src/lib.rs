//! Weft CSSOM
//!
//! Live stylesheet object and the selector-keyed rule index that applies
//! computed rule text to it without disturbing cascade order.

mod sheet;
mod rule_index;

pub use sheet::{RuleSheet, StyleSheet};
pub use rule_index::RuleIndex;

/// Stylesheet mutation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CssomError {
    #[error("Syntax error in rule: {0}")]
    Syntax(String),

    #[error("Index {index} is out of range for a sheet of {len} rules")]
    IndexSize { index: usize, len: usize },
}
