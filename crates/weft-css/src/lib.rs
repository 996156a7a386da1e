//! Weft CSS
//!
//! CSS syntax tree, build-time style manifest extraction and the
//! worker-side style model that turns edits into incremental rule deltas.

mod syntax;
mod extract;
mod manifest;
mod change;
mod model;
pub mod validate;

pub use syntax::{
    parse_declarations, CssRule, Declaration, ImportRule, MediaRule, StyleRule, Stylesheet,
    SyntaxIssue,
};
pub use extract::{
    compose_selector, flatten, split_selector_list, ExtractOptions, ExtractOutput, FlatDeclaration,
    OutputMode, StyleExtractor, MANIFEST_MARKER,
};
pub use manifest::{ManifestValue, StyleManifest};
pub use change::{ChangeKind, StyleChange, StyleOverrides};
pub use model::{ProcessingResult, RuleChange, StyleModel};

/// Parse a CSS stylesheet into a syntax tree
pub fn parse_stylesheet(css: &str) -> Stylesheet {
    syntax::parse(css)
}

/// CSS error
#[derive(Debug, thiserror::Error)]
pub enum CssError {
    #[error("{kind} change for `{selector}` is missing its {field}")]
    MissingField {
        kind: ChangeKind,
        selector: String,
        field: &'static str,
    },

    #[error("Invalid value for `{property}`: {value:?}")]
    InvalidValue { property: String, value: String },

    #[error("Invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("Cannot rename `{from}` to `{to}`: a rule for `{to}` already exists")]
    SelectorConflict { from: String, to: String },

    #[error("Manifest I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
