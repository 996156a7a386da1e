//! Weft HTML
//!
//! Style manifest extraction from authored HTML documents: inline `style`
//! attributes, `<style>` blocks and stylesheet links.

mod extractor;

pub use extractor::{inline_selector, HtmlStyleExtractor, IMPORT_SELECTOR};

use weft_css::StyleManifest;

/// Extract a style manifest from an HTML document
pub fn extract_html(html: &str) -> Result<StyleManifest, HtmlError> {
    HtmlStyleExtractor::new().extract(html)
}

/// HTML extraction error
#[derive(Debug, thiserror::Error)]
pub enum HtmlError {
    #[error("Failed to read HTML document: {0}")]
    Io(#[from] std::io::Error),
}
