//! Style Normalizer
//!
//! Walks a parsed syntax tree in document order, composes nested selectors,
//! groups declarations by media condition and emits a [`StyleManifest`],
//! either as a JSON sidecar next to the processed file or as a parallel
//! stylesheet of custom properties.

use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::StyleManifest;
use crate::syntax::{CssRule, Declaration};
use crate::{parse_stylesheet, CssError};

/// Marker comment prefix left in transformed CSS when a sidecar is written
pub const MANIFEST_MARKER: &str = "style-manifest:";

/// One declaration with its effective selector and media condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatDeclaration {
    pub selector: String,
    pub media: Option<String>,
    pub property: String,
    pub value: String,
}

/// Flatten a syntax tree into declarations in document order
pub fn flatten(rules: &[CssRule]) -> Vec<FlatDeclaration> {
    let mut out = Vec::new();
    walk(rules, None, None, &mut out);
    out
}

fn walk(
    rules: &[CssRule],
    parent: Option<&str>,
    media: Option<&str>,
    out: &mut Vec<FlatDeclaration>,
) {
    for rule in rules {
        match rule {
            CssRule::Style(style) => {
                let selector = match parent {
                    Some(parent) => compose_selector(parent, &style.selector),
                    None => style.selector.clone(),
                };
                push_declarations(&style.declarations, &selector, media, out);
                walk(&style.rules, Some(&selector), media, out);
            }
            CssRule::Media(block) => {
                let condition = match media {
                    Some(outer) => format!("{} and {}", outer, block.condition),
                    None => block.condition.clone(),
                };
                if let Some(parent) = parent {
                    push_declarations(&block.declarations, parent, Some(&condition), out);
                }
                walk(&block.rules, parent, Some(&condition), out);
            }
            CssRule::Import(_) | CssRule::Other { .. } => {}
        }
    }
}

fn push_declarations(
    declarations: &[Declaration],
    selector: &str,
    media: Option<&str>,
    out: &mut Vec<FlatDeclaration>,
) {
    for declaration in declarations {
        out.push(FlatDeclaration {
            selector: selector.to_string(),
            media: media.map(str::to_string),
            property: declaration.property.clone(),
            value: declaration.written_value(),
        });
    }
}

/// Compose a nested selector with its parent
///
/// Descendant composition (`parent child`) unless the child references the
/// parent with `&`. Selector lists compose pairwise.
pub fn compose_selector(parent: &str, child: &str) -> String {
    let parents = split_selector_list(parent);
    let children = split_selector_list(child);
    let mut composed = Vec::with_capacity(parents.len() * children.len());

    for parent in &parents {
        for child in &children {
            if child.contains('&') {
                composed.push(child.replace('&', parent));
            } else {
                composed.push(format!("{} {}", parent, child));
            }
        }
    }

    composed.join(", ")
}

/// Split a selector list on top-level commas
pub fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in selector.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(selector[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Where extracted styles go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// JSON sidecar plus a marker comment in the CSS output
    #[default]
    Json,
    /// Custom-property stylesheet replaces the CSS output
    Css,
}

/// Extraction options
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub output: OutputMode,
    /// Sidecar file name, written next to the processed file
    pub manifest_file_name: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            output: OutputMode::Json,
            manifest_file_name: "style-manifest.json".to_string(),
        }
    }
}

/// Result of transforming one file
#[derive(Debug, Clone)]
pub struct ExtractOutput {
    /// Transformed CSS
    pub css: String,
    pub manifest: StyleManifest,
    /// Sidecar path when one was written
    pub manifest_path: Option<PathBuf>,
}

/// Build-time style extraction pass
#[derive(Debug, Clone, Default)]
pub struct StyleExtractor {
    options: ExtractOptions,
}

impl StyleExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Parse `css` and extract its manifest
    pub fn extract(&self, css: &str) -> StyleManifest {
        self.extract_rules(&parse_stylesheet(css).rules)
    }

    /// Extract a manifest from an already parsed syntax tree
    pub fn extract_rules(&self, rules: &[CssRule]) -> StyleManifest {
        let declarations = flatten(rules);
        tracing::debug!("Extracted {} declarations", declarations.len());
        StyleManifest::from_declarations(&declarations)
    }

    /// Sidecar location for a processed file
    pub fn manifest_path_for(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        dir.join(&self.options.manifest_file_name)
    }

    /// Transform one file according to the configured output mode
    pub fn transform(&self, source: &Path, css: &str) -> Result<ExtractOutput, CssError> {
        let manifest = self.extract(css);

        match self.options.output {
            OutputMode::Json => {
                let path = self.manifest_path_for(source);
                fs::write(&path, manifest.to_json()?)?;
                tracing::info!(
                    "Wrote style manifest for {} ({} selectors) to {}",
                    source.display(),
                    manifest.len(),
                    path.display()
                );

                let mut output = css.trim_end().to_string();
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&format!(
                    "/* {} {} */\n",
                    MANIFEST_MARKER, self.options.manifest_file_name
                ));

                Ok(ExtractOutput {
                    css: output,
                    manifest,
                    manifest_path: Some(path),
                })
            }
            OutputMode::Css => Ok(ExtractOutput {
                css: manifest.to_custom_properties(),
                manifest,
                manifest_path: None,
            }),
        }
    }
}
