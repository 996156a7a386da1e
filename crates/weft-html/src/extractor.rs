//! HTML style extraction
//!
//! Parses with html5ever into an RcDom and walks elements in document order.
//! `<style>` contents go through the CSS syntax tree parser, so braces in
//! comments, strings and nested blocks are handled.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use weft_css::{flatten, parse_declarations, parse_stylesheet, StyleManifest};

use crate::HtmlError;

/// Manifest selector under which stylesheet links are recorded
pub const IMPORT_SELECTOR: &str = "@import";

/// Style sources gathered from one document
#[derive(Default)]
struct Sources {
    blocks: StyleManifest,
    inline: StyleManifest,
    links: Vec<(String, String)>,
}

/// Extracts a [`StyleManifest`] from literal HTML
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlStyleExtractor;

impl HtmlStyleExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every style source in `html`
    ///
    /// Inline declarations override `<style>` declarations for the same
    /// selector and property. Links are recorded under [`IMPORT_SELECTOR`]
    /// as `href -> media`.
    pub fn extract(&self, html: &str) -> Result<StyleManifest, HtmlError> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())?;

        let mut sources = Sources::default();
        self.walk(&dom.document, &mut sources);

        tracing::debug!(
            "HTML styles: {} block selectors, {} inline selectors, {} links",
            sources.blocks.len(),
            sources.inline.len(),
            sources.links.len()
        );

        let mut manifest = sources.blocks;
        manifest.merge(sources.inline);
        for (href, media) in &sources.links {
            manifest.insert(IMPORT_SELECTOR, None, href, media);
        }
        Ok(manifest)
    }

    fn walk(&self, handle: &Handle, sources: &mut Sources) {
        if let RcNodeData::Element { name, attrs, .. } = &handle.data {
            let tag: &str = &name.local;
            let attrs = attrs.borrow();
            let attr = |key: &str| {
                attrs
                    .iter()
                    .find(|a| &*a.name.local == key)
                    .map(|a| a.value.to_string())
            };

            if let Some(style) = attr("style") {
                let selector =
                    inline_selector(tag, attr("id").as_deref(), attr("class").as_deref());
                for declaration in parse_declarations(&style) {
                    sources.inline.insert(
                        &selector,
                        None,
                        &declaration.property,
                        &declaration.written_value(),
                    );
                }
            }

            match tag {
                "style" => {
                    let text = text_content(handle);
                    let sheet = parse_stylesheet(&text);
                    for issue in &sheet.errors {
                        tracing::debug!("<style> block: {}", issue);
                    }
                    for declaration in flatten(&sheet.rules) {
                        sources.blocks.insert(
                            &declaration.selector,
                            declaration.media.as_deref(),
                            &declaration.property,
                            &declaration.value,
                        );
                    }
                }
                "link" => {
                    let is_stylesheet = attr("rel").is_some_and(|rel| {
                        rel.split_whitespace()
                            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                    });
                    if is_stylesheet && let Some(href) = attr("href") {
                        let media = attr("media")
                            .map(|m| m.trim().to_string())
                            .filter(|m| !m.is_empty())
                            .unwrap_or_else(|| "all".to_string());
                        sources.links.push((href, media));
                    }
                }
                _ => {}
            }
        }

        for child in handle.children.borrow().iter() {
            self.walk(child, sources);
        }
    }
}

/// Selector synthesised for an element's inline style: tag, `#id`, then
/// one `.class` per class
pub fn inline_selector(tag: &str, id: Option<&str>, class: Option<&str>) -> String {
    let mut selector = tag.to_ascii_lowercase();
    if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
        selector.push('#');
        selector.push_str(id);
    }
    for class in class.unwrap_or_default().split_whitespace() {
        selector.push('.');
        selector.push_str(class);
    }
    selector
}

fn text_content(handle: &Handle) -> String {
    let mut text = String::new();
    for child in handle.children.borrow().iter() {
        if let RcNodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}
