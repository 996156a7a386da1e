//! Incremental Style Model
//!
//! Worker-side state: the baseline rules, the latest override snapshot and
//! the last rendered rule blocks. Every edit re-renders the sheet and diffs
//! it against the previous render, so only the blocks whose text changed
//! are handed to the live stylesheet.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::change::{ChangeKind, StyleChange, StyleOverrides};
use crate::extract::flatten;
use crate::validate;
use crate::{parse_stylesheet, CssError};

/// New text for one rule block of the live stylesheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChange {
    /// Selector, or `@media <condition>` for a media block
    pub selector: String,
    /// Block contents without the enclosing braces; empty when the block
    /// no longer has any content
    pub css_text: String,
    /// Key this block was rendered under before a rename. The live rule
    /// should be re-keyed in place rather than appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

impl RuleChange {
    pub fn new(selector: impl Into<String>, css_text: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            css_text: css_text.into(),
            renamed_from: None,
        }
    }
}

/// Output of one processing task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Full recomputed stylesheet
    pub css: String,
    /// Advisory diagnostics, never fatal
    pub warnings: Vec<String>,
    /// Changed blocks in stylesheet order
    pub changes: Vec<RuleChange>,
}

impl ProcessingResult {
    /// Changed block text for `selector`
    pub fn change(&self, selector: &str) -> Option<&str> {
        self.changes
            .iter()
            .find(|change| change.selector == selector)
            .map(|change| change.css_text.as_str())
    }
}

#[derive(Debug, Clone)]
struct RuleBlock {
    selector: String,
    media: Option<String>,
    declarations: Vec<(String, String)>,
}

impl RuleBlock {
    fn set(&mut self, property: &str, value: &str) {
        match self.declarations.iter_mut().find(|(name, _)| name == property) {
            Some(entry) => entry.1 = value.to_string(),
            None => self
                .declarations
                .push((property.to_string(), value.to_string())),
        }
    }

    fn remove(&mut self, property: &str) -> bool {
        let before = self.declarations.len();
        self.declarations.retain(|(name, _)| name != property);
        self.declarations.len() != before
    }
}

/// Baseline rules plus overrides, with the last render kept for diffing
#[derive(Debug, Clone, Default)]
pub struct StyleModel {
    blocks: Vec<RuleBlock>,
    overrides: StyleOverrides,
    rendered: Vec<(String, String)>,
    /// `(from, to)` renames applied since the last render
    renames: Vec<(String, String)>,
}

impl StyleModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to a new baseline and render it in full
    pub fn initialize(
        &mut self,
        css: &str,
        overrides: StyleOverrides,
    ) -> Result<ProcessingResult, CssError> {
        check_overrides(&overrides)?;

        let sheet = parse_stylesheet(css);
        let mut warnings: Vec<String> = sheet.errors.iter().map(|issue| issue.to_string()).collect();

        let mut blocks: Vec<RuleBlock> = Vec::new();
        let mut positions: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut rejected: HashSet<String> = HashSet::new();

        for declaration in flatten(&sheet.rules) {
            if rejected.contains(&declaration.selector) {
                continue;
            }
            let key = (declaration.selector.clone(), declaration.media.clone());
            let index = match positions.get(&key) {
                Some(&index) => index,
                None => {
                    if let Err(reason) = validate::check_selector(&declaration.selector) {
                        warnings.push(format!(
                            "Dropped rule `{}`: {}",
                            declaration.selector, reason
                        ));
                        rejected.insert(declaration.selector);
                        continue;
                    }
                    blocks.push(RuleBlock {
                        selector: declaration.selector.clone(),
                        media: declaration.media.clone(),
                        declarations: Vec::new(),
                    });
                    positions.insert(key, blocks.len() - 1);
                    blocks.len() - 1
                }
            };
            blocks[index].set(&declaration.property, &declaration.value);
        }

        self.blocks = blocks;
        self.overrides = overrides;
        self.rendered.clear();
        self.renames.clear();

        let mut result = self.render_and_diff();
        warnings.append(&mut result.warnings);
        result.warnings = warnings;

        tracing::debug!(
            "Style model initialized: {} blocks, {} warnings",
            self.blocks.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    /// Apply one edit against a fresh override snapshot
    ///
    /// The model is left untouched when the edit is rejected.
    pub fn process(
        &mut self,
        change: &StyleChange,
        overrides: StyleOverrides,
    ) -> Result<ProcessingResult, CssError> {
        check_overrides(&overrides)?;
        let mut warnings = self.apply(change)?;
        self.overrides = overrides;

        let mut result = self.render_and_diff();
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Current full stylesheet text
    pub fn css(&self) -> String {
        render_css(&self.render())
    }

    fn apply(&mut self, change: &StyleChange) -> Result<Vec<String>, CssError> {
        let mut warnings = Vec::new();
        let media = change.media.as_deref();

        match change.kind {
            ChangeKind::SetProperty => {
                let property = required(change, change.property.as_deref(), "property")?;
                let value = required(change, change.value.as_deref(), "value")?;
                if !validate::check_value(value) {
                    return Err(CssError::InvalidValue {
                        property: property.to_string(),
                        value: value.to_string(),
                    });
                }

                match self.block_mut(&change.selector, media) {
                    Some(block) => block.set(property, value),
                    None => {
                        validate::check_selector(&change.selector)
                            .map_err(|_| CssError::InvalidSelector(change.selector.clone()))?;
                        let mut block = RuleBlock {
                            selector: change.selector.clone(),
                            media: media.map(str::to_string),
                            declarations: Vec::new(),
                        };
                        block.set(property, value);
                        self.blocks.push(block);
                    }
                }
            }
            ChangeKind::RemoveProperty => {
                let property = required(change, change.property.as_deref(), "property")?;
                let removed = self
                    .block_mut(&change.selector, media)
                    .is_some_and(|block| block.remove(property));
                if !removed {
                    warnings.push(format!(
                        "`{}` is not set on `{}`; nothing to remove",
                        property, change.selector
                    ));
                }
            }
            ChangeKind::RenameSelector => {
                let target = required(change, change.value.as_deref(), "value")?.trim();
                validate::check_selector(target)
                    .map_err(|_| CssError::InvalidSelector(target.to_string()))?;
                if target != change.selector && self.blocks.iter().any(|b| b.selector == target) {
                    return Err(CssError::SelectorConflict {
                        from: change.selector.clone(),
                        to: target.to_string(),
                    });
                }

                let mut renamed = 0;
                for block in self.blocks.iter_mut().filter(|b| b.selector == change.selector) {
                    block.selector = target.to_string();
                    renamed += 1;
                }
                if renamed == 0 {
                    warnings.push(format!(
                        "No rule for `{}`; rename to `{}` has no effect",
                        change.selector, target
                    ));
                } else if target != change.selector {
                    self.renames.push((change.selector.clone(), target.to_string()));
                }
            }
        }

        Ok(warnings)
    }

    fn block_mut(&mut self, selector: &str, media: Option<&str>) -> Option<&mut RuleBlock> {
        self.blocks
            .iter_mut()
            .find(|block| block.selector == selector && block.media.as_deref() == media)
    }

    /// Render rule blocks as `(key, body)` in stylesheet order
    fn render(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(self.blocks.len());
        let mut emitted_media: HashSet<&str> = HashSet::new();

        for block in &self.blocks {
            match &block.media {
                None => {
                    let mut declarations = block.declarations.clone();
                    if let Some(overrides) = self.overrides.get(&block.selector) {
                        for (property, value) in overrides {
                            match declarations.iter_mut().find(|(name, _)| name == property) {
                                Some(entry) => entry.1 = value.clone(),
                                None => declarations.push((property.clone(), value.clone())),
                            }
                        }
                    }
                    out.push((block.selector.clone(), declaration_text(&declarations)));
                }
                Some(condition) => {
                    if !emitted_media.insert(condition.as_str()) {
                        continue;
                    }
                    let body = self
                        .blocks
                        .iter()
                        .filter(|b| b.media.as_deref() == Some(condition.as_str()))
                        .map(|b| format!("{} {{ {} }}", b.selector, declaration_text(&b.declarations)))
                        .collect::<Vec<_>>()
                        .join(" ");
                    out.push((format!("@media {}", condition), body));
                }
            }
        }

        // Overrides for selectors without a base rule go after everything else
        for (selector, properties) in self.overrides.iter() {
            let has_base = self
                .blocks
                .iter()
                .any(|b| b.media.is_none() && &b.selector == selector);
            if !has_base {
                let declarations: Vec<(String, String)> = properties
                    .iter()
                    .map(|(p, v)| (p.clone(), v.clone()))
                    .collect();
                out.push((selector.clone(), declaration_text(&declarations)));
            }
        }

        out
    }

    fn render_and_diff(&mut self) -> ProcessingResult {
        let next = self.render();
        let previous: HashMap<&str, &str> = self
            .rendered
            .iter()
            .map(|(key, body)| (key.as_str(), body.as_str()))
            .collect();
        let next_keys: HashSet<&str> = next.iter().map(|(key, _)| key.as_str()).collect();

        // A renamed block moves into its old slot when the old key is gone
        let renames = std::mem::take(&mut self.renames);
        let moved: HashMap<&str, &str> = renames
            .iter()
            .filter(|(from, to)| {
                previous.contains_key(from.as_str())
                    && !previous.contains_key(to.as_str())
                    && !next_keys.contains(from.as_str())
                    && next_keys.contains(to.as_str())
            })
            .map(|(from, to)| (to.as_str(), from.as_str()))
            .collect();
        let moved_from: HashSet<&str> = moved.values().copied().collect();

        let mut changes: Vec<RuleChange> = next
            .iter()
            .filter(|(key, body)| previous.get(key.as_str()) != Some(&body.as_str()))
            .map(|(key, body)| RuleChange {
                selector: key.clone(),
                css_text: body.clone(),
                renamed_from: moved.get(key.as_str()).map(|from| from.to_string()),
            })
            .collect();

        // Blocks that disappeared keep their slot in the live sheet, emptied
        for (key, body) in &self.rendered {
            if !next_keys.contains(key.as_str())
                && !body.is_empty()
                && !moved_from.contains(key.as_str())
            {
                changes.push(RuleChange::new(key.clone(), String::new()));
            }
        }

        let css = render_css(&next);
        let warnings = validate::collect_warnings(&css);
        for warning in &warnings {
            tracing::debug!("Rendered stylesheet warning: {}", warning);
        }

        self.rendered = next;
        ProcessingResult {
            css,
            warnings,
            changes,
        }
    }
}

fn required<'a>(
    change: &StyleChange,
    field: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, CssError> {
    field.ok_or_else(|| CssError::MissingField {
        kind: change.kind,
        selector: change.selector.clone(),
        field: name,
    })
}

fn check_overrides(overrides: &StyleOverrides) -> Result<(), CssError> {
    for (_, properties) in overrides.iter() {
        for (property, value) in properties {
            if !validate::check_value(value) {
                return Err(CssError::InvalidValue {
                    property: property.clone(),
                    value: value.clone(),
                });
            }
        }
    }
    Ok(())
}

fn declaration_text(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(property, value)| format!("{}: {};", property, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_css(blocks: &[(String, String)]) -> String {
    blocks
        .iter()
        .map(|(key, body)| {
            if body.is_empty() {
                format!("{} {{}}", key)
            } else {
                format!("{} {{ {} }}", key, body)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
