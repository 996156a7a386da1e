//! Style edits and inline overrides
//!
//! Input side of the processing pipeline: one `StyleChange` per editor
//! gesture, plus the full override snapshot the change is computed against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Edit category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// Set `property` to `value` on `selector`
    SetProperty,
    /// Remove `property` from `selector`
    RemoveProperty,
    /// Rename `selector` to `value`
    RenameSelector,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::SetProperty => "property-set",
            ChangeKind::RemoveProperty => "property-remove",
            ChangeKind::RenameSelector => "selector-rename",
        })
    }
}

/// A single user edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleChange {
    pub kind: ChangeKind,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Breakpoint the edit targets; `None` edits the unconditional rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

impl StyleChange {
    pub fn set_property(
        selector: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind: ChangeKind::SetProperty,
            selector: selector.into(),
            property: Some(property.into()),
            value: Some(value.into()),
            media: None,
        }
    }

    pub fn remove_property(selector: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::RemoveProperty,
            selector: selector.into(),
            property: Some(property.into()),
            value: None,
            media: None,
        }
    }

    pub fn rename_selector(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::RenameSelector,
            selector: from.into(),
            property: None,
            value: Some(to.into()),
            media: None,
        }
    }

    /// Target a responsive breakpoint instead of the unconditional rule
    pub fn in_media(mut self, condition: impl Into<String>) -> Self {
        self.media = Some(condition.into());
        self
    }
}

/// Inline overrides: selector -> property -> value
///
/// Passed by value into every processing call so the worker always sees a
/// complete snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleOverrides(BTreeMap<String, BTreeMap<String, String>>);

impl StyleOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StyleOverrides::set`]
    pub fn with(
        mut self,
        selector: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set(selector, property, value);
        self
    }

    pub fn set(
        &mut self,
        selector: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.0
            .entry(selector.into())
            .or_default()
            .insert(property.into(), value.into());
    }

    /// Remove one override, dropping the selector once it has none left
    pub fn remove(&mut self, selector: &str, property: &str) -> Option<String> {
        let properties = self.0.get_mut(selector)?;
        let removed = properties.remove(property);
        if properties.is_empty() {
            self.0.remove(selector);
        }
        removed
    }

    pub fn get(&self, selector: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(selector)
    }

    pub fn contains_selector(&self, selector: &str) -> bool {
        self.0.contains_key(selector)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
