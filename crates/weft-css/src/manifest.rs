//! Style Manifest
//!
//! Canonical `selector -> property -> (value | media condition -> value)`
//! map produced at build time. Serialised as a JSON sidecar, or re-emitted
//! as a stylesheet of custom properties.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::CssError;
use crate::extract::FlatDeclaration;

/// Entry under a selector: a plain value, or a media-gated property map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Value(String),
    Media(BTreeMap<String, String>),
}

/// Canonical selector -> property map
///
/// JSON keys are sorted; selectors and media conditions also remember the
/// order they first appeared in, which the stylesheet emission follows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleManifest {
    entries: BTreeMap<String, BTreeMap<String, ManifestValue>>,
    #[serde(skip)]
    selector_order: Vec<String>,
    #[serde(skip)]
    media_order: Vec<String>,
}

impl PartialEq for StyleManifest {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for StyleManifest {}

impl StyleManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from flattened declarations, later ones winning
    pub fn from_declarations(declarations: &[FlatDeclaration]) -> Self {
        let mut manifest = Self::new();
        for declaration in declarations {
            manifest.insert(
                &declaration.selector,
                declaration.media.as_deref(),
                &declaration.property,
                &declaration.value,
            );
        }
        manifest
    }

    /// Record `property: value` for `selector`, under `media` when given
    pub fn insert(&mut self, selector: &str, media: Option<&str>, property: &str, value: &str) {
        if !self.entries.contains_key(selector) {
            self.selector_order.push(selector.to_string());
        }
        if let Some(condition) = media
            && !self.media_order.iter().any(|known| known == condition)
        {
            self.media_order.push(condition.to_string());
        }

        let properties = self.entries.entry(selector.to_string()).or_default();
        match media {
            None => {
                properties.insert(property.to_string(), ManifestValue::Value(value.to_string()));
            }
            Some(condition) => {
                let entry = properties
                    .entry(condition.to_string())
                    .or_insert_with(|| ManifestValue::Media(BTreeMap::new()));
                if let ManifestValue::Value(previous) = entry {
                    tracing::debug!(
                        "Media condition `{}` on `{}` replaces plain value {:?}",
                        condition,
                        selector,
                        previous
                    );
                    *entry = ManifestValue::Media(BTreeMap::new());
                }
                if let ManifestValue::Media(map) = entry {
                    map.insert(property.to_string(), value.to_string());
                }
            }
        }
    }

    /// Merge `other` into `self`; entries from `other` win
    pub fn merge(&mut self, mut other: StyleManifest) {
        let order: Vec<String> = other.selectors().map(str::to_string).collect();
        for selector in order {
            let Some(properties) = other.entries.remove(&selector) else {
                continue;
            };
            for (key, value) in properties {
                match value {
                    ManifestValue::Value(value) => self.insert(&selector, None, &key, &value),
                    ManifestValue::Media(map) => {
                        for (property, value) in map {
                            self.insert(&selector, Some(&key), &property, &value);
                        }
                    }
                }
            }
        }
    }

    pub fn get(&self, selector: &str) -> Option<&BTreeMap<String, ManifestValue>> {
        self.entries.get(selector)
    }

    /// Unconditional value of `property` on `selector`
    pub fn value(&self, selector: &str, property: &str) -> Option<&str> {
        match self.entries.get(selector)?.get(property)? {
            ManifestValue::Value(value) => Some(value),
            ManifestValue::Media(_) => None,
        }
    }

    /// Value of `property` on `selector` under `media`
    pub fn media_value(&self, selector: &str, media: &str, property: &str) -> Option<&str> {
        match self.entries.get(selector)?.get(media)? {
            ManifestValue::Media(map) => map.get(property).map(String::as_str),
            ManifestValue::Value(_) => None,
        }
    }

    /// Selectors in first-appearance order
    ///
    /// A manifest read back from JSON has no recorded order; its selectors
    /// follow in key order.
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        let recorded = self.selector_order.iter().map(String::as_str);
        let rest = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|selector| !self.selector_order.iter().any(|known| known == selector));
        recorded.chain(rest)
    }

    /// Media conditions in first-appearance order, unrecorded ones last
    fn media_conditions(&self) -> Vec<&str> {
        let mut conditions: Vec<&str> = self.media_order.iter().map(String::as_str).collect();
        for properties in self.entries.values() {
            for (key, value) in properties {
                if matches!(value, ManifestValue::Media(_)) && !conditions.contains(&key.as_str()) {
                    conditions.push(key.as_str());
                }
            }
        }
        conditions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, CssError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CssError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Re-emit as custom properties (`--property: value`) under the same
    /// selectors, media-gated values wrapped in their `@media` block
    ///
    /// Rules follow source order: plain rules first, then one block per
    /// media condition.
    pub fn to_custom_properties(&self) -> String {
        let mut css = String::new();

        for selector in self.selectors() {
            let Some(properties) = self.entries.get(selector) else {
                continue;
            };
            let mut plain = String::new();
            for (property, value) in properties {
                if let ManifestValue::Value(value) = value {
                    let _ = writeln!(plain, "  {}: {};", custom_property(property), value);
                }
            }
            if !plain.is_empty() {
                let _ = write!(css, "{} {{\n{}}}\n", selector, plain);
            }
        }

        for condition in self.media_conditions() {
            let _ = writeln!(css, "@media {} {{", condition);
            for selector in self.selectors() {
                let gated = self.entries.get(selector).and_then(|p| p.get(condition));
                if let Some(ManifestValue::Media(map)) = gated {
                    let _ = writeln!(css, "  {} {{", selector);
                    for (property, value) in map {
                        let _ = writeln!(css, "    {}: {};", custom_property(property), value);
                    }
                    css.push_str("  }\n");
                }
            }
            css.push_str("}\n");
        }

        css
    }
}

fn custom_property(property: &str) -> String {
    if property.starts_with("--") {
        property.to_string()
    } else {
        format!("--{}", property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> StyleManifest {
        let mut manifest = StyleManifest::new();
        manifest.insert(".foo", None, "color", "red");
        manifest.insert(".foo", Some("(max-width: 600px)"), "color", "blue");
        manifest.insert(".bar", None, "--gap", "4px");
        manifest
    }

    #[test]
    fn test_json_shape() {
        let value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                ".foo": { "color": "red", "(max-width: 600px)": { "color": "blue" } },
                ".bar": { "--gap": "4px" }
            })
        );
    }

    #[test]
    fn test_from_json() {
        let manifest = StyleManifest::from_json(
            r#"{ ".a": { "width": "1px", "print": { "display": "none" } } }"#,
        )
        .unwrap();
        assert_eq!(manifest.value(".a", "width"), Some("1px"));
        assert_eq!(manifest.media_value(".a", "print", "display"), Some("none"));
        assert_eq!(manifest.value(".a", "print"), None);
    }

    #[test]
    fn test_custom_properties() {
        let css = sample().to_custom_properties();
        assert!(css.contains(".bar {\n  --gap: 4px;\n}"), "{}", css);
        assert!(css.contains(".foo {\n  --color: red;\n}"), "{}", css);
        assert!(
            css.contains("@media (max-width: 600px) {\n  .foo {\n    --color: blue;\n  }\n}"),
            "{}",
            css
        );
    }

    #[test]
    fn test_custom_properties_keep_source_order() {
        let mut manifest = StyleManifest::new();
        manifest.insert(".b", None, "color", "red");
        manifest.insert(".a", None, "color", "blue");
        manifest.insert(".b", Some("print"), "color", "black");
        manifest.insert(".a", Some("(min-width: 40em)"), "color", "navy");

        let css = manifest.to_custom_properties();
        let b = css.find(".b {").unwrap();
        let a = css.find(".a {").unwrap();
        assert!(b < a, "{}", css);
        assert!(css.find("@media print").unwrap() < css.find("@media (min-width: 40em)").unwrap());
        assert_eq!(manifest.selectors().collect::<Vec<_>>(), vec![".b", ".a"]);
    }

    #[test]
    fn test_order_ignored_by_equality() {
        let manifest = sample();
        let back = StyleManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.selectors().collect::<Vec<_>>(), vec![".bar", ".foo"]);
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = sample();
        let mut other = StyleManifest::new();
        other.insert(".foo", None, "color", "green");
        other.insert(".baz", Some("print"), "display", "none");
        base.merge(other);

        assert_eq!(base.value(".foo", "color"), Some("green"));
        assert_eq!(base.media_value(".foo", "(max-width: 600px)", "color"), Some("blue"));
        assert_eq!(base.media_value(".baz", "print", "display"), Some("none"));
        assert_eq!(base.len(), 3);
    }
}
