//! Rule Index
//!
//! Maps each selector (or `@media` block key) to the ordinal of its rule in
//! the owned stylesheet. Updating an indexed selector replaces the rule in
//! place, so its cascade position never moves; new selectors are appended.
//! A renamed selector takes over the ordinal of the selector it replaces.

use std::collections::HashMap;

use crate::sheet::{RuleSheet, StyleSheet};
use crate::CssomError;

/// Selector -> ordinal index over one live stylesheet
#[derive(Debug, Default)]
pub struct RuleIndex<S: RuleSheet = StyleSheet> {
    sheet: S,
    ordinals: HashMap<String, usize>,
}

impl RuleIndex<StyleSheet> {
    pub fn new() -> Self {
        Self::with_sheet(StyleSheet::new())
    }
}

impl<S: RuleSheet> RuleIndex<S> {
    /// Index over an existing, empty sheet
    pub fn with_sheet(sheet: S) -> Self {
        Self {
            sheet,
            ordinals: HashMap::new(),
        }
    }

    /// Write `css_text` (declarations, or nested rules for a media key) as
    /// the rule for `selector`
    pub fn update_rule(&mut self, selector: &str, css_text: &str) -> Result<(), CssomError> {
        let rule = rule_text(selector, css_text);

        match self.ordinals.get(selector).copied() {
            Some(ordinal) => {
                self.replace_at(ordinal, &rule)?;
                tracing::debug!("Replaced rule #{} for `{}`", ordinal, selector);
            }
            None => {
                let ordinal = self.sheet.insert_rule(&rule, self.sheet.len())?;
                self.ordinals.insert(selector.to_string(), ordinal);
                tracing::debug!("Appended rule #{} for `{}`", ordinal, selector);
            }
        }
        Ok(())
    }

    /// Write the rule for `to` into the slot indexed under `from`
    ///
    /// Falls back to [`RuleIndex::update_rule`] when `from` is not indexed
    /// or `to` already is; `from` is then emptied in place.
    pub fn rename_rule(&mut self, from: &str, to: &str, css_text: &str) -> Result<(), CssomError> {
        match (self.ordinals.get(from).copied(), self.ordinals.contains_key(to)) {
            (Some(ordinal), false) => {
                self.replace_at(ordinal, &rule_text(to, css_text))?;
                self.ordinals.remove(from);
                self.ordinals.insert(to.to_string(), ordinal);
                tracing::debug!("Re-keyed rule #{} from `{}` to `{}`", ordinal, from, to);
                Ok(())
            }
            _ => {
                self.update_rule(to, css_text)?;
                if self.ordinals.contains_key(from) {
                    self.update_rule(from, "")?;
                }
                Ok(())
            }
        }
    }

    fn replace_at(&mut self, ordinal: usize, rule: &str) -> Result<(), CssomError> {
        let previous = self.sheet.css_rule(ordinal);
        self.sheet.delete_rule(ordinal)?;
        if let Err(error) = self.sheet.insert_rule(rule, ordinal) {
            if let Some(previous) = previous {
                // Keep the ordinal pointing at a rule
                self.sheet.insert_rule(&previous, ordinal)?;
            }
            return Err(error);
        }
        Ok(())
    }

    pub fn ordinal(&self, selector: &str) -> Option<usize> {
        self.ordinals.get(selector).copied()
    }

    /// Number of indexed selectors
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Drop every rule and forget every ordinal
    pub fn reset(&mut self) {
        self.sheet.clear();
        self.ordinals.clear();
    }

    pub fn sheet(&self) -> &S {
        &self.sheet
    }
}

fn rule_text(selector: &str, css_text: &str) -> String {
    let body = css_text.trim();
    if body.is_empty() {
        format!("{} {{}}", selector)
    } else {
        format!("{} {{ {} }}", selector, body)
    }
}
