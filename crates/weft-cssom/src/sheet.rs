//! Live stylesheet
//!
//! In-memory stand-in for a document's CSSOM sheet. Rules are stored as
//! their source text; every insertion is checked to be exactly one rule.

use weft_css::validate;

use crate::CssomError;

/// Mutable rule list, mirroring the CSSOM `insertRule`/`deleteRule` surface
pub trait RuleSheet {
    /// Number of rules
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `rule` at `index`, shifting later rules down
    fn insert_rule(&mut self, rule: &str, index: usize) -> Result<usize, CssomError>;

    /// Delete the rule at `index`, shifting later rules up
    fn delete_rule(&mut self, index: usize) -> Result<(), CssomError>;

    /// Source text of the rule at `index`
    fn css_rule(&self, index: usize) -> Option<String>;

    /// Remove every rule
    fn clear(&mut self) {
        while !self.is_empty() {
            if self.delete_rule(self.len() - 1).is_err() {
                break;
            }
        }
    }
}

/// Stylesheet owned by one editor document
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<String>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(&self, index: usize) -> Option<&str> {
        self.rules.get(index).map(String::as_str)
    }

    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(String::as_str)
    }

    /// Whole sheet as CSS text, one rule per line
    pub fn css_text(&self) -> String {
        self.rules.join("\n")
    }
}

impl RuleSheet for StyleSheet {
    fn len(&self) -> usize {
        self.rules.len()
    }

    fn insert_rule(&mut self, rule: &str, index: usize) -> Result<usize, CssomError> {
        if index > self.rules.len() {
            return Err(CssomError::IndexSize {
                index,
                len: self.rules.len(),
            });
        }
        validate::check_rule(rule).map_err(CssomError::Syntax)?;
        self.rules.insert(index, rule.trim().to_string());
        Ok(index)
    }

    fn delete_rule(&mut self, index: usize) -> Result<(), CssomError> {
        if index >= self.rules.len() {
            return Err(CssomError::IndexSize {
                index,
                len: self.rules.len(),
            });
        }
        self.rules.remove(index);
        Ok(())
    }

    fn css_rule(&self, index: usize) -> Option<String> {
        self.rules.get(index).cloned()
    }

    fn clear(&mut self) {
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_delete() {
        let mut sheet = StyleSheet::new();
        sheet.insert_rule(".a { color: red; }", 0).unwrap();
        sheet.insert_rule(".b { color: blue; }", 0).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rule(0), Some(".b { color: blue; }"));

        sheet.delete_rule(0).unwrap();
        assert_eq!(sheet.rule(0), Some(".a { color: red; }"));
    }

    #[test]
    fn test_insert_rejects_garbage() {
        let mut sheet = StyleSheet::new();
        let err = sheet.insert_rule(".a { color: red; } .b {}", 0).unwrap_err();
        assert!(matches!(err, CssomError::Syntax(_)));
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_index_size() {
        let mut sheet = StyleSheet::new();
        assert_eq!(
            sheet.insert_rule(".a {}", 1),
            Err(CssomError::IndexSize { index: 1, len: 0 })
        );
        assert_eq!(
            sheet.delete_rule(0),
            Err(CssomError::IndexSize { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_css_text() {
        let mut sheet = StyleSheet::new();
        sheet.insert_rule(".a { top: 0; }", 0).unwrap();
        sheet.insert_rule("@media print { .a { display: none; } }", 1).unwrap();
        assert_eq!(
            sheet.css_text(),
            ".a { top: 0; }\n@media print { .a { display: none; } }"
        );
        sheet.clear();
        assert_eq!(sheet.css_text(), "");
    }
}
