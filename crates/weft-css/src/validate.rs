//! Validation through lightningcss and cssparser
//!
//! The syntax tree keeps author text verbatim; these helpers run the text
//! through lightningcss to reject what a browser would reject and to
//! collect recovery warnings. Declaration values are checked on the
//! cssparser token stream.

use std::sync::{Arc, RwLock};

use cssparser::{Parser, ParserInput, Token};
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};

use crate::syntax::{parse_declarations, split_important};

/// Declaration appended after a checked value; it only survives when the
/// value leaves nothing open
const SENTINEL: &str = "--weft-value-end";

/// Check that `text` is exactly one well-formed rule
pub fn check_rule(text: &str) -> Result<(), String> {
    let sheet = StyleSheet::parse(text, ParserOptions::default()).map_err(|e| e.to_string())?;
    match sheet.rules.0.len() {
        1 => Ok(()),
        0 => Err("no rule found".to_string()),
        n => Err(format!("expected a single rule, found {}", n)),
    }
}

/// Check that `selector` parses as a style rule selector list
pub fn check_selector(selector: &str) -> Result<(), String> {
    let text = format!("{} {{}}", selector);
    let sheet = StyleSheet::parse(&text, ParserOptions::default()).map_err(|e| e.to_string())?;
    match sheet.rules.0.as_slice() {
        [CssRule::Style(_)] => Ok(()),
        _ => Err(format!("`{}` is not a selector list", selector)),
    }
}

/// Check that `value` cannot break out of its declaration
///
/// Quoted strings, comments and function arguments may hold any character.
/// Top-level `;`, braces, stray closing brackets and anything left
/// unterminated are rejected.
pub fn check_value(value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }

    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        if matches!(
            token,
            Token::Semicolon
                | Token::CurlyBracketBlock
                | Token::CloseCurlyBracket
                | Token::CloseParenthesis
                | Token::CloseSquareBracket
                | Token::BadString(_)
                | Token::BadUrl(_)
        ) {
            return false;
        }
    }

    // Unterminated strings, blocks and comments swallow what follows
    let declarations = parse_declarations(&format!("x: {}; {}: 0", value, SENTINEL));
    match declarations.as_slice() {
        [first, last] => {
            (first.value.clone(), first.important) == split_important(value)
                && last.property == SENTINEL
        }
        _ => false,
    }
}

/// Parse `css` with error recovery and return the warnings
pub fn collect_warnings(css: &str) -> Vec<String> {
    let warnings = Arc::new(RwLock::new(Vec::new()));
    let options = ParserOptions {
        error_recovery: true,
        warnings: Some(Arc::clone(&warnings)),
        ..ParserOptions::default()
    };

    if let Err(error) = StyleSheet::parse(css, options) {
        return vec![error.to_string()];
    }

    warnings
        .read()
        .map(|list| list.iter().map(|warning| warning.to_string()).collect())
        .unwrap_or_default()
}
