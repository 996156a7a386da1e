//! CSS Syntax Tree
//!
//! Tokenizer-backed parser built on cssparser. Selectors, media conditions
//! and declaration values are kept exactly as authored (trimmed), so the
//! manifest and the worker model reproduce what was written instead of a
//! re-serialised form. Nested style rules and `@media` blocks inside style
//! rules stay attached to their parent rule.

use std::fmt;

use cssparser::{
    AtRuleParser, BasicParseErrorKind, CowRcStr, DeclarationParser, ParseError, Parser,
    ParserInput, ParserState, QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
    StyleSheetParser, Token,
};

/// CSS declaration (property: value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Property name, lowercased unless it is a custom property
    pub property: String,
    /// Value text without a trailing `!important`
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            important: false,
        }
    }

    /// Value as it is written back into a stylesheet
    pub fn written_value(&self) -> String {
        if self.important {
            format!("{} !important", self.value)
        } else {
            self.value.clone()
        }
    }
}

/// Style rule: selector list, its declarations and any nested rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
    pub rules: Vec<CssRule>,
}

/// `@media` block
///
/// Declarations only appear when the block is nested inside a style rule,
/// in which case they apply to that rule's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRule {
    pub condition: String,
    pub declarations: Vec<Declaration>,
    pub rules: Vec<CssRule>,
}

/// `@import` rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRule {
    pub url: String,
    pub media: Option<String>,
}

/// Node of the syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style(StyleRule),
    Media(MediaRule),
    Import(ImportRule),
    /// Any other at-rule, kept opaque
    Other { name: String, prelude: String },
}

/// Parsed stylesheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
    /// Items skipped because they did not parse
    pub errors: Vec<SyntaxIssue>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A rule or declaration the parser skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based line
    pub line: u32,
    pub column: u32,
    pub snippet: String,
}

impl SyntaxIssue {
    fn from_error<E>(error: &ParseError<'_, E>, snippet: &str) -> Self {
        Self {
            line: error.location.line + 1,
            column: error.location.column,
            snippet: collapse_whitespace(snippet),
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: skipped invalid CSS `{}`",
            self.line, self.column, self.snippet
        )
    }
}

pub(crate) fn parse(css: &str) -> Stylesheet {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut errors = Vec::new();
    let mut rules = Vec::new();
    let mut skipped = Vec::new();

    {
        let mut rule_parser = RuleParser {
            in_style: false,
            errors: &mut errors,
        };
        for result in StyleSheetParser::new(&mut parser, &mut rule_parser) {
            match result {
                Ok(BodyItem::Rule(rule)) => rules.push(rule),
                Ok(BodyItem::Declaration(_)) => {}
                Err((error, slice)) => skipped.push(SyntaxIssue::from_error(&error, slice)),
            }
        }
    }

    errors.extend(skipped);
    for issue in &errors {
        tracing::debug!("{}", issue);
    }
    tracing::debug!("Parsed {} top-level CSS rules", rules.len());

    Stylesheet { rules, errors }
}

/// Parse a bare declaration list such as an inline `style` attribute
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    let mut errors = Vec::new();
    let (declarations, _) = parse_body(&mut parser, true, &mut errors);
    for issue in &errors {
        tracing::debug!("{}", issue);
    }
    declarations
}

enum BodyItem {
    Declaration(Declaration),
    Rule(CssRule),
}

enum AtPrelude {
    Media(String),
    Import(ImportRule),
    Other { name: String, prelude: String },
}

struct RuleParser<'a> {
    /// Inside a style rule: declarations are allowed
    in_style: bool,
    errors: &'a mut Vec<SyntaxIssue>,
}

fn parse_body<'i>(
    input: &mut Parser<'i, '_>,
    in_style: bool,
    errors: &mut Vec<SyntaxIssue>,
) -> (Vec<Declaration>, Vec<CssRule>) {
    let mut declarations = Vec::new();
    let mut rules = Vec::new();
    let mut skipped = Vec::new();

    {
        let mut body = RuleParser {
            in_style,
            errors: &mut *errors,
        };
        for result in RuleBodyParser::new(input, &mut body) {
            match result {
                Ok(BodyItem::Declaration(declaration)) => declarations.push(declaration),
                Ok(BodyItem::Rule(rule)) => rules.push(rule),
                Err((error, slice)) => skipped.push(SyntaxIssue::from_error(&error, slice)),
            }
        }
    }

    errors.extend(skipped);
    (declarations, rules)
}

/// Consume the rest of `input` and return it as collapsed source text
fn consume_raw(input: &mut Parser<'_, '_>) -> String {
    let start = input.position();
    while input.next_including_whitespace_and_comments().is_ok() {}
    collapse_whitespace(input.slice_from(start))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a trailing `!important` off a raw value
pub(crate) fn split_important(raw: &str) -> (String, bool) {
    let trimmed = raw.trim();
    // ASCII lowercasing keeps byte offsets, so `lower` indexes line up with `trimmed`
    let lower = trimmed.to_ascii_lowercase();
    if let Some(head) = lower.strip_suffix("important")
        && let Some(head) = head.trim_end().strip_suffix('!')
    {
        let len = head.trim_end().len();
        return (trimmed[..len].to_string(), true);
    }
    (trimmed.to_string(), false)
}

impl<'i> DeclarationParser<'i> for RuleParser<'_> {
    type Declaration = BodyItem;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _declaration_start: &ParserState,
    ) -> Result<BodyItem, ParseError<'i, ()>> {
        let start = input.position();
        loop {
            let is_block = match input.next_including_whitespace_and_comments() {
                Ok(token) => matches!(token, Token::CurlyBracketBlock),
                Err(_) => break,
            };
            // `a:hover { ... }` inside a style rule is a nested rule, not a declaration
            if is_block {
                return Err(input.new_error(BasicParseErrorKind::QualifiedRuleInvalid));
            }
        }

        let (value, important) = split_important(input.slice_from(start));
        if value.is_empty() {
            return Err(input.new_error(BasicParseErrorKind::EndOfInput));
        }

        let property = if name.starts_with("--") {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        };

        Ok(BodyItem::Declaration(Declaration {
            property,
            value,
            important,
        }))
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleParser<'_> {
    type Prelude = String;
    type QualifiedRule = BodyItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<String, ParseError<'i, ()>> {
        let selector = consume_raw(input);
        if selector.is_empty() {
            return Err(input.new_error(BasicParseErrorKind::QualifiedRuleInvalid));
        }
        Ok(selector)
    }

    fn parse_block<'t>(
        &mut self,
        selector: String,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<BodyItem, ParseError<'i, ()>> {
        let (declarations, rules) = parse_body(input, true, self.errors);
        Ok(BodyItem::Rule(CssRule::Style(StyleRule {
            selector,
            declarations,
            rules,
        })))
    }
}

impl<'i> AtRuleParser<'i> for RuleParser<'_> {
    type Prelude = AtPrelude;
    type AtRule = BodyItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<AtPrelude, ParseError<'i, ()>> {
        if name.eq_ignore_ascii_case("media") {
            return Ok(AtPrelude::Media(consume_raw(input)));
        }
        if name.eq_ignore_ascii_case("import") {
            let url = input.expect_url_or_string()?.to_string();
            let media = consume_raw(input);
            return Ok(AtPrelude::Import(ImportRule {
                url,
                media: (!media.is_empty()).then_some(media),
            }));
        }
        Ok(AtPrelude::Other {
            name: name.to_ascii_lowercase(),
            prelude: consume_raw(input),
        })
    }

    fn rule_without_block(
        &mut self,
        prelude: AtPrelude,
        _start: &ParserState,
    ) -> Result<BodyItem, ()> {
        match prelude {
            AtPrelude::Import(import) => Ok(BodyItem::Rule(CssRule::Import(import))),
            AtPrelude::Other { name, prelude } => {
                Ok(BodyItem::Rule(CssRule::Other { name, prelude }))
            }
            AtPrelude::Media(_) => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: AtPrelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<BodyItem, ParseError<'i, ()>> {
        match prelude {
            AtPrelude::Media(condition) => {
                let (declarations, rules) = parse_body(input, self.in_style, self.errors);
                Ok(BodyItem::Rule(CssRule::Media(MediaRule {
                    condition,
                    declarations,
                    rules,
                })))
            }
            AtPrelude::Other { name, prelude } => {
                while input.next().is_ok() {}
                Ok(BodyItem::Rule(CssRule::Other { name, prelude }))
            }
            AtPrelude::Import(_) => Err(input.new_error(BasicParseErrorKind::AtRuleBodyInvalid)),
        }
    }
}

impl<'i> RuleBodyItemParser<'i, BodyItem, ()> for RuleParser<'_> {
    fn parse_declarations(&self) -> bool {
        self.in_style
    }

    fn parse_qualified(&self) -> bool {
        true
    }
}
