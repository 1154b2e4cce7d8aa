//! Path pattern compilation.
//!
//! Patterns use the familiar Express/Koa syntax:
//!
//! | Syntax | Meaning |
//! |---|---|
//! | `:name` | a named segment, matching `[^/#?]+?` |
//! | `:name(\d+)` | a named segment with a custom pattern |
//! | `(.*)` | an unnamed group, keyed by its index |
//! | `?` / `*` / `+` | optional / zero or more / one or more |
//! | `{/prefix:name.suffix}` | a group with explicit prefix and suffix |
//! | `\:` | an escaped literal |
//!
//! A `/` or `.` directly before a parameter becomes its prefix, so
//! `/books/:id?` also matches `/books`.
//!
//! The regex crate has no lookahead, so the trailing assertions of
//! non-terminal patterns consume at most one delimiter. Only the match
//! extent differs; captures are unaffected.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use daedalus_core::Params;
use regex::{Regex, RegexBuilder};

use crate::error::RouterError;

const DEFAULT_PATTERN: &str = "[^/#?]+?";
const DELIMITERS: &str = "/#?";
const DELIMITER_CLASS: &str = "[/#?]";
const PREFIXES: &str = "./";
const RESERVED: &str = ";/?:@&=+$,#";

/// How many times a key may repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Exactly once.
    One,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Modifier {
    fn from_token(value: &str) -> Self {
        match value {
            "?" => Self::Optional,
            "*" => Self::ZeroOrMore,
            "+" => Self::OneOrMore,
            _ => Self::One,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::One => "",
            Self::Optional => "?",
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
        }
    }

    /// Returns true if the key may be absent.
    #[must_use]
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Optional | Self::ZeroOrMore)
    }

    /// Returns true if the key may repeat.
    #[must_use]
    pub fn is_repeat(self) -> bool {
        matches!(self, Self::ZeroOrMore | Self::OneOrMore)
    }
}

/// A parameter declared by a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Parameter name, or its index for unnamed groups.
    pub name: String,
    /// Literal text emitted before the value.
    pub prefix: String,
    /// Literal text emitted after the value.
    pub suffix: String,
    /// The regex the value must match. Empty for pure literal groups.
    pub pattern: String,
    /// Repetition.
    pub modifier: Modifier,
}

/// One piece of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text.
    Text(String),
    /// A parameter or group.
    Key(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Open,
    Close,
    Pattern,
    Name,
    Char,
    EscapedChar,
    Modifier,
    End,
}

impl fmt::Display for Lex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Pattern => "PATTERN",
            Self::Name => "NAME",
            Self::Char => "CHAR",
            Self::EscapedChar => "ESCAPED_CHAR",
            Self::Modifier => "MODIFIER",
            Self::End => "END",
        };
        f.write_str(name)
    }
}

struct LexToken {
    kind: Lex,
    index: usize,
    value: String,
}

fn lex(path: &str) -> Result<Vec<LexToken>, String> {
    let chars: Vec<char> = path.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let mut push = |kind, index, value: String| tokens.push(LexToken { kind, index, value });

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => {
                push(Lex::Modifier, i, c.to_string());
                i += 1;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| format!("dangling escape at {i}"))?;
                push(Lex::EscapedChar, i, escaped.to_string());
                i += 2;
            }
            '{' => {
                push(Lex::Open, i, c.to_string());
                i += 1;
            }
            '}' => {
                push(Lex::Close, i, c.to_string());
                i += 1;
            }
            ':' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .collect();
                if name.is_empty() {
                    return Err(format!("missing parameter name at {i}"));
                }
                let len = name.chars().count();
                push(Lex::Name, i, name);
                i += 1 + len;
            }
            '(' => {
                let mut count = 1;
                let mut pattern = String::new();
                let mut j = i + 1;

                if chars.get(j) == Some(&'?') {
                    return Err(format!("pattern cannot start with \"?\" at {j}"));
                }

                while j < chars.len() {
                    if chars[j] == '\\' {
                        pattern.push('\\');
                        if let Some(next) = chars.get(j + 1) {
                            pattern.push(*next);
                        }
                        j += 2;
                        continue;
                    }

                    if chars[j] == ')' {
                        count -= 1;
                        if count == 0 {
                            j += 1;
                            break;
                        }
                    } else if chars[j] == '(' {
                        count += 1;
                        if chars.get(j + 1) != Some(&'?') {
                            return Err(format!("capturing groups are not allowed at {j}"));
                        }
                    }

                    pattern.push(chars[j]);
                    j += 1;
                }

                if count != 0 {
                    return Err(format!("unbalanced pattern at {i}"));
                }
                if pattern.is_empty() {
                    return Err(format!("missing pattern at {i}"));
                }

                push(Lex::Pattern, i, pattern);
                i = j;
            }
            _ => {
                push(Lex::Char, i, c.to_string());
                i += 1;
            }
        }
    }

    push(Lex::End, i, String::new());
    Ok(tokens)
}

struct Cursor {
    tokens: Vec<LexToken>,
    pos: usize,
}

impl Cursor {
    fn try_consume(&mut self, kind: Lex) -> Option<String> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Some(token.value.clone())
            }
            _ => None,
        }
    }

    fn must_consume(&mut self, kind: Lex) -> Result<String, String> {
        self.try_consume(kind).ok_or_else(|| match self.tokens.get(self.pos) {
            Some(token) => format!(
                "unexpected {} at {}, expected {kind}",
                token.kind, token.index
            ),
            None => format!("unexpected end of pattern, expected {kind}"),
        })
    }

    fn consume_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(value) = self
            .try_consume(Lex::Char)
            .or_else(|| self.try_consume(Lex::EscapedChar))
        {
            text.push_str(&value);
        }
        text
    }

    fn done(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// Parses a pattern into tokens.
///
/// # Errors
///
/// Returns [`RouterError::InvalidPattern`] for malformed patterns.
pub fn parse(path: &str) -> Result<Vec<Token>, RouterError> {
    parse_inner(path).map_err(|reason| RouterError::invalid_pattern(path, reason))
}

fn parse_inner(path: &str) -> Result<Vec<Token>, String> {
    let mut cursor = Cursor {
        tokens: lex(path)?,
        pos: 0,
    };
    let mut result = Vec::new();
    let mut next_index = 0usize;
    let mut text = String::new();

    let mut index_name = || {
        let name = next_index.to_string();
        next_index += 1;
        name
    };

    while !cursor.done() {
        let ch = cursor.try_consume(Lex::Char);
        let name = cursor.try_consume(Lex::Name);
        let pattern = cursor.try_consume(Lex::Pattern);

        if name.is_some() || pattern.is_some() {
            let mut prefix = ch.unwrap_or_default();
            if !PREFIXES.contains(prefix.as_str()) {
                text.push_str(&prefix);
                prefix.clear();
            }
            if !text.is_empty() {
                result.push(Token::Text(std::mem::take(&mut text)));
            }

            let name = name.unwrap_or_else(&mut index_name);
            let modifier = cursor
                .try_consume(Lex::Modifier)
                .map_or(Modifier::One, |m| Modifier::from_token(&m));
            result.push(Token::Key(Key {
                name,
                prefix,
                suffix: String::new(),
                pattern: pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
                modifier,
            }));
            continue;
        }

        if let Some(value) = ch.or_else(|| cursor.try_consume(Lex::EscapedChar)) {
            text.push_str(&value);
            continue;
        }

        if !text.is_empty() {
            result.push(Token::Text(std::mem::take(&mut text)));
        }

        if cursor.try_consume(Lex::Open).is_some() {
            let prefix = cursor.consume_text();
            let name = cursor.try_consume(Lex::Name);
            let pattern = cursor.try_consume(Lex::Pattern);
            let suffix = cursor.consume_text();
            cursor.must_consume(Lex::Close)?;
            let modifier = cursor
                .try_consume(Lex::Modifier)
                .map_or(Modifier::One, |m| Modifier::from_token(&m));

            let (name, pattern) = match (name, pattern) {
                (Some(name), Some(pattern)) => (name, pattern),
                (Some(name), None) => (name, DEFAULT_PATTERN.to_string()),
                (None, Some(pattern)) => (index_name(), pattern),
                (None, None) => (String::new(), String::new()),
            };
            result.push(Token::Key(Key {
                name,
                prefix,
                suffix,
                pattern,
                modifier,
            }));
            continue;
        }

        cursor.must_consume(Lex::End)?;
    }

    Ok(result)
}

/// Options that shape the compiled regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Case-sensitive matching.
    pub sensitive: bool,
    /// Disallow an optional trailing delimiter.
    pub strict: bool,
    /// Anchor the match at the end of the path.
    pub end: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
            end: true,
        }
    }
}

fn tokens_to_regex_source(tokens: &[Token], options: MatchOptions) -> String {
    let mut route = String::from("^");

    for token in tokens {
        match token {
            Token::Text(text) => route.push_str(&regex::escape(text)),
            Token::Key(key) => {
                let prefix = regex::escape(&key.prefix);
                let suffix = regex::escape(&key.suffix);
                let pattern = &key.pattern;
                let modifier = key.modifier.as_str();

                let piece = if pattern.is_empty() {
                    format!("(?:{prefix}{suffix}){modifier}")
                } else if !prefix.is_empty() || !suffix.is_empty() {
                    if key.modifier.is_repeat() {
                        let optional = if key.modifier == Modifier::ZeroOrMore { "?" } else { "" };
                        format!(
                            "(?:{prefix}((?:{pattern})(?:{suffix}{prefix}(?:{pattern}))*){suffix}){optional}"
                        )
                    } else {
                        format!("(?:{prefix}({pattern}){suffix}){modifier}")
                    }
                } else if key.modifier.is_repeat() {
                    format!("((?:{pattern}){modifier})")
                } else {
                    format!("({pattern}){modifier}")
                };
                route.push_str(&piece);
            }
        }
    }

    if options.end {
        if !options.strict {
            route.push_str(DELIMITER_CLASS);
            route.push('?');
        }
        route.push('$');
    } else {
        let end_delimited = match tokens.last() {
            Some(Token::Text(text)) => text.ends_with(|c| DELIMITERS.contains(c)),
            Some(Token::Key(_)) => false,
            None => true,
        };
        if !options.strict {
            route.push_str(&format!("(?:{DELIMITER_CLASS}$)?"));
        }
        if !end_delimited {
            route.push_str(&format!("(?:{DELIMITER_CLASS}|$)"));
        }
    }

    route
}

/// A compiled path pattern.
///
/// # Example
///
/// ```
/// use daedalus_router::path::{MatchOptions, PathPattern};
///
/// let pattern = PathPattern::compile("/chores/:id", MatchOptions::default()).unwrap();
/// assert!(pattern.is_match("/chores/42"));
/// assert!(pattern.is_match("/CHORES/42/"));
/// assert_eq!(pattern.captures("/chores/42"), vec!["42".to_string()]);
/// assert_eq!(pattern.keys()[0].name, "id");
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    keys: Vec<Key>,
}

impl PathPattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] if the pattern is malformed or
    /// a custom parameter pattern is not a valid regex.
    pub fn compile(path: &str, options: MatchOptions) -> Result<Self, RouterError> {
        let tokens = parse(path)?;
        let source = tokens_to_regex_source(&tokens, options);
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!options.sensitive)
            .build()
            .map_err(|e| RouterError::invalid_pattern(path, e.to_string()))?;

        let keys = tokens
            .into_iter()
            .filter_map(|token| match token {
                Token::Key(key) if !key.pattern.is_empty() => Some(key),
                _ => None,
            })
            .collect();

        Ok(Self { regex, keys })
    }

    /// Returns true if `path` matches.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Returns the raw capture values, one per key. Unmatched optional
    /// groups yield empty strings.
    #[must_use]
    pub fn captures(&self, path: &str) -> Vec<String> {
        self.regex.captures(path).map_or_else(Vec::new, |caps| {
            caps.iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect()
        })
    }

    /// The declared keys in order.
    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The compiled regex.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// Values substituted into a pattern by [`to_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlParams {
    /// Values looked up by key name.
    Named(Params),
    /// Values assigned to keys in declaration order.
    Positional(Vec<String>),
}

impl Default for UrlParams {
    fn default() -> Self {
        Self::Named(Params::new())
    }
}

impl From<Params> for UrlParams {
    fn from(params: Params) -> Self {
        Self::Named(params)
    }
}

impl From<&Params> for UrlParams {
    fn from(params: &Params) -> Self {
        Self::Named(params.clone())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for UrlParams {
    fn from(pairs: [(K, V); N]) -> Self {
        Self::Named(pairs.into_iter().collect())
    }
}

impl From<Vec<String>> for UrlParams {
    fn from(values: Vec<String>) -> Self {
        Self::Positional(values)
    }
}

impl From<Vec<&str>> for UrlParams {
    fn from(values: Vec<&str>) -> Self {
        Self::Positional(values.into_iter().map(String::from).collect())
    }
}

/// A query string appended by [`to_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Used verbatim; a leading `?` is optional.
    Raw(String),
    /// Form-encoded in order.
    Pairs(Vec<(String, String)>),
}

impl From<&str> for Query {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for Query {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Query {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self::Pairs(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Query {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Pairs(map.into_iter().collect())
    }
}

impl From<HashMap<String, String>> for Query {
    fn from(map: HashMap<String, String>) -> Self {
        let mut pairs: Vec<_> = map.into_iter().collect();
        pairs.sort();
        Self::Pairs(pairs)
    }
}

/// Options for [`to_url`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// Query string to append.
    pub query: Option<Query>,
    /// Validate values case-sensitively.
    pub sensitive: bool,
}

impl UrlOptions {
    /// Options with a query string.
    #[must_use]
    pub fn with_query(query: impl Into<Query>) -> Self {
        Self {
            query: Some(query.into()),
            sensitive: false,
        }
    }
}

/// Builds a URL from a pattern.
///
/// Wildcard groups written as `(.*)` are dropped, values are
/// percent-encoded and checked against their key's pattern, and optional
/// keys without a value are skipped.
///
/// ```
/// use daedalus_router::path::{to_url, UrlOptions};
///
/// let url = to_url("/chores/:id", &[("id", "a b")].into(), &UrlOptions::with_query("page=2")).unwrap();
/// assert_eq!(url, "/chores/a%20b?page=2");
/// ```
///
/// # Errors
///
/// [`RouterError::MissingParam`] when a required key has no value,
/// [`RouterError::ParamMismatch`] when a value does not match its pattern.
pub fn to_url(path: &str, params: &UrlParams, options: &UrlOptions) -> Result<String, RouterError> {
    let stripped = path.replace("(.*)", "");
    let tokens = parse(&stripped)?;

    let mut url = String::new();
    let mut position = 0usize;

    for token in &tokens {
        let key = match token {
            Token::Text(text) => {
                url.push_str(text);
                continue;
            }
            Token::Key(key) => key,
        };

        if key.pattern.is_empty() {
            if !key.modifier.is_optional() {
                url.push_str(&key.prefix);
                url.push_str(&key.suffix);
            }
            continue;
        }

        let value = match params {
            UrlParams::Named(named) => named.get(&key.name).map(ToString::to_string),
            UrlParams::Positional(values) => values.get(position).cloned(),
        };
        position += 1;

        let Some(value) = value else {
            if key.modifier.is_optional() {
                continue;
            }
            return Err(RouterError::MissingParam {
                name: key.name.clone(),
            });
        };

        let segment = urlencoding::encode(&value).into_owned();
        let validator = RegexBuilder::new(&format!("^(?:{})$", key.pattern))
            .case_insensitive(!options.sensitive)
            .build()
            .map_err(|e| RouterError::invalid_pattern(path, e.to_string()))?;
        if !validator.is_match(&segment) {
            return Err(RouterError::ParamMismatch {
                name: key.name.clone(),
                pattern: key.pattern.clone(),
                value: segment,
            });
        }

        url.push_str(&key.prefix);
        url.push_str(&segment);
        url.push_str(&key.suffix);
    }

    match &options.query {
        Some(Query::Raw(raw)) => {
            let raw = raw.strip_prefix('?').unwrap_or(raw);
            if !raw.is_empty() {
                url.push('?');
                url.push_str(raw);
            }
        }
        Some(Query::Pairs(pairs)) if !pairs.is_empty() => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        _ => {}
    }

    Ok(url)
}

/// Percent-decodes a parameter value, returning it unchanged if it is not
/// valid percent-encoded UTF-8.
#[must_use]
pub fn decode_component(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned())
}

/// Decodes a request path the way `decodeURI` does: escapes of reserved
/// characters such as `%2F` stay encoded so they cannot introduce new
/// segments.
///
/// Returns `None` for a truncated or non-hex escape, or if the decoded
/// bytes are not UTF-8.
#[must_use]
pub fn decode_path(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let decoded = bytes
            .get(i + 1..i + 3)
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        let byte = decoded?;

        if byte.is_ascii() && RESERVED.contains(char::from(byte)) {
            out.extend_from_slice(&bytes[i..i + 3]);
        } else {
            out.push(byte);
        }
        i += 3;
    }

    String::from_utf8(out).ok()
}
