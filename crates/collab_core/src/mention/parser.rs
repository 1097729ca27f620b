//! Mention token scanner and display renderer.
//!
//! # Responsibility
//! - Recognize `<trigger><name>` tokens in free text and markup bodies.
//! - Render display markup where every mention is wrapped in a highlight span.
//! - Collapse recognized names into the notification candidate set.
//!
//! # Invariants
//! - `extract_display_markup` is idempotent: existing highlight spans are
//!   treated as transparent and rebuilt, never nested.
//! - A trigger only starts a mention at a token boundary, so `a@b.com` is
//!   plain text.
//! - Trailing `.` is sentence punctuation, not part of a name.
//! - Untrusted tags are escaped into visible text and scanned like text.

use crate::markup::{escape_text, tokenize, MarkupToken, Tag};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Trigger character used when no configuration is supplied.
pub const DEFAULT_TRIGGER: char = '@';
const HIGHLIGHT_CLASS: &str = "mention";
const HIGHLIGHT_NAME_ATTR: &str = "data-mention";

static DEFAULT_PARSER: Lazy<MentionParser> =
    Lazy::new(|| MentionParser::new(DEFAULT_TRIGGER).expect("default trigger is valid"));

/// Returns whether `ch` may appear inside a mentioned name.
pub fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_')
}

/// Returns whether `ch` can act as a mention trigger.
///
/// Name characters, whitespace and markup-significant characters are refused.
pub fn is_valid_trigger(ch: char) -> bool {
    !ch.is_whitespace()
        && !ch.is_control()
        && !is_name_char(ch)
        && !matches!(ch, '<' | '>' | '&' | '"' | '\'')
}

/// Parser construction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionParserError {
    InvalidTrigger(char),
}

impl Display for MentionParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTrigger(ch) => write!(f, "invalid mention trigger `{ch}`"),
        }
    }
}

impl Error for MentionParserError {}

/// Transient mention occurrence found while parsing one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    /// Trigger plus name exactly as written, e.g. `@james.strutt`.
    pub raw_match: String,
    /// Name without the trigger; case preserved.
    pub referenced_name: String,
    /// Byte offset of the trigger in the parsed body.
    pub start: usize,
    /// Byte offset one past the last name byte.
    pub end: usize,
}

enum Piece<'a> {
    Text(&'a str),
    Mention(MentionToken),
    Tag(Tag<'a>),
}

/// Mention scanner bound to one trigger character.
#[derive(Debug, Clone)]
pub struct MentionParser {
    trigger: char,
    token_re: Regex,
}

impl MentionParser {
    pub fn new(trigger: char) -> Result<Self, MentionParserError> {
        if !is_valid_trigger(trigger) {
            return Err(MentionParserError::InvalidTrigger(trigger));
        }
        let mut buf = [0u8; 4];
        let pattern = format!(
            r"{}([\p{{L}}\p{{N}}._-]+)",
            regex::escape(trigger.encode_utf8(&mut buf))
        );
        let token_re =
            Regex::new(&pattern).map_err(|_| MentionParserError::InvalidTrigger(trigger))?;
        Ok(Self { trigger, token_re })
    }

    pub fn trigger(&self) -> char {
        self.trigger
    }

    /// Returns every mention occurrence in document order.
    pub fn scan_mentions(&self, body: &str) -> Vec<MentionToken> {
        self.pieces(body)
            .into_iter()
            .filter_map(|piece| match piece {
                Piece::Mention(token) => Some(token),
                Piece::Text(_) | Piece::Tag(_) => None,
            })
            .collect()
    }

    /// Returns distinct mentioned names, case preserved.
    pub fn extract_mention_targets(&self, body: &str) -> BTreeSet<String> {
        self.scan_mentions(body)
            .into_iter()
            .map(|token| token.referenced_name)
            .collect()
    }

    /// Renders `body` as display markup with highlighted mentions.
    pub fn extract_display_markup(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len() + 32);
        for piece in self.pieces(body) {
            match piece {
                Piece::Text(text) => out.push_str(&escape_text(text)),
                Piece::Mention(token) => out.push_str(&format!(
                    r#"<span class="{HIGHLIGHT_CLASS}" {HIGHLIGHT_NAME_ATTR}="{}">{}</span>"#,
                    token.referenced_name,
                    escape_text(&token.raw_match)
                )),
                Piece::Tag(tag) => out.push_str(&tag.canonical()),
            }
        }
        out
    }

    fn pieces<'a>(&self, body: &'a str) -> Vec<Piece<'a>> {
        let mut pieces = Vec::new();
        let mut offset = 0;
        let mut previous: Option<char> = None;
        let mut highlight_depth = 0usize;

        for token in tokenize(body) {
            let len = token.source().len();
            match token {
                MarkupToken::Text(text) => {
                    self.split_text(text, offset, previous, &mut pieces);
                    previous = text.chars().next_back();
                }
                MarkupToken::Tag(tag) => {
                    // Highlight spans are rebuilt from their text, so they are skipped here.
                    let opens_highlight = !tag.closing && is_highlight_span(&tag);
                    let closes_highlight =
                        tag.closing && tag.name == "span" && highlight_depth > 0;
                    if opens_highlight {
                        highlight_depth += 1;
                    } else if closes_highlight {
                        highlight_depth -= 1;
                    } else if tag.is_trusted() {
                        previous = None;
                        pieces.push(Piece::Tag(tag));
                    } else {
                        // Escaped tags render as text, so they are scanned as text.
                        self.split_text(tag.raw, offset, previous, &mut pieces);
                        previous = tag.raw.chars().next_back();
                    }
                }
            }
            offset += len;
        }
        pieces
    }

    fn split_text<'a>(
        &self,
        text: &'a str,
        base: usize,
        previous: Option<char>,
        pieces: &mut Vec<Piece<'a>>,
    ) {
        let mut last = 0;
        for caps in self.token_re.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let start = whole.start();
            let before = if start == 0 {
                previous
            } else {
                text[..start].chars().next_back()
            };
            if before.is_some_and(is_name_char) {
                continue;
            }
            let name = name.as_str().trim_end_matches('.');
            if name.is_empty() {
                continue;
            }

            let end = start + self.trigger.len_utf8() + name.len();
            if last < start {
                pieces.push(Piece::Text(&text[last..start]));
            }
            pieces.push(Piece::Mention(MentionToken {
                raw_match: text[start..end].to_string(),
                referenced_name: name.to_string(),
                start: base + start,
                end: base + end,
            }));
            last = end;
        }
        if last < text.len() {
            pieces.push(Piece::Text(&text[last..]));
        }
    }
}

impl Default for MentionParser {
    fn default() -> Self {
        DEFAULT_PARSER.clone()
    }
}

fn is_highlight_span(tag: &Tag<'_>) -> bool {
    tag.name == "span"
        && tag
            .attribute("class")
            .is_some_and(|class| class.split_whitespace().any(|c| c == HIGHLIGHT_CLASS))
}

/// Display markup for `body` using the default `@` trigger.
pub fn extract_display_markup(body: &str) -> String {
    DEFAULT_PARSER.extract_display_markup(body)
}

/// Mention targets for `body` using the default `@` trigger.
pub fn extract_mention_targets(body: &str) -> BTreeSet<String> {
    DEFAULT_PARSER.extract_mention_targets(body)
}

/// Mention tokens for `body` using the default `@` trigger.
pub fn scan_mentions(body: &str) -> Vec<MentionToken> {
    DEFAULT_PARSER.scan_mentions(body)
}
