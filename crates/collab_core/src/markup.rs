//! Restricted markup subset shared by the editor and the mention parser.
//!
//! # Responsibility
//! - Split markup into text and tag tokens without building a DOM.
//! - Escape display text idempotently and literal text losslessly.
//! - Decode the entities the core emits.
//! - Reduce markup to visible plain text.
//!
//! # Invariants
//! - `escape_text(&escape_text(s)) == escape_text(s)`.
//! - `decode_entities(&escape_literal(s)) == s`.
//! - Tokens are contiguous: concatenating every token's source text yields
//!   the input unchanged.
//! - Only `TRUSTED_TAGS` are ever re-emitted as tags by core renderers.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<(/?)([A-Za-z][A-Za-z0-9]*)((?:\s[^<>]*)?)/?>").expect("valid tag regex")
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid attribute regex")
});
static ENTITY_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});")
        .expect("valid entity prefix regex")
});
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:([A-Za-z][A-Za-z0-9]*)|#([0-9]{1,7})|#[xX]([0-9A-Fa-f]{1,6}));")
        .expect("valid entity regex")
});

/// Tags the display layer is allowed to trust.
pub const TRUSTED_TAGS: &[&str] = &[
    "b", "strong", "i", "em", "u", "ul", "ol", "li", "br", "p", "div",
];

/// One lexical unit of markup input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupToken<'a> {
    /// Raw text between tags, entities still encoded.
    Text(&'a str),
    Tag(Tag<'a>),
}

impl MarkupToken<'_> {
    /// Source text covered by this token.
    pub fn source(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Tag(tag) => tag.raw,
        }
    }
}

/// Opening or closing tag as written in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// ASCII-lowercased tag name.
    pub name: String,
    pub closing: bool,
    /// Raw attribute section, possibly empty.
    pub attrs: &'a str,
    /// Full source text of the tag, including angle brackets.
    pub raw: &'a str,
}

impl<'a> Tag<'a> {
    /// Returns the value of the first attribute named `name` (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        let attrs: &'a str = self.attrs;
        ATTR_RE.captures_iter(attrs).find_map(|caps| {
            let key = caps.get(1)?.as_str();
            if !key.eq_ignore_ascii_case(name) {
                return None;
            }
            caps.get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|value| value.as_str())
        })
    }

    pub fn is_trusted(&self) -> bool {
        is_trusted_tag(self.name.as_str())
    }

    /// Attribute-free rendering of this tag.
    pub fn canonical(&self) -> String {
        if self.closing {
            format!("</{}>", self.name)
        } else {
            format!("<{}>", self.name)
        }
    }
}

pub fn is_trusted_tag(name: &str) -> bool {
    TRUSTED_TAGS.contains(&name)
}

/// Splits markup into text and tag tokens.
///
/// A `<` that does not start a well-formed tag stays part of the text.
pub fn tokenize(input: &str) -> Vec<MarkupToken<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find('<') {
        let at = cursor + offset;
        let Some(caps) = TAG_RE.captures(&input[at..]) else {
            cursor = at + 1;
            continue;
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            cursor = at + 1;
            continue;
        };

        if text_start < at {
            tokens.push(MarkupToken::Text(&input[text_start..at]));
        }
        tokens.push(MarkupToken::Tag(Tag {
            name: name.as_str().to_ascii_lowercase(),
            closing: caps.get(1).is_some_and(|slash| !slash.as_str().is_empty()),
            attrs: caps.get(3).map_or("", |attrs| attrs.as_str()),
            raw: whole.as_str(),
        }));
        cursor = at + whole.len();
        text_start = cursor;
    }

    if text_start < input.len() {
        tokens.push(MarkupToken::Text(&input[text_start..]));
    }
    tokens
}

/// Escapes `<`, `>` and bare `&`; existing character entities are kept.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (index, ch) in text.char_indices() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' if ENTITY_PREFIX_RE.is_match(&text[index..]) => escaped.push('&'),
            '&' => escaped.push_str("&amp;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escapes `<`, `>` and every `&`, so `decode_entities` restores `text` exactly.
pub fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Decodes the common named entities and all numeric entities.
///
/// Unknown named entities are left as written.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            if let Some(name) = caps.get(1) {
                return match name.as_str() {
                    "amp" => "&".to_string(),
                    "lt" => "<".to_string(),
                    "gt" => ">".to_string(),
                    "quot" => "\"".to_string(),
                    "apos" => "'".to_string(),
                    "nbsp" => " ".to_string(),
                    _ => whole.to_string(),
                };
            }
            let code = match (caps.get(2), caps.get(3)) {
                (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
                (None, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, None) => None,
            };
            code.and_then(char::from_u32)
                .map_or_else(|| whole.to_string(), |ch| ch.to_string())
        })
        .into_owned()
}

/// Reduces markup to the text a reader would see.
///
/// Block boundaries (`br`, `p`, `div`, `li`) become single newlines; the
/// result is not trimmed.
pub fn plain_text(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    for token in tokenize(markup) {
        match token {
            MarkupToken::Text(text) => out.push_str(&decode_entities(text)),
            MarkupToken::Tag(tag) => match tag.name.as_str() {
                "br" => out.push('\n'),
                "p" | "div" | "li" | "ul" | "ol" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{
        decode_entities, escape_literal, escape_text, plain_text, tokenize, MarkupToken,
    };

    #[test]
    fn tokenize_splits_tags_and_keeps_stray_angle_brackets_in_text() {
        let tokens = tokenize("a < b <b class=\"x\">bold</b>");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], MarkupToken::Text("a < b "));
        match &tokens[1] {
            MarkupToken::Tag(tag) => {
                assert_eq!(tag.name, "b");
                assert!(!tag.closing);
                assert_eq!(tag.attribute("class"), Some("x"));
            }
            other => panic!("expected tag, got {other:?}"),
        }
        let rebuilt: String = tokens.iter().map(|token| token.source()).collect();
        assert_eq!(rebuilt, "a < b <b class=\"x\">bold</b>");
    }

    #[test]
    fn tokenize_accepts_self_closing_break() {
        let tokens = tokenize("x<br/>y<BR />");
        let names: Vec<String> = tokens
            .iter()
            .filter_map(|token| match token {
                MarkupToken::Tag(tag) => Some(tag.name.clone()),
                MarkupToken::Text(_) => None,
            })
            .collect();
        assert_eq!(names, vec!["br".to_string(), "br".to_string()]);
    }

    #[test]
    fn escape_is_idempotent_and_preserves_entities() {
        let once = escape_text("1 < 2 & 3 &amp; <x>");
        assert_eq!(once, "1 &lt; 2 &amp; 3 &amp; &lt;x&gt;");
        assert_eq!(escape_text(&once), once);
    }

    #[test]
    fn literal_escape_keeps_entity_lookalikes_as_typed() {
        let typed = "use &amp; here, &lt; &#64; & <b>";
        let escaped = escape_literal(typed);
        assert_eq!(
            escaped,
            "use &amp;amp; here, &amp;lt; &amp;#64; &amp; &lt;b&gt;"
        );
        assert_eq!(decode_entities(&escaped), typed);
    }

    #[test]
    fn decode_handles_named_and_numeric_entities() {
        assert_eq!(decode_entities("&lt;a&gt; &amp; &#64;&#x41; &bogus;"), "<a> & @A &bogus;");
    }

    #[test]
    fn plain_text_turns_blocks_into_lines() {
        let text = plain_text("<p>one</p><ul><li>two</li><li>3 &amp; 4</li></ul>five<br>six");
        assert_eq!(text, "one\ntwo\n3 & 4\nfive\nsix");
    }
}
