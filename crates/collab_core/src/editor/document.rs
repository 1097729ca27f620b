//! Text-run document model for the editable surface.
//!
//! # Responsibility
//! - Represent formatted content as blocks of styled text runs.
//! - Convert between the document and the trusted markup subset.
//!
//! # Invariants
//! - Documents are always normalized: adjacent runs with equal style are
//!   merged, empty runs are dropped, and a lone empty paragraph collapses to
//!   an empty document.
//! - `Document::from_markup(&doc.to_markup()) == doc` for every normalized
//!   document.
//! - Offsets are char offsets over `plain_text()`, blocks joined by `\n`.

use crate::markup::{decode_entities, escape_literal, tokenize, MarkupToken};

/// Inline formatting flags carried by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// One toggleable inline flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineFlag {
    Bold,
    Italic,
    Underline,
}

impl InlineStyle {
    pub fn get(&self, flag: InlineFlag) -> bool {
        match flag {
            InlineFlag::Bold => self.bold,
            InlineFlag::Italic => self.italic,
            InlineFlag::Underline => self.underline,
        }
    }

    pub fn with(mut self, flag: InlineFlag, enabled: bool) -> Self {
        match flag {
            InlineFlag::Bold => self.bold = enabled,
            InlineFlag::Italic => self.italic = enabled,
            InlineFlag::Underline => self.underline = enabled,
        }
        self
    }
}

/// Block-level structure of one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockKind {
    #[default]
    Paragraph,
    UnorderedItem,
    OrderedItem,
}

impl BlockKind {
    fn list_tag(self) -> Option<&'static str> {
        match self {
            Self::Paragraph => None,
            Self::UnorderedItem => Some("ul"),
            Self::OrderedItem => Some("ol"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub style: InlineStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: InlineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub runs: Vec<TextRun>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            runs: Vec::new(),
        }
    }

    pub fn with_runs(kind: BlockKind, runs: Vec<TextRun>) -> Self {
        let mut block = Self { kind, runs };
        block.normalize();
        block
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.runs.iter().map(|run| run.text.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub(crate) fn styled_chars(&self) -> Vec<(char, InlineStyle)> {
        self.runs
            .iter()
            .flat_map(|run| run.text.chars().map(move |ch| (ch, run.style)))
            .collect()
    }

    pub(crate) fn from_styled_chars(kind: BlockKind, chars: &[(char, InlineStyle)]) -> Self {
        let mut runs: Vec<TextRun> = Vec::new();
        for &(ch, style) in chars {
            match runs.last_mut() {
                Some(run) if run.style == style => run.text.push(ch),
                _ => runs.push(TextRun::new(ch.to_string(), style)),
            }
        }
        Self { kind, runs }
    }

    fn normalize(&mut self) {
        let mut merged: Vec<TextRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.style == run.style => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

/// Ordered sequence of blocks; the editor's single source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut document = Self { blocks };
        document.normalize();
        document
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total length in chars, counting one separator between blocks.
    pub fn len(&self) -> usize {
        let text: usize = self.blocks.iter().map(Block::len).sum();
        text + self.blocks.len().saturating_sub(1)
    }

    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn normalize(&mut self) {
        for block in &mut self.blocks {
            block.normalize();
        }
        if self.blocks.len() == 1
            && self.blocks[0].kind == BlockKind::Paragraph
            && self.blocks[0].is_empty()
        {
            self.blocks.clear();
        }
    }

    /// Parses the trusted markup subset.
    ///
    /// Unknown tags are dropped while their text is kept; a `<br>` that only
    /// pads an otherwise empty line is ignored.
    pub fn from_markup(markup: &str) -> Self {
        let tokens = tokenize(markup);
        let mut reader = MarkupReader::default();

        for (index, token) in tokens.iter().enumerate() {
            match token {
                MarkupToken::Text(text) => {
                    let decoded = decode_entities(text).replace("\r\n", "\n");
                    for (line_index, line) in decoded.split('\n').enumerate() {
                        if line_index > 0 {
                            reader.line_break();
                        }
                        if !line.is_empty() {
                            reader.push_text(line);
                        }
                    }
                }
                MarkupToken::Tag(tag) => match (tag.name.as_str(), tag.closing) {
                    ("b" | "strong", closing) => reader.bold = adjust(reader.bold, closing),
                    ("i" | "em", closing) => reader.italic = adjust(reader.italic, closing),
                    ("u", closing) => reader.underline = adjust(reader.underline, closing),
                    ("ul", false) => reader.open_list(BlockKind::UnorderedItem),
                    ("ol", false) => reader.open_list(BlockKind::OrderedItem),
                    ("ul" | "ol", true) => reader.close_list(),
                    ("li" | "p" | "div", false) => reader.open_block(),
                    ("li" | "p" | "div", true) => reader.finish_block(),
                    ("br", _) => {
                        let pads_line = matches!(
                            tokens.get(index + 1),
                            Some(MarkupToken::Tag(next))
                                if next.closing && matches!(next.name.as_str(), "li" | "p" | "div")
                        );
                        if !pads_line {
                            reader.line_break();
                        }
                    }
                    _ => {}
                },
            }
        }

        reader.finish_block();
        Self::from_blocks(reader.blocks)
    }

    /// Renders canonical markup: `<p>` paragraphs, grouped `<ul>`/`<ol>`
    /// lists, inline styles nested as `<b><i><u>`.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        let mut open_list: Option<BlockKind> = None;

        for block in &self.blocks {
            if open_list.is_some() && open_list != Some(block.kind) {
                close_list(&mut out, open_list.take());
            }
            match block.kind.list_tag() {
                None => {
                    out.push_str("<p>");
                    render_runs(&block.runs, &mut out);
                    out.push_str("</p>");
                }
                Some(tag) => {
                    if open_list.is_none() {
                        out.push('<');
                        out.push_str(tag);
                        out.push('>');
                        open_list = Some(block.kind);
                    }
                    out.push_str("<li>");
                    render_runs(&block.runs, &mut out);
                    out.push_str("</li>");
                }
            }
        }
        close_list(&mut out, open_list);
        out
    }
}

fn adjust(depth: u32, closing: bool) -> u32 {
    if closing {
        depth.saturating_sub(1)
    } else {
        depth + 1
    }
}

fn close_list(out: &mut String, kind: Option<BlockKind>) {
    if let Some(tag) = kind.and_then(BlockKind::list_tag) {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

fn render_runs(runs: &[TextRun], out: &mut String) {
    for run in runs {
        let tags: Vec<&str> = [
            (run.style.bold, "b"),
            (run.style.italic, "i"),
            (run.style.underline, "u"),
        ]
        .into_iter()
        .filter_map(|(enabled, tag)| enabled.then_some(tag))
        .collect();

        for tag in &tags {
            out.push('<');
            out.push_str(tag);
            out.push('>');
        }
        out.push_str(&escape_literal(&run.text));
        for tag in tags.iter().rev() {
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[derive(Default)]
struct MarkupReader {
    blocks: Vec<Block>,
    current: Option<Block>,
    list: Option<BlockKind>,
    bold: u32,
    italic: u32,
    underline: u32,
}

impl MarkupReader {
    fn context_kind(&self) -> BlockKind {
        self.list.unwrap_or(BlockKind::Paragraph)
    }

    fn style(&self) -> InlineStyle {
        InlineStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
        }
    }

    fn push_text(&mut self, text: &str) {
        let style = self.style();
        let kind = self.context_kind();
        self.current
            .get_or_insert_with(|| Block::new(kind))
            .runs
            .push(TextRun::new(text, style));
    }

    fn finish_block(&mut self) {
        if let Some(block) = self.current.take() {
            self.blocks.push(block);
        }
    }

    fn open_block(&mut self) {
        self.finish_block();
        self.current = Some(Block::new(self.context_kind()));
    }

    fn line_break(&mut self) {
        let kind = self
            .current
            .as_ref()
            .map_or_else(|| self.context_kind(), |block| block.kind);
        let finished = self.current.take().unwrap_or_else(|| Block::new(kind));
        self.blocks.push(finished);
        self.current = Some(Block::new(kind));
    }

    fn open_list(&mut self, kind: BlockKind) {
        self.finish_block();
        self.list = Some(kind);
    }

    fn close_list(&mut self) {
        self.finish_block();
        self.list = None;
    }
}
