//! Pure editing operations over `Document`.
//!
//! Every function leaves the document normalized, whether it succeeds or
//! returns an error.

use crate::editor::document::{Block, BlockKind, Document, InlineFlag, InlineStyle};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Char range over the document's plain text. `start <= end` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(anchor: usize, focus: usize) -> Self {
        Self {
            start: anchor.min(focus),
            end: anchor.max(focus),
        }
    }

    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn clamp(self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }
}

/// Failure reported by a formatting primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Inline formatting needs a non-empty selection.
    EmptySelection,
    /// Selection reaches past the end of the document.
    OutOfRange { offset: usize, len: usize },
    /// No block exists where a structural command should apply.
    NoBlockAtCaret,
    NothingToUndo,
    NothingToRedo,
    /// Host primitive refused the command.
    Rejected(String),
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySelection => write!(f, "selection is empty"),
            Self::OutOfRange { offset, len } => {
                write!(f, "offset {offset} is outside document of length {len}")
            }
            Self::NoBlockAtCaret => write!(f, "no block at caret"),
            Self::NothingToUndo => write!(f, "nothing to undo"),
            Self::NothingToRedo => write!(f, "nothing to redo"),
            Self::Rejected(reason) => write!(f, "primitive rejected command: {reason}"),
        }
    }
}

impl Error for FormatError {}

/// Maps a document offset to `(block index, char offset in block)`.
pub fn locate(document: &Document, offset: usize) -> Option<(usize, usize)> {
    let mut block_start = 0;
    for (index, block) in document.blocks().iter().enumerate() {
        let block_end = block_start + block.len();
        if offset <= block_end {
            return Some((index, offset - block_start));
        }
        block_start = block_end + 1;
    }
    None
}

fn check_range(document: &Document, selection: Selection) -> Result<(), FormatError> {
    let len = document.len();
    if selection.end > len {
        return Err(FormatError::OutOfRange {
            offset: selection.end,
            len,
        });
    }
    Ok(())
}

/// Style that typing at `offset` should inherit.
pub fn style_at(document: &Document, offset: usize) -> InlineStyle {
    let Some((index, in_block)) = locate(document, offset) else {
        return InlineStyle::default();
    };
    let chars = document.blocks()[index].styled_chars();
    let char_index = if in_block == 0 { 0 } else { in_block - 1 };
    chars
        .get(char_index)
        .map_or_else(InlineStyle::default, |&(_, style)| style)
}

/// Toggles `flag` over the selection: cleared when every selected char
/// already carries it, set otherwise.
pub fn toggle_inline(
    document: &mut Document,
    selection: Selection,
    flag: InlineFlag,
) -> Result<(), FormatError> {
    if selection.is_collapsed() {
        return Err(FormatError::EmptySelection);
    }
    check_range(document, selection)?;

    let mut exploded: Vec<Vec<(char, InlineStyle)>> = document
        .blocks()
        .iter()
        .map(Block::styled_chars)
        .collect();

    let mut covered = Vec::new();
    let mut block_start = 0;
    for (index, chars) in exploded.iter().enumerate() {
        let block_end = block_start + chars.len();
        let from = selection.start.max(block_start);
        let to = selection.end.min(block_end);
        if from < to {
            covered.push((index, from - block_start, to - block_start));
        }
        block_start = block_end + 1;
    }

    let enable = !covered.iter().all(|&(index, from, to)| {
        exploded[index][from..to]
            .iter()
            .all(|(_, style)| style.get(flag))
    });

    for &(index, from, to) in &covered {
        for entry in &mut exploded[index][from..to] {
            entry.1 = entry.1.with(flag, enable);
        }
    }

    let blocks = document
        .blocks()
        .iter()
        .zip(exploded.iter())
        .map(|(block, chars)| Block::from_styled_chars(block.kind, chars))
        .collect();
    *document = Document::from_blocks(blocks);
    Ok(())
}

/// Turns the selected blocks into `kind` list items, or back into
/// paragraphs when they already are.
pub fn toggle_list(
    document: &mut Document,
    selection: Selection,
    kind: BlockKind,
) -> Result<(), FormatError> {
    let (Some((first, _)), Some((last, _))) = (
        locate(document, selection.start),
        locate(document, selection.end),
    ) else {
        return Err(FormatError::NoBlockAtCaret);
    };

    let blocks = document.blocks_mut();
    let target = if blocks[first..=last].iter().all(|block| block.kind == kind) {
        BlockKind::Paragraph
    } else {
        kind
    };
    for block in &mut blocks[first..=last] {
        block.kind = target;
    }
    document.normalize();
    Ok(())
}

/// Inserts an empty `kind` block after the block holding `caret`.
///
/// Returns the caret offset inside the new block.
pub fn list_skeleton(document: &mut Document, caret: usize, kind: BlockKind) -> usize {
    if document.is_empty() {
        document.blocks_mut().push(Block::new(kind));
        return 0;
    }

    let index = locate(document, caret).map_or(document.blocks().len() - 1, |(index, _)| index);
    let offset: usize = document.blocks()[..=index]
        .iter()
        .map(|block| block.len() + 1)
        .sum();
    document.blocks_mut().insert(index + 1, Block::new(kind));
    document.normalize();
    offset
}

/// Removes the selected text, merging the boundary blocks.
pub fn delete_range(document: &mut Document, selection: Selection) -> Result<(), FormatError> {
    if selection.is_collapsed() {
        return Ok(());
    }
    check_range(document, selection)?;
    let (Some((first, from)), Some((last, to))) = (
        locate(document, selection.start),
        locate(document, selection.end),
    ) else {
        return Err(FormatError::NoBlockAtCaret);
    };

    let blocks = document.blocks_mut();
    let head = blocks[first].styled_chars();
    let tail = blocks[last].styled_chars();
    let mut merged: Vec<(char, InlineStyle)> = head[..from].to_vec();
    merged.extend_from_slice(&tail[to..]);

    let kind = blocks[first].kind;
    blocks.splice(first..=last, [Block::from_styled_chars(kind, &merged)]);
    document.normalize();
    Ok(())
}

/// Replaces the selection with `text`, typed in `style`.
///
/// `\n` starts a new block of the same kind. Returns the caret after the
/// inserted text.
pub fn insert_text(
    document: &mut Document,
    selection: Selection,
    text: &str,
    style: InlineStyle,
) -> Result<usize, FormatError> {
    check_range(document, selection)?;
    delete_range(document, selection)?;

    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    if text.is_empty() {
        return Ok(selection.start);
    }
    if document.is_empty() {
        document.blocks_mut().push(Block::new(BlockKind::Paragraph));
    }

    let (index, offset) =
        locate(document, selection.start).ok_or(FormatError::NoBlockAtCaret)?;
    let blocks = document.blocks_mut();
    let kind = blocks[index].kind;
    let chars = blocks[index].styled_chars();
    let (head, tail) = chars.split_at(offset);

    let mut lines: Vec<Vec<(char, InlineStyle)>> = text
        .split('\n')
        .map(|line| line.chars().map(|ch| (ch, style)).collect())
        .collect();
    if let Some(first) = lines.first_mut() {
        let mut prefixed = head.to_vec();
        prefixed.append(first);
        *first = prefixed;
    }
    if let Some(last) = lines.last_mut() {
        last.extend_from_slice(tail);
    }

    let replacement: Vec<Block> = lines
        .iter()
        .map(|line| Block::from_styled_chars(kind, line))
        .collect();
    blocks.splice(index..=index, replacement);
    document.normalize();

    Ok(selection.start + text.chars().count())
}

/// Deletes the selection, or the char before a collapsed caret.
///
/// Returns the resulting caret offset.
pub fn delete_backward(document: &mut Document, selection: Selection) -> Result<usize, FormatError> {
    if !selection.is_collapsed() {
        delete_range(document, selection)?;
        return Ok(selection.start);
    }
    if selection.start == 0 {
        return Ok(0);
    }
    delete_range(
        document,
        Selection::new(selection.start - 1, selection.start),
    )?;
    Ok(selection.start - 1)
}
