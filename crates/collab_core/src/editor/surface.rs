//! Editable rich-text surface.
//!
//! # Responsibility
//! - Own one `Document` and its rendered markup (`EditorBuffer`).
//! - Route every edit, shortcut and paste through `apply_format_command`.
//! - Sync externally supplied values without disturbing the caret.
//!
//! # Invariants
//! - `EditorBuffer::rendered_markup` always equals `document.to_markup()`
//!   once a public call returns, whether the primitive succeeded or not.
//! - No change handler runs while `is_programmatic_update` is set.
//! - An external value whose canonical form matches the rendered markup is
//!   ignored, so the caret and history survive.

use crate::config::{CollabConfig, DEFAULT_UNDO_DEPTH};
use crate::editor::document::{BlockKind, Document, InlineFlag, InlineStyle};
use crate::editor::ops::{self, FormatError, Selection};
use log::{debug, warn};
use std::collections::VecDeque;

/// Live state of one surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorBuffer {
    pub rendered_markup: String,
    pub is_programmatic_update: bool,
}

/// Single entry point for edits and formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    UnorderedList,
    OrderedList,
    Undo,
    Redo,
    /// Replaces the selection with plain text in the caret style.
    InsertText(String),
    DeleteBackward,
}

impl FormatCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::UnorderedList => "unordered_list",
            Self::OrderedList => "ordered_list",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::InsertText(_) => "insert_text",
            Self::DeleteBackward => "delete_backward",
        }
    }

    /// Block kind for structural list commands.
    pub fn list_kind(&self) -> Option<BlockKind> {
        match self {
            Self::UnorderedList => Some(BlockKind::UnorderedItem),
            Self::OrderedList => Some(BlockKind::OrderedItem),
            _ => None,
        }
    }

    fn inline_flag(&self) -> Option<InlineFlag> {
        match self {
            Self::Bold => Some(InlineFlag::Bold),
            Self::Italic => Some(InlineFlag::Italic),
            Self::Underline => Some(InlineFlag::Underline),
            _ => None,
        }
    }

    /// Maps a keyboard chord to its command, if it is a formatting shortcut.
    pub fn from_shortcut(chord: KeyChord) -> Option<Self> {
        if !(chord.ctrl || chord.meta) {
            return None;
        }
        match (chord.key.to_ascii_lowercase(), chord.shift) {
            ('b', false) => Some(Self::Bold),
            ('i', false) => Some(Self::Italic),
            ('u', false) => Some(Self::Underline),
            ('z', false) => Some(Self::Undo),
            ('z', true) | ('y', false) => Some(Self::Redo),
            _ => None,
        }
    }
}

/// Key press with modifiers as delivered by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyChord {
    pub key: char,
    pub ctrl: bool,
    /// Command key on macOS hosts.
    pub meta: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn ctrl(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn ctrl_shift(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            shift: true,
            ..Self::default()
        }
    }
}

/// Clipboard payload offered to `paste`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardContent {
    Plain(String),
    /// Foreign markup; only its visible text is kept.
    Markup(String),
}

/// Result of one `apply_format_command` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    Applied,
    /// A list primitive failed and an empty list item was inserted instead.
    FellBack(FormatError),
    /// The primitive failed; the buffer is unchanged but consistent.
    Failed(FormatError),
}

/// Host text-editing primitives.
///
/// `TextRunPrimitives` is the pure implementation; hosts with native editing
/// support can plug in their own and rely on the surface's fallback and
/// re-derivation steps.
pub trait FormattingPrimitives: Send {
    fn toggle_inline(
        &mut self,
        document: &mut Document,
        selection: Selection,
        flag: InlineFlag,
    ) -> Result<(), FormatError>;

    fn toggle_list(
        &mut self,
        document: &mut Document,
        selection: Selection,
        kind: BlockKind,
    ) -> Result<(), FormatError>;

    fn insert_text(
        &mut self,
        document: &mut Document,
        selection: Selection,
        text: &str,
        style: InlineStyle,
    ) -> Result<usize, FormatError>;

    fn delete_backward(
        &mut self,
        document: &mut Document,
        selection: Selection,
    ) -> Result<usize, FormatError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextRunPrimitives;

impl FormattingPrimitives for TextRunPrimitives {
    fn toggle_inline(
        &mut self,
        document: &mut Document,
        selection: Selection,
        flag: InlineFlag,
    ) -> Result<(), FormatError> {
        ops::toggle_inline(document, selection, flag)
    }

    fn toggle_list(
        &mut self,
        document: &mut Document,
        selection: Selection,
        kind: BlockKind,
    ) -> Result<(), FormatError> {
        ops::toggle_list(document, selection, kind)
    }

    fn insert_text(
        &mut self,
        document: &mut Document,
        selection: Selection,
        text: &str,
        style: InlineStyle,
    ) -> Result<usize, FormatError> {
        ops::insert_text(document, selection, text, style)
    }

    fn delete_backward(
        &mut self,
        document: &mut Document,
        selection: Selection,
    ) -> Result<usize, FormatError> {
        ops::delete_backward(document, selection)
    }
}

/// Handle returned by `on_user_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeHandlerId(u64);

type ChangeHandler = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone)]
struct Snapshot {
    document: Document,
    selection: Selection,
}

#[derive(Debug)]
struct History {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    depth: usize,
}

impl History {
    fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    fn record(&mut self, snapshot: Snapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        Some(next)
    }

    fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

/// One editable surface; never shared between instances.
pub struct RichTextSurface {
    buffer: EditorBuffer,
    document: Document,
    selection: Selection,
    pending_style: InlineStyle,
    primitives: Box<dyn FormattingPrimitives>,
    history: History,
    handlers: Vec<(ChangeHandlerId, ChangeHandler)>,
    next_handler_id: u64,
}

impl Default for RichTextSurface {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl RichTextSurface {
    pub fn new(undo_depth: usize) -> Self {
        Self::with_primitives(Box::new(TextRunPrimitives), undo_depth)
    }

    pub fn from_config(config: &CollabConfig) -> Self {
        Self::new(config.undo_depth)
    }

    pub fn with_primitives(primitives: Box<dyn FormattingPrimitives>, undo_depth: usize) -> Self {
        Self {
            buffer: EditorBuffer::default(),
            document: Document::new(),
            selection: Selection::default(),
            pending_style: InlineStyle::default(),
            primitives,
            history: History::new(undo_depth),
            handlers: Vec::new(),
            next_handler_id: 0,
        }
    }

    /// Current rendered markup.
    pub fn value(&self) -> &str {
        &self.buffer.rendered_markup
    }

    pub fn buffer(&self) -> &EditorBuffer {
        &self.buffer
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Style applied to the next typed text.
    pub fn pending_style(&self) -> InlineStyle {
        self.pending_style
    }

    pub fn can_undo(&self) -> bool {
        !self.history.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.history.redo.is_empty()
    }

    /// Moves the selection; offsets past the end are clamped.
    pub fn set_selection(&mut self, anchor: usize, focus: usize) {
        self.selection = Selection::new(anchor, focus).clamp(self.document.len());
        self.pending_style = ops::style_at(&self.document, self.selection.start);
    }

    /// Syncs a value supplied by the owner of the surface.
    ///
    /// Returns `true` when the surface was re-rendered. Values equal to the
    /// rendered markup (after canonicalization) and values arriving while a
    /// formatting command is in flight are ignored.
    pub fn set_external_value(&mut self, markup: &str) -> bool {
        if self.buffer.is_programmatic_update {
            debug!("event=external_value module=editor status=skipped reason=format_in_flight");
            return false;
        }
        if markup == self.buffer.rendered_markup {
            return false;
        }
        let incoming = Document::from_markup(markup);
        if incoming.to_markup() == self.buffer.rendered_markup {
            debug!("event=external_value module=editor status=skipped reason=unchanged");
            return false;
        }

        self.buffer.is_programmatic_update = true;
        self.document = incoming;
        self.history.clear();
        self.selection = Selection::caret(self.document.len());
        self.pending_style = ops::style_at(&self.document, self.selection.start);
        self.rederive();
        self.buffer.is_programmatic_update = false;
        debug!(
            "event=external_value module=editor status=ok chars={}",
            self.document.len()
        );
        true
    }

    /// Subscribes to user-intent changes; the handler receives the new markup.
    pub fn on_user_change(&mut self, handler: impl FnMut(&str) + Send + 'static) -> ChangeHandlerId {
        let id = ChangeHandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn remove_change_handler(&mut self, id: ChangeHandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Runs one command: primitive, list fallback, then re-derivation.
    pub fn apply_format_command(&mut self, command: FormatCommand) -> FormatOutcome {
        let before = self.snapshot();
        let rendered_before = self.buffer.rendered_markup.clone();
        self.buffer.is_programmatic_update = true;

        let outcome = match self.run_primitive(&command) {
            Ok(()) => FormatOutcome::Applied,
            Err(err) => match command.list_kind() {
                Some(kind) => {
                    warn!(
                        "event=format_command module=editor status=fallback command={} error={}",
                        command.name(),
                        err
                    );
                    let caret = ops::list_skeleton(&mut self.document, self.selection.end, kind);
                    self.selection = Selection::caret(caret);
                    FormatOutcome::FellBack(err)
                }
                None => {
                    warn!(
                        "event=format_command module=editor status=error command={} error={}",
                        command.name(),
                        err
                    );
                    FormatOutcome::Failed(err)
                }
            },
        };

        // The primitive may not report its own change, so always re-derive.
        self.rederive();
        self.buffer.is_programmatic_update = false;

        if self.buffer.rendered_markup != rendered_before {
            if !matches!(command, FormatCommand::Undo | FormatCommand::Redo) {
                self.history.record(before);
            }
            self.emit_change();
        }
        outcome
    }

    /// Applies the command bound to `chord`; `None` when it is not a shortcut.
    pub fn handle_shortcut(&mut self, chord: KeyChord) -> Option<FormatOutcome> {
        FormatCommand::from_shortcut(chord).map(|command| self.apply_format_command(command))
    }

    /// Typing entry point.
    pub fn insert_text(&mut self, text: impl Into<String>) -> FormatOutcome {
        self.apply_format_command(FormatCommand::InsertText(text.into()))
    }

    pub fn delete_backward(&mut self) -> FormatOutcome {
        self.apply_format_command(FormatCommand::DeleteBackward)
    }

    /// Inserts clipboard content as plain text in the surface's own style.
    pub fn paste(&mut self, content: ClipboardContent) -> FormatOutcome {
        let text = match content {
            ClipboardContent::Plain(text) => text,
            ClipboardContent::Markup(markup) => Document::from_markup(&markup).plain_text(),
        };
        self.apply_format_command(FormatCommand::InsertText(text))
    }

    fn run_primitive(&mut self, command: &FormatCommand) -> Result<(), FormatError> {
        if let Some(flag) = command.inline_flag() {
            if self.selection.is_collapsed() {
                let enabled = self.pending_style.get(flag);
                self.pending_style = self.pending_style.with(flag, !enabled);
                return Ok(());
            }
            self.primitives
                .toggle_inline(&mut self.document, self.selection, flag)?;
            self.pending_style = ops::style_at(&self.document, self.selection.end);
            return Ok(());
        }
        if let Some(kind) = command.list_kind() {
            return self
                .primitives
                .toggle_list(&mut self.document, self.selection, kind);
        }

        match command {
            FormatCommand::InsertText(text) => {
                let caret = self.primitives.insert_text(
                    &mut self.document,
                    self.selection,
                    text,
                    self.pending_style,
                )?;
                self.selection = Selection::caret(caret);
                Ok(())
            }
            FormatCommand::DeleteBackward => {
                let caret = self
                    .primitives
                    .delete_backward(&mut self.document, self.selection)?;
                self.selection = Selection::caret(caret);
                Ok(())
            }
            FormatCommand::Undo => {
                let current = self.snapshot();
                let previous = self.history.undo(current).ok_or(FormatError::NothingToUndo)?;
                self.restore(previous);
                Ok(())
            }
            FormatCommand::Redo => {
                let current = self.snapshot();
                let next = self.history.redo(current).ok_or(FormatError::NothingToRedo)?;
                self.restore(next);
                Ok(())
            }
            FormatCommand::Bold
            | FormatCommand::Italic
            | FormatCommand::Underline
            | FormatCommand::UnorderedList
            | FormatCommand::OrderedList => Ok(()),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            document: self.document.clone(),
            selection: self.selection,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.document = snapshot.document;
        self.selection = snapshot.selection;
        self.pending_style = ops::style_at(&self.document, self.selection.start);
    }

    fn rederive(&mut self) {
        self.buffer.rendered_markup = self.document.to_markup();
        self.selection = self.selection.clamp(self.document.len());
    }

    fn emit_change(&mut self) {
        if self.buffer.is_programmatic_update {
            return;
        }
        let markup = &self.buffer.rendered_markup;
        for (_, handler) in &mut self.handlers {
            handler(markup);
        }
    }
}
