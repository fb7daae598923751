use std::path::PathBuf;

use thiserror::Error;
use unicode_width::UnicodeWidthStr;

/// Style flags carried by a rendered element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StyleFlags(u8);

impl StyleFlags {
    pub const BOLD: StyleFlags = StyleFlags(1);
    pub const ITALIC: StyleFlags = StyleFlags(1 << 1);
    pub const UNDERLINE: StyleFlags = StyleFlags(1 << 2);
    pub const REVERSE: StyleFlags = StyleFlags(1 << 3);
    pub const STRIKETHROUGH: StyleFlags = StyleFlags(1 << 4);

    pub const fn empty() -> Self {
        StyleFlags(0)
    }

    pub const fn contains(self, other: StyleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: StyleFlags) -> Self {
        StyleFlags(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: StyleFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for StyleFlags {
    type Output = StyleFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// An image referenced from chapter content.
///
/// `width` and `height` are measured in terminal cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: PathBuf,
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub text: String,
    pub style: StyleFlags,
    pub image: Option<ImageRef>,
}

impl Element {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: StyleFlags::empty(),
            image: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: StyleFlags) -> Self {
        Self {
            text: text.into(),
            style,
            image: None,
        }
    }

    pub fn image(text: impl Into<String>, image: ImageRef) -> Self {
        Self {
            text: text.into(),
            style: StyleFlags::empty(),
            image: Some(image),
        }
    }

    /// Display width in terminal columns.
    pub fn width(&self) -> usize {
        self.text.width()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub elements: Vec<Element>,
}

impl Line {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            elements: vec![Element::text(text)],
        }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    pub fn word_count(&self) -> usize {
        self.elements
            .iter()
            .map(|e| e.text.split_whitespace().count())
            .sum()
    }
}

/// One chapter as laid out by the book provider. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedChapter {
    lines: Vec<Line>,
}

impl RenderedChapter {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn rows(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Terminal geometry handed to the provider so it can lay chapters out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to open book {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("chapter {0} has no readable content")]
    MissingChapter(usize),
    #[error("failed to lay out chapter {index}: {reason}")]
    Layout { index: usize, reason: String },
}

/// Contract of the layout engine that turns a book into rendered chapters.
///
/// The provider keeps its own notion of the current chapter; the viewport
/// drives it through `next_chapter`/`previous_chapter`/`set_current_chapter`.
pub trait BookProvider {
    fn render_current_chapter(&mut self) -> Result<RenderedChapter, BookError>;

    /// Advances to the next chapter, returning false at the end of the book.
    fn next_chapter(&mut self) -> bool;

    /// Steps back one chapter, returning false at the start of the book.
    fn previous_chapter(&mut self) -> bool;

    fn set_current_chapter(&mut self, index: usize) -> bool;

    fn current_chapter(&self) -> usize;

    fn num_chapters(&self) -> usize;

    /// Table of contents as `(label, chapter index)` pairs in reading order.
    fn toc(&self) -> Vec<(String, usize)>;

    /// Rendered line count of every chapter at the current layout width.
    fn number_of_lines(&mut self) -> Result<Vec<usize>, BookError>;

    /// Re-layout for a new terminal geometry.
    fn update_term_info(&mut self, size: TermSize);
}
