use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::book::{BookProvider, Line, RenderedChapter, TermSize};
use crate::word_count::WordCountTable;

/// Where the reader currently is inside the book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportState {
    pub chapter_index: usize,
    /// Coarse progress marker inside the chapter, independent of layout width.
    pub word_position: usize,
    /// Scroll position in cells (`row * cols`), kept across width changes.
    pub precise_offset: usize,
    /// `precise_offset` mapped to a whole row.
    pub line_offset: usize,
}

/// Scroll offset, chapter transitions and progress bookkeeping over a
/// [`BookProvider`].
pub struct ViewportController {
    book: Box<dyn BookProvider>,
    chapter: RenderedChapter,
    word_counts: WordCountTable,
    chapter_lines: Vec<usize>,
    positions: Vec<usize>,
    state: ViewportState,
    rows: usize,
    cols: usize,
}

impl ViewportController {
    /// Opens the book at `chapter_index`, restoring the word position stored
    /// for that chapter in `positions`.
    ///
    /// `size` is the viewport geometry, i.e. the rows available for text.
    pub fn new(
        mut book: Box<dyn BookProvider>,
        mut positions: Vec<usize>,
        chapter_index: usize,
        size: TermSize,
    ) -> Result<Self> {
        let num_chapters = book.num_chapters();
        positions.resize(num_chapters, 0);

        let chapter_index = if chapter_index < num_chapters {
            chapter_index
        } else {
            0
        };

        book.update_term_info(size);
        if !book.set_current_chapter(chapter_index) {
            debug!("Provider refused chapter {chapter_index}, staying at its current chapter");
        }
        let chapter_lines = book
            .number_of_lines()
            .context("Failed to count chapter lines")?;

        let mut viewport = Self {
            book,
            chapter: RenderedChapter::default(),
            word_counts: WordCountTable::default(),
            chapter_lines,
            positions,
            state: ViewportState::default(),
            rows: usize::from(size.rows),
            cols: usize::from(size.cols).max(1),
        };
        viewport.load_current_chapter()?;
        let position = viewport.stored_position(viewport.state.chapter_index);
        viewport.restore_position(position);
        Ok(viewport)
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn chapter(&self) -> &RenderedChapter {
        &self.chapter
    }

    pub fn book(&self) -> &dyn BookProvider {
        self.book.as_ref()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_chapters(&self) -> usize {
        self.positions.len()
    }

    pub fn word_counts(&self) -> &WordCountTable {
        &self.word_counts
    }

    /// Largest valid `line_offset` for the current chapter and geometry.
    pub fn max_offset(&self) -> usize {
        self.chapter.rows().saturating_sub(self.rows)
    }

    /// Lines currently inside the viewport.
    pub fn visible_lines(&self) -> &[Line] {
        let lines = self.chapter.lines();
        let start = self.state.line_offset.min(lines.len());
        let end = start.saturating_add(self.rows).min(lines.len());
        &lines[start..end]
    }

    pub fn scroll_down(&mut self) -> bool {
        if self.state.line_offset >= self.max_offset() {
            return false;
        }
        self.set_precise_offset(self.state.precise_offset + self.cols);
        true
    }

    pub fn scroll_up(&mut self) -> bool {
        if self.state.line_offset == 0 {
            return false;
        }
        self.set_precise_offset(self.state.precise_offset.saturating_sub(self.cols));
        true
    }

    pub fn jump_top(&mut self) -> bool {
        if self.state.line_offset == 0 {
            return false;
        }
        self.set_precise_offset(0);
        true
    }

    pub fn jump_bottom(&mut self) -> bool {
        let bottom = self.max_offset();
        if self.state.line_offset == bottom {
            return false;
        }
        self.set_precise_offset(bottom * self.cols);
        true
    }

    /// Moves to the next chapter, returning false at the end of the book.
    pub fn next_chapter(&mut self) -> Result<bool> {
        self.remember_position();
        let previous = self.state.chapter_index;
        if !self.book.next_chapter() {
            return Ok(false);
        }
        Ok(self.enter_current_chapter(previous))
    }

    /// Moves to the previous chapter, returning false at the start of the book.
    pub fn previous_chapter(&mut self) -> Result<bool> {
        self.remember_position();
        let previous = self.state.chapter_index;
        if !self.book.previous_chapter() {
            return Ok(false);
        }
        Ok(self.enter_current_chapter(previous))
    }

    /// Jumps to `chapter_index` at `word_position`.
    pub fn goto(&mut self, chapter_index: usize, word_position: usize) -> Result<bool> {
        if chapter_index >= self.num_chapters() {
            return Ok(false);
        }
        self.remember_position();
        let previous = self.state.chapter_index;
        if chapter_index != previous {
            if !self.book.set_current_chapter(chapter_index) {
                return Ok(false);
            }
            if !self.load_or_revert(previous) {
                return Ok(false);
            }
        }
        self.restore_position(word_position);
        Ok(true)
    }

    /// Re-lays the book out for `size`, keeping the reading position.
    ///
    /// The cell offset is rescaled by the column ratio and clamped into
    /// `[0, max_offset * cols]`.
    pub fn resize(&mut self, size: TermSize) -> Result<()> {
        let old_cols = self.cols;
        self.book.update_term_info(size);
        self.rows = usize::from(size.rows);
        self.cols = usize::from(size.cols).max(1);
        self.chapter_lines = self
            .book
            .number_of_lines()
            .context("Failed to count chapter lines after resize")?;
        self.load_current_chapter()?;

        let scaled = self.state.precise_offset * old_cols / self.cols;
        let limit = self.max_offset() * self.cols;
        self.set_precise_offset(scaled.min(limit));
        debug!(
            "Resized viewport to {}x{}, offset {} -> row {}",
            self.cols, self.rows, self.state.precise_offset, self.state.line_offset
        );
        Ok(())
    }

    /// Lines read so far across the whole book, counting the viewport.
    pub fn progress(&self) -> usize {
        let before: usize = self
            .chapter_lines
            .iter()
            .take(self.state.chapter_index)
            .sum();
        (before + self.state.line_offset + self.rows).min(self.total_lines())
    }

    pub fn total_lines(&self) -> usize {
        self.chapter_lines.iter().sum()
    }

    pub fn percentage(&self) -> usize {
        match self.total_lines() {
            0 => 100,
            total => self.progress() * 100 / total,
        }
    }

    /// Per-chapter word positions with the current chapter's position recorded.
    pub fn positions(&self) -> Vec<usize> {
        let mut positions = self.positions.clone();
        if let Some(slot) = positions.get_mut(self.state.chapter_index) {
            *slot = self.state.word_position;
        }
        positions
    }

    fn stored_position(&self, chapter_index: usize) -> usize {
        self.positions.get(chapter_index).copied().unwrap_or(0)
    }

    fn remember_position(&mut self) {
        let index = self.state.chapter_index;
        if let Some(slot) = self.positions.get_mut(index) {
            *slot = self.state.word_position;
        }
    }

    fn enter_current_chapter(&mut self, previous: usize) -> bool {
        if !self.load_or_revert(previous) {
            return false;
        }
        let position = self.stored_position(self.state.chapter_index);
        self.restore_position(position);
        info!(
            "Entered chapter {}/{}",
            self.state.chapter_index + 1,
            self.num_chapters()
        );
        true
    }

    /// Renders the chapter the provider moved to. When that fails the
    /// provider is stepped back to `previous` and the current chapter stays.
    fn load_or_revert(&mut self, previous: usize) -> bool {
        match self.load_current_chapter() {
            Ok(()) => true,
            Err(e) => {
                warn!("Staying in chapter {}: {e:#}", previous + 1);
                if !self.book.set_current_chapter(previous) {
                    warn!("Provider refused to return to chapter {}", previous + 1);
                }
                false
            }
        }
    }

    fn load_current_chapter(&mut self) -> Result<()> {
        let index = self.book.current_chapter();
        self.chapter = self
            .book
            .render_current_chapter()
            .with_context(|| format!("Failed to render chapter {index}"))?;
        self.word_counts = WordCountTable::from_chapter(&self.chapter);
        self.state.chapter_index = index;
        Ok(())
    }

    fn restore_position(&mut self, word_position: usize) {
        let offset = self
            .word_counts
            .offset_from_position(word_position)
            .min(self.max_offset());
        self.set_precise_offset(offset * self.cols);
    }

    fn set_precise_offset(&mut self, precise_offset: usize) {
        self.state.precise_offset = precise_offset;
        self.state.line_offset = (precise_offset / self.cols).min(self.max_offset());
        self.state.word_position = self.word_counts.prefix_sum(self.state.line_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::MemoryBook;

    fn numbered_chapter(prefix: &str, lines: usize) -> String {
        (1..=lines)
            .map(|i| format!("{prefix} line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn viewport(chapters: &[usize], rows: u16) -> ViewportController {
        let texts: Vec<String> = chapters
            .iter()
            .enumerate()
            .map(|(i, n)| numbered_chapter(&format!("c{i}"), *n))
            .collect();
        let book = MemoryBook::from_texts(&texts);
        ViewportController::new(
            Box::new(book),
            Vec::new(),
            0,
            TermSize::new(40, rows),
        )
        .unwrap()
    }

    #[test]
    fn test_scroll_stays_within_bounds() {
        let mut vp = viewport(&[20], 5);
        for _ in 0..25 {
            vp.scroll_down();
            assert!(vp.state().line_offset <= 15);
        }
        assert_eq!(vp.state().line_offset, 15);
        assert!(!vp.scroll_down());

        for _ in 0..30 {
            vp.scroll_up();
        }
        assert_eq!(vp.state().line_offset, 0);
        assert!(!vp.scroll_up());
    }

    #[test]
    fn test_scroll_updates_word_position_to_prefix_sum() {
        // every line has three words
        let mut vp = viewport(&[10], 4);
        assert_eq!(vp.state().word_position, 3);
        vp.scroll_down();
        vp.scroll_down();
        assert_eq!(vp.state().line_offset, 2);
        assert_eq!(vp.state().word_position, 9);
        assert_eq!(vp.state().precise_offset, 80);
    }

    #[test]
    fn test_jump_top_and_bottom() {
        let mut vp = viewport(&[30], 10);
        assert!(vp.jump_bottom());
        assert_eq!(vp.state().line_offset, 20);
        assert_eq!(vp.state().word_position, vp.word_counts().prefix_sum(20));
        assert!(!vp.jump_bottom());
        assert!(vp.jump_top());
        assert_eq!(vp.state().line_offset, 0);
        assert_eq!(vp.state().word_position, 3);
    }

    #[test]
    fn test_short_chapter_never_scrolls() {
        let mut vp = viewport(&[3], 10);
        assert_eq!(vp.max_offset(), 0);
        assert!(!vp.scroll_down());
        assert!(!vp.jump_bottom());
        assert_eq!(vp.visible_lines().len(), 3);
    }

    #[test]
    fn test_chapter_transitions_restore_stored_positions() {
        let mut vp = viewport(&[20, 20, 20], 5);
        for _ in 0..4 {
            vp.scroll_down();
        }
        assert!(vp.next_chapter().unwrap());
        assert_eq!(vp.state().chapter_index, 1);
        assert_eq!(vp.state().line_offset, 0);

        assert!(vp.previous_chapter().unwrap());
        assert_eq!(vp.state().chapter_index, 0);
        assert_eq!(vp.state().line_offset, 4);
        assert_eq!(vp.positions()[0], vp.state().word_position);
    }

    #[test]
    fn test_chapter_bounds() {
        let mut vp = viewport(&[5, 5], 3);
        assert!(!vp.previous_chapter().unwrap());
        assert!(vp.next_chapter().unwrap());
        assert!(!vp.next_chapter().unwrap());
        assert_eq!(vp.state().chapter_index, 1);
    }

    #[test]
    fn test_unreadable_chapter_keeps_current_one() {
        let book = MemoryBook::from_texts(&[
            numbered_chapter("a", 30),
            numbered_chapter("b", 30),
            numbered_chapter("c", 30),
        ])
        .with_broken_chapter(1);
        let mut vp =
            ViewportController::new(Box::new(book), Vec::new(), 0, TermSize::new(40, 10)).unwrap();
        vp.scroll_down();

        assert!(!vp.next_chapter().unwrap());
        assert_eq!(vp.state().chapter_index, 0);
        assert_eq!(vp.book().current_chapter(), 0);
        assert_eq!(vp.state().line_offset, 1);
        assert_eq!(vp.visible_lines()[0].elements[0].text, "a line 2");

        assert!(!vp.goto(1, 0).unwrap());
        assert_eq!(vp.book().current_chapter(), 0);

        // chapters past the broken one are still reachable
        assert!(vp.goto(2, 0).unwrap());
        assert_eq!(vp.state().chapter_index, 2);
        assert!(!vp.previous_chapter().unwrap());
        assert_eq!(vp.book().current_chapter(), 2);
    }

    #[test]
    fn test_restores_position_from_stored_positions() {
        let book = MemoryBook::from_texts(&[numbered_chapter("a", 30), numbered_chapter("b", 30)]);
        // word position 22 lies on row 7 (inclusive prefix sums 3, 6, ..., 24)
        let vp = ViewportController::new(Box::new(book), vec![0, 22], 1, TermSize::new(40, 10))
            .unwrap();
        assert_eq!(vp.state().chapter_index, 1);
        assert_eq!(vp.state().line_offset, 7);
        assert_eq!(vp.state().word_position, 24);
    }

    #[test]
    fn test_out_of_range_chapter_falls_back_to_first() {
        let book = MemoryBook::from_texts(&[numbered_chapter("a", 3)]);
        let vp = ViewportController::new(Box::new(book), vec![0, 0, 0], 7, TermSize::new(40, 10))
            .unwrap();
        assert_eq!(vp.state().chapter_index, 0);
        assert_eq!(vp.positions().len(), 1);
    }

    #[test]
    fn test_resize_rescales_precise_offset() {
        let mut vp = viewport(&[100], 10);
        for _ in 0..30 {
            vp.scroll_down();
        }
        assert_eq!(vp.state().precise_offset, 30 * 40);

        vp.resize(TermSize::new(80, 10)).unwrap();
        assert_eq!(vp.state().precise_offset, 30 * 40 * 40 / 80);
        assert_eq!(vp.state().line_offset, 600 / 80);
    }

    #[test]
    fn test_resize_clamps_offset_into_range() {
        let mut vp = viewport(&[40], 10);
        vp.jump_bottom();
        vp.resize(TermSize::new(10, 10)).unwrap();
        let limit = vp.max_offset() * vp.cols();
        assert!(vp.state().precise_offset <= limit);
        assert_eq!(vp.state().line_offset, vp.max_offset());

        vp.resize(TermSize::new(10, 60)).unwrap();
        assert_eq!(vp.state().precise_offset, 0);
        assert_eq!(vp.state().line_offset, 0);
    }

    #[test]
    fn test_progress_is_monotonic_and_reaches_hundred() {
        let mut vp = viewport(&[12, 3, 20], 5);
        let mut last = vp.percentage();
        loop {
            while vp.scroll_down() {
                let pct = vp.percentage();
                assert!(pct >= last, "{pct} < {last}");
                last = pct;
            }
            if !vp.next_chapter().unwrap() {
                break;
            }
            let pct = vp.percentage();
            assert!(pct >= last, "{pct} < {last} after chapter change");
            last = pct;
        }
        assert_eq!(vp.percentage(), 100);
        assert_eq!(vp.progress(), vp.total_lines());
    }

    #[test]
    fn test_goto_records_current_position() {
        let mut vp = viewport(&[20, 20], 5);
        vp.scroll_down();
        let before = vp.state().word_position;
        assert!(vp.goto(1, 9).unwrap());
        assert_eq!(vp.state().chapter_index, 1);
        assert_eq!(vp.state().line_offset, 2);
        assert_eq!(vp.positions()[0], before);
        assert!(!vp.goto(5, 0).unwrap());
    }
}
