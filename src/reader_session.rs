use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{Event, KeyEvent, KeyEventKind};
use log::{debug, error, info};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::book::{self, BookProvider, StyleFlags, TermSize};
use crate::bookmarks::{BookPosition, BookmarkView, ConfirmationView};
use crate::command_prompt::{Command, CommandPrompt, PromptAction, PromptOutcome, parse_command};
use crate::event_source::EventSource;
use crate::keymap::{Action, Keymaps};
use crate::list_view::{ListAction, ListOutcome, ListView};
use crate::overlay::{Compositor, OverlayManager};
use crate::session_store::{SessionRecord, SessionStore};
use crate::table_of_contents::TocView;
use crate::viewport::ViewportController;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Process-wide resources of a session: the terminal and the image compositor.
///
/// Dropping the context shuts the compositor down.
pub struct SessionContext<B: Backend> {
    terminal: Terminal<B>,
    compositor: Box<dyn Compositor>,
}

impl<B: Backend> SessionContext<B>
where
    B::Error: Send + Sync + 'static,
{
    pub fn new(terminal: Terminal<B>, compositor: Box<dyn Compositor>) -> Self {
        Self {
            terminal,
            compositor,
        }
    }

    pub fn size(&self) -> Result<TermSize> {
        let size = self.terminal.size().context("Failed to query terminal size")?;
        Ok(TermSize::new(size.width, size.height))
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn compositor_mut(&mut self) -> &mut dyn Compositor {
        self.compositor.as_mut()
    }
}

impl<B: Backend> Drop for SessionContext<B> {
    fn drop(&mut self) {
        self.compositor.shutdown();
    }
}

/// Which view currently receives input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Reading,
    Toc,
    Bookmarks,
    Confirmation,
    CommandEntry,
}

/// A modal stacked above the reading view.
enum Mode {
    Toc,
    Bookmarks,
    Confirmation(ConfirmationView),
    CommandEntry,
}

impl Mode {
    fn kind(&self) -> ModeKind {
        match self {
            Mode::Toc => ModeKind::Toc,
            Mode::Bookmarks => ModeKind::Bookmarks,
            Mode::Confirmation(_) => ModeKind::Confirmation,
            Mode::CommandEntry => ModeKind::CommandEntry,
        }
    }

    fn hides_images(&self) -> bool {
        !matches!(self, Mode::CommandEntry)
    }
}

/// Result a closed modal hands to the mode below it.
enum Outcome {
    Toc(ListOutcome<usize>),
    Bookmarks(ListOutcome<BookPosition>),
    Confirmation(ListOutcome<bool>),
    Prompt(PromptOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Key(KeyEvent),
    Resize(TermSize),
}

impl Input {
    /// Key presses and resizes; everything else is ignored.
    pub fn from_event(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(Input::Key(key)),
            Event::Resize(cols, rows) => Some(Input::Resize(TermSize::new(cols, rows))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Top-level reader: owns the viewport and every modal and routes input to
/// whichever one is on top of the mode stack.
pub struct ReaderSession {
    book_path: PathBuf,
    store: SessionStore,
    keymaps: Keymaps,
    viewport: ViewportController,
    overlay: OverlayManager,
    toc: TocView,
    bookmarks: BookmarkView,
    prompt: CommandPrompt,
    modes: Vec<Mode>,
    term_size: TermSize,
    retrack_images: bool,
    shutdown: Option<Arc<AtomicBool>>,
}

impl ReaderSession {
    /// Opens `book` where the previous session for `book_path` left off.
    pub fn new(
        book: Box<dyn BookProvider>,
        book_path: impl Into<PathBuf>,
        store: SessionStore,
        keymaps: Keymaps,
        term_size: TermSize,
    ) -> Result<Self> {
        let book_path = book_path.into();
        let record = store.load(&book_path);
        debug!(
            "Restoring chapter {} with {} bookmarks",
            record.chapter_index,
            record.bookmarks.len()
        );

        let toc = TocView::new(book.toc());
        let viewport = ViewportController::new(
            book,
            record.positions,
            record.chapter_index,
            viewport_size(term_size),
        )?;
        info!(
            "Opened {book_path:?} at chapter {}/{}",
            viewport.state().chapter_index + 1,
            viewport.num_chapters()
        );

        Ok(Self {
            book_path,
            store,
            keymaps,
            viewport,
            overlay: OverlayManager::new(),
            toc,
            bookmarks: BookmarkView::new(record.bookmarks),
            prompt: CommandPrompt::new(),
            modes: Vec::new(),
            term_size,
            retrack_images: true,
            shutdown: None,
        })
    }

    /// Quit as soon as `flag` is raised, e.g. from a signal handler.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn book_path(&self) -> &Path {
        &self.book_path
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn overlay(&self) -> &OverlayManager {
        &self.overlay
    }

    pub fn bookmarks(&self) -> &BookmarkView {
        &self.bookmarks
    }

    pub fn toc(&self) -> &TocView {
        &self.toc
    }

    pub fn active_mode(&self) -> ModeKind {
        self.modes.last().map_or(ModeKind::Reading, Mode::kind)
    }

    pub fn mode_depth(&self) -> usize {
        self.modes.len()
    }

    /// Runs until quit, then saves the session.
    ///
    /// The session is saved even when the loop stops on an error; that
    /// error is returned after saving.
    pub fn run<B: Backend>(
        &mut self,
        ctx: &mut SessionContext<B>,
        events: &mut dyn EventSource,
    ) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        let result = self.event_loop(ctx, events);
        if let Err(e) = &result {
            error!("Session loop failed: {e:#}");
        }

        if let Err(e) = self.overlay.hide_all(ctx.compositor_mut()) {
            error!("Failed to clear images: {e:#}");
        }
        let saved = self.save();
        result.and(saved)
    }

    fn event_loop<B: Backend>(
        &mut self,
        ctx: &mut SessionContext<B>,
        events: &mut dyn EventSource,
    ) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        loop {
            if self.shutdown_requested() {
                info!("Termination requested");
                return Ok(());
            }
            self.draw(ctx)?;
            self.refresh_images(ctx.compositor_mut())?;

            if !events.poll(POLL_INTERVAL)? {
                continue;
            }
            let Some(input) = Input::from_event(events.read()?) else {
                continue;
            };
            if self.handle_input(input)? == Flow::Quit {
                return Ok(());
            }
        }
    }

    pub fn draw<B: Backend>(&self, ctx: &mut SessionContext<B>) -> Result<()>
    where
        B::Error: Send + Sync + 'static,
    {
        ctx.terminal
            .draw(|f| self.render(f))
            .context("Failed to draw frame")?;
        Ok(())
    }

    /// Writes positions, chapter and bookmarks to the session store.
    pub fn save(&self) -> Result<()> {
        let record = SessionRecord {
            positions: self.viewport.positions(),
            chapter_index: self.viewport.state().chapter_index,
            bookmarks: self.bookmarks.bookmarks().to_vec(),
        };
        self.store
            .save(&self.book_path, &record)
            .with_context(|| format!("Failed to save session for {:?}", self.book_path))
    }

    /// Routes one input to the active mode and unwinds finished modals.
    pub fn handle_input(&mut self, input: Input) -> Result<Flow> {
        if let Input::Resize(size) = input {
            self.term_size = size;
        }
        let outcome = match self.active_mode() {
            ModeKind::Reading => return self.handle_reading(input),
            ModeKind::Toc => {
                let action = self.list_action(input, ModeKind::Toc);
                self.toc.handle_action(action).map(Outcome::Toc)
            }
            ModeKind::Bookmarks => {
                let action = self.list_action(input, ModeKind::Bookmarks);
                if action == Action::DeleteBookmark {
                    self.open_confirmation();
                    None
                } else {
                    self.bookmarks.handle_action(action).map(Outcome::Bookmarks)
                }
            }
            ModeKind::Confirmation => {
                let action = self.list_action(input, ModeKind::Confirmation);
                match self.modes.last_mut() {
                    Some(Mode::Confirmation(dialog)) => {
                        dialog.handle_action(action).map(Outcome::Confirmation)
                    }
                    _ => None,
                }
            }
            ModeKind::CommandEntry => match input {
                Input::Key(key) => self.prompt.handle_key(key),
                Input::Resize(_) => Some(self.prompt.resize()),
            }
            .map(Outcome::Prompt),
        };
        match outcome {
            Some(outcome) => self.unwind(outcome),
            None => Ok(Flow::Continue),
        }
    }

    fn list_action(&self, input: Input, mode: ModeKind) -> Action {
        let keymap = match mode {
            ModeKind::Toc => &self.keymaps.toc,
            ModeKind::Bookmarks => &self.keymaps.bookmarks,
            _ => &self.keymaps.list,
        };
        match input {
            Input::Key(key) => keymap.action_for(&key).unwrap_or(Action::Noop),
            Input::Resize(_) => Action::Resize,
        }
    }

    /// Pops finished modals, handing each result to the mode below.
    fn unwind(&mut self, mut outcome: Outcome) -> Result<Flow> {
        loop {
            self.modes.pop();
            let parent_result = match self.active_mode() {
                ModeKind::Reading => return self.resume_reading(outcome),
                ModeKind::Bookmarks => match outcome {
                    Outcome::Confirmation(answer) => self.bookmarks.on_confirmation(answer),
                    _ => None,
                },
                _ => None,
            };
            match parent_result {
                // quit and resize close the parent as well
                Some(action) => {
                    outcome = Outcome::Bookmarks(ListOutcome {
                        action,
                        payload: None,
                    })
                }
                None => return Ok(Flow::Continue),
            }
        }
    }

    fn resume_reading(&mut self, outcome: Outcome) -> Result<Flow> {
        match outcome {
            Outcome::Toc(result) => {
                let target = result.payload.map(|chapter| BookPosition::new(chapter, 0));
                self.finish_list(result.action, target)
            }
            Outcome::Bookmarks(result) => self.finish_list(result.action, result.payload),
            Outcome::Confirmation(result) => self.finish_list(result.action, None),
            Outcome::Prompt(result) => {
                match result.action {
                    PromptAction::Submit => self.run_command(&result.text),
                    PromptAction::Cancel => {}
                    PromptAction::Resize => self.resize_viewport()?,
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn finish_list(&mut self, action: ListAction, target: Option<BookPosition>) -> Result<Flow> {
        match action {
            ListAction::Quit => return Ok(Flow::Quit),
            ListAction::Resize => self.resize_viewport()?,
            ListAction::Select => {
                if let Some(position) = target {
                    self.jump_to(position)?;
                }
            }
            ListAction::CloseView => {}
        }
        Ok(Flow::Continue)
    }

    fn handle_reading(&mut self, input: Input) -> Result<Flow> {
        let action = match input {
            Input::Key(key) => self.keymaps.reader.action_for(&key).unwrap_or(Action::Noop),
            Input::Resize(_) => Action::Resize,
        };
        match action {
            Action::Quit => return Ok(Flow::Quit),
            Action::ScrollDown => {
                self.viewport.scroll_down();
            }
            Action::ScrollUp => {
                self.viewport.scroll_up();
            }
            Action::JumpTop => {
                self.viewport.jump_top();
            }
            Action::JumpBottom => {
                self.viewport.jump_bottom();
            }
            Action::NextChapter => {
                if self.viewport.next_chapter()? {
                    self.retrack_images = true;
                }
            }
            Action::PreviousChapter => {
                if self.viewport.previous_chapter()? {
                    self.retrack_images = true;
                }
            }
            Action::Resize => self.resize_viewport()?,
            Action::OpenToc => {
                let chapter = self.viewport.state().chapter_index;
                let area = self.screen_area();
                if self.toc.open(area, &chapter) {
                    self.modes.push(Mode::Toc);
                }
            }
            Action::OpenBookmarks => {
                let position = self.current_position();
                let area = self.screen_area();
                if self.bookmarks.open(area, &position) {
                    self.modes.push(Mode::Bookmarks);
                }
            }
            Action::OpenCommandLine => {
                self.prompt.open("");
                self.modes.push(Mode::CommandEntry);
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn open_confirmation(&mut self) {
        let Some(mut dialog) = self.bookmarks.confirm_delete(self.term_size.cols) else {
            return;
        };
        let area = self.screen_area();
        if dialog.open(area, &()) {
            self.modes.push(Mode::Confirmation(dialog));
        }
    }

    fn run_command(&mut self, text: &str) {
        match parse_command(text) {
            Some(Command::AddBookmark(label)) => {
                let position = self.current_position();
                let stored = self.bookmarks.add_bookmark(&label, position);
                info!("Bookmarked {stored:?}");
            }
            None => debug!("Ignoring command {text:?}"),
        }
    }

    fn jump_to(&mut self, position: BookPosition) -> Result<()> {
        let before = self.viewport.state().chapter_index;
        if self.viewport.goto(position.chapter, position.word)?
            && self.viewport.state().chapter_index != before
        {
            self.retrack_images = true;
        }
        Ok(())
    }

    fn resize_viewport(&mut self) -> Result<()> {
        self.viewport.resize(viewport_size(self.term_size))?;
        self.retrack_images = true;
        Ok(())
    }

    fn current_position(&self) -> BookPosition {
        let state = self.viewport.state();
        BookPosition::new(state.chapter_index, state.word_position)
    }

    fn screen_area(&self) -> Rect {
        Rect::new(0, 0, self.term_size.cols, self.term_size.rows)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Brings the compositor in line with what is on screen.
    fn refresh_images(&mut self, compositor: &mut dyn Compositor) -> Result<()> {
        if self.retrack_images {
            self.overlay.hide_all(compositor)?;
            self.overlay.track_chapter(self.viewport.chapter());
            self.retrack_images = false;
        }
        if self.modes.iter().any(Mode::hides_images) {
            self.overlay.conceal(compositor)
        } else {
            self.overlay.sync_visibility(
                self.viewport.state().line_offset,
                self.viewport.rows(),
                compositor,
            )
        }
    }

    fn render(&self, f: &mut Frame) {
        let area = f.area();
        let text_area = Rect {
            height: area.height.saturating_sub(1),
            ..area
        };
        let status_area = Rect {
            y: area.y + text_area.height,
            height: area.height.min(1),
            ..area
        };

        let lines: Vec<Line> = self.viewport.visible_lines().iter().map(to_line).collect();
        f.render_widget(Paragraph::new(lines), text_area);
        self.render_status(f, status_area);

        for mode in &self.modes {
            match mode {
                Mode::Toc => self.toc.render(f),
                Mode::Bookmarks => self.bookmarks.render(f),
                Mode::Confirmation(dialog) => dialog.render(f),
                Mode::CommandEntry => self.prompt.render(f, status_area),
            }
        }
    }

    fn render_status(&self, f: &mut Frame, area: Rect) {
        let state = self.viewport.state();
        let style = Style::default().add_modifier(Modifier::DIM);
        let chapter = format!(
            " {}/{}",
            state.chapter_index + 1,
            self.viewport.num_chapters()
        );
        let percentage = format!("{}% ", self.viewport.percentage());
        f.render_widget(Paragraph::new(Line::styled(chapter, style)), area);
        f.render_widget(
            Paragraph::new(Line::styled(percentage, style).right_aligned()),
            area,
        );
    }
}

/// Viewport geometry for a terminal of `size`; the last row is the status line.
fn viewport_size(size: TermSize) -> TermSize {
    TermSize::new(size.cols, size.rows.saturating_sub(1))
}

fn to_line(line: &book::Line) -> Line<'_> {
    Line::from(
        line.elements
            .iter()
            .map(|element| Span::styled(element.text.as_str(), style_for(element.style)))
            .collect::<Vec<_>>(),
    )
}

fn style_for(flags: StyleFlags) -> Style {
    let mut modifier = Modifier::empty();
    for (flag, m) in [
        (StyleFlags::BOLD, Modifier::BOLD),
        (StyleFlags::ITALIC, Modifier::ITALIC),
        (StyleFlags::UNDERLINE, Modifier::UNDERLINED),
        (StyleFlags::REVERSE, Modifier::REVERSED),
        (StyleFlags::STRIKETHROUGH, Modifier::CROSSED_OUT),
    ] {
        if flags.contains(flag) {
            modifier |= m;
        }
    }
    Style::default().add_modifier(modifier)
}
