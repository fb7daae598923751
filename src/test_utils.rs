pub mod test_helpers {
    use crate::book::{BookError, BookProvider, Element, ImageRef, Line, RenderedChapter, TermSize};
    use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Builder for creating test scenarios with simulated user input
    #[derive(Default)]
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a character key press
        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        /// Add a Ctrl+character key press
        pub fn press_ctrl_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key(c));
            self
        }

        pub fn press_key(mut self, code: KeyCode) -> Self {
            self.events
                .push(SimulatedEventSource::key_event(code, KeyModifiers::empty()));
            self
        }

        pub fn press_enter(self) -> Self {
            self.press_key(KeyCode::Enter)
        }

        pub fn press_esc(self) -> Self {
            self.press_key(KeyCode::Esc)
        }

        pub fn press_backspace(self) -> Self {
            self.press_key(KeyCode::Backspace)
        }

        /// Type every character of `text`
        pub fn type_text(mut self, text: &str) -> Self {
            for c in text.chars() {
                self = self.press_char(c);
            }
            self
        }

        /// Navigate down n times (press 'j' n times)
        pub fn navigate_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('j'));
            }
            self
        }

        /// Navigate up n times (press 'k' n times)
        pub fn navigate_up(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('k'));
            }
            self
        }

        /// Navigate to next chapter (press 'l')
        pub fn next_chapter(self) -> Self {
            self.press_char('l')
        }

        /// Navigate to previous chapter (press 'h')
        pub fn prev_chapter(self) -> Self {
            self.press_char('h')
        }

        pub fn open_toc(self) -> Self {
            self.press_char('t')
        }

        pub fn open_bookmarks(self) -> Self {
            self.press_char('B')
        }

        /// Open the `:` prompt, type `command` and submit it
        pub fn command(self, command: &str) -> Self {
            self.press_char(':').type_text(command).press_enter()
        }

        pub fn resize(mut self, cols: u16, rows: u16) -> Self {
            self.events
                .push(SimulatedEventSource::resize_event(cols, rows));
            self
        }

        /// Quit the application (press 'q')
        pub fn quit(self) -> Self {
            self.press_char('q')
        }

        pub fn events(&self) -> &[Event] {
            &self.events
        }

        /// Build the simulated event source
        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// In-memory book: one line per `\n` separated text row, no reflow.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryBook {
        chapters: Vec<RenderedChapter>,
        toc: Vec<(String, usize)>,
        current: usize,
        size: Option<TermSize>,
        broken: Option<usize>,
        relayout_fails: bool,
        layouts: usize,
    }

    impl MemoryBook {
        pub fn new(chapters: Vec<RenderedChapter>) -> Self {
            let toc = (0..chapters.len())
                .map(|i| (format!("Chapter {}", i + 1), i))
                .collect();
            Self {
                chapters,
                toc,
                current: 0,
                size: None,
                broken: None,
                relayout_fails: false,
                layouts: 0,
            }
        }

        pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
            Self::new(
                texts
                    .iter()
                    .map(|text| {
                        RenderedChapter::new(text.as_ref().lines().map(Line::plain).collect())
                    })
                    .collect(),
            )
        }

        /// `chapters` chapters of `lines` lines with three words each
        pub fn numbered(chapters: usize, lines: usize) -> Self {
            let texts: Vec<String> = (0..chapters)
                .map(|c| {
                    (1..=lines)
                        .map(|i| format!("c{c} line {i}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .collect();
            Self::from_texts(&texts)
        }

        pub fn with_toc(mut self, toc: Vec<(String, usize)>) -> Self {
            self.toc = toc;
            self
        }

        /// Replaces line `row` of `chapter` with an image anchor
        pub fn with_image(mut self, chapter: usize, row: usize, image: ImageRef) -> Self {
            if let Some(rendered) = self.chapters.get_mut(chapter) {
                let mut lines = rendered.lines().to_vec();
                if let Some(line) = lines.get_mut(row) {
                    *line = Line::new(vec![Element::image("[image]", image)]);
                }
                *rendered = RenderedChapter::new(lines);
            }
            self
        }

        /// Rendering `chapter` fails with `BookError::MissingChapter`
        pub fn with_broken_chapter(mut self, chapter: usize) -> Self {
            self.broken = Some(chapter);
            self
        }

        /// Only the first line count succeeds, so every resize fails
        pub fn with_failing_relayout(mut self) -> Self {
            self.relayout_fails = true;
            self
        }

        pub fn size(&self) -> Option<TermSize> {
            self.size
        }
    }

    impl BookProvider for MemoryBook {
        fn render_current_chapter(&mut self) -> Result<RenderedChapter, BookError> {
            if self.broken == Some(self.current) {
                return Err(BookError::MissingChapter(self.current));
            }
            self.chapters
                .get(self.current)
                .cloned()
                .ok_or(BookError::MissingChapter(self.current))
        }

        fn next_chapter(&mut self) -> bool {
            if self.current + 1 < self.chapters.len() {
                self.current += 1;
                true
            } else {
                false
            }
        }

        fn previous_chapter(&mut self) -> bool {
            if self.current > 0 {
                self.current -= 1;
                true
            } else {
                false
            }
        }

        fn set_current_chapter(&mut self, index: usize) -> bool {
            if index < self.chapters.len() {
                self.current = index;
                true
            } else {
                false
            }
        }

        fn current_chapter(&self) -> usize {
            self.current
        }

        fn num_chapters(&self) -> usize {
            self.chapters.len()
        }

        fn toc(&self) -> Vec<(String, usize)> {
            self.toc.clone()
        }

        fn number_of_lines(&mut self) -> Result<Vec<usize>, BookError> {
            self.layouts += 1;
            if self.relayout_fails && self.layouts > 1 {
                return Err(BookError::Layout {
                    index: self.current,
                    reason: "layout engine gave up".to_string(),
                });
            }
            Ok(self.chapters.iter().map(RenderedChapter::rows).collect())
        }

        fn update_term_info(&mut self, size: TermSize) {
            self.size = Some(size);
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            // Trim trailing whitespace from each line
            lines.push(line.trim_end().to_string());
        }

        // Remove trailing empty lines
        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }

        lines.join("\n")
    }
}
