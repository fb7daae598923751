use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    Submit,
    Cancel,
    Resize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOutcome {
    pub action: PromptAction,
    pub text: String,
}

/// Commands understood by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddBookmark(String),
}

/// Parses submitted prompt text; anything unrecognised yields `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut tokens = text.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some("bookmark"), Some("add")) => {
            let label = tokens.collect::<Vec<_>>().join(" ");
            if label.is_empty() {
                None
            } else {
                Some(Command::AddBookmark(label))
            }
        }
        _ => None,
    }
}

/// Single-line `:` prompt drawn over the status row.
#[derive(Debug, Clone, Default)]
pub struct CommandPrompt {
    buffer: String,
}

impl CommandPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, initial: &str) {
        self.buffer = initial.to_string();
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Edits the buffer; returns an outcome once the prompt should close.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<PromptOutcome> {
        match key.code {
            KeyCode::Enter => Some(self.finish(PromptAction::Submit)),
            KeyCode::Esc => Some(self.cancel()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(self.cancel())
            }
            KeyCode::Backspace => {
                if self.buffer.pop().is_none() {
                    return Some(self.finish(PromptAction::Cancel));
                }
                None
            }
            KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
                self.buffer.push(c);
                None
            }
            _ => None,
        }
    }

    pub fn resize(&mut self) -> PromptOutcome {
        self.finish(PromptAction::Resize)
    }

    /// The part of the buffer shown in a row `width` cells wide.
    pub fn visible_text(&self, width: u16) -> &str {
        crop_text(&self.buffer, usize::from(width))
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        let style = Style::default().add_modifier(Modifier::REVERSED);
        let text = self.visible_text(area.width);
        let line = Line::from(vec![Span::styled(":", style), Span::styled(text, style)]);
        f.render_widget(Paragraph::new(line).style(style), area);

        let cursor_x = area.x + 1 + u16::try_from(text.chars().count()).unwrap_or(0);
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, area.y));
        }
    }

    fn cancel(&mut self) -> PromptOutcome {
        self.buffer.clear();
        self.finish(PromptAction::Cancel)
    }

    fn finish(&self, action: PromptAction) -> PromptOutcome {
        PromptOutcome {
            action,
            text: self.buffer.clone(),
        }
    }
}

/// Whole text if it fits beside the `:` marker, else its tail.
fn crop_text(text: &str, width: usize) -> &str {
    let len = text.chars().count();
    if len + 1 < width {
        return text;
    }
    let keep = width.saturating_sub(2);
    match text.char_indices().nth(len - keep) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{capture_terminal_state, create_test_terminal};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(prompt: &mut CommandPrompt, text: &str) {
        for c in text.chars() {
            assert_eq!(prompt.handle_key(key(KeyCode::Char(c))), None);
        }
    }

    #[test]
    fn test_submit_returns_buffer() {
        let mut prompt = CommandPrompt::new();
        prompt.open("");
        type_text(&mut prompt, "bookmark add x");
        let outcome = prompt.handle_key(key(KeyCode::Enter)).unwrap();
        assert_eq!(outcome.action, PromptAction::Submit);
        assert_eq!(outcome.text, "bookmark add x");
    }

    #[test]
    fn test_escape_and_ctrl_c_clear_buffer() {
        let mut prompt = CommandPrompt::new();
        type_text(&mut prompt, "abc");
        let outcome = prompt.handle_key(key(KeyCode::Esc)).unwrap();
        assert_eq!(outcome.action, PromptAction::Cancel);
        assert_eq!(outcome.text, "");

        type_text(&mut prompt, "abc");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(prompt.handle_key(ctrl_c).unwrap().text, "");
        assert_eq!(prompt.text(), "");
    }

    #[test]
    fn test_backspace_on_empty_buffer_closes() {
        let mut prompt = CommandPrompt::new();
        type_text(&mut prompt, "a");
        assert_eq!(prompt.handle_key(key(KeyCode::Backspace)), None);
        assert_eq!(prompt.text(), "");
        let outcome = prompt.handle_key(key(KeyCode::Backspace)).unwrap();
        assert_eq!(outcome.action, PromptAction::Cancel);
    }

    #[test]
    fn test_shifted_characters_are_appended() {
        let mut prompt = CommandPrompt::new();
        prompt
            .handle_key(KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT))
            .map(|_| panic!("prompt closed"));
        assert_eq!(prompt.text(), "A");
    }

    #[test]
    fn test_crop_text() {
        assert_eq!(crop_text("hello", 7), "hello");
        assert_eq!(crop_text("hello", 6), "ello");
        assert_eq!(crop_text("hello world", 6), "orld");
        assert_eq!(crop_text("", 1), "");
        assert_eq!(crop_text("héllo", 5), "llo");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("bookmark add  my  place "),
            Some(Command::AddBookmark("my place".to_string()))
        );
        assert_eq!(parse_command("bookmark add"), None);
        assert_eq!(parse_command("bookmark   add   "), None);
        assert_eq!(parse_command("bookmark remove x"), None);
        assert_eq!(parse_command("goto 5"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_render_shows_tail() {
        let mut terminal = create_test_terminal(10, 2);
        let mut prompt = CommandPrompt::new();
        prompt.open("bookmark add here");
        terminal
            .draw(|f| prompt.render(f, Rect::new(0, 1, 10, 1)))
            .unwrap();
        let screen = capture_terminal_state(&terminal);
        assert!(screen.contains(":add here"));
    }
}
