use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Clear, Paragraph},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use unicode_width::UnicodeWidthStr;

use crate::keymap::Action;

/// Margin, in cells, between the screen edge, the frame and the entries.
pub const PADDING: u16 = 3;

/// A labelled list row. Serialized as a `[label, payload]` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry<T> {
    pub label: String,
    pub payload: T,
}

impl<T> ListEntry<T> {
    pub fn new(label: impl Into<String>, payload: T) -> Self {
        Self {
            label: label.into(),
            payload,
        }
    }
}

impl<T: Serialize> Serialize for ListEntry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.label, &self.payload).serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ListEntry<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (label, payload) = <(String, T)>::deserialize(deserializer)?;
        Ok(Self { label, payload })
    }
}

/// How a list modal finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAction {
    /// Quit the whole application.
    Quit,
    /// Close this view and resume the parent.
    CloseView,
    Select,
    /// The terminal changed size; every ancestor has to re-layout.
    Resize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOutcome<T> {
    pub action: ListAction,
    /// Payload of the selected entry, `None` when the list is empty.
    pub payload: Option<T>,
}

/// Index of the last entry whose payload is `<= seed`, or -1 if there is none.
pub fn upper_bound_row<T: PartialOrd>(entries: &[ListEntry<T>], seed: &T) -> isize {
    let first_after = entries
        .iter()
        .position(|entry| entry.payload > *seed)
        .unwrap_or(entries.len());
    first_after as isize - 1
}

/// Scrollable, selectable single-column list drawn as a bordered modal.
#[derive(Debug, Clone)]
pub struct ListNavigator<T> {
    title: String,
    entries: Vec<ListEntry<T>>,
    selected_row: usize,
    y_offset: usize,
    area: Rect,
}

impl<T: Clone> ListNavigator<T> {
    pub fn new(title: impl Into<String>, entries: Vec<ListEntry<T>>) -> Self {
        Self {
            title: title.into(),
            entries,
            selected_row: 0,
            y_offset: 0,
            area: Rect::default(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn entries(&self) -> &[ListEntry<T>] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<ListEntry<T>> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selected_row(&self) -> usize {
        self.selected_row
    }

    pub fn selected(&self) -> Option<&ListEntry<T>> {
        self.entries.get(self.selected_row)
    }

    pub fn y_offset(&self) -> usize {
        self.y_offset
    }

    /// Whether `area` leaves room for the frame, the title and at least one row.
    pub fn has_draw_estate(&self, area: Rect) -> bool {
        let padding = i32::from(PADDING);
        let rows = i32::from(area.height);
        let cols = i32::from(area.width);
        rows - 4 * padding + 1 > 0 && cols - 3 * padding > self.title.width() as i32
    }

    /// Prepares the view for `area` with `selected_row` highlighted.
    ///
    /// Returns false without touching any state when the area is too small;
    /// callers treat that as if nothing happened.
    pub fn open(&mut self, area: Rect, selected_row: isize) -> bool {
        if !self.has_draw_estate(area) {
            return false;
        }
        self.area = area;
        self.y_offset = 0;
        self.selected_row = usize::try_from(selected_row.max(0)).unwrap_or(0);
        self.clamp_selection();
        self.scroll_to_selected();
        true
    }

    /// Applies one action; returns the outcome once the view should close.
    pub fn handle_action(&mut self, action: Action) -> Option<ListOutcome<T>> {
        match action {
            Action::Next => {
                if self.selected_row + 1 < self.entries.len() {
                    self.selected_row += 1;
                    self.scroll_to_selected();
                }
                None
            }
            Action::Previous => {
                if self.selected_row > 0 {
                    self.selected_row -= 1;
                    self.scroll_to_selected();
                }
                None
            }
            Action::Quit => Some(self.finish(ListAction::Quit)),
            Action::CloseView => Some(self.finish(ListAction::CloseView)),
            Action::Select if !self.entries.is_empty() => Some(self.finish(ListAction::Select)),
            Action::Resize => {
                self.y_offset = 0;
                Some(self.finish(ListAction::Resize))
            }
            _ => None,
        }
    }

    /// Removes the selected entry and moves the selection up one row.
    pub fn remove_selected(&mut self) -> Option<ListEntry<T>> {
        if self.entries.is_empty() {
            return None;
        }
        let removed = self.entries.remove(self.selected_row);
        self.selected_row = self.selected_row.saturating_sub(1);
        self.clamp_selection();
        self.scroll_to_selected();
        Some(removed)
    }

    /// Number of entry rows that fit inside the frame.
    pub fn visible_rows(&self) -> usize {
        let rows = i32::from(self.area.height) - 4 * i32::from(PADDING) + 1;
        usize::try_from(rows).unwrap_or(0)
    }

    pub fn render(&self, f: &mut Frame) {
        let area = self.area.intersection(f.area());
        let frame_area = Rect {
            x: area.x + PADDING,
            y: area.y + PADDING,
            width: area.width.saturating_sub(2 * PADDING),
            height: area.height.saturating_sub(2 * PADDING),
        };
        f.render_widget(Clear, frame_area);

        let title = Span::styled(
            self.title.as_str(),
            Style::default().add_modifier(Modifier::BOLD | Modifier::ITALIC),
        );
        f.render_widget(Block::bordered().title(title), frame_area);

        let list_area = Rect {
            x: area.x + 2 * PADDING + 1,
            y: area.y + 2 * PADDING,
            width: area.width.saturating_sub(4 * PADDING + 1),
            height: u16::try_from(self.visible_rows()).unwrap_or(u16::MAX),
        }
        .intersection(frame_area);

        let lines: Vec<Line> = self
            .entries
            .iter()
            .enumerate()
            .skip(self.y_offset)
            .take(self.visible_rows())
            .map(|(row, entry)| {
                let style = if row == self.selected_row {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                Line::from(Span::styled(entry.label.as_str(), style))
            })
            .collect();
        f.render_widget(Paragraph::new(lines), list_area);
    }

    fn finish(&self, action: ListAction) -> ListOutcome<T> {
        ListOutcome {
            action,
            payload: self.selected().map(|entry| entry.payload.clone()),
        }
    }

    fn clamp_selection(&mut self) {
        if self.selected_row >= self.entries.len() {
            self.selected_row = self.entries.len().saturating_sub(1);
        }
    }

    /// Keeps the selected row inside the visible window.
    fn scroll_to_selected(&mut self) {
        let visible = self.visible_rows().max(1);
        let last_visible_row = self.y_offset + visible - 1;
        if self.selected_row > last_visible_row {
            self.y_offset = self.selected_row + 1 - visible;
        } else if self.selected_row < self.y_offset {
            self.y_offset = self.selected_row;
        }
    }
}

/// A list modal specialised with its own data and initial selection rule.
pub trait ListView {
    type Payload: Clone;
    type Seed: ?Sized;

    fn navigator(&self) -> &ListNavigator<Self::Payload>;

    fn navigator_mut(&mut self) -> &mut ListNavigator<Self::Payload>;

    /// Row to highlight when the view opens; negative values mean the top.
    fn determine_selected_row(&self, _seed: &Self::Seed) -> isize {
        0
    }

    fn open(&mut self, area: Rect, seed: &Self::Seed) -> bool {
        let row = self.determine_selected_row(seed);
        self.navigator_mut().open(area, row)
    }

    fn handle_action(&mut self, action: Action) -> Option<ListOutcome<Self::Payload>> {
        self.navigator_mut().handle_action(action)
    }

    fn render(&self, f: &mut Frame) {
        self.navigator().render(f);
    }
}
