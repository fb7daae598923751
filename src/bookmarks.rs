use log::debug;
use serde::{Deserialize, Serialize};

use crate::list_view::{
    ListAction, ListEntry, ListNavigator, ListOutcome, ListView, PADDING, upper_bound_row,
};

pub const BOOKMARKS_TITLE: &str = "Bookmarks";

/// A reading position: chapter index plus word position inside it.
///
/// Ordered by chapter first, then word; stored on disk as `[chapter, word]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct BookPosition {
    pub chapter: usize,
    pub word: usize,
}

impl BookPosition {
    pub fn new(chapter: usize, word: usize) -> Self {
        Self { chapter, word }
    }
}

impl From<(usize, usize)> for BookPosition {
    fn from((chapter, word): (usize, usize)) -> Self {
        Self { chapter, word }
    }
}

impl From<BookPosition> for (usize, usize) {
    fn from(position: BookPosition) -> Self {
        (position.chapter, position.word)
    }
}

pub type Bookmark = ListEntry<BookPosition>;

/// Bookmarks sorted by position, with unique labels.
#[derive(Debug, Clone)]
pub struct BookmarkView {
    navigator: ListNavigator<BookPosition>,
}

impl BookmarkView {
    pub fn new(mut bookmarks: Vec<Bookmark>) -> Self {
        bookmarks.sort_by_key(|bookmark| bookmark.payload);
        Self {
            navigator: ListNavigator::new(BOOKMARKS_TITLE, bookmarks),
        }
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.navigator.entries()
    }

    /// Inserts a bookmark after every entry at or before `position`.
    ///
    /// Underscores are appended to `label` until it is unique. Returns the
    /// label actually stored.
    pub fn add_bookmark(&mut self, label: &str, position: BookPosition) -> String {
        let index = usize::try_from(self.determine_selected_row(&position) + 1).unwrap_or(0);
        let mut label = label.to_string();
        while self.bookmarks().iter().any(|b| b.label == label) {
            label.push('_');
        }
        debug!("Adding bookmark {label:?} at {position:?}");
        self.navigator
            .entries_mut()
            .insert(index, ListEntry::new(label.clone(), position));
        label
    }

    /// Builds the dialog asking to delete the selected bookmark, if any.
    pub fn confirm_delete(&self, cols: u16) -> Option<ConfirmationView> {
        let selected = self.navigator.selected()?;
        Some(ConfirmationView::new(&selected.label, cols))
    }

    /// Applies the answer of a delete dialog.
    ///
    /// Quit and resize are returned so the caller can propagate them.
    pub fn on_confirmation(&mut self, outcome: ListOutcome<bool>) -> Option<ListAction> {
        match outcome.action {
            ListAction::Quit | ListAction::Resize => Some(outcome.action),
            ListAction::Select if outcome.payload == Some(true) => {
                if let Some(removed) = self.navigator.remove_selected() {
                    debug!("Deleted bookmark {:?}", removed.label);
                }
                None
            }
            _ => None,
        }
    }
}

impl ListView for BookmarkView {
    type Payload = BookPosition;
    type Seed = BookPosition;

    fn navigator(&self) -> &ListNavigator<BookPosition> {
        &self.navigator
    }

    fn navigator_mut(&mut self) -> &mut ListNavigator<BookPosition> {
        &mut self.navigator
    }

    fn determine_selected_row(&self, position: &BookPosition) -> isize {
        upper_bound_row(self.navigator.entries(), position)
    }
}

const ELLIPSIS_SUFFIX: &str = "...\"?";

/// Title of the delete dialog, cut to fit inside a `cols` wide frame.
pub fn confirmation_title(label: &str, cols: u16) -> String {
    let title = format!("Delete bookmark \"{label}\"?");
    let max = usize::from(cols).saturating_sub(3 * usize::from(PADDING) + 1);
    if title.chars().count() <= max {
        return title;
    }
    let keep = max.saturating_sub(ELLIPSIS_SUFFIX.chars().count());
    let mut cut: String = title.chars().take(keep).collect();
    cut.push_str(ELLIPSIS_SUFFIX);
    cut
}

/// Yes/No dialog; the payload is `true` for "Yes".
#[derive(Debug, Clone)]
pub struct ConfirmationView {
    navigator: ListNavigator<bool>,
}

impl ConfirmationView {
    pub fn new(label: &str, cols: u16) -> Self {
        let entries = vec![ListEntry::new("Yes", true), ListEntry::new("No", false)];
        Self {
            navigator: ListNavigator::new(confirmation_title(label, cols), entries),
        }
    }
}

impl ListView for ConfirmationView {
    type Payload = bool;
    type Seed = ();

    fn navigator(&self) -> &ListNavigator<bool> {
        &self.navigator
    }

    fn navigator_mut(&mut self) -> &mut ListNavigator<bool> {
        &mut self.navigator
    }
}
