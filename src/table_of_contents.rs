use crate::list_view::{ListEntry, ListNavigator, ListView, upper_bound_row};

pub const TOC_TITLE: &str = "Table of Contents";

/// Chapter list; highlights the chapter the reader is currently in.
#[derive(Debug, Clone)]
pub struct TocView {
    navigator: ListNavigator<usize>,
}

impl TocView {
    pub fn new(toc: impl IntoIterator<Item = (String, usize)>) -> Self {
        let entries = toc
            .into_iter()
            .map(|(label, chapter)| ListEntry::new(label, chapter))
            .collect();
        Self {
            navigator: ListNavigator::new(TOC_TITLE, entries),
        }
    }
}

impl ListView for TocView {
    type Payload = usize;
    type Seed = usize;

    fn navigator(&self) -> &ListNavigator<usize> {
        &self.navigator
    }

    fn navigator_mut(&mut self) -> &mut ListNavigator<usize> {
        &mut self.navigator
    }

    /// Last entry starting at or before `current_chapter`.
    fn determine_selected_row(&self, current_chapter: &usize) -> isize {
        upper_bound_row(self.navigator.entries(), current_chapter)
    }
}
