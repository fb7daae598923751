use crate::book::RenderedChapter;

/// Per-line word counts of one chapter, each entry clamped to at least 1.
///
/// The clamp keeps prefix sums strictly increasing, which is what lets
/// [`WordCountTable::offset_from_position`] map a word position back to a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordCountTable {
    counts: Vec<usize>,
}

impl WordCountTable {
    pub fn from_raw(counts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            counts: counts.into_iter().map(|c| c.max(1)).collect(),
        }
    }

    pub fn from_chapter(chapter: &RenderedChapter) -> Self {
        Self::from_raw(chapter.lines().iter().map(|line| line.word_count()))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Words up to and including row `offset` (clamped to the last row).
    pub fn prefix_sum(&self, offset: usize) -> usize {
        let end = offset.saturating_add(1).min(self.counts.len());
        self.counts[..end].iter().sum()
    }

    /// Smallest row `o` with `position <= prefix_sum(o)`.
    ///
    /// Positions past the end of the chapter resolve to the last row.
    pub fn offset_from_position(&self, position: usize) -> usize {
        let Some(&first) = self.counts.first() else {
            return 0;
        };
        let mut offset = 0;
        let mut sum = first;
        while position > sum && offset + 1 < self.counts.len() {
            offset += 1;
            sum += self.counts[offset];
        }
        offset
    }
}
