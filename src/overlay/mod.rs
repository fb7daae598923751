pub mod compositor;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use crate::book::{ImageRef, RenderedChapter};
pub use compositor::{Compositor, NullCompositor, UeberzugCompositor};

/// Rows of tolerance above and below the viewport before an image is hidden.
const VISIBILITY_PADDING: i64 = 1;

/// Stable identity of a placement, derived from where it first appeared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacementId(String);

impl PlacementId {
    pub fn derive(x: usize, y: usize, path: &Path) -> Self {
        Self(format!("{x}:{y}:{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Invisible,
}

/// Compositor-side state of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlacement {
    pub id: PlacementId,
    pub path: PathBuf,
    pub x: usize,
    /// Screen row; may be negative while an image is partially scrolled out.
    pub y: i64,
    pub width: u16,
    pub height: u16,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementCommand {
    Show(ImagePlacement),
    Hide(PlacementId),
}

/// Placement mutations that must reach the compositor as one frame.
#[derive(Debug, Default)]
pub struct OverlayBatch {
    commands: Vec<PlacementCommand>,
}

impl OverlayBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PlacementCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[PlacementCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Sends the batch in one commit; empty batches are dropped.
    pub fn commit(self, compositor: &mut dyn Compositor) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        compositor.commit(&self)
    }
}

/// Keeps image placements in step with the text viewport.
///
/// The identity cache outlives chapters so an image that comes back into
/// view reuses its placement instead of creating a new one.
#[derive(Debug, Default)]
pub struct OverlayManager {
    placements: HashMap<PlacementId, ImagePlacement>,
    /// Placements of the current chapter with their chapter row.
    tracked: Vec<(usize, PlacementId)>,
}

impl OverlayManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image anchored at column `x`, chapter row `y`.
    pub fn add_image(&mut self, x: usize, y: usize, image: &ImageRef) -> PlacementId {
        let id = PlacementId::derive(x, y, &image.path);
        let placement = self
            .placements
            .entry(id.clone())
            .and_modify(|_| debug!("Reusing placement {id}"))
            .or_insert_with(|| ImagePlacement {
                id: id.clone(),
                path: image.path.clone(),
                x,
                y: 0,
                width: image.width,
                height: image.height,
                visibility: Visibility::Invisible,
            });
        placement.x = x;
        placement.y = y as i64;
        placement.width = image.width;
        placement.height = image.height;
        self.tracked.push((y, id.clone()));
        id
    }

    /// Registers every image anchor of `chapter`, returning how many were found.
    pub fn track_chapter(&mut self, chapter: &RenderedChapter) -> usize {
        let mut found = 0;
        for (row, line) in chapter.lines().iter().enumerate() {
            let mut column = 0;
            for element in &line.elements {
                if let Some(image) = &element.image {
                    self.add_image(column, row, image);
                    found += 1;
                }
                column += element.width();
            }
        }
        found
    }

    /// Hides every placement of the chapter being left and stops tracking them.
    pub fn hide_all(&mut self, compositor: &mut dyn Compositor) -> Result<()> {
        let batch = self.hide_tracked();
        self.tracked.clear();
        batch.commit(compositor)
    }

    /// Hides tracked placements while keeping them tracked, e.g. under a modal.
    pub fn conceal(&mut self, compositor: &mut dyn Compositor) -> Result<()> {
        self.hide_tracked().commit(compositor)
    }

    /// Shows the placements that intersect the viewport at `offset` and hides
    /// the rest, committing only what changed.
    pub fn sync_visibility(
        &mut self,
        offset: usize,
        viewport_rows: usize,
        compositor: &mut dyn Compositor,
    ) -> Result<()> {
        let mut batch = OverlayBatch::new();
        let offset = offset as i64;
        let rows = viewport_rows as i64;

        for (row, id) in &self.tracked {
            let Some(placement) = self.placements.get_mut(id) else {
                continue;
            };
            let y_pos = *row as i64 - offset;
            let height = i64::from(placement.height);
            let visible =
                y_pos + height + VISIBILITY_PADDING >= 0 && y_pos - VISIBILITY_PADDING <= rows;

            if visible {
                let changed = placement.visibility != Visibility::Visible || placement.y != y_pos;
                placement.y = y_pos;
                placement.visibility = Visibility::Visible;
                if changed {
                    batch.push(PlacementCommand::Show(placement.clone()));
                }
            } else if placement.visibility == Visibility::Visible {
                placement.visibility = Visibility::Invisible;
                batch.push(PlacementCommand::Hide(id.clone()));
            }
        }

        batch.commit(compositor)
    }

    pub fn placement(&self, id: &PlacementId) -> Option<&ImagePlacement> {
        self.placements.get(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &ImagePlacement> {
        self.tracked
            .iter()
            .filter_map(|(_, id)| self.placements.get(id))
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    pub fn cached_len(&self) -> usize {
        self.placements.len()
    }

    fn hide_tracked(&mut self) -> OverlayBatch {
        let mut batch = OverlayBatch::new();
        for (_, id) in &self.tracked {
            if let Some(placement) = self.placements.get_mut(id) {
                if placement.visibility == Visibility::Visible {
                    placement.visibility = Visibility::Invisible;
                    batch.push(PlacementCommand::Hide(id.clone()));
                }
            }
        }
        batch
    }
}
