use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use epub::doc::{EpubDoc, NavPoint};
use html2text::render::RichAnnotation;
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::book::{BookError, BookProvider, Element, ImageRef, Line, RenderedChapter, StyleFlags, TermSize};

/// Pixel size of one terminal cell when the terminal does not report it.
const FALLBACK_CELL_PX: (u32, u32) = (8, 16);

/// An image resource written out of the archive.
#[derive(Debug, Clone)]
struct ExtractedImage {
    file: PathBuf,
    width_px: u32,
    height_px: u32,
}

/// [`BookProvider`] over an EPUB file, laid out with html2text.
pub struct EpubProvider {
    doc: EpubDoc<BufReader<File>>,
    /// Keyed by the resource path inside the archive.
    images: HashMap<PathBuf, ExtractedImage>,
    _image_dir: TempDir,
    size: TermSize,
    cell_px: (u32, u32),
    /// Line counts for the width they were computed at.
    line_counts: Option<(u16, Vec<usize>)>,
}

impl EpubProvider {
    pub fn open(path: &Path) -> Result<Self, BookError> {
        let open_error = |reason: String| BookError::Open {
            path: path.display().to_string(),
            reason,
        };
        let mut doc = EpubDoc::new(path).map_err(|e| open_error(e.to_string()))?;
        let image_dir = TempDir::new().map_err(|e| open_error(e.to_string()))?;
        let images = extract_images(&mut doc, image_dir.path());
        info!(
            "Opened EPUB {path:?}: {} chapters, {} images",
            doc.get_num_chapters(),
            images.len()
        );

        Ok(Self {
            doc,
            images,
            _image_dir: image_dir,
            size: TermSize::new(80, 24),
            cell_px: FALLBACK_CELL_PX,
            line_counts: None,
        })
    }

    fn layout_current(&mut self) -> Result<Vec<Line>, BookError> {
        let index = self.doc.get_current_chapter();
        let (html, _mime) = self
            .doc
            .get_current_str()
            .ok_or(BookError::MissingChapter(index))?;
        let chapter_dir = self
            .doc
            .get_current_path()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let cols = self.size.cols;
        let cell_px = self.cell_px;
        let images = &self.images;
        layout_html(&html, usize::from(cols.max(1)), |src| {
            let image = find_image(images, &chapter_dir, src)?;
            let (width, height) =
                fit_image_cells((image.width_px, image.height_px), cell_px, cols);
            Some(ImageRef {
                path: image.file.clone(),
                width,
                height,
            })
        })
        .map_err(|reason| BookError::Layout { index, reason })
    }
}

impl BookProvider for EpubProvider {
    fn render_current_chapter(&mut self) -> Result<RenderedChapter, BookError> {
        Ok(RenderedChapter::new(self.layout_current()?))
    }

    fn next_chapter(&mut self) -> bool {
        self.doc.go_next()
    }

    fn previous_chapter(&mut self) -> bool {
        self.doc.go_prev()
    }

    fn set_current_chapter(&mut self, index: usize) -> bool {
        self.doc.set_current_chapter(index)
    }

    fn current_chapter(&self) -> usize {
        self.doc.get_current_chapter()
    }

    fn num_chapters(&self) -> usize {
        self.doc.get_num_chapters()
    }

    fn toc(&self) -> Vec<(String, usize)> {
        let mut points = Vec::new();
        flatten_toc(&self.doc.toc, &mut points);
        points
            .into_iter()
            .filter_map(|point| {
                let target = strip_fragment(&point.content);
                match self.doc.resource_uri_to_chapter(&target) {
                    Some(chapter) => Some((point.label.trim().to_string(), chapter)),
                    None => {
                        debug!("Dropping TOC entry {:?}: {target:?} is not in the spine", point.label);
                        None
                    }
                }
            })
            .collect()
    }

    fn number_of_lines(&mut self) -> Result<Vec<usize>, BookError> {
        if let Some((cols, counts)) = &self.line_counts {
            if *cols == self.size.cols {
                return Ok(counts.clone());
            }
        }

        let current = self.doc.get_current_chapter();
        let mut counts = Vec::with_capacity(self.doc.get_num_chapters());
        for index in 0..self.doc.get_num_chapters() {
            if !self.doc.set_current_chapter(index) {
                counts.push(0);
                continue;
            }
            let rows = match self.layout_current() {
                Ok(lines) => lines.len(),
                Err(e) => {
                    warn!("Counting chapter {index} as empty: {e}");
                    0
                }
            };
            counts.push(rows);
        }
        let _ = self.doc.set_current_chapter(current);

        self.line_counts = Some((self.size.cols, counts.clone()));
        Ok(counts)
    }

    fn update_term_info(&mut self, size: TermSize) {
        self.size = size;
        self.cell_px = terminal_cell_px();
    }
}

/// Writes every image resource into `dir`, measuring its pixel size.
fn extract_images(
    doc: &mut EpubDoc<BufReader<File>>,
    dir: &Path,
) -> HashMap<PathBuf, ExtractedImage> {
    let mut images = HashMap::new();
    let resources: Vec<(String, PathBuf, String)> = doc
        .resources
        .iter()
        .map(|(id, resource)| (id.clone(), resource.path.clone(), resource.mime.clone()))
        .collect();

    for (index, (id, path, mime)) in resources.into_iter().enumerate() {
        if !mime.starts_with("image/") {
            continue;
        }
        let Some((data, _)) = doc.get_resource(&id) else {
            warn!("Failed to read image resource {id}");
            continue;
        };
        let (width_px, height_px) = match imagesize::blob_size(&data) {
            Ok(size) => (size.width as u32, size.height as u32),
            Err(e) => {
                warn!("Skipping image {path:?}: {e}");
                continue;
            }
        };
        let file_name = path
            .file_name()
            .map(|name| format!("{index}-{}", name.to_string_lossy()))
            .unwrap_or_else(|| format!("{index}.img"));
        let file = dir.join(file_name);
        if let Err(e) = fs::write(&file, &data) {
            warn!("Failed to extract image {path:?}: {e}");
            continue;
        }
        images.insert(
            path,
            ExtractedImage {
                file,
                width_px,
                height_px,
            },
        );
    }
    images
}

fn find_image<'a>(
    images: &'a HashMap<PathBuf, ExtractedImage>,
    chapter_dir: &Path,
    src: &str,
) -> Option<&'a ExtractedImage> {
    let src = strip_fragment(Path::new(src));
    if let Some(image) = images.get(&normalize(&chapter_dir.join(&src))) {
        return Some(image);
    }
    let name = src.file_name()?;
    images
        .iter()
        .find(|(path, _)| path.file_name() == Some(name))
        .map(|(_, image)| image)
}

/// Cell size in pixels as reported by the terminal.
fn terminal_cell_px() -> (u32, u32) {
    match crossterm::terminal::window_size() {
        Ok(size) if size.width > 0 && size.height > 0 && size.columns > 0 && size.rows > 0 => (
            u32::from(size.width / size.columns).max(1),
            u32::from(size.height / size.rows).max(1),
        ),
        _ => FALLBACK_CELL_PX,
    }
}

fn div_ceil(x: u32, y: u32) -> u32 {
    if y == 0 { 0 } else { x.div_ceil(y) }
}

/// Cells an image of `px` pixels covers, shrunk to fit `cols` columns.
pub fn fit_image_cells(px: (u32, u32), cell_px: (u32, u32), cols: u16) -> (u16, u16) {
    let width_cells = div_ceil(px.0, cell_px.0);
    let height_cells = div_ceil(px.1, cell_px.1);
    let width_fit = width_cells.min(u32::from(cols));
    let height_fit = div_ceil(width_fit * height_cells, width_cells);
    (
        u16::try_from(width_fit).unwrap_or(u16::MAX),
        u16::try_from(height_fit).unwrap_or(u16::MAX),
    )
}

/// Lays `html` out at `width` columns.
///
/// Images are turned into an anchor element followed by blank rows so the
/// image has room below its anchor. `resolve` maps an image `src` to the
/// image to draw, or `None` to keep only its alt text.
pub fn layout_html(
    html: &str,
    width: usize,
    resolve: impl Fn(&str) -> Option<ImageRef>,
) -> Result<Vec<Line>, String> {
    let tagged_lines = html2text::from_read_rich(html.as_bytes(), width).map_err(|e| e.to_string())?;
    let mut lines = Vec::with_capacity(tagged_lines.len());

    for tagged in tagged_lines {
        let mut elements = Vec::new();
        let mut image_rows = 0;
        for piece in tagged.tagged_strings() {
            let mut style = StyleFlags::empty();
            let mut image = None;
            for annotation in &piece.tag {
                match annotation {
                    RichAnnotation::Strong => style.insert(StyleFlags::BOLD),
                    RichAnnotation::Emphasis => style.insert(StyleFlags::ITALIC),
                    RichAnnotation::Strikeout => style.insert(StyleFlags::STRIKETHROUGH),
                    RichAnnotation::Link(_) => style.insert(StyleFlags::UNDERLINE),
                    RichAnnotation::Code => style.insert(StyleFlags::REVERSE),
                    RichAnnotation::Image(src) => image = resolve(src),
                    _ => {}
                }
            }
            match image {
                Some(image) => {
                    image_rows = image_rows.max(usize::from(image.height));
                    elements.push(Element::image(piece.s.clone(), image));
                }
                None => elements.push(Element::styled(piece.s.clone(), style)),
            }
        }
        lines.push(Line::new(elements));
        lines.extend((1..image_rows).map(|_| Line::blank()));
    }
    Ok(lines)
}

fn flatten_toc<'a>(points: &'a [NavPoint], out: &mut Vec<&'a NavPoint>) {
    for point in points {
        out.push(point);
        flatten_toc(&point.children, out);
    }
}

fn strip_fragment(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    match text.split_once('#') {
        Some((file, _)) => PathBuf::from(file),
        None => path.to_path_buf(),
    }
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
