use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("4f6a0d2e-8c31-5b7a-9d42-1e0c57a8b364").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("document unavailable: {0}")]
    DocumentUnavailable(String),
    #[error("split ratio {0} is outside (0, 1)")]
    InvalidSplitRatio(f32),
    #[error("failed to read config file {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Rectangle in [0,1]x[0,1] page space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn clamp(self) -> Self {
        Self {
            left: self.left.clamp(0.0, 1.0),
            top: self.top.clamp(0.0, 1.0),
            right: self.right.clamp(0.0, 1.0),
            bottom: self.bottom.clamp(0.0, 1.0),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub fn from_turns(turns: i32) -> Self {
        match turns.rem_euclid(4) {
            0 => Rotation::None,
            1 => Rotation::Quarter,
            2 => Rotation::Half,
            _ => Rotation::ThreeQuarter,
        }
    }

    pub fn turns(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 1,
            Rotation::Half => 2,
            Rotation::ThreeQuarter => 3,
        }
    }

    /// Rotation left to apply when the cached bitmap was already rendered
    /// with `native` applied.
    pub fn relative_to(self, native: Rotation) -> Rotation {
        Rotation::from_turns(self.turns() - native.turns())
    }

    pub fn inverse(self) -> Rotation {
        Rotation::from_turns(-self.turns())
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::None
    }
}

/// Viewport-space rectangle. Coordinates may go negative once a placement
/// has been mapped into a rotated painter frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Fit a page of the given aspect (width / height) inside a box, preserving
/// the aspect. The limiting dimension is the one the box runs out of first.
pub fn fit_to_box(aspect: f32, box_width: i32, box_height: i32) -> (i32, i32) {
    if aspect <= 0.0 || box_width <= 0 || box_height <= 0 {
        return (0, 0);
    }
    let box_aspect = box_width as f32 / box_height as f32;
    if box_aspect > aspect {
        (((box_height as f32) * aspect).round() as i32, box_height)
    } else {
        (box_width, ((box_width as f32) / aspect).round() as i32)
    }
}

/// Map a placement rectangle into the frame of a painter that has been
/// rotated by `rotation` quarter turns. Composing `rotation` with its
/// inverse returns the original rectangle.
pub fn rotate_placement(rect: PixelRect, rotation: Rotation) -> PixelRect {
    let PixelRect {
        x,
        y,
        width,
        height,
    } = rect;
    match rotation {
        Rotation::None => rect,
        Rotation::Quarter => PixelRect::new(y, -x - width, height, width),
        Rotation::Half => PixelRect::new(-x - width, -y - height, width, height),
        Rotation::ThreeQuarter => PixelRect::new(-y - height, x, height, width),
    }
}

/// Undo the document rotation on a point in unit page space. Used when
/// mapping pointer coordinates back onto the page.
pub fn rotate_unit_point(x: f32, y: f32, rotation: Rotation) -> (f32, f32) {
    match rotation {
        Rotation::None => (x, y),
        Rotation::Quarter => (y, 1.0 - x),
        Rotation::Half => (1.0 - x, 1.0 - y),
        Rotation::ThreeQuarter => (1.0 - y, x),
    }
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A cache entry for a page slot. The entry can exist before the bitmap has
/// been rendered; consumers draw a placeholder background until it arrives.
#[derive(Debug, Clone, Default)]
pub struct CachedPage {
    pub image: Option<Arc<RenderImage>>,
    pub rotation: Rotation,
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    /// Width / height of the given page.
    fn page_aspect(&self, page: usize) -> f32;

    fn min_aspect(&self) -> f32;

    fn max_aspect(&self) -> f32;

    /// Page-local substring search. `None` means the page failed to load and
    /// the caller should skip it; an empty vector means no match.
    fn search_page(
        &self,
        page: usize,
        term: &str,
        case_sensitive: bool,
    ) -> Option<Vec<NormalizedRect>>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> anyhow::Result<Arc<dyn DocumentBackend>>;
}

/// Reference-counted render cache shared by the layout's render slots.
pub trait PageCache: Send + Sync {
    /// Acquire a reference to the entry for `(page, slot)`, registering a
    /// render request at `target_width` when none exists yet. `None` means
    /// the page index is outside the cache's range.
    fn acquire(&self, page: usize, target_width: i32, slot: usize) -> Option<CachedPage>;

    fn release(&self, page: usize, slot: usize);

    /// Drop unreferenced entries for `slot` whose page index falls outside
    /// `[low, high]`.
    fn evict_outside(&self, low: usize, high: usize, slot: usize);
}

pub trait RenderSurface {
    fn clear(&mut self);

    fn draw_image(&mut self, image: &RenderImage, placement: PixelRect, rotation: Rotation);

    fn fill_background(&mut self, placement: PixelRect);

    fn highlight(&mut self, rect: PixelRect);
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub split_ratio: f32,
    pub slide_gap: i32,
    pub prefetch_count: usize,
    pub highlight_margin: i32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            split_ratio: 0.67,
            slide_gap: 10,
            prefetch_count: 4,
            highlight_margin: 2,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let raw = fs::read_to_string(path).map_err(|source| ViewerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ViewerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(ViewerError::InvalidSplitRatio(self.split_ratio));
        }
        Ok(())
    }
}
