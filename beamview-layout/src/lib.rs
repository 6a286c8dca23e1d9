use std::sync::Arc;

use tracing::trace;

use beamview_core::{
    fit_to_box, rotate_placement, rotate_unit_point, DocumentBackend, PageCache, PixelRect,
    RenderSurface, Rotation, ViewerConfig,
};
use beamview_search::HitWatch;

/// Snapshot of the layout geometry. Recomputed wholesale on every resize or
/// page change; owned exclusively by the active layout instance.
#[derive(Debug, Clone, Copy)]
pub struct LayoutFrame {
    pub viewport_width: i32,
    pub viewport_height: i32,
    pub split_ratio: f32,
    pub optimized_ratio: f32,
    pub split_is_horizontal: bool,
    pub current_page: usize,
    pub rotation: Rotation,
}

/// Contract shared by all layout variants. Single- and grid-page layouts
/// live outside this crate; the presenter split view is the interesting one.
pub trait Layout {
    fn resize(&mut self, width: i32, height: i32);

    fn render(&mut self, surface: &mut dyn RenderSurface);

    fn select(&mut self, page: usize) -> bool;

    fn get_location_at(&self, px: i32, py: i32) -> (usize, (f32, f32));

    fn advance_hit(&mut self, forward: bool) -> bool;

    fn page_visible(&self, page: usize) -> bool;
}

/// Dual-slide presenter layout: the main slide takes `split_ratio` of the
/// viewport on the chosen split axis, the next slide fills the remainder.
pub struct PresenterLayout {
    doc: Arc<dyn DocumentBackend>,
    cache: Arc<dyn PageCache>,
    hits: HitWatch,
    config: ViewerConfig,
    render_slot: usize,
    frame: LayoutFrame,
    search_visible: bool,
}

impl PresenterLayout {
    pub fn new(
        doc: Arc<dyn DocumentBackend>,
        cache: Arc<dyn PageCache>,
        hits: HitWatch,
        config: ViewerConfig,
        render_slot: usize,
        page: usize,
    ) -> Self {
        let page_count = doc.page_count();
        let current_page = page.min(page_count.saturating_sub(1));
        Self {
            doc,
            cache,
            hits,
            config,
            render_slot,
            frame: LayoutFrame {
                viewport_width: 0,
                viewport_height: 0,
                split_ratio: config.split_ratio,
                optimized_ratio: config.split_ratio,
                split_is_horizontal: true,
                current_page,
                rotation: Rotation::None,
            },
            search_visible: false,
        }
    }

    pub fn frame(&self) -> &LayoutFrame {
        &self.frame
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.frame.rotation = rotation;
    }

    pub fn set_search_visible(&mut self, visible: bool) {
        self.search_visible = visible;
    }

    fn clamped_aspect_page(&self, page: usize) -> usize {
        page.min(self.doc.page_count().saturating_sub(1))
    }

    /// Pick the split orientation that maximizes the fitted main-slide area
    /// and clamp the ratio against the document's aspect bounds.
    fn recompute_split(&mut self) {
        let width = self.frame.viewport_width;
        let height = self.frame.viewport_height;
        let ratio = self.frame.split_ratio;
        self.frame.optimized_ratio = ratio;
        if width <= 0 || height <= 0 || self.doc.page_count() == 0 {
            return;
        }

        let small_width = (width as f32 * ratio).round() as i32;
        let small_height = (height as f32 * ratio).round() as i32;
        let horiz_aspect = small_width as f32 / height as f32;
        let vert_aspect = width as f32 / small_height as f32;

        // The first page's aspect decides the orientation for the whole
        // document.
        let aspect = self.doc.page_aspect(0);
        let (hw, hh) = fit_to_box(aspect, small_width, height);
        let (vw, vh) = fit_to_box(aspect, width, small_height);
        self.frame.split_is_horizontal = hw as i64 * hh as i64 >= vw as i64 * vh as i64;

        if self.frame.split_is_horizontal {
            if horiz_aspect > self.doc.max_aspect() {
                self.frame.optimized_ratio = self.doc.max_aspect() * height as f32 / width as f32;
            }
        } else if vert_aspect < self.doc.min_aspect() {
            self.frame.optimized_ratio = width as f32 / self.doc.min_aspect() / height as f32;
        }
    }

    fn slot_boxes(&self) -> [(i32, i32); 2] {
        let width = self.frame.viewport_width;
        let height = self.frame.viewport_height;
        let gap = self.config.slide_gap;
        if self.frame.split_is_horizontal {
            let main_width = (self.frame.optimized_ratio * width as f32).round() as i32;
            [(main_width, height), (width - main_width - gap, height / 2)]
        } else {
            let main_height = (self.frame.optimized_ratio * height as f32).round() as i32;
            [(width, main_height), (width / 2, height - main_height - gap)]
        }
    }

    /// Placement rectangles for the two visible slides: main slide centered
    /// in its box, next slide flush after the main slide on the split axis.
    fn placements(&self) -> [PixelRect; 2] {
        let boxes = self.slot_boxes();
        let mut placed = [PixelRect::default(); 2];
        for i in 0..2 {
            let aspect = self
                .doc
                .page_aspect(self.clamped_aspect_page(self.frame.current_page + i));
            let (bw, bh) = boxes[i];
            let (pw, ph) = fit_to_box(aspect, bw, bh);
            placed[i] = PixelRect::new((bw - pw) / 2, (bh - ph) / 2, pw, ph);
        }
        if self.frame.split_is_horizontal {
            placed[1].x = boxes[0].0 + self.config.slide_gap;
            placed[1].y = 0;
        } else {
            placed[1].x = self.frame.viewport_width - placed[1].width;
            placed[1].y = boxes[0].1 + self.config.slide_gap;
        }
        placed
    }

    /// Width a page would be rendered at in the main slot; used to request
    /// prefetched pages at the size they will eventually be shown at.
    fn fit_width(&self, page: usize) -> i32 {
        let aspect = self.doc.page_aspect(self.clamped_aspect_page(page));
        let (bw, bh) = if self.frame.split_is_horizontal {
            (
                (self.frame.optimized_ratio * self.frame.viewport_width as f32).round() as i32,
                self.frame.viewport_height,
            )
        } else {
            (
                self.frame.viewport_width,
                (self.frame.optimized_ratio * self.frame.viewport_height as f32).round() as i32,
            )
        };
        fit_to_box(aspect, bw, bh).0
    }

    fn draw_highlights(&self, surface: &mut dyn RenderSurface, placements: &[PixelRect; 2]) {
        let page_count = self.doc.page_count();
        let margin = self.config.highlight_margin;
        for i in 0..2 {
            let page = self.frame.current_page + i;
            if page >= page_count {
                continue;
            }
            let Some(rects) = self.hits.hits_for_page(page) else {
                continue;
            };
            let placement = placements[i];
            for rect in rects {
                let x = placement.x + (rect.left * placement.width as f32).round() as i32 - margin;
                let y = placement.y + (rect.top * placement.height as f32).round() as i32 - margin;
                let w = (rect.width() * placement.width as f32).round() as i32 + 2 * margin;
                let h = (rect.height() * placement.height as f32).round() as i32 + 2 * margin;
                surface.highlight(PixelRect::new(x, y, w, h));
            }
        }
    }
}

impl Layout for PresenterLayout {
    fn resize(&mut self, width: i32, height: i32) {
        self.frame.viewport_width = width.max(0);
        self.frame.viewport_height = height.max(0);
        self.recompute_split();
    }

    fn render(&mut self, surface: &mut dyn RenderSurface) {
        surface.clear();
        let page_count = self.doc.page_count();
        if page_count == 0 {
            return;
        }
        let placements = self.placements();

        for i in 0..2 {
            let page = self.frame.current_page + i;
            if page >= page_count {
                continue;
            }
            let slot = self.render_slot + i;
            let placement = placements[i];
            match self.cache.acquire(page, placement.width, slot) {
                Some(cached) => {
                    match cached.image {
                        Some(image) => {
                            let rotation = self.frame.rotation.relative_to(cached.rotation);
                            surface.draw_image(
                                &image,
                                rotate_placement(placement, rotation),
                                rotation,
                            );
                        }
                        None => surface.fill_background(placement),
                    }
                    self.cache.release(page, slot);
                }
                None => surface.fill_background(placement),
            }
        }

        if self.search_visible {
            self.draw_highlights(surface, &placements);
        }

        // Warm the cache around the current page; handles are dropped right
        // away, retention is the cache's business.
        let prefetch = self.config.prefetch_count;
        for offset in 1..=prefetch {
            let ahead = self.frame.current_page + offset;
            if ahead < page_count
                && self
                    .cache
                    .acquire(ahead, self.fit_width(ahead), self.render_slot)
                    .is_some()
            {
                self.cache.release(ahead, self.render_slot);
            }
            if let Some(behind) = self.frame.current_page.checked_sub(offset) {
                if self
                    .cache
                    .acquire(behind, self.fit_width(behind), self.render_slot)
                    .is_some()
                {
                    self.cache.release(behind, self.render_slot);
                }
            }
        }
        let low = self.frame.current_page.saturating_sub(prefetch * 3);
        let high = self.frame.current_page + 1 + prefetch * 3;
        for i in 0..2 {
            self.cache.evict_outside(low, high, self.render_slot + i);
        }
        trace!(page = self.frame.current_page, "rendered presenter frame");
    }

    fn select(&mut self, page: usize) -> bool {
        let page_count = self.doc.page_count();
        if page_count == 0 {
            return false;
        }
        let next = page.min(page_count - 1);
        if next == self.frame.current_page {
            return false;
        }
        self.frame.current_page = next;
        true
    }

    fn get_location_at(&self, px: i32, py: i32) -> (usize, (f32, f32)) {
        let placements = self.placements();
        let mut chosen = None;
        let mut last = (0usize, (0.0f32, 0.0f32));
        for (i, placement) in placements.iter().enumerate() {
            let x = (px - placement.x) as f32 / placement.width.max(1) as f32;
            let y = (py - placement.y) as f32 / placement.height.max(1) as f32;
            let point = rotate_unit_point(x, y, self.frame.rotation);
            last = (i, point);
            if (0.0..=1.0).contains(&point.0) && (0.0..=1.0).contains(&point.1) {
                chosen = Some(last);
                break;
            }
        }
        // A point in neither slide belongs to the next slide by convention.
        let (slot, point) = chosen.unwrap_or(last);
        (self.frame.current_page + slot, point)
    }

    fn advance_hit(&mut self, forward: bool) -> bool {
        let pages = self.hits.pages_with_hits();
        if pages.is_empty() {
            return false;
        }
        // Pressing "next" while the search ran backwards moves backwards
        // through the document.
        let document_forward = forward == self.hits.is_forward();
        let current = self.frame.current_page;
        let target = if document_forward {
            pages
                .iter()
                .copied()
                .find(|&page| page > current)
                .unwrap_or(pages[0])
        } else {
            pages
                .iter()
                .rev()
                .copied()
                .find(|&page| page < current)
                .unwrap_or(pages[pages.len() - 1])
        };
        self.select(target);
        true
    }

    fn page_visible(&self, page: usize) -> bool {
        page == self.frame.current_page || page == self.frame.current_page + 1
    }
}
