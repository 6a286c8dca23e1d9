use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, instrument};

use beamview_core::{
    CachedPage, DocumentBackend, DocumentInfo, DocumentProvider, PageCache, RenderImage,
    RenderSurface, Rotation, ViewerConfig,
};
use beamview_layout::{Layout, LayoutFrame, PresenterLayout};
use beamview_search::{SearchCoordinator, SearchState, Submission};

pub use beamview_search::SearchDirection;

/// One open document wired to its search worker and presenter layout.
pub struct ViewerSession {
    doc: Arc<dyn DocumentBackend>,
    search: SearchCoordinator,
    layout: PresenterLayout,
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("doc", &self.doc.info().id)
            .finish_non_exhaustive()
    }
}

impl ViewerSession {
    #[instrument(skip(provider, cache, config))]
    pub async fn open_with<P: DocumentProvider>(
        provider: &P,
        path: &Path,
        cache: Arc<dyn PageCache>,
        config: ViewerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let doc = provider
            .open(path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        debug!(id = %doc.info().id, pages = doc.page_count(), "document opened");
        let search = SearchCoordinator::spawn(Arc::clone(&doc))?;
        let layout = PresenterLayout::new(Arc::clone(&doc), cache, search.hits(), config, 0, 0);
        Ok(Self {
            doc,
            search,
            layout,
        })
    }

    pub fn info(&self) -> &DocumentInfo {
        self.doc.info()
    }

    /// A search always starts from the page currently on screen.
    pub fn submit_query(&mut self, term: &str, direction: SearchDirection) -> Submission {
        let start_page = self.layout.frame().current_page;
        self.layout.set_search_visible(!term.is_empty());
        self.search.submit(term, start_page, direction)
    }

    pub fn cancel_search(&mut self) {
        self.search.cancel_current();
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.layout.set_search_visible(false);
    }

    pub fn is_forward(&self) -> bool {
        self.search.is_forward()
    }

    pub fn search_state(&self) -> SearchState {
        self.search.state()
    }

    /// Drain the progress-text stream accumulated since the last call.
    pub fn progress_messages(&self) -> Vec<String> {
        self.search
            .drain_events()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        self.layout.resize(width, height);
    }

    pub fn render(&mut self, surface: &mut dyn RenderSurface) {
        self.layout.render(surface);
    }

    pub fn frame(&self) -> &LayoutFrame {
        self.layout.frame()
    }

    pub fn current_page(&self) -> usize {
        self.layout.frame().current_page
    }

    pub fn goto_page(&mut self, page: usize) -> bool {
        self.layout.select(page)
    }

    pub fn next_page(&mut self) -> bool {
        self.layout.select(self.layout.frame().current_page + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        let current = self.layout.frame().current_page;
        self.layout.select(current.saturating_sub(1))
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.layout.set_rotation(rotation);
    }

    pub fn get_location_at(&self, px: i32, py: i32) -> (usize, (f32, f32)) {
        self.layout.get_location_at(px, py)
    }

    pub fn advance_hit(&mut self, forward: bool) -> bool {
        self.layout.advance_hit(forward)
    }

    pub fn page_visible(&self, page: usize) -> bool {
        self.layout.page_visible(page)
    }

    /// Joins the search worker. The session owns the last strong document
    /// reference, so the backend outlives the worker by construction.
    pub fn shutdown(mut self) {
        self.search.shutdown();
    }
}

#[derive(Default)]
struct CacheEntry {
    image: Option<Arc<RenderImage>>,
    rotation: Rotation,
    refs: usize,
    requested_width: i32,
}

/// Reference `PageCache`: entries appear on first acquire as unrendered
/// requests, an external renderer fills them in via `fulfill`, and eviction
/// only touches unreferenced entries outside the window.
pub struct MemoryPageCache {
    page_count: usize,
    entries: Mutex<HashMap<(usize, usize), CacheEntry>>,
}

impl MemoryPageCache {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn fulfill(&self, page: usize, slot: usize, image: RenderImage, rotation: Rotation) {
        let mut entries = self.entries.lock();
        // A render finishing after its entry was evicted is dropped.
        if let Some(entry) = entries.get_mut(&(page, slot)) {
            entry.image = Some(Arc::new(image));
            entry.rotation = rotation;
        }
    }

    /// Unrendered entries, as `(page, requested_width, slot)`.
    pub fn pending_requests(&self) -> Vec<(usize, i32, usize)> {
        let entries = self.entries.lock();
        let mut pending: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.image.is_none())
            .map(|(&(page, slot), entry)| (page, entry.requested_width, slot))
            .collect();
        pending.sort_unstable();
        pending
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PageCache for MemoryPageCache {
    fn acquire(&self, page: usize, target_width: i32, slot: usize) -> Option<CachedPage> {
        if page >= self.page_count {
            return None;
        }
        let mut entries = self.entries.lock();
        let entry = entries.entry((page, slot)).or_default();
        entry.refs += 1;
        if entry.image.is_none() {
            entry.requested_width = target_width;
        }
        Some(CachedPage {
            image: entry.image.clone(),
            rotation: entry.rotation,
        })
    }

    fn release(&self, page: usize, slot: usize) {
        if let Some(entry) = self.entries.lock().get_mut(&(page, slot)) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    fn evict_outside(&self, low: usize, high: usize, slot: usize) {
        self.entries.lock().retain(|&(page, entry_slot), entry| {
            entry_slot != slot || entry.refs > 0 || (page >= low && page <= high)
        });
    }
}
