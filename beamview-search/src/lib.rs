use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context as _;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use beamview_core::{DocumentBackend, NormalizedRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub term: String,
    pub start_page: usize,
    pub direction: SearchDirection,
}

impl SearchQuery {
    /// Smartcase: the scan is case sensitive iff the term itself contains an
    /// uppercase code point.
    pub fn case_sensitive(&self) -> bool {
        self.term.chars().any(|c| c.is_uppercase())
    }

    pub fn is_forward(&self) -> bool {
        self.direction == SearchDirection::Forward
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Scanning,
    CancelRequested,
    Terminating,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Cleared,
    Progress {
        case_sensitive: bool,
        percent: u32,
        hit_count: usize,
    },
    PageUpdated {
        page: usize,
        hit_count: usize,
    },
    Done {
        case_sensitive: bool,
        hit_count: usize,
    },
    Stopped,
}

fn case_label(case_sensitive: bool) -> &'static str {
    if case_sensitive {
        "Case"
    } else {
        "no case"
    }
}

impl fmt::Display for SearchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchEvent::Cleared => write!(f, "cleared"),
            SearchEvent::Progress {
                case_sensitive,
                percent,
                hit_count,
            } => write!(
                f,
                "[{}] {}% searched, {} hits",
                case_label(*case_sensitive),
                percent,
                hit_count
            ),
            SearchEvent::PageUpdated { page, hit_count } => {
                write!(f, "page {}: {} hits", page, hit_count)
            }
            SearchEvent::Done {
                case_sensitive,
                hit_count,
            } => write!(f, "[{}] done, {} hits", case_label(*case_sensitive), hit_count),
            SearchEvent::Stopped => write!(f, "done."),
        }
    }
}

/// Sparse page-to-hits map. Entries are stamped with the query epoch that
/// produced them; inserts from a superseded epoch are rejected, so hits can
/// never leak across queries.
#[derive(Debug, Default)]
pub struct HitIndex {
    epoch: u64,
    pages: BTreeMap<usize, Vec<NormalizedRect>>,
}

impl HitIndex {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn total_hits(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn hits_for_page(&self, page: usize) -> Option<&[NormalizedRect]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.pages.keys().copied()
    }

    fn clear_for_epoch(&mut self, epoch: u64) {
        if epoch < self.epoch {
            return;
        }
        self.pages.clear();
        self.epoch = epoch;
    }

    fn insert_for_epoch(&mut self, epoch: u64, page: usize, rects: Vec<NormalizedRect>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        // Wholesale replacement; a re-scanned page never merges partially.
        self.pages.insert(page, rects);
        true
    }
}

#[derive(Default)]
struct Mailbox {
    pending: Option<SearchQuery>,
    terminate: bool,
}

struct Shared {
    doc: Arc<dyn DocumentBackend>,
    mailbox: Mutex<Mailbox>,
    wake: Condvar,
    epoch: AtomicU64,
    terminating: AtomicBool,
    forward: AtomicBool,
    hits: RwLock<HitIndex>,
    events: Mutex<Vec<SearchEvent>>,
    state: Mutex<SearchState>,
}

impl Shared {
    fn superseded(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch || self.terminating.load(Ordering::SeqCst)
    }

    fn push_event(&self, event: SearchEvent) {
        self.events.lock().push(event);
    }

    fn set_state(&self, state: SearchState) {
        *self.state.lock() = state;
    }

    fn request_cancel(&self) {
        let mut state = self.state.lock();
        if *state == SearchState::Scanning {
            *state = SearchState::CancelRequested;
        }
    }
}

/// Cloneable read-only view of the hit index, handed to layout instances.
#[derive(Clone)]
pub struct HitWatch {
    shared: Arc<Shared>,
}

impl HitWatch {
    pub fn has_hits(&self) -> bool {
        !self.shared.hits.read().is_empty()
    }

    pub fn total_hits(&self) -> usize {
        self.shared.hits.read().total_hits()
    }

    pub fn hits_for_page(&self, page: usize) -> Option<Vec<NormalizedRect>> {
        self.shared.hits.read().hits_for_page(page).map(<[_]>::to_vec)
    }

    pub fn pages_with_hits(&self) -> Vec<usize> {
        self.shared.hits.read().pages().collect()
    }

    pub fn is_forward(&self) -> bool {
        self.shared.forward.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started,
    Refocused,
}

pub struct SearchCoordinator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    current_term: String,
}

impl SearchCoordinator {
    pub fn spawn(doc: Arc<dyn DocumentBackend>) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            doc,
            mailbox: Mutex::new(Mailbox::default()),
            wake: Condvar::new(),
            epoch: AtomicU64::new(0),
            terminating: AtomicBool::new(false),
            forward: AtomicBool::new(true),
            hits: RwLock::new(HitIndex::default()),
            events: Mutex::new(Vec::new()),
            state: Mutex::new(SearchState::Idle),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("beamview-search".into())
            .spawn(move || worker_loop(worker_shared))
            .context("failed to spawn search worker")?;
        Ok(Self {
            shared,
            worker: Some(worker),
            current_term: String::new(),
        })
    }

    /// Hand a query to the worker. Resubmitting the term that is already
    /// displayed only refocuses the caller; it never restarts a lap.
    pub fn submit(&mut self, term: &str, start_page: usize, direction: SearchDirection) -> Submission {
        self.shared
            .forward
            .store(direction == SearchDirection::Forward, Ordering::SeqCst);
        if term == self.current_term {
            debug!(term, "identical term resubmitted, refocus only");
            return Submission::Refocused;
        }
        self.current_term = term.to_string();

        // The mailbox lock keeps the epoch bump, the index wipe and the
        // pending handoff atomic with respect to the worker's pickup.
        let mut mailbox = self.shared.mailbox.lock();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.hits.write().clear_for_epoch(epoch);
        self.shared.push_event(SearchEvent::Cleared);
        mailbox.pending = Some(SearchQuery {
            term: term.to_string(),
            start_page,
            direction,
        });
        self.shared.request_cancel();
        self.shared.wake.notify_one();
        Submission::Started
    }

    /// Cooperative cancellation: a queued query is dequeued and the
    /// in-flight lap dies at the next page boundary. Hits already emitted
    /// stay until the next submit or clear.
    pub fn cancel_current(&mut self) {
        let mut mailbox = self.shared.mailbox.lock();
        mailbox.pending = None;
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        drop(mailbox);
        self.shared.request_cancel();
        self.current_term.clear();
    }

    /// Drop all hits and the displayed term.
    pub fn clear(&mut self) {
        let mut mailbox = self.shared.mailbox.lock();
        mailbox.pending = None;
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.hits.write().clear_for_epoch(epoch);
        drop(mailbox);
        self.shared.request_cancel();
        self.current_term.clear();
        self.shared.push_event(SearchEvent::Cleared);
    }

    /// Blocks until the worker has exited. Safe to call more than once; the
    /// `Drop` impl falls back to it so the thread never outlives the
    /// document handle.
    pub fn shutdown(&mut self) {
        {
            let mut mailbox = self.shared.mailbox.lock();
            mailbox.terminate = true;
        }
        self.shared.terminating.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("search worker panicked before shutdown");
            }
        }
        self.shared.set_state(SearchState::Terminating);
    }

    pub fn hits(&self) -> HitWatch {
        HitWatch {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_forward(&self) -> bool {
        self.shared.forward.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SearchState {
        *self.shared.state.lock()
    }

    pub fn drain_events(&self) -> Vec<SearchEvent> {
        std::mem::take(&mut *self.shared.events.lock())
    }
}

impl Drop for SearchCoordinator {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

/// One full circular lap over all pages, starting at `start` and stepping in
/// `direction`. Every page is visited exactly once.
pub fn circular_pages(
    start: usize,
    page_count: usize,
    direction: SearchDirection,
) -> impl Iterator<Item = usize> {
    (0..page_count).map(move |step| match direction {
        SearchDirection::Forward => (start + step) % page_count,
        SearchDirection::Backward => (start + page_count - step) % page_count,
    })
}

fn lap_percent(start: usize, page: usize, page_count: usize, direction: SearchDirection) -> u32 {
    let travelled = match direction {
        SearchDirection::Forward => page + page_count - start,
        SearchDirection::Backward => start + page_count - page,
    };
    ((travelled % page_count) * 100 / page_count) as u32
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let (query, epoch) = {
            let mut mailbox = shared.mailbox.lock();
            loop {
                if mailbox.terminate {
                    shared.set_state(SearchState::Terminating);
                    return;
                }
                if let Some(query) = mailbox.pending.take() {
                    break (query, shared.epoch.load(Ordering::SeqCst));
                }
                shared.set_state(SearchState::Idle);
                shared.wake.wait(&mut mailbox);
            }
        };
        shared.set_state(SearchState::Scanning);
        scan_lap(&shared, &query, epoch);
    }
}

fn scan_lap(shared: &Shared, query: &SearchQuery, epoch: u64) {
    let doc = shared.doc.as_ref();
    let page_count = doc.page_count();

    // An empty term is an explicit stop, not a literal search.
    if query.term.is_empty() || page_count == 0 {
        shared.hits.write().clear_for_epoch(epoch);
        shared.push_event(SearchEvent::Stopped);
        return;
    }

    let case_sensitive = query.case_sensitive();
    let start = query.start_page % page_count;
    debug!(
        term = %query.term,
        start,
        forward = query.is_forward(),
        case_sensitive,
        "starting scan lap"
    );
    shared.push_event(SearchEvent::Progress {
        case_sensitive,
        percent: 0,
        hit_count: 0,
    });

    let mut hit_count = 0usize;
    for page in circular_pages(start, page_count, query.direction) {
        if shared.superseded(epoch) {
            debug!(page, "scan superseded, dropping lap");
            return;
        }
        let rects = match doc.search_page(page, &query.term, case_sensitive) {
            Some(rects) => rects,
            None => {
                warn!(page, "failed to load page during search, skipping");
                continue;
            }
        };
        // A cancellation that raced the page accumulation discards it whole.
        if shared.superseded(epoch) {
            return;
        }
        if rects.is_empty() {
            continue;
        }
        let page_hits = rects.len();
        hit_count += page_hits;
        if !shared.hits.write().insert_for_epoch(epoch, page, rects) {
            return;
        }
        shared.push_event(SearchEvent::PageUpdated {
            page,
            hit_count: page_hits,
        });
        shared.push_event(SearchEvent::Progress {
            case_sensitive,
            percent: lap_percent(start, page, page_count, query.direction),
            hit_count,
        });
    }
    if shared.superseded(epoch) {
        return;
    }
    debug!(hit_count, "scan lap complete");
    shared.push_event(SearchEvent::Done {
        case_sensitive,
        hit_count,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use beamview_core::{document_id_for_path, DocumentInfo};

    fn rect(i: usize) -> NormalizedRect {
        let offset = i as f32 * 0.1;
        NormalizedRect::new(offset, offset, offset + 0.05, offset + 0.02)
    }

    struct Gate {
        page: usize,
        reached: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    struct GateControl {
        reached: mpsc::Receiver<()>,
        release: mpsc::Sender<()>,
    }

    struct FakeDocument {
        info: DocumentInfo,
        hits_by_term: HashMap<String, BTreeMap<usize, Vec<NormalizedRect>>>,
        failing_pages: Vec<usize>,
        scanned: Mutex<Vec<(usize, bool)>>,
        gate: Option<Gate>,
    }

    impl FakeDocument {
        fn new(page_count: usize) -> Self {
            let path = PathBuf::from("/tmp/fake.pdf");
            Self {
                info: DocumentInfo {
                    id: document_id_for_path(&path),
                    path,
                    page_count,
                },
                hits_by_term: HashMap::new(),
                failing_pages: Vec::new(),
                scanned: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn with_hits(mut self, term: &str, page: usize, count: usize) -> Self {
            let rects = (0..count).map(rect).collect();
            self.hits_by_term
                .entry(term.to_string())
                .or_default()
                .insert(page, rects);
            self
        }

        fn with_failing(mut self, page: usize) -> Self {
            self.failing_pages.push(page);
            self
        }

        fn with_gate(mut self, page: usize) -> (Self, GateControl) {
            let (reached_tx, reached_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            self.gate = Some(Gate {
                page,
                reached: Mutex::new(reached_tx),
                release: Mutex::new(release_rx),
            });
            (
                self,
                GateControl {
                    reached: reached_rx,
                    release: release_tx,
                },
            )
        }

        fn scanned(&self) -> Vec<(usize, bool)> {
            self.scanned.lock().clone()
        }

        fn scan_order(&self) -> Vec<usize> {
            self.scanned().iter().map(|(page, _)| *page).collect()
        }
    }

    impl DocumentBackend for FakeDocument {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn page_aspect(&self, _page: usize) -> f32 {
            1.33
        }

        fn min_aspect(&self) -> f32 {
            1.33
        }

        fn max_aspect(&self) -> f32 {
            1.33
        }

        fn search_page(
            &self,
            page: usize,
            term: &str,
            case_sensitive: bool,
        ) -> Option<Vec<NormalizedRect>> {
            if let Some(gate) = &self.gate {
                if page == gate.page {
                    gate.reached.lock().send(()).ok();
                    gate.release.lock().recv().ok();
                }
            }
            self.scanned.lock().push((page, case_sensitive));
            if self.failing_pages.contains(&page) {
                return None;
            }
            Some(
                self.hits_by_term
                    .get(term)
                    .and_then(|pages| pages.get(&page))
                    .cloned()
                    .unwrap_or_default(),
            )
        }
    }

    fn drain_until_terminal(coordinator: &SearchCoordinator) -> Vec<SearchEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        loop {
            events.extend(coordinator.drain_events());
            if events
                .iter()
                .any(|e| matches!(e, SearchEvent::Done { .. } | SearchEvent::Stopped))
            {
                return events;
            }
            assert!(Instant::now() < deadline, "search did not finish in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn wait_for_idle(coordinator: &SearchCoordinator) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while coordinator.state() != SearchState::Idle {
            assert!(Instant::now() < deadline, "worker did not return to idle");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn circular_lap_visits_every_page_exactly_once() {
        let forward: Vec<_> = circular_pages(2, 5, SearchDirection::Forward).collect();
        assert_eq!(forward, vec![2, 3, 4, 0, 1]);

        let backward: Vec<_> = circular_pages(2, 5, SearchDirection::Backward).collect();
        assert_eq!(backward, vec![2, 1, 0, 4, 3]);

        for start in 0..7 {
            let mut seen: Vec<_> = circular_pages(start, 7, SearchDirection::Backward).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..7).collect::<Vec<_>>());
        }
    }

    #[test]
    fn lap_percent_is_relative_to_start_and_direction() {
        assert_eq!(lap_percent(2, 2, 5, SearchDirection::Forward), 0);
        assert_eq!(lap_percent(2, 3, 5, SearchDirection::Forward), 20);
        assert_eq!(lap_percent(2, 1, 5, SearchDirection::Forward), 80);
        assert_eq!(lap_percent(2, 1, 5, SearchDirection::Backward), 20);
        assert_eq!(lap_percent(2, 3, 5, SearchDirection::Backward), 80);
    }

    #[test]
    fn hit_index_rejects_stale_epochs() {
        let mut index = HitIndex::default();
        index.clear_for_epoch(2);
        assert!(!index.insert_for_epoch(1, 0, vec![rect(0)]));
        assert!(index.insert_for_epoch(2, 0, vec![rect(0)]));
        assert_eq!(index.total_hits(), 1);

        // An older clear never regresses the index.
        index.clear_for_epoch(1);
        assert_eq!(index.total_hits(), 1);
        index.clear_for_epoch(3);
        assert!(index.is_empty());
    }

    #[test]
    fn scan_order_wraps_around_from_start_page() {
        let doc = Arc::new(FakeDocument::new(5));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        assert_eq!(
            coordinator.submit("alpha", 2, SearchDirection::Forward),
            Submission::Started
        );
        drain_until_terminal(&coordinator);
        assert_eq!(doc.scan_order(), vec![2, 3, 4, 0, 1]);

        coordinator.submit("beta", 2, SearchDirection::Backward);
        drain_until_terminal(&coordinator);
        assert_eq!(doc.scan_order()[5..], [2, 1, 0, 4, 3]);

        coordinator.shutdown();
    }

    #[test]
    fn smartcase_follows_uppercase_presence() {
        let doc = Arc::new(FakeDocument::new(3));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("Test", 0, SearchDirection::Forward);
        drain_until_terminal(&coordinator);
        assert!(doc.scanned().iter().all(|&(_, case)| case));

        coordinator.submit("test", 0, SearchDirection::Forward);
        drain_until_terminal(&coordinator);
        let scanned = doc.scanned();
        assert!(scanned[3..].iter().all(|&(_, case)| !case));
        // Same scan order either way; only the flag differs.
        assert_eq!(doc.scan_order()[..3], doc.scan_order()[3..]);

        coordinator.shutdown();
    }

    #[test]
    fn hits_land_on_the_matching_page_only() {
        let doc = Arc::new(FakeDocument::new(5).with_hits("Test", 4, 2));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("Test", 2, SearchDirection::Forward);
        let events = drain_until_terminal(&coordinator);

        let hits = coordinator.hits();
        assert_eq!(hits.pages_with_hits(), vec![4]);
        assert_eq!(hits.hits_for_page(4).unwrap().len(), 2);
        assert!(hits
            .pages_with_hits()
            .iter()
            .all(|&page| page < doc.page_count()));
        assert!(events.contains(&SearchEvent::PageUpdated {
            page: 4,
            hit_count: 2
        }));
        assert!(events.contains(&SearchEvent::Done {
            case_sensitive: true,
            hit_count: 2
        }));

        coordinator.shutdown();
    }

    #[test]
    fn identical_term_resubmit_is_a_noop() {
        let doc = Arc::new(FakeDocument::new(4).with_hits("abc", 1, 1));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("abc", 0, SearchDirection::Forward);
        drain_until_terminal(&coordinator);
        let scanned_before = doc.scanned().len();

        assert_eq!(
            coordinator.submit("abc", 2, SearchDirection::Backward),
            Submission::Refocused
        );
        // Direction still updates on a refocus.
        assert!(!coordinator.is_forward());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(doc.scanned().len(), scanned_before);
        assert_eq!(coordinator.hits().pages_with_hits(), vec![1]);

        coordinator.shutdown();
    }

    #[test]
    fn empty_term_stops_without_scanning() {
        let doc = Arc::new(FakeDocument::new(4).with_hits("abc", 1, 1));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("abc", 0, SearchDirection::Forward);
        drain_until_terminal(&coordinator);
        let scanned_before = doc.scanned().len();
        assert!(coordinator.hits().has_hits());

        coordinator.submit("", 0, SearchDirection::Forward);
        let events = drain_until_terminal(&coordinator);
        assert!(events.contains(&SearchEvent::Stopped));
        assert!(!coordinator.hits().has_hits());
        assert_eq!(doc.scanned().len(), scanned_before);

        coordinator.shutdown();
    }

    #[test]
    fn superseding_query_discards_the_stale_epoch() {
        let (doc, gate) = FakeDocument::new(6)
            .with_hits("aaa", 0, 1)
            .with_hits("bbb", 5, 3)
            .with_gate(1);
        let doc = Arc::new(doc);
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("aaa", 0, SearchDirection::Forward);
        gate.reached
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never reached the gated page");
        // Page 0 hits are already in; the worker is stalled inside page 1.
        coordinator.submit("bbb", 5, SearchDirection::Forward);
        gate.release.send(()).unwrap();

        let events = drain_until_terminal(&coordinator);
        let hits = coordinator.hits();
        assert_eq!(hits.pages_with_hits(), vec![5]);
        assert_eq!(hits.hits_for_page(5).unwrap().len(), 3);
        assert!(events.contains(&SearchEvent::Done {
            case_sensitive: false,
            hit_count: 3
        }));

        coordinator.shutdown();
    }

    #[test]
    fn cancel_current_aborts_without_clearing() {
        let (doc, gate) = FakeDocument::new(6).with_hits("aaa", 0, 1).with_gate(1);
        let doc = Arc::new(doc);
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("aaa", 0, SearchDirection::Forward);
        gate.reached
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never reached the gated page");
        coordinator.cancel_current();
        assert_eq!(coordinator.state(), SearchState::CancelRequested);
        gate.release.send(()).unwrap();

        wait_for_idle(&coordinator);
        let events = coordinator.drain_events();
        assert!(!events
            .iter()
            .any(|e| matches!(e, SearchEvent::Done { .. })));
        // Hits emitted before the cancel stay visible until the next submit.
        assert_eq!(coordinator.hits().pages_with_hits(), vec![0]);
        // The scan never went past the gated page.
        assert!(doc.scan_order().len() <= 2);

        coordinator.shutdown();
    }

    #[test]
    fn failing_page_is_skipped_not_fatal() {
        let doc = Arc::new(FakeDocument::new(5).with_failing(2).with_hits("abc", 3, 1));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("abc", 0, SearchDirection::Forward);
        let events = drain_until_terminal(&coordinator);

        assert_eq!(doc.scan_order(), vec![0, 1, 2, 3, 4]);
        assert_eq!(coordinator.hits().pages_with_hits(), vec![3]);
        assert!(events.contains(&SearchEvent::Done {
            case_sensitive: false,
            hit_count: 1
        }));

        coordinator.shutdown();
    }

    #[test]
    fn clear_drops_hits_and_term() {
        let doc = Arc::new(FakeDocument::new(3).with_hits("abc", 1, 2));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();

        coordinator.submit("abc", 0, SearchDirection::Forward);
        drain_until_terminal(&coordinator);
        assert!(coordinator.hits().has_hits());

        coordinator.clear();
        assert!(!coordinator.hits().has_hits());
        // After a clear the same term starts a fresh lap.
        assert_eq!(
            coordinator.submit("abc", 0, SearchDirection::Forward),
            Submission::Started
        );
        drain_until_terminal(&coordinator);
        assert!(coordinator.hits().has_hits());

        coordinator.shutdown();
    }

    #[test]
    fn shutdown_joins_and_is_idempotent() {
        let doc = Arc::new(FakeDocument::new(3));
        let mut coordinator = SearchCoordinator::spawn(doc).unwrap();
        coordinator.shutdown();
        assert_eq!(coordinator.state(), SearchState::Terminating);
        coordinator.shutdown();
    }

    #[test]
    fn zero_page_document_reports_stop() {
        let doc = Arc::new(FakeDocument::new(0));
        let mut coordinator = SearchCoordinator::spawn(doc.clone()).unwrap();
        coordinator.submit("abc", 0, SearchDirection::Forward);
        let events = drain_until_terminal(&coordinator);
        assert!(events.contains(&SearchEvent::Stopped));
        assert!(doc.scan_order().is_empty());
        coordinator.shutdown();
    }

    #[test]
    fn progress_text_matches_the_status_labels() {
        let progress = SearchEvent::Progress {
            case_sensitive: true,
            percent: 40,
            hit_count: 3,
        };
        assert_eq!(progress.to_string(), "[Case] 40% searched, 3 hits");
        let done = SearchEvent::Done {
            case_sensitive: false,
            hit_count: 7,
        };
        assert_eq!(done.to_string(), "[no case] done, 7 hits");
        assert_eq!(SearchEvent::Stopped.to_string(), "done.");
    }
}
