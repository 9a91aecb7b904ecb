//! Deterministic collaborators for tests
//!
//! [`ScriptedDecoder`] produces rasters whose every byte equals the page
//! number, so a test can tell which page reached the surface. Pages can be
//! held so that a render blocks inside the worker until the test releases it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::decode::{DecodeFault, DecodedDocument, DocumentDecoder, PageSize, Raster};
use crate::source::{ByteSource, DocumentId, FetchError};
use crate::viewer::CancellationToken;

/// Longest a held page blocks before giving up, so a broken test cannot hang
const HOLD_LIMIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Script {
    sizes: Vec<PageSize>,
    held: Mutex<HashSet<usize>>,
    released: Condvar,
    failing: Mutex<HashSet<usize>>,
    panicking: Mutex<HashSet<usize>>,
    rasterized: Mutex<Vec<(usize, f32)>>,
    size_queries: AtomicUsize,
    opens: AtomicUsize,
    panic_on_open: AtomicUsize,
}

/// Fake decode capability with scripted geometry, holds and failures
#[derive(Clone)]
pub struct ScriptedDecoder {
    script: Arc<Script>,
}

impl ScriptedDecoder {
    /// Bytes this decoder refuses to open
    pub const MALFORMED: &'static [u8] = b"<malformed>";

    pub fn with_sizes(sizes: Vec<PageSize>) -> Self {
        Self {
            script: Arc::new(Script {
                sizes,
                ..Script::default()
            }),
        }
    }

    pub fn uniform(pages: usize, width: f32, height: f32) -> Self {
        Self::with_sizes(vec![PageSize::new(width, height); pages])
    }

    /// Block rasterization of `page` until released
    pub fn hold(&self, page: usize) {
        lock(&self.script.held).insert(page);
    }

    pub fn release(&self, page: usize) {
        lock(&self.script.held).remove(&page);
        self.script.released.notify_all();
    }

    pub fn release_all(&self) {
        lock(&self.script.held).clear();
        self.script.released.notify_all();
    }

    /// Make rasterization of `page` fail
    pub fn fail_page(&self, page: usize) {
        lock(&self.script.failing).insert(page);
    }

    /// Panic inside the `nth` call to `open` (1-based), killing whatever
    /// thread made it
    pub fn panic_on_open(&self, nth: usize) {
        self.script.panic_on_open.store(nth, Ordering::SeqCst);
    }

    /// Make rasterization of `page` panic inside the decoder
    pub fn panic_page(&self, page: usize) {
        lock(&self.script.panicking).insert(page);
    }

    /// Every `(page, scale)` that finished rasterizing, in order
    pub fn rasterized(&self) -> Vec<(usize, f32)> {
        lock(&self.script.rasterized).clone()
    }

    pub fn size_queries(&self) -> usize {
        self.script.size_queries.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentDecoder for ScriptedDecoder {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn DecodedDocument>, DecodeFault> {
        let nth = self.script.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if nth == self.script.panic_on_open.load(Ordering::SeqCst) {
            panic!("scripted panic opening document (call {nth})");
        }
        if bytes == Self::MALFORMED {
            return Err(DecodeFault::Malformed("scripted malformed input".into()));
        }
        Ok(Box::new(ScriptedDocument {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedDocument {
    script: Arc<Script>,
}

impl ScriptedDocument {
    fn size(&self, page: usize) -> Result<PageSize, DecodeFault> {
        if page == 0 || page > self.script.sizes.len() {
            return Err(DecodeFault::PageOutOfRange {
                page,
                page_count: self.script.sizes.len(),
            });
        }
        Ok(self.script.sizes[page - 1])
    }

    fn wait_while_held(&self, page: usize) {
        let deadline = Instant::now() + HOLD_LIMIT;
        let mut held = lock(&self.script.held);
        while held.contains(&page) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            held = self
                .script
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl DecodedDocument for ScriptedDocument {
    fn page_count(&self) -> usize {
        self.script.sizes.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, DecodeFault> {
        self.script.size_queries.fetch_add(1, Ordering::SeqCst);
        self.size(page)
    }

    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        _cancel: &CancellationToken,
    ) -> Result<Raster, DecodeFault> {
        let size = self.size(page)?;
        self.wait_while_held(page);

        let panics = lock(&self.script.panicking).contains(&page);
        if panics {
            panic!("scripted panic on page {page}");
        }
        if lock(&self.script.failing).contains(&page) {
            return Err(DecodeFault::engine(format!("scripted failure on page {page}")));
        }

        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;
        let pixels = vec![page as u8; width as usize * height as usize * 3];
        lock(&self.script.rasterized).push((page, scale));
        Raster::new(pixels, width, height)
    }
}

/// In-memory byte source keyed by document id
#[derive(Clone, Default)]
pub struct StaticSource {
    documents: Arc<Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, id: &str, result: Result<Vec<u8>, FetchError>) -> Self {
        self.set(id, result);
        self
    }

    /// Replace what `id` fetches from now on. Clones share the same table.
    pub fn set(&self, id: &str, result: Result<Vec<u8>, FetchError>) {
        lock(&self.documents).insert(id.to_string(), result);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ByteSource for StaticSource {
    fn fetch(&self, document: &DocumentId) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.documents)
            .get(document.as_str())
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    status: 404,
                    body: format!("unknown document {document}"),
                })
            })
    }
}
