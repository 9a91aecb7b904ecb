//! Viewer - owns the session, scheduler, navigation state and surface
//!
//! Everything here runs on the owner thread. Background work (fetching,
//! rasterizing) reports back through [`Viewer::pump`] or [`Viewer::wait`],
//! which apply results only if they are still current.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::decode::DocumentDecoder;
use crate::source::{ByteSource, DocumentId};

use super::error::ViewerError;
use super::geometry::{DEFAULT_FIT_PADDING, DEFAULT_ZOOM_STEP, ViewportGeometry, ZoomMode};
use super::loader::{Fetched, Loader};
use super::navigation::{Command, Effect, Intent, NavigationController, ViewerState};
use super::request::RenderOutcome;
use super::scheduler::{DEFAULT_CACHE_SIZE, RenderScheduler};
use super::session::DocumentSession;
use super::surface::RenderSurface;

/// Viewer tuning knobs
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerOptions {
    pub fit_padding: f32,
    pub zoom_step: f32,
    pub initial_zoom: ZoomMode,
    pub cache_size: usize,
    /// Page shown first after each load (1-based)
    pub start_page: Option<usize>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            fit_padding: DEFAULT_FIT_PADDING,
            zoom_step: DEFAULT_ZOOM_STEP,
            initial_zoom: ZoomMode::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            start_page: None,
        }
    }
}

/// Where the current document came from, kept for reloads
enum Origin {
    Remote {
        source: Arc<dyn ByteSource>,
        document: DocumentId,
    },
    Memory {
        document: DocumentId,
        bytes: Arc<[u8]>,
    },
}

impl Origin {
    fn document(&self) -> &DocumentId {
        match self {
            Self::Remote { document, .. } | Self::Memory { document, .. } => document,
        }
    }
}

pub struct Viewer {
    nav: NavigationController,
    session: DocumentSession,
    scheduler: RenderScheduler,
    surface: RenderSurface,
    loader: Loader,
    origin: Option<Origin>,
    last_error: Option<ViewerError>,
    start_page: Option<usize>,
}

impl Viewer {
    pub fn new(decoder: Arc<dyn DocumentDecoder>, options: ViewerOptions) -> Self {
        let nav = NavigationController::new(
            ViewportGeometry::new(options.fit_padding),
            options.zoom_step,
            options.initial_zoom,
        );
        Self {
            nav,
            session: DocumentSession::new(Arc::clone(&decoder)),
            scheduler: RenderScheduler::with_cache_size(decoder, options.cache_size),
            surface: RenderSurface::new(),
            loader: Loader::new(),
            origin: None,
            last_error: None,
            start_page: options.start_page,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        self.nav.state()
    }

    #[must_use]
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    #[must_use]
    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    #[must_use]
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Most recent user-visible error, cleared by the next successful render
    #[must_use]
    pub fn last_error(&self) -> Option<&ViewerError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn document(&self) -> Option<&DocumentId> {
        self.origin.as_ref().map(Origin::document)
    }

    /// Whether a fetch is in flight
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.loader.is_pending()
    }

    /// Start loading `document` from `source`. Replaces the current document.
    pub fn open(&mut self, source: Arc<dyn ByteSource>, document: DocumentId) {
        self.begin_load(&document);
        log::info!("Opening document {document}");
        self.loader.start(Arc::clone(&source), document.clone());
        self.origin = Some(Origin::Remote { source, document });
    }

    /// Load a document already in memory. Decoding happens synchronously.
    pub fn open_bytes(&mut self, document: DocumentId, bytes: Vec<u8>) {
        self.begin_load(&document);
        let bytes: Arc<[u8]> = Arc::from(bytes);
        self.origin = Some(Origin::Memory {
            document,
            bytes: Arc::clone(&bytes),
        });
        self.load_bytes(bytes.to_vec());
    }

    /// Fetch or decode the current document again
    pub fn reload(&mut self) {
        match self.origin.take() {
            Some(Origin::Remote { source, document }) => self.open(source, document),
            Some(Origin::Memory { document, bytes }) => self.open_bytes(document, bytes.to_vec()),
            None => log::debug!("Nothing to reload"),
        }
    }

    /// Recover from the last error: reload a document that failed to load,
    /// or render the current page again
    pub fn retry(&mut self) {
        if self.nav.is_ready() {
            self.execute(Command::Retry);
        } else if !self.loader.is_pending() {
            self.reload();
        }
    }

    pub fn dispatch(&mut self, intent: Intent) {
        self.execute(intent.into());
    }

    /// Report the width available for the page, in the same units as page sizes
    pub fn resize(&mut self, width: f32) {
        self.execute(Command::ContainerResized(width));
    }

    /// Jump to a page typed by the user; non-numeric text is ignored
    pub fn enter_page_text(&mut self, text: &str) {
        self.execute(Command::GoToPageText(text.to_string()));
    }

    /// Apply finished loads and renders without blocking. Returns the number
    /// of results applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        if let Some(fetched) = self.loader.poll() {
            self.on_fetched(fetched);
            applied += 1;
        }

        let mut outcomes = Vec::new();
        self.scheduler.poll(|_, outcome| outcomes.push(outcome));
        applied += outcomes.len();
        for outcome in outcomes {
            self.on_render(outcome);
        }
        applied
    }

    /// Block until a load or render result is applied, or `timeout` elapses
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.pump() > 0 {
            return true;
        }

        if self.loader.is_pending() {
            return match self.loader.wait(timeout) {
                Some(fetched) => {
                    self.on_fetched(fetched);
                    true
                }
                None => false,
            };
        }

        let mut outcomes = Vec::new();
        self.scheduler.wait(timeout, |_, outcome| outcomes.push(outcome));
        let delivered = !outcomes.is_empty();
        for outcome in outcomes {
            self.on_render(outcome);
        }
        delivered
    }

    /// Wait until nothing is loading or `timeout` elapses in total
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.loader.is_pending() || self.scheduler.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.wait(remaining);
        }
        self.pump();
        true
    }

    /// Release the current document. Idempotent.
    pub fn teardown(&mut self) {
        self.loader.cancel();
        self.scheduler.cancel_all();
        if let Some(id) = self.session.handle().map(|h| h.id()) {
            self.scheduler.release(id);
        }
        self.session.teardown();
        self.surface.clear();
        self.execute(Command::Closed);
    }

    fn begin_load(&mut self, document: &DocumentId) {
        self.teardown();
        self.last_error = None;
        self.session.begin(document.clone());
        if let Some(page) = self.start_page {
            self.nav.set_start_page(page);
        }
        self.execute(Command::LoadStarted);
    }

    fn on_fetched(&mut self, fetched: Fetched) {
        match fetched.result {
            Ok(bytes) => {
                log::debug!("Fetched {} ({} bytes)", fetched.document, bytes.len());
                self.load_bytes(bytes);
            }
            Err(e) => {
                log::error!("Failed to fetch {}: {e}", fetched.document);
                let error = ViewerError::from(e);
                self.session.fail(error.to_string());
                self.fail_document(error);
            }
        }
    }

    fn load_bytes(&mut self, bytes: Vec<u8>) {
        match self.session.load(bytes) {
            Ok(page_count) => self.execute(Command::DocumentReady { page_count }),
            Err(fault) => self.fail_document(ViewerError::from(fault)),
        }
    }

    fn fail_document(&mut self, error: ViewerError) {
        let reason = error.to_string();
        self.last_error = Some(error);
        self.execute(Command::DocumentFailed(reason));
    }

    fn on_render(&mut self, outcome: RenderOutcome) {
        match outcome {
            RenderOutcome::Raster(raster) => {
                self.surface.present(raster);
                self.last_error = None;
                self.execute(Command::RenderDelivered);
            }
            RenderOutcome::Failed { page, reason } => {
                let error = ViewerError::RenderFailed { page, reason };
                let message = error.to_string();
                self.last_error = Some(error);
                self.execute(Command::RenderFailed(message));
            }
            RenderOutcome::Cancelled => {
                log::debug!("{}", ViewerError::RenderCancelled);
            }
        }
    }

    fn execute(&mut self, cmd: Command) {
        let effects = self.nav.apply(cmd, &mut self.session);
        for effect in effects {
            match effect {
                Effect::Render { page, scale } => match self.session.handle() {
                    Some(handle) => {
                        self.scheduler.request(handle, page, scale);
                    }
                    None => log::warn!("Render of page {page} requested without a document"),
                },
                Effect::ClearSurface => self.surface.clear(),
            }
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.teardown();
    }
}
