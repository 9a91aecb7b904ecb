//! Viewer navigation state machine
//!
//! All state changes go through [`NavigationController::apply`], which
//! updates [`ViewerState`] synchronously and returns the effects the caller
//! must execute. A transition that changes the visible `(page, scale)` pair
//! yields exactly one [`Effect::Render`]; one that does not yields none.

use crate::decode::PageSize;

use super::geometry::{
    DEFAULT_ZOOM_STEP, ViewportGeometry, ZoomMode, clamp_scale, round_scale, same_scale,
};

/// Source of per-page intrinsic sizes
pub trait PageGeometry {
    fn page_size(&mut self, page: usize) -> Option<PageSize>;
}

/// Visible viewer state. Mutated only by [`NavigationController::apply`].
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerState {
    current_page: usize,
    zoom: ZoomMode,
    num_pages: usize,
    loading: bool,
    error: Option<String>,
    effective_scale: f32,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            current_page: 1,
            zoom: ZoomMode::default(),
            num_pages: 0,
            loading: false,
            error: None,
            effective_scale: 1.0,
        }
    }
}

impl ViewerState {
    /// Current page (1-based)
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn zoom(&self) -> ZoomMode {
        self.zoom
    }

    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Scale of the most recent render target
    #[must_use]
    pub fn effective_scale(&self) -> f32 {
        self.effective_scale
    }
}

/// User-level navigation intents
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    NextPage,
    PrevPage,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    FitWidth,
    GoToPage(usize),
}

/// Inputs to the state machine
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A document load started; previous state is discarded
    LoadStarted,
    DocumentReady { page_count: usize },
    DocumentFailed(String),
    GoToPage(usize),
    /// Free-form page number text; non-numeric input is ignored
    GoToPageText(String),
    NextPage,
    PrevPage,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    FitWidth,
    ContainerResized(f32),
    RenderDelivered,
    RenderFailed(String),
    /// Re-render the current page even if nothing changed
    Retry,
    /// The document was closed
    Closed,
}

impl From<Intent> for Command {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::NextPage => Self::NextPage,
            Intent::PrevPage => Self::PrevPage,
            Intent::ZoomIn => Self::ZoomIn,
            Intent::ZoomOut => Self::ZoomOut,
            Intent::ResetZoom => Self::ResetZoom,
            Intent::FitWidth => Self::FitWidth,
            Intent::GoToPage(page) => Self::GoToPage(page),
        }
    }
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Effect {
    /// Render `page` at the resolved `scale`
    Render { page: usize, scale: f32 },
    ClearSurface,
}

#[derive(Clone, Copy, Debug)]
struct RenderTarget {
    page: usize,
    scale: f32,
}

impl RenderTarget {
    fn same_as(self, other: RenderTarget) -> bool {
        self.page == other.page && same_scale(self.scale, other.scale)
    }
}

pub struct NavigationController {
    state: ViewerState,
    geometry: ViewportGeometry,
    zoom_step: f32,
    initial_zoom: ZoomMode,
    container_width: Option<f32>,
    /// Page requested before the document was ready
    pending_page: Option<usize>,
    ready: bool,
    last_target: Option<RenderTarget>,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new(ViewportGeometry::default(), DEFAULT_ZOOM_STEP, ZoomMode::default())
    }
}

impl NavigationController {
    #[must_use]
    pub fn new(geometry: ViewportGeometry, zoom_step: f32, initial_zoom: ZoomMode) -> Self {
        let initial_zoom = match initial_zoom {
            ZoomMode::Explicit(scale) => ZoomMode::explicit(scale),
            ZoomMode::FitWidth => ZoomMode::FitWidth,
        };
        Self {
            state: ViewerState {
                zoom: initial_zoom,
                ..ViewerState::default()
            },
            geometry,
            zoom_step: if zoom_step.is_finite() && zoom_step > 0.0 {
                zoom_step
            } else {
                DEFAULT_ZOOM_STEP
            },
            initial_zoom,
            container_width: None,
            pending_page: None,
            ready: false,
            last_target: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Page to show once the document becomes ready (e.g. a deep link)
    pub fn set_start_page(&mut self, page: usize) {
        self.pending_page = Some(page);
    }

    /// Apply a command and return the resulting effects
    pub fn apply(&mut self, cmd: Command, pages: &mut dyn PageGeometry) -> Vec<Effect> {
        match cmd {
            Command::LoadStarted => {
                self.ready = false;
                self.last_target = None;
                self.state.num_pages = 0;
                self.state.current_page = 1;
                self.state.loading = true;
                self.state.error = None;
                vec![]
            }

            Command::DocumentReady { page_count } => {
                if page_count == 0 {
                    return self.apply(Command::DocumentFailed("document has no pages".into()), pages);
                }
                self.ready = true;
                self.last_target = None;
                self.state.num_pages = page_count;
                self.state.error = None;
                let start = self.pending_page.take().unwrap_or(1);
                self.state.current_page = self.clamp_page(start);
                self.sync_render(pages)
            }

            Command::DocumentFailed(reason) => {
                self.ready = false;
                self.last_target = None;
                self.state.num_pages = 0;
                self.state.current_page = 1;
                self.state.loading = false;
                self.state.error = Some(reason);
                vec![Effect::ClearSurface]
            }

            Command::GoToPage(page) => {
                if !self.ready {
                    self.pending_page = Some(page);
                    return vec![];
                }
                let clamped = self.clamp_page(page);
                if clamped == self.state.current_page {
                    return vec![];
                }
                self.state.current_page = clamped;
                self.sync_render(pages)
            }

            Command::GoToPageText(text) => match text.trim().parse::<i64>() {
                Ok(page) => {
                    let page = usize::try_from(page.max(1)).unwrap_or(usize::MAX);
                    self.apply(Command::GoToPage(page), pages)
                }
                Err(_) => {
                    log::debug!("Ignoring page input {text:?}");
                    vec![]
                }
            },

            Command::NextPage => {
                let next = self.state.current_page.saturating_add(1);
                self.apply(Command::GoToPage(next), pages)
            }

            Command::PrevPage => {
                let prev = self.state.current_page.saturating_sub(1).max(1);
                self.apply(Command::GoToPage(prev), pages)
            }

            Command::ZoomIn => self.step_zoom(self.zoom_step, pages),

            Command::ZoomOut => self.step_zoom(-self.zoom_step, pages),

            Command::ResetZoom => {
                self.state.zoom = ZoomMode::Explicit(1.0);
                self.sync_render(pages)
            }

            Command::FitWidth => {
                self.state.zoom = ZoomMode::FitWidth;
                self.sync_render(pages)
            }

            Command::ContainerResized(width) => {
                if !width.is_finite() || width <= 0.0 {
                    return vec![];
                }
                self.container_width = Some(width);
                if self.state.zoom == ZoomMode::FitWidth {
                    self.sync_render(pages)
                } else {
                    vec![]
                }
            }

            Command::RenderDelivered => {
                self.state.loading = false;
                vec![]
            }

            Command::RenderFailed(reason) => {
                self.state.loading = false;
                self.state.error = Some(reason);
                vec![]
            }

            Command::Retry => {
                self.last_target = None;
                self.sync_render(pages)
            }

            Command::Closed => {
                self.ready = false;
                self.last_target = None;
                self.pending_page = None;
                self.state = ViewerState {
                    zoom: self.state.zoom,
                    ..ViewerState::default()
                };
                vec![Effect::ClearSurface]
            }
        }
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.clamp(1, self.state.num_pages.max(1))
    }

    fn step_zoom(&mut self, delta: f32, pages: &mut dyn PageGeometry) -> Vec<Effect> {
        let base = match self.state.zoom {
            ZoomMode::Explicit(scale) => scale,
            ZoomMode::FitWidth => self.state.effective_scale,
        };
        let next = clamp_scale(round_scale(base + delta));
        // A fit-width scale outside the clamp range must not step the wrong way.
        if (delta > 0.0 && next < base) || (delta < 0.0 && next > base) {
            return vec![];
        }
        self.state.zoom = ZoomMode::Explicit(next);
        self.sync_render(pages)
    }

    /// Resolve the effective scale for the current page and emit a render if
    /// the target changed
    fn sync_render(&mut self, pages: &mut dyn PageGeometry) -> Vec<Effect> {
        if !self.ready {
            return vec![];
        }

        let page = self.state.current_page;
        let scale = match pages.page_size(page) {
            Some(size) => self.geometry.resolve(self.state.zoom, size, self.container_width),
            None => match self.state.zoom {
                ZoomMode::Explicit(scale) => scale,
                ZoomMode::FitWidth => 1.0,
            },
        };
        self.state.effective_scale = scale;

        let target = RenderTarget { page, scale };
        if self.last_target.is_some_and(|last| last.same_as(target)) {
            return vec![];
        }
        self.last_target = Some(target);
        self.state.loading = true;
        self.state.error = None;
        vec![Effect::Render { page, scale }]
    }

    /// Zoom mode configured for new documents
    #[must_use]
    pub fn initial_zoom(&self) -> ZoomMode {
        self.initial_zoom
    }
}
