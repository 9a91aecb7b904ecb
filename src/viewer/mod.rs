//! Document viewer core
//!
//! [`Viewer`] ties together the pieces:
//! - [`DocumentSession`] owns the decoded document and its page geometry
//! - [`NavigationController`] turns user intents into state changes and
//!   render effects
//! - [`RenderScheduler`] runs renders on a worker thread and delivers only the
//!   latest one
//! - [`RenderSurface`] holds what is on screen

mod cache;
mod cancel;
mod controller;
mod error;
pub mod geometry;
mod loader;
pub mod navigation;
mod request;
mod scheduler;
mod session;
mod surface;
mod worker;

pub use cache::{CacheKey, PageCache};
pub use cancel::CancellationToken;
pub use controller::{Viewer, ViewerOptions};
pub use error::ViewerError;
pub use geometry::{ViewportGeometry, ZoomMode};
pub use loader::{Fetched, LoadTicket, Loader};
pub use navigation::{Command, Effect, Intent, NavigationController, PageGeometry, ViewerState};
pub use request::{Generation, PageRequest, RenderOutcome, RenderTask, TaskState};
pub use scheduler::{DEFAULT_CACHE_SIZE, RenderScheduler};
pub use session::{DocumentHandle, DocumentSession, DocumentStatus, HandleId};
pub use surface::RenderSurface;
