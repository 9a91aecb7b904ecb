pub mod app;
pub mod decode;
pub mod event_source;
pub mod inputs;
pub mod panic_handler;
pub mod settings;
pub mod source;
pub mod viewer;
pub mod widget;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app::{App, run_app};
pub use viewer::{Viewer, ViewerOptions};
