pub mod keymap;
pub mod page_input;

pub use keymap::{Action, map_key};
pub use page_input::{PageInput, PageInputEvent};
