//! Process-wide panic hook
//!
//! A panic on the UI thread restores the terminal, logs and exits. Render
//! workers catch their own panics and report them as page errors, so for
//! those threads the hook only logs.

use crossterm::{
    execute,
    terminal::{LeaveAlternateScreen, disable_raw_mode},
};
use std::io::{self, Write};
use std::panic;
use std::thread;

/// Thread-name prefix of render workers
pub const RENDER_THREAD_PREFIX: &str = "docview-render-";

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let current = thread::current();
        let name = current.name().unwrap_or("<unnamed>");
        if is_render_thread(name) {
            log::error!("Render thread {name} panicked: {panic_info}");
            return;
        }

        restore_terminal();
        log::error!("docview panicked on {name}: {panic_info}");
        default_hook(panic_info);
        std::process::exit(1);
    }));
}

fn is_render_thread(name: &str) -> bool {
    name.starts_with(RENDER_THREAD_PREFIX)
}

/// Put the terminal back into cooked mode on the main screen with a visible
/// cursor. Safe to call more than once.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
    let _ = writeln!(io::stderr());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_threads_are_recognised_by_name() {
        assert!(is_render_thread(&format!("{RENDER_THREAD_PREFIX}3")));
        assert!(!is_render_thread("main"));
        assert!(!is_render_thread("docview-loader"));
    }
}
