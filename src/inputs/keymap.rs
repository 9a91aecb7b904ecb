//! Global key bindings while the viewer is focused

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::viewer::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Navigate(Intent),
    /// Open the page-number field
    BeginPageInput,
    Retry,
    Quit,
}

/// Map a key press to an action. Releases and repeats of non-navigation keys
/// are ignored.
pub fn map_key(key: KeyEvent) -> Option<Action> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Right => Action::Navigate(Intent::NextPage),
        KeyCode::Left => Action::Navigate(Intent::PrevPage),
        KeyCode::Char('+' | '=') => Action::Navigate(Intent::ZoomIn),
        KeyCode::Char('-') => Action::Navigate(Intent::ZoomOut),
        KeyCode::Char('0') => Action::Navigate(Intent::ResetZoom),
        KeyCode::Char('f') => Action::Navigate(Intent::FitWidth),
        _ if key.kind == KeyEventKind::Repeat => return None,
        KeyCode::Char('g') => Action::BeginPageInput,
        KeyCode::Char('r') => Action::Retry,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        _ => return None,
    };
    Some(action)
}
