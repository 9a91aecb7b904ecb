//! Page-number entry field
//!
//! Collects free-form text; the viewer decides on submit whether it is a page
//! number.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

const MAX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageInputEvent {
    Editing,
    Submit(String),
    Cancel,
}

#[derive(Debug, Default, Clone)]
pub struct PageInput {
    text: String,
}

impl PageInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PageInputEvent {
        if key.kind == KeyEventKind::Release {
            return PageInputEvent::Editing;
        }
        match key.code {
            KeyCode::Char(c) if !c.is_control() => {
                if self.text.chars().count() < MAX_LEN {
                    self.text.push(c);
                }
                PageInputEvent::Editing
            }
            KeyCode::Backspace => {
                self.text.pop();
                PageInputEvent::Editing
            }
            KeyCode::Enter => PageInputEvent::Submit(std::mem::take(&mut self.text)),
            KeyCode::Esc => PageInputEvent::Cancel,
            _ => PageInputEvent::Editing,
        }
    }
}
