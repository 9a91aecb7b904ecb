use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::viewer::{ViewerState, ZoomMode};

/// One-line summary under the page: position, zoom, load state and errors.
/// While the page field is open it shows the prompt instead.
pub struct StatusBar<'a> {
    state: &'a ViewerState,
    document: Option<&'a str>,
    page_input: Option<&'a str>,
}

impl<'a> StatusBar<'a> {
    pub fn new(state: &'a ViewerState) -> Self {
        Self {
            state,
            document: None,
            page_input: None,
        }
    }

    pub fn document(mut self, name: Option<&'a str>) -> Self {
        self.document = name;
        self
    }

    pub fn page_input(mut self, text: Option<&'a str>) -> Self {
        self.page_input = text;
        self
    }

    fn spans(&self) -> Vec<Span<'a>> {
        let base = Style::default().fg(Color::White).bg(Color::DarkGray);

        if let Some(text) = self.page_input {
            return vec![
                Span::styled(" Go to page: ", base.add_modifier(Modifier::BOLD)),
                Span::styled(format!("{text}_"), base),
                Span::styled("  Enter to jump, Esc to cancel ", base.fg(Color::Gray)),
            ];
        }

        let mut spans = Vec::new();
        if let Some(name) = self.document {
            spans.push(Span::styled(format!(" {name} "), base.add_modifier(Modifier::BOLD)));
        }

        let state = self.state;
        if state.num_pages() > 0 {
            spans.push(Span::styled(
                format!(" Page {}/{} ", state.current_page(), state.num_pages()),
                base,
            ));
            let zoom = match state.zoom() {
                ZoomMode::Explicit(_) => format!(" {:.0}% ", state.effective_scale() * 100.0),
                ZoomMode::FitWidth => {
                    format!(" Fit width ({:.0}%) ", state.effective_scale() * 100.0)
                }
            };
            spans.push(Span::styled(zoom, base));
        }

        if state.loading() {
            spans.push(Span::styled(" Loading… ", base.fg(Color::Yellow)));
        }

        if let Some(error) = state.error() {
            spans.push(Span::styled(
                format!(" {error} (r to retry) "),
                Style::default().fg(Color::White).bg(Color::Red),
            ));
        }

        spans
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = Line::from(self.spans());
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bar: StatusBar<'_>) -> String {
        bar.spans().iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn empty_state_shows_nothing_but_document() {
        let state = ViewerState::default();
        assert_eq!(text(StatusBar::new(&state).document(Some("report"))), " report ");
    }

    #[test]
    fn prompt_replaces_status() {
        let state = ViewerState::default();
        let shown = text(StatusBar::new(&state).page_input(Some("12")));
        assert!(shown.contains("Go to page: 12_"));
    }
}
