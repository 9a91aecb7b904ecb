use std::time::Duration;

use anyhow::Result;
use crossterm::event::Event;
use ratatui::{
    Frame, Terminal,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
};

use crate::event_source::EventSource;
use crate::inputs::{Action, PageInput, PageInputEvent, map_key};
use crate::viewer::Viewer;
use crate::widget::raster_view::DEFAULT_CELL_PIXELS;
use crate::widget::{RasterView, StatusBar};

const TICK: Duration = Duration::from_millis(50);
const MAX_EVENTS_PER_TICK: usize = 50;

pub struct App {
    viewer: Viewer,
    page_input: Option<PageInput>,
    cell_px: u32,
    viewport_columns: Option<u16>,
    should_quit: bool,
}

impl App {
    pub fn new(viewer: Viewer) -> Self {
        Self {
            viewer,
            page_input: None,
            cell_px: DEFAULT_CELL_PIXELS,
            viewport_columns: None,
            should_quit: false,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer {
        &mut self.viewer
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn page_input(&self) -> Option<&str> {
        self.page_input.as_ref().map(PageInput::text)
    }

    /// Tell the viewer how wide the page area is
    pub fn set_viewport_columns(&mut self, columns: u16) {
        if self.viewport_columns == Some(columns) {
            return;
        }
        self.viewport_columns = Some(columns);
        self.viewer.resize(f32::from(columns) * self.cell_px as f32);
    }

    pub fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Key(key) => {
                if let Some(input) = self.page_input.as_mut() {
                    match input.handle_key(*key) {
                        PageInputEvent::Editing => {}
                        PageInputEvent::Submit(text) => {
                            self.page_input = None;
                            self.viewer.enter_page_text(&text);
                        }
                        PageInputEvent::Cancel => self.page_input = None,
                    }
                    return;
                }

                match map_key(*key) {
                    Some(Action::Navigate(intent)) => self.viewer.dispatch(intent),
                    Some(Action::BeginPageInput) => {
                        if self.viewer.state().num_pages() > 0 {
                            self.page_input = Some(PageInput::new());
                        }
                    }
                    Some(Action::Retry) => self.viewer.retry(),
                    Some(Action::Quit) => self.should_quit = true,
                    None => {}
                }
            }
            Event::Resize(columns, _) => self.set_viewport_columns(*columns),
            _ => {}
        }
    }

    pub fn draw(&self, f: &mut Frame) {
        let [page_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(f.area());

        self.draw_page(f, page_area);

        let status = StatusBar::new(self.viewer.state())
            .document(self.viewer.document().map(|d| d.as_str()))
            .page_input(self.page_input());
        f.render_widget(status, status_area);
    }

    fn draw_page(&self, f: &mut Frame, area: Rect) {
        if let Some(raster) = self.viewer.surface().bitmap() {
            f.render_widget(RasterView::new(raster).cell_pixels(self.cell_px), area);
            return;
        }

        let state = self.viewer.state();
        let (message, color) = if let Some(error) = state.error() {
            (error.to_string(), Color::Red)
        } else if state.loading() {
            ("Loading document…".to_string(), Color::Gray)
        } else {
            ("No document".to_string(), Color::DarkGray)
        };
        let middle = Rect {
            y: area.y + area.height / 2,
            height: 1.min(area.height),
            ..area
        };
        f.render_widget(
            Paragraph::new(message)
                .alignment(Alignment::Center)
                .style(Style::default().fg(color)),
            middle,
        );
    }
}

pub fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        let size = terminal.size()?;
        app.set_viewport_columns(size.width);
        app.viewer_mut().pump();
        terminal.draw(|f| app.draw(f))?;

        if !event_source.poll(TICK)? {
            continue;
        }
        let mut processed = 0;
        while processed < MAX_EVENTS_PER_TICK && event_source.poll(Duration::ZERO)? {
            let event = event_source.read()?;
            processed += 1;
            app.handle_event(&event);
            if app.should_quit() {
                log::debug!("Quit requested");
                return Ok(());
            }
        }
    }
}
