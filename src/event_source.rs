use anyhow::Result;
pub use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use std::collections::VecDeque;
use std::time::Duration;

/// Where terminal events come from; swapped out in tests
pub trait EventSource {
    /// Poll for events with a timeout
    fn poll(&mut self, timeout: Duration) -> Result<bool>;

    /// Read the next event
    fn read(&mut self) -> Result<Event>;
}

/// Terminal event source backed by crossterm
pub struct KeyboardEventSource;

impl EventSource for KeyboardEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        Ok(crossterm::event::poll(timeout)?)
    }

    fn read(&mut self) -> Result<Event> {
        Ok(crossterm::event::read()?)
    }
}

/// Scripted event source for tests. Always ready; reports `q` once the
/// script runs out.
pub struct SimulatedEventSource {
    events: VecDeque<Event>,
}

impl SimulatedEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: crossterm::event::KeyEventKind::Press,
            state: crossterm::event::KeyEventState::empty(),
        })
    }

    pub fn key(code: KeyCode) -> Event {
        Self::key_event(code, KeyModifiers::empty())
    }

    pub fn char_key(c: char) -> Event {
        Self::key(KeyCode::Char(c))
    }

    /// Key events for each character of `text`
    pub fn typed(text: &str) -> Vec<Event> {
        text.chars().map(Self::char_key).collect()
    }

    pub fn resize(columns: u16, rows: u16) -> Event {
        Event::Resize(columns, rows)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for SimulatedEventSource {
    fn poll(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self) -> Result<Event> {
        Ok(self
            .events
            .pop_front()
            .unwrap_or_else(|| SimulatedEventSource::char_key('q')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_events_then_quits() {
        let mut events = SimulatedEventSource::typed("12");
        events.push(SimulatedEventSource::key(KeyCode::Enter));
        let mut source = SimulatedEventSource::new(events);

        assert!(source.poll(Duration::ZERO).unwrap());
        assert!(matches!(
            source.read().unwrap(),
            Event::Key(KeyEvent { code: KeyCode::Char('1'), .. })
        ));
        source.read().unwrap();
        assert!(matches!(
            source.read().unwrap(),
            Event::Key(KeyEvent { code: KeyCode::Enter, .. })
        ));

        assert_eq!(source.remaining(), 0);
        assert!(source.poll(Duration::ZERO).unwrap());
        assert!(matches!(
            source.read().unwrap(),
            Event::Key(KeyEvent { code: KeyCode::Char('q'), .. })
        ));
    }
}
