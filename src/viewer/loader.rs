//! Background document fetch
//!
//! Fetching blocks on I/O, so it runs on its own thread. Each load gets a
//! ticket; a result whose ticket is no longer current is discarded, which
//! makes switching documents mid-fetch safe.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};

use crate::source::{ByteSource, DocumentId, FetchError};

/// Identifies one load attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

/// Result of a finished fetch
#[derive(Debug)]
pub struct Fetched {
    pub ticket: LoadTicket,
    pub document: DocumentId,
    pub result: Result<Vec<u8>, FetchError>,
}

#[derive(Default)]
pub struct Loader {
    current: LoadTicket,
    pending: Option<Receiver<Fetched>>,
}

impl Loader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start fetching `document`, superseding any load in progress
    pub fn start(&mut self, source: Arc<dyn ByteSource>, document: DocumentId) -> LoadTicket {
        let ticket = LoadTicket(self.current.0 + 1);
        self.current = ticket;

        let (tx, rx) = flume::bounded(1);
        let for_thread = document.clone();
        let spawned = thread::Builder::new()
            .name(format!("docview-fetch-{}", ticket.0))
            .spawn(move || {
                let result = source.fetch(&for_thread);
                let _ = tx.send(Fetched {
                    ticket,
                    document: for_thread,
                    result,
                });
            });

        match spawned {
            Ok(_) => self.pending = Some(rx),
            Err(e) => {
                log::error!("Failed to spawn fetch thread: {e}");
                let (tx, rx) = flume::bounded(1);
                let _ = tx.send(Fetched {
                    ticket,
                    document,
                    result: Err(FetchError::Transport(format!("cannot start fetch: {e}"))),
                });
                self.pending = Some(rx);
            }
        }
        ticket
    }

    /// Forget the load in progress; its result will be dropped
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("Abandoned load {:?}", self.current);
        }
        self.current = LoadTicket(self.current.0 + 1);
    }

    /// Take the result of the current load if it has finished
    pub fn poll(&mut self) -> Option<Fetched> {
        let fetched = self.pending.as_ref()?.try_recv().ok();
        self.accept(fetched)
    }

    /// Block up to `timeout` for the current load
    pub fn wait(&mut self, timeout: Duration) -> Option<Fetched> {
        let rx = self.pending.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(fetched) => self.accept(Some(fetched)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Fetch thread for {:?} exited without a result", self.current);
                self.pending = None;
                None
            }
        }
    }

    fn accept(&mut self, fetched: Option<Fetched>) -> Option<Fetched> {
        let fetched = fetched?;
        self.pending = None;
        if fetched.ticket != self.current {
            log::debug!("Dropping stale load {:?}", fetched.ticket);
            return None;
        }
        Some(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticSource;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn delivers_fetched_bytes() {
        let source = StaticSource::new().with("a", Ok(b"bytes".to_vec()));
        let mut loader = Loader::new();

        let ticket = loader.start(Arc::new(source), DocumentId::new("a"));
        let fetched = loader.wait(WAIT).unwrap();
        assert_eq!(fetched.ticket, ticket);
        assert_eq!(fetched.result.unwrap(), b"bytes");
        assert!(!loader.is_pending());
    }

    #[test]
    fn reports_fetch_errors() {
        let mut loader = Loader::new();
        loader.start(Arc::new(StaticSource::new()), DocumentId::new("missing"));

        let fetched = loader.wait(WAIT).unwrap();
        assert!(matches!(
            fetched.result,
            Err(FetchError::Status { status: 404, .. })
        ));
    }

    #[test]
    fn cancelled_load_is_dropped() {
        let source = StaticSource::new().with("a", Ok(b"bytes".to_vec()));
        let mut loader = Loader::new();

        loader.start(Arc::new(source), DocumentId::new("a"));
        loader.cancel();
        assert!(loader.wait(Duration::from_millis(50)).is_none());
        assert!(loader.poll().is_none());
    }
}
