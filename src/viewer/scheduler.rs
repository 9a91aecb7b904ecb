//! Render scheduler - one authoritative render at a time
//!
//! Every request gets a fresh [`Generation`]. Starting a request cancels the
//! running one cooperatively, and completions are applied only when their
//! generation is still the latest issued. Ordering therefore follows request
//! order, not completion order: a slow early render can never overwrite a
//! fast later one, whether or not the worker honoured the cancel signal.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::decode::{DecodeFault, DocumentDecoder};
use crate::panic_handler::RENDER_THREAD_PREFIX;

use super::cache::PageCache;
use super::cancel::CancellationToken;
use super::request::{
    Generation, PageRequest, RenderOutcome, RenderRequest, RenderResponse, RenderTask, TaskState,
};
use super::session::{DocumentHandle, HandleId};
use super::worker::render_worker;

/// Default number of rasters kept in the page cache
pub const DEFAULT_CACHE_SIZE: usize = 16;

/// Channels to the worker bound to one document handle
struct WorkerLink {
    handle: HandleId,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
}

struct ActiveTask {
    task: RenderTask,
    cancel: CancellationToken,
}

pub struct RenderScheduler {
    decoder: Arc<dyn DocumentDecoder>,
    cache: Arc<Mutex<PageCache>>,
    worker: Option<WorkerLink>,
    current_generation: Generation,
    active: Option<ActiveTask>,
    /// Completions produced on the owner thread (e.g. a dead worker)
    backlog: VecDeque<RenderResponse>,
    cancelled_count: usize,
}

impl RenderScheduler {
    pub fn new(decoder: Arc<dyn DocumentDecoder>) -> Self {
        Self::with_cache_size(decoder, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(decoder: Arc<dyn DocumentDecoder>, cache_size: usize) -> Self {
        Self {
            decoder,
            cache: Arc::new(Mutex::new(PageCache::new(cache_size))),
            worker: None,
            current_generation: Generation::default(),
            active: None,
            backlog: VecDeque::new(),
            cancelled_count: 0,
        }
    }

    /// Latest issued generation
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        self.current_generation
    }

    /// Task for the latest request, if any
    #[must_use]
    pub fn active_task(&self) -> Option<&RenderTask> {
        self.active.as_ref().map(|a| &a.task)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.task.state == TaskState::Running)
    }

    /// How many running tasks were superseded or cancelled so far
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled_count
    }

    /// Number of rasters currently cached
    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Request `page` of `handle` at `scale`. The result arrives through
    /// [`poll`](Self::poll) or [`wait`](Self::wait).
    pub fn request(&mut self, handle: &DocumentHandle, page: usize, scale: f32) -> Generation {
        let generation = self.current_generation.next();
        self.current_generation = generation;

        self.cancel_running();

        let request = PageRequest {
            page,
            scale,
            generation,
        };
        let cancel = CancellationToken::new();
        let mut task = RenderTask::new(request);

        if !handle.is_ready() {
            task.state = TaskState::Failed("document is not ready".into());
            self.backlog.push_back(RenderResponse::Error {
                generation,
                page,
                error: DecodeFault::engine("document is not ready"),
            });
            self.active = Some(ActiveTask { task, cancel });
            return generation;
        }

        let sent = self.ensure_worker(handle).and_then(|link| {
            link.request_tx
                .send(RenderRequest::Page {
                    handle: handle.id(),
                    request,
                    cancel: cancel.clone(),
                })
                .ok()
        });

        if sent.is_some() {
            task.state = TaskState::Running;
            log::debug!("Render {generation}: page {page} at {scale:.2}");
        } else {
            log::error!("Render worker unavailable for {generation}");
            task.state = TaskState::Failed("render worker unavailable".into());
            self.worker = None;
            self.backlog.push_back(RenderResponse::Error {
                generation,
                page,
                error: DecodeFault::engine("render worker unavailable"),
            });
        }

        self.active = Some(ActiveTask { task, cancel });
        generation
    }

    /// Cancel the running task, if any, and make every in-flight completion
    /// stale. Returns whether a running task was cancelled.
    pub fn cancel_all(&mut self) -> bool {
        self.current_generation = self.current_generation.next();
        self.cancel_running()
    }

    /// Stop the worker and drop cached rasters for `handle`
    pub fn release(&mut self, handle: HandleId) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate_handle(handle);
        if self.worker.as_ref().is_some_and(|w| w.handle == handle) {
            self.shutdown_worker();
        }
        self.backlog.clear();
    }

    /// Stop the worker without waiting for it
    pub fn shutdown(&mut self) {
        self.cancel_all();
        self.shutdown_worker();
    }

    /// Drain finished renders without blocking. `on_result` is invoked only
    /// for the latest generation; stale completions are dropped. Returns the
    /// number of results delivered.
    pub fn poll(&mut self, mut on_result: impl FnMut(Generation, RenderOutcome)) -> usize {
        let mut delivered = 0;

        loop {
            while let Some(response) = self.backlog.pop_front() {
                delivered += self.settle(response, &mut on_result);
            }

            let Some(link) = self.worker.as_ref() else {
                break;
            };
            match link.response_rx.try_recv() {
                Ok(response) => delivered += self.settle(response, &mut on_result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.worker_lost(),
            }
        }

        delivered
    }

    /// Block until a result for the latest generation is delivered or
    /// `timeout` elapses. Returns whether one was delivered.
    pub fn wait(
        &mut self,
        timeout: Duration,
        mut on_result: impl FnMut(Generation, RenderOutcome),
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.poll(&mut on_result) > 0 {
                return true;
            }
            let Some(link) = self.worker.as_ref() else {
                return false;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match link.response_rx.recv_timeout(remaining) {
                Ok(response) => {
                    if self.settle(response, &mut on_result) > 0 {
                        return true;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => self.worker_lost(),
            }
        }
    }

    fn settle(
        &mut self,
        response: RenderResponse,
        on_result: &mut impl FnMut(Generation, RenderOutcome),
    ) -> usize {
        let generation = response.generation();
        if generation != self.current_generation {
            log::debug!(
                "Dropping stale render {generation} (current {})",
                self.current_generation
            );
            return 0;
        }

        let (state, outcome) = match response {
            RenderResponse::Page { raster, .. } => {
                (TaskState::Completed, RenderOutcome::Raster(raster))
            }
            RenderResponse::Cancelled(_) => (TaskState::Cancelled, RenderOutcome::Cancelled),
            RenderResponse::Error { page, error, .. } => {
                let reason = error.to_string();
                log::warn!("Render {generation} of page {page} failed: {reason}");
                (
                    TaskState::Failed(reason.clone()),
                    RenderOutcome::Failed { page, reason },
                )
            }
        };

        if let Some(active) = self
            .active
            .as_mut()
            .filter(|a| a.task.request.generation == generation)
        {
            active.task.state = state;
        }

        on_result(generation, outcome);
        1
    }

    /// The worker thread died. A render it still owed fails in its place.
    fn worker_lost(&mut self) {
        log::warn!("Render worker disconnected");
        self.worker = None;
        if let Some(active) = self
            .active
            .as_ref()
            .filter(|a| a.task.state == TaskState::Running)
        {
            let PageRequest {
                page, generation, ..
            } = active.task.request;
            self.backlog.push_back(RenderResponse::Error {
                generation,
                page,
                error: DecodeFault::engine("render worker stopped unexpectedly"),
            });
        }
    }

    fn cancel_running(&mut self) -> bool {
        match self.active.as_mut() {
            Some(active) if active.task.state == TaskState::Running => {
                active.cancel.cancel();
                active.task.state = TaskState::Cancelled;
                self.cancelled_count += 1;
                log::debug!("Cancelled render {}", active.task.request.generation);
                true
            }
            _ => false,
        }
    }

    fn ensure_worker(&mut self, handle: &DocumentHandle) -> Option<&WorkerLink> {
        if self.worker.as_ref().is_some_and(|w| w.handle != handle.id()) {
            self.shutdown_worker();
        }

        if self.worker.is_none() {
            let (request_tx, request_rx) = flume::unbounded();
            let (response_tx, response_rx) = flume::unbounded();
            let decoder = Arc::clone(&self.decoder);
            let bytes = Arc::clone(handle.bytes());
            let cache = Arc::clone(&self.cache);
            let id = handle.id();

            let spawned = thread::Builder::new()
                .name(format!("{RENDER_THREAD_PREFIX}{}", id.0))
                .spawn(move || {
                    render_worker(decoder.as_ref(), id, &bytes, request_rx, response_tx, cache);
                });

            match spawned {
                Ok(_) => {
                    self.worker = Some(WorkerLink {
                        handle: id,
                        request_tx,
                        response_rx,
                    });
                }
                Err(e) => {
                    log::error!("Failed to spawn render worker: {e}");
                    return None;
                }
            }
        }

        self.worker.as_ref()
    }

    fn shutdown_worker(&mut self) {
        if let Some(link) = self.worker.take() {
            let _ = link.request_tx.send(RenderRequest::Shutdown);
            log::debug!("Shut down render worker for {:?}", link.handle);
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DocumentId;
    use crate::test_utils::ScriptedDecoder;
    use crate::viewer::DocumentSession;

    const WAIT: Duration = Duration::from_secs(5);

    fn ready_session(decoder: &ScriptedDecoder) -> DocumentSession {
        let mut session = DocumentSession::new(Arc::new(decoder.clone()));
        session.begin(DocumentId::new("doc"));
        session.load(b"doc".to_vec()).unwrap();
        session
    }

    fn collect(scheduler: &mut RenderScheduler) -> Vec<(Generation, RenderOutcome)> {
        let mut out = Vec::new();
        scheduler.wait(WAIT, |g, o| out.push((g, o)));
        out
    }

    #[test]
    fn generations_increase_per_request() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));
        let handle = session.handle().unwrap();

        let a = scheduler.request(handle, 1, 1.0);
        let b = scheduler.request(handle, 2, 1.0);
        let c = scheduler.request(handle, 3, 1.0);
        assert!(a < b && b < c);
        assert_eq!(scheduler.current_generation(), c);
    }

    #[test]
    fn delivers_latest_result() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));

        let generation = scheduler.request(session.handle().unwrap(), 2, 1.0);
        let results = collect(&mut scheduler);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, generation);
        match &results[0].1 {
            RenderOutcome::Raster(raster) => assert_eq!(raster.pixels()[0], 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            scheduler.active_task().unwrap().state,
            TaskState::Completed
        );
    }

    #[test]
    fn superseded_request_never_delivers() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        decoder.hold(3);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder.clone()));
        let handle = session.handle().unwrap();

        scheduler.request(handle, 3, 1.0);
        let latest = scheduler.request(handle, 5, 1.0);
        assert_eq!(scheduler.cancelled_count(), 1);
        decoder.release(3);

        let results = collect(&mut scheduler);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, latest);
        match &results[0].1 {
            RenderOutcome::Raster(raster) => assert_eq!(raster.pixels()[0], 5),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let mut late = 0;
        scheduler.poll(|_, _| late += 1);
        assert_eq!(late, 0);
    }

    #[test]
    fn failure_is_reported_for_current_generation() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        decoder.fail_page(4);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));

        scheduler.request(session.handle().unwrap(), 4, 1.0);
        let results = collect(&mut scheduler);
        assert!(matches!(
            results[0].1,
            RenderOutcome::Failed { page: 4, .. }
        ));
        assert!(matches!(
            scheduler.active_task().unwrap().state,
            TaskState::Failed(_)
        ));
    }

    #[test]
    fn cancel_all_makes_in_flight_render_stale() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        decoder.hold(1);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder.clone()));

        scheduler.request(session.handle().unwrap(), 1, 1.0);
        assert!(scheduler.is_running());
        assert!(scheduler.cancel_all());
        assert!(!scheduler.is_running());
        decoder.release(1);

        assert!(!scheduler.wait(Duration::from_millis(300), |_, _| {}));
    }

    #[test]
    fn request_against_unready_handle_fails_fast() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        let mut session = DocumentSession::new(Arc::new(decoder.clone()));
        session.begin(DocumentId::new("doc"));
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));

        scheduler.request(session.handle().unwrap(), 1, 1.0);
        let mut failed = false;
        scheduler.poll(|_, outcome| failed = matches!(outcome, RenderOutcome::Failed { .. }));
        assert!(failed);
    }

    #[test]
    fn dead_worker_fails_the_running_render() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        let session = ready_session(&decoder);
        // The session opened once; the worker's own open is the second.
        decoder.panic_on_open(2);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));

        let generation = scheduler.request(session.handle().unwrap(), 3, 1.0);
        let results = collect(&mut scheduler);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, generation);
        assert!(matches!(
            results[0].1,
            RenderOutcome::Failed { page: 3, .. }
        ));
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.active_task().unwrap().state,
            TaskState::Failed(_)
        ));
    }

    #[test]
    fn decoder_panic_reaches_a_final_state() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        decoder.panic_page(2);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder));
        let handle = session.handle().unwrap();

        scheduler.request(handle, 2, 1.0);
        let results = collect(&mut scheduler);
        assert!(matches!(
            results[0].1,
            RenderOutcome::Failed { page: 2, .. }
        ));
        assert!(!scheduler.is_running());

        scheduler.request(handle, 1, 1.0);
        let results = collect(&mut scheduler);
        assert!(matches!(results[0].1, RenderOutcome::Raster(_)));
    }

    #[test]
    fn cache_hit_skips_rasterization() {
        let decoder = ScriptedDecoder::uniform(5, 4.0, 4.0);
        let session = ready_session(&decoder);
        let mut scheduler = RenderScheduler::new(Arc::new(decoder.clone()));
        let handle = session.handle().unwrap();

        scheduler.request(handle, 2, 1.0);
        collect(&mut scheduler);
        scheduler.request(handle, 2, 1.0);
        let results = collect(&mut scheduler);

        assert!(matches!(results[0].1, RenderOutcome::Raster(_)));
        assert_eq!(decoder.rasterized().len(), 1);
        assert_eq!(scheduler.cached_pages(), 1);

        scheduler.release(handle.id());
        assert_eq!(scheduler.cached_pages(), 0);
    }
}
