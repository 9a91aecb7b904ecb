//! Render worker - runs in a dedicated thread per document handle

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};

use crate::decode::{DecodeFault, DecodedDocument, DocumentDecoder};

use super::cache::{CacheKey, PageCache};
use super::request::{PageRequest, RenderRequest, RenderResponse};
use super::session::HandleId;
use super::CancellationToken;

/// Main worker loop.
///
/// Opens its own decoded copy of the document, then serves page requests
/// until `Shutdown` arrives or the scheduler drops its sender.
pub fn render_worker(
    decoder: &dyn DocumentDecoder,
    handle: HandleId,
    bytes: &[u8],
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
) {
    let doc = decoder.open(bytes);
    if let Err(e) = &doc {
        log::error!("Render worker for {handle:?} could not open document: {e}");
    }

    for request in requests {
        match request {
            RenderRequest::Page {
                handle: for_handle,
                request,
                cancel,
            } => {
                let response = if for_handle != handle {
                    RenderResponse::Error {
                        generation: request.generation,
                        page: request.page,
                        error: DecodeFault::engine("request routed to the wrong document"),
                    }
                } else {
                    match &doc {
                        Ok(doc) => guarded_render(doc.as_ref(), handle, request, &cancel, &cache),
                        Err(e) => RenderResponse::Error {
                            generation: request.generation,
                            page: request.page,
                            error: e.clone(),
                        },
                    }
                };
                // The scheduler may already be gone; nothing left to notify.
                let _ = responses.send(response);
            }

            RenderRequest::Shutdown => break,
        }
    }

    log::debug!("Render worker for {handle:?} stopped");
}

/// Run [`render_page`], turning a decoder panic into an error for that page
fn guarded_render(
    doc: &dyn DecodedDocument,
    handle: HandleId,
    request: PageRequest,
    cancel: &CancellationToken,
    cache: &Arc<Mutex<PageCache>>,
) -> RenderResponse {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        render_page(doc, handle, request, cancel, cache)
    }));
    result.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!(
            "Decoder panicked rendering page {} for {}: {message}",
            request.page,
            request.generation
        );
        RenderResponse::Error {
            generation: request.generation,
            page: request.page,
            error: DecodeFault::engine(format!("decoder panicked: {message}")),
        }
    })
}

fn render_page(
    doc: &dyn DecodedDocument,
    handle: HandleId,
    request: PageRequest,
    cancel: &CancellationToken,
    cache: &Arc<Mutex<PageCache>>,
) -> RenderResponse {
    let PageRequest {
        page,
        scale,
        generation,
    } = request;

    if cancel.is_cancelled() {
        return RenderResponse::Cancelled(generation);
    }

    let key = CacheKey::new(handle, page, scale);
    let cached = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key);
    if let Some(raster) = cached {
        log::debug!("Page {page} at {scale:.2} served from cache for {generation}");
        return RenderResponse::Page {
            generation,
            page,
            raster,
        };
    }

    match doc.rasterize(page, scale, cancel) {
        Ok(raster) => {
            let raster = Arc::new(raster);
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Arc::clone(&raster));
            if cancel.is_cancelled() {
                RenderResponse::Cancelled(generation)
            } else {
                RenderResponse::Page {
                    generation,
                    page,
                    raster,
                }
            }
        }
        Err(_) if cancel.is_cancelled() => RenderResponse::Cancelled(generation),
        Err(error) => RenderResponse::Error {
            generation,
            page,
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedDecoder;
    use crate::viewer::Generation;
    use std::thread;

    fn spawn(
        decoder: ScriptedDecoder,
        bytes: &'static [u8],
    ) -> (
        Sender<RenderRequest>,
        Receiver<RenderResponse>,
        Arc<Mutex<PageCache>>,
    ) {
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        let cache = Arc::new(Mutex::new(PageCache::new(8)));
        let worker_cache = Arc::clone(&cache);
        thread::spawn(move || {
            render_worker(&decoder, HandleId(1), bytes, req_rx, resp_tx, worker_cache);
        });
        (req_tx, resp_rx, cache)
    }

    fn page(page: usize, generation: u64) -> RenderRequest {
        RenderRequest::Page {
            handle: HandleId(1),
            request: PageRequest {
                page,
                scale: 1.0,
                generation: Generation(generation),
            },
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn renders_and_caches_pages() {
        let decoder = ScriptedDecoder::uniform(3, 4.0, 2.0);
        let (tx, rx, cache) = spawn(decoder.clone(), b"doc");

        tx.send(page(2, 1)).unwrap();
        match rx.recv().unwrap() {
            RenderResponse::Page { page, raster, .. } => {
                assert_eq!(page, 2);
                assert_eq!(raster.pixels()[0], 2);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        tx.send(page(2, 2)).unwrap();
        assert!(matches!(rx.recv().unwrap(), RenderResponse::Page { .. }));
        assert_eq!(decoder.rasterized().len(), 1);
        assert_eq!(cache.lock().unwrap().len(), 1);

        tx.send(RenderRequest::Shutdown).unwrap();
    }

    #[test]
    fn cancelled_before_start_is_skipped() {
        let decoder = ScriptedDecoder::uniform(3, 4.0, 2.0);
        let (tx, rx, _cache) = spawn(decoder.clone(), b"doc");

        let cancel = CancellationToken::new();
        cancel.cancel();
        tx.send(RenderRequest::Page {
            handle: HandleId(1),
            request: PageRequest {
                page: 1,
                scale: 1.0,
                generation: Generation(5),
            },
            cancel,
        })
        .unwrap();

        assert!(matches!(
            rx.recv().unwrap(),
            RenderResponse::Cancelled(Generation(5))
        ));
        assert!(decoder.rasterized().is_empty());
    }

    #[test]
    fn open_failure_answers_every_request() {
        let decoder = ScriptedDecoder::uniform(3, 4.0, 2.0);
        let (tx, rx, _cache) = spawn(decoder, ScriptedDecoder::MALFORMED);

        tx.send(page(1, 1)).unwrap();
        tx.send(page(2, 2)).unwrap();
        for _ in 0..2 {
            assert!(matches!(
                rx.recv().unwrap(),
                RenderResponse::Error {
                    error: DecodeFault::Malformed(_),
                    ..
                }
            ));
        }
    }

    #[test]
    fn decoder_panic_becomes_page_error() {
        let decoder = ScriptedDecoder::uniform(3, 4.0, 2.0);
        decoder.panic_page(2);
        let (tx, rx, _cache) = spawn(decoder, b"doc");

        tx.send(page(2, 1)).unwrap();
        match rx.recv().unwrap() {
            RenderResponse::Error { page, error, .. } => {
                assert_eq!(page, 2);
                assert!(error.to_string().contains("panicked"), "{error}");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        tx.send(page(1, 2)).unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            RenderResponse::Page { page: 1, .. }
        ));
    }

    #[test]
    fn rasterize_failure_is_reported() {
        let decoder = ScriptedDecoder::uniform(3, 4.0, 2.0);
        decoder.fail_page(3);
        let (tx, rx, _cache) = spawn(decoder, b"doc");

        tx.send(page(3, 1)).unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            RenderResponse::Error { page: 3, .. }
        ));
    }
}
