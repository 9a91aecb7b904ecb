//! Document session: one decoded document handle and its lifecycle

use std::collections::HashMap;
use std::sync::Arc;

use crate::decode::{DecodeFault, DecodedDocument, DocumentDecoder, PageSize};
use crate::source::DocumentId;

use super::navigation::PageGeometry;

/// Identity of a document handle; a new one is issued for every load
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

/// Lifecycle of a document handle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

/// Opaque view of the loaded document
#[derive(Clone, Debug)]
pub struct DocumentHandle {
    id: HandleId,
    source: DocumentId,
    bytes: Arc<[u8]>,
    page_count: usize,
    status: DocumentStatus,
}

impl DocumentHandle {
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[must_use]
    pub fn source(&self) -> &DocumentId {
        &self.source
    }

    /// Shared document bytes, used by render workers to open their own copy
    #[must_use]
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn status(&self) -> &DocumentStatus {
        &self.status
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }
}

/// Owns the current document handle and its decoded form
pub struct DocumentSession {
    decoder: Arc<dyn DocumentDecoder>,
    handle: Option<DocumentHandle>,
    decoded: Option<Box<dyn DecodedDocument>>,
    page_sizes: HashMap<usize, PageSize>,
    next_handle_id: u64,
}

impl DocumentSession {
    pub fn new(decoder: Arc<dyn DocumentDecoder>) -> Self {
        Self {
            decoder,
            handle: None,
            decoded: None,
            page_sizes: HashMap::new(),
            next_handle_id: 1,
        }
    }

    #[must_use]
    pub fn decoder(&self) -> &Arc<dyn DocumentDecoder> {
        &self.decoder
    }

    #[must_use]
    pub fn handle(&self) -> Option<&DocumentHandle> {
        self.handle.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> DocumentStatus {
        self.handle
            .as_ref()
            .map_or(DocumentStatus::Unloaded, |h| h.status.clone())
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.handle
            .as_ref()
            .filter(|h| h.is_ready())
            .map_or(0, |h| h.page_count)
    }

    /// Start a new handle in the `Loading` state, releasing the previous one
    pub fn begin(&mut self, source: DocumentId) -> HandleId {
        self.teardown();
        let id = HandleId(self.next_handle_id);
        self.next_handle_id += 1;
        self.handle = Some(DocumentHandle {
            id,
            source,
            bytes: Arc::from(Vec::new()),
            page_count: 0,
            status: DocumentStatus::Loading,
        });
        id
    }

    /// Decode `bytes` into the handle started by [`begin`](Self::begin).
    ///
    /// Returns the page count. A decode failure marks the handle `Failed`;
    /// it stays failed until a fresh `begin`/`load`.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<usize, DecodeFault> {
        let pending = matches!(
            self.handle.as_ref().map(|h| &h.status),
            Some(DocumentStatus::Loading)
        );
        if !pending {
            self.begin(DocumentId::new("<memory>"));
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(DecodeFault::engine("no document handle"));
        };

        match self.decoder.open(&bytes) {
            Ok(decoded) => {
                let page_count = decoded.page_count();
                if page_count == 0 {
                    handle.status = DocumentStatus::Failed(DecodeFault::EmptyDocument.to_string());
                    return Err(DecodeFault::EmptyDocument);
                }
                handle.bytes = Arc::from(bytes);
                handle.page_count = page_count;
                handle.status = DocumentStatus::Ready;
                self.decoded = Some(decoded);
                log::info!(
                    "Document {} ready: {page_count} page(s)",
                    handle.source
                );
                Ok(page_count)
            }
            Err(fault) => {
                log::warn!("Document {} failed to decode: {fault}", handle.source);
                handle.status = DocumentStatus::Failed(fault.to_string());
                Err(fault)
            }
        }
    }

    /// Mark the pending handle failed without decoding (e.g. fetch failure)
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.decoded = None;
        if let Some(handle) = self.handle.as_mut() {
            handle.status = DocumentStatus::Failed(reason.into());
        }
    }

    /// Intrinsic size of `page`; looked up lazily, then memoized
    pub fn page_intrinsic_size(&mut self, page: usize) -> Result<PageSize, DecodeFault> {
        if let Some(size) = self.page_sizes.get(&page) {
            return Ok(*size);
        }
        let decoded = self
            .decoded
            .as_ref()
            .ok_or_else(|| DecodeFault::engine("document is not loaded"))?;
        let size = decoded.page_size(page)?;
        self.page_sizes.insert(page, size);
        Ok(size)
    }

    /// Release the decoded document. Idempotent. Render workers hold their
    /// own decoded copies, so this is safe while a render is running.
    pub fn teardown(&mut self) {
        self.decoded = None;
        self.page_sizes.clear();
        if let Some(handle) = self.handle.take() {
            log::debug!("Released document handle {:?} ({})", handle.id, handle.source);
        }
    }
}

impl PageGeometry for DocumentSession {
    fn page_size(&mut self, page: usize) -> Option<PageSize> {
        match self.page_intrinsic_size(page) {
            Ok(size) => Some(size),
            Err(e) => {
                log::warn!("No geometry for page {page}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedDecoder;

    fn session(decoder: &ScriptedDecoder) -> DocumentSession {
        DocumentSession::new(Arc::new(decoder.clone()))
    }

    #[test]
    fn load_marks_ready_with_page_count() {
        let decoder = ScriptedDecoder::uniform(5, 400.0, 600.0);
        let mut session = session(&decoder);

        session.begin(DocumentId::new("doc"));
        assert_eq!(session.status(), DocumentStatus::Loading);

        assert_eq!(session.load(b"doc".to_vec()), Ok(5));
        assert_eq!(session.status(), DocumentStatus::Ready);
        assert_eq!(session.page_count(), 5);
        assert_eq!(&**session.handle().unwrap().bytes(), b"doc");
    }

    #[test]
    fn malformed_bytes_fail_the_handle() {
        let decoder = ScriptedDecoder::uniform(5, 400.0, 600.0);
        let mut session = session(&decoder);

        session.begin(DocumentId::new("doc"));
        let err = session.load(ScriptedDecoder::MALFORMED.to_vec()).unwrap_err();
        assert!(matches!(err, DecodeFault::Malformed(_)));
        assert!(matches!(session.status(), DocumentStatus::Failed(_)));
        assert_eq!(session.page_count(), 0);
    }

    #[test]
    fn page_sizes_are_memoized() {
        let decoder = ScriptedDecoder::uniform(3, 400.0, 600.0);
        let mut session = session(&decoder);
        session.load(b"doc".to_vec()).unwrap();

        let first = session.page_intrinsic_size(2).unwrap();
        let second = session.page_intrinsic_size(2).unwrap();
        assert_eq!(first, second);
        assert_eq!(decoder.size_queries(), 1);
        assert!(session.page_intrinsic_size(4).is_err());
    }

    #[test]
    fn each_load_issues_a_new_handle() {
        let decoder = ScriptedDecoder::uniform(1, 10.0, 10.0);
        let mut session = session(&decoder);

        let first = session.begin(DocumentId::new("a"));
        session.load(b"a".to_vec()).unwrap();
        let second = session.begin(DocumentId::new("b"));
        assert_ne!(first, second);
        assert_eq!(session.status(), DocumentStatus::Loading);
    }

    #[test]
    fn teardown_is_idempotent() {
        let decoder = ScriptedDecoder::uniform(2, 10.0, 10.0);
        let mut session = session(&decoder);
        session.load(b"doc".to_vec()).unwrap();

        session.teardown();
        session.teardown();
        assert_eq!(session.status(), DocumentStatus::Unloaded);
        assert!(session.page_intrinsic_size(1).is_err());
    }
}
