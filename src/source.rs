//! Document byte retrieval
//!
//! Fetching is a single request for the full document content. HTTP-level
//! failures (status + body) are reported separately from transport failures
//! so the viewer can tell a missing document from an unreachable server.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Default REST endpoint serving document files
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

/// Header carrying the optional API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Upper bound on a fetched document
pub const MAX_DOCUMENT_BYTES: u64 = 512 * 1024 * 1024;

/// Identifier of a document within a byte source
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from byte retrieval
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("{path}: {detail}")]
    Io { path: String, detail: String },
}

/// Source of raw document bytes
pub trait ByteSource: Send + Sync {
    fn fetch(&self, document: &DocumentId) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `GET {api_base}/documents/{id}/file`
pub struct HttpByteSource {
    agent: ureq::Agent,
    api_base: String,
    api_key: Option<String>,
    max_bytes: u64,
}

impl HttpByteSource {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .build();
        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            max_bytes: MAX_DOCUMENT_BYTES,
        }
    }

    /// Refuse bodies larger than `max_bytes`
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn document_url(&self, document: &DocumentId) -> String {
        format!("{}/documents/{}/file", self.api_base, document)
    }
}

impl ByteSource for HttpByteSource {
    fn fetch(&self, document: &DocumentId) -> Result<Vec<u8>, FetchError> {
        let url = self.document_url(document);
        log::debug!("Fetching document {document} from {url}");

        let mut request = self.agent.get(&url);
        if let Some(key) = &self.api_key {
            request = request.set(API_KEY_HEADER, key);
        }

        match request.call() {
            Ok(response) => {
                let bytes = read_limited(response.into_reader(), self.max_bytes)?;
                log::info!("Fetched document {document}: {} bytes", bytes.len());
                Ok(bytes)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                log::warn!("Fetching document {document} failed with status {status}");
                Err(FetchError::Status { status, body })
            }
            Err(ureq::Error::Transport(transport)) => {
                log::warn!("Fetching document {document} failed: {transport}");
                Err(FetchError::Transport(transport.to_string()))
            }
        }
    }
}

/// Read the whole body, failing rather than truncating past `limit` bytes
fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    if bytes.len() as u64 > limit {
        return Err(FetchError::Transport(format!(
            "document exceeds the {limit} byte limit"
        )));
    }
    Ok(bytes)
}

/// Reads documents from the local filesystem; the document id is a path
#[derive(Default)]
pub struct FileByteSource {
    root: Option<PathBuf>,
}

impl FileByteSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative document ids against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl ByteSource for FileByteSource {
    fn fetch(&self, document: &DocumentId) -> Result<Vec<u8>, FetchError> {
        let path = match &self.root {
            Some(root) => root.join(document.as_str()),
            None => PathBuf::from(document.as_str()),
        };
        std::fs::read(&path).map_err(|e| FetchError::Io {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }
}
