//! Viewer error taxonomy

use crate::decode::DecodeFault;
use crate::source::FetchError;

/// Failures surfaced by the viewer.
///
/// Out-of-range page numbers and zoom factors are clamped and never become
/// errors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ViewerError {
    /// Byte retrieval failed; recoverable by loading again
    #[error("Failed to fetch document: {0}")]
    NetworkFetch(#[from] FetchError),

    /// Bytes are not a valid document; terminal for the current handle
    #[error("Failed to open document: {0}")]
    Decode(#[from] DecodeFault),

    /// A render was superseded. Expected, never shown to the user.
    #[error("Render cancelled")]
    RenderCancelled,

    /// A render that was still current failed; local to that page
    #[error("Failed to render page {page}: {reason}")]
    RenderFailed { page: usize, reason: String },
}

impl ViewerError {
    /// Whether this error should reach the user
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::RenderCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_not_user_visible() {
        assert!(!ViewerError::RenderCancelled.is_user_visible());
        assert!(
            ViewerError::RenderFailed {
                page: 2,
                reason: "boom".into()
            }
            .is_user_visible()
        );
    }

    #[test]
    fn fetch_status_message_includes_status_and_body() {
        let err = ViewerError::from(FetchError::Status {
            status: 403,
            body: "forbidden".into(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to fetch document: server returned 403: forbidden"
        );
    }
}
