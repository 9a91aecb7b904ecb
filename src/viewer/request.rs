//! Render request, task and response types

use std::fmt;
use std::sync::Arc;

use crate::decode::{DecodeFault, Raster};

use super::cancel::CancellationToken;
use super::session::HandleId;

/// Monotonic identifier of a render request; only the latest one may reach
/// the surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One page at one resolved scale. Immutable once issued.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageRequest {
    /// Page number (1-based)
    pub page: usize,
    /// Effective scale; fit-to-width has already been resolved
    pub scale: f32,
    pub generation: Generation,
}

/// Lifecycle of a render task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Cancelled,
    Completed,
    Failed(String),
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Scheduler bookkeeping for one request
#[derive(Clone, Debug)]
pub struct RenderTask {
    pub request: PageRequest,
    pub state: TaskState,
}

impl RenderTask {
    #[must_use]
    pub fn new(request: PageRequest) -> Self {
        Self {
            request,
            state: TaskState::Pending,
        }
    }
}

/// Message sent to a render worker
#[derive(Debug)]
pub enum RenderRequest {
    Page {
        handle: HandleId,
        request: PageRequest,
        cancel: CancellationToken,
    },
    Shutdown,
}

/// Message sent back by a render worker
#[derive(Debug)]
pub enum RenderResponse {
    Page {
        generation: Generation,
        page: usize,
        raster: Arc<Raster>,
    },
    Cancelled(Generation),
    Error {
        generation: Generation,
        page: usize,
        error: DecodeFault,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn generation(&self) -> Generation {
        match self {
            Self::Page { generation, .. } | Self::Error { generation, .. } => *generation,
            Self::Cancelled(generation) => *generation,
        }
    }
}

/// What the owner thread receives for the current generation
#[derive(Clone, Debug)]
pub enum RenderOutcome {
    Raster(Arc<Raster>),
    Cancelled,
    Failed { page: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generations_are_ordered() {
        let first = Generation::default().next();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second, Generation(2));
        assert_eq!(second.to_string(), "#2");
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed("x".into()).is_terminal());
    }

    #[test]
    fn response_generation() {
        assert_eq!(
            RenderResponse::Cancelled(Generation(4)).generation(),
            Generation(4)
        );
        let err = RenderResponse::Error {
            generation: Generation(9),
            page: 1,
            error: DecodeFault::EmptyDocument,
        };
        assert_eq!(err.generation(), Generation(9));
    }
}
