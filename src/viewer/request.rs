//! Viewer request and response types

use crate::pdf::loader::DocumentLoadError;
use crate::pdf::renderer::PassSummary;
use crate::pdf::zoom::RenderScale;

/// Unique identifier for viewer requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum ViewerRequest {
    /// Open a document, replacing any handle already held
    Load { id: RequestId, url: String },

    /// Wipe and rebuild every page at `scale`, writing only while the
    /// surface `session` is still current
    Render {
        id: RequestId,
        scale: RenderScale,
        session: u64,
    },

    /// Release the document handle
    Close { id: RequestId },

    /// Stop the worker
    Shutdown,
}

/// Response sent back by the render worker
#[derive(Debug)]
pub enum ViewerResponse {
    Loaded {
        id: RequestId,
        page_count: usize,
    },

    LoadFailed {
        id: RequestId,
        error: DocumentLoadError,
    },

    LoadingChanged {
        id: RequestId,
        loading: bool,
    },

    RenderError {
        id: RequestId,
        message: Option<String>,
    },

    PassComplete {
        id: RequestId,
        summary: PassSummary,
    },

    Closed {
        id: RequestId,
    },

    /// Request dropped without running: superseded, or nothing to render
    Cancelled(RequestId),
}

impl ViewerResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            ViewerResponse::Loaded { id, .. }
            | ViewerResponse::LoadFailed { id, .. }
            | ViewerResponse::LoadingChanged { id, .. }
            | ViewerResponse::RenderError { id, .. }
            | ViewerResponse::PassComplete { id, .. }
            | ViewerResponse::Closed { id }
            | ViewerResponse::Cancelled(id) => *id,
        }
    }
}
