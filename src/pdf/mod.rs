//! PDF rendering infrastructure

pub mod document;
pub mod gesture;
pub mod loader;
#[cfg(feature = "pdf")]
pub mod mupdf_backend;
pub mod protection;
pub mod renderer;
pub mod surface;
pub mod watermark;
pub mod zoom;

pub use document::{DecodeError, Decoder, DocumentHandle, PageFault, PageSize, PageSource, PdfPage};
pub use gesture::{GestureHandler, GestureResponse, GestureState, TouchEvent, TouchPhase, TouchPoint};
pub use loader::{
    AttemptOutcome, DocumentLoadError, DocumentLoader, FailureCause, LoadAttempt, LoaderConfig,
    StrategyFailure,
};
pub use loader::fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use loader::strategy::StrategyKind;
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfDecoder;
pub use protection::ContentGuard;
pub use renderer::{NullObserver, PageRenderer, PassSummary, RenderObserver};
pub use surface::{
    Destination, DestinationError, DirectorySink, PageSurface, PageViewport, RenderedPage,
    SessionSurfaces, SharedSurfaces, SurfaceStack, WatermarkOverlay, WatermarkStyle,
};
pub use watermark::WatermarkPainter;
pub use zoom::{RenderScale, ScalePolicy, Zoom};
