//! Viewer shell: hosts the loader, renderer, zoom, gestures and content
//! protection, and runs the open/close lifecycle around them
//!
//! Loading and rendering happen on a background worker. The shell talks to
//! it over channels and applies the responses in [`Viewer::poll`] or
//! [`Viewer::wait_idle`], which is also where observer callbacks fire.

pub mod request;
pub mod state;
mod worker;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};

use crate::host::{
    Disposition, EventType, HostEvent, HostEventKind, HostPage, Key, ListenerId, ListenerScope,
};
use crate::pdf::gesture::GestureHandler;
use crate::pdf::loader::DocumentLoader;
use crate::pdf::protection::ContentGuard;
use crate::pdf::renderer::{PageRenderer, PassSummary, RenderObserver};
use crate::pdf::surface::{SharedSurfaces, WatermarkStyle};
use crate::pdf::zoom::{self, RenderScale, ScalePolicy, Zoom};
use crate::settings::Settings;

use request::{RequestId, ViewerRequest, ViewerResponse};
use state::{Command, Effect};
pub use state::ViewerState;
use worker::Worker;

pub const DEFAULT_TITLE: &str = "Document";
pub const MISSING_URL_MESSAGE: &str = "No document URL provided";
const SCROLL_LOCK: &str = "hidden";

/// Presentation settings for a viewer instance
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub scale_policy: ScalePolicy,
    pub double_tap_window: Duration,
    pub watermark: WatermarkStyle,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ViewerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            scale_policy: settings.scale_policy(),
            double_tap_window: settings.double_tap_window(),
            watermark: settings.watermark.clone(),
        }
    }
}

/// Touch listener feeding pinch and double-tap scale changes back to the
/// viewer; removed on drop
struct GestureBinding {
    host: HostPage,
    listener: ListenerId,
    scale: Arc<Mutex<RenderScale>>,
    requested: Receiver<f32>,
}

impl GestureBinding {
    fn install(host: &HostPage, window: Duration, current: RenderScale) -> Self {
        let scale = Arc::new(Mutex::new(current));
        let (tx, requested) = flume::unbounded();
        let handler = Mutex::new(GestureHandler::new(window));
        let shared_scale = Arc::clone(&scale);

        let listener = host.add_listener(ListenerScope::Viewer, EventType::Touch, move |event| {
            let HostEventKind::Touch(touch) = event else {
                return Disposition::Continue;
            };
            let current = *shared_scale.lock().unwrap_or_else(PoisonError::into_inner);
            let response = handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle(touch, current);

            if let Some(value) = response.set_scale {
                let _ = tx.send(value);
            }
            if response.prevent_default {
                Disposition::PreventDefault
            } else {
                Disposition::Continue
            }
        });

        Self {
            host: host.clone(),
            listener,
            scale,
            requested,
        }
    }

    /// Keep the handler's view of the current scale in sync
    fn track(&self, scale: RenderScale) {
        *self.scale.lock().unwrap_or_else(PoisonError::into_inner) = scale;
    }

    /// Newest scale requested since the last call
    fn take_requested(&self) -> Option<f32> {
        self.requested.try_iter().last()
    }
}

impl Drop for GestureBinding {
    fn drop(&mut self) {
        self.host.remove_listener(self.listener);
    }
}

/// A document viewer mounted into a [`HostPage`]
pub struct Viewer {
    state: ViewerState,
    config: ViewerConfig,
    zoom: Zoom,
    host: HostPage,
    surfaces: SharedSurfaces,
    observer: Box<dyn RenderObserver>,

    guard: Option<ContentGuard>,
    gestures: Option<GestureBinding>,
    /// Body overflow to restore on close; `Some` while scroll is locked
    saved_overflow: Option<Option<String>>,

    url: Option<String>,
    title: String,
    page_count: Option<usize>,
    loading: bool,
    last_pass: Option<PassSummary>,

    request_tx: Sender<ViewerRequest>,
    response_rx: Receiver<ViewerResponse>,
    next_request_id: u64,
    pending: HashSet<RequestId>,
    /// Responses to requests older than this belong to a previous session
    session_start: RequestId,
    worker: Option<JoinHandle<()>>,
}

impl Viewer {
    /// Create a closed viewer and start its render worker
    #[must_use]
    pub fn new(
        config: ViewerConfig,
        host: HostPage,
        loader: DocumentLoader,
        observer: Box<dyn RenderObserver>,
    ) -> Self {
        let surfaces = SharedSurfaces::new();
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let renderer = PageRenderer::new(config.watermark.clone());
        let worker_surfaces = surfaces.clone();
        // the worker owns document handles, which never leave its thread
        let worker = std::thread::spawn(move || {
            Worker::new(loader, renderer, worker_surfaces, response_tx).run(request_rx);
        });

        Self {
            state: ViewerState::Closed,
            zoom: Zoom::new(config.scale_policy),
            config,
            host,
            surfaces,
            observer,
            guard: None,
            gestures: None,
            saved_overflow: None,
            url: None,
            title: DEFAULT_TITLE.to_string(),
            page_count: None,
            loading: false,
            last_pass: None,
            request_tx,
            response_rx,
            next_request_id: 1,
            pending: HashSet::new(),
            session_start: RequestId::new(0),
            worker: Some(worker),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    #[must_use]
    pub fn scale(&self) -> RenderScale {
        self.zoom.scale()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Page count of the open document, once loaded
    #[must_use]
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn last_pass(&self) -> Option<&PassSummary> {
        self.last_pass.as_ref()
    }

    /// Rendered pages of the current pass
    #[must_use]
    pub fn surfaces(&self) -> &SharedSurfaces {
        &self.surfaces
    }

    #[must_use]
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Open a document; an already open one is replaced
    pub fn open(&mut self, url: Option<&str>, title: Option<&str>) {
        self.url = url.map(str::trim).filter(|u| !u.is_empty()).map(String::from);
        self.title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        log::info!("opening {:?} ({})", self.url, self.title);

        let effects = self.state.apply(Command::Open);
        self.execute_effects(effects);
    }

    /// Try loading again after a failure
    pub fn retry(&mut self) {
        let effects = self.state.apply(Command::Retry);
        self.execute_effects(effects);
    }

    /// Close the viewer, releasing the document and every page
    pub fn close(&mut self) {
        let effects = self.state.apply(Command::Close);
        self.execute_effects(effects);
    }

    pub fn zoom_in(&mut self) {
        self.apply_zoom(zoom::Command::ZoomIn);
    }

    pub fn zoom_out(&mut self) {
        self.apply_zoom(zoom::Command::ZoomOut);
    }

    pub fn set_scale(&mut self, value: f32) {
        self.apply_zoom(zoom::Command::SetScale(value));
    }

    /// Route an input event from the hosting page
    ///
    /// Listeners registered by the viewer see the event first; Escape then
    /// dismisses a settled viewer and gesture-driven zoom is applied.
    pub fn handle_event(&mut self, event: &HostEvent) -> Disposition {
        let disposition = self.host.dispatch(event);

        if let Some(value) = self.gestures.as_ref().and_then(GestureBinding::take_requested) {
            self.set_scale(value);
        }

        if let HostEventKind::KeyDown(key) = &event.kind {
            if key.key == Key::Escape && self.state.accepts_escape() {
                log::debug!("escape pressed, closing viewer");
                self.close();
            }
        }

        disposition
    }

    /// Apply every response the worker has produced so far
    ///
    /// Returns the number of responses handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            handled += 1;
        }
        handled
    }

    /// Block until the worker has answered every outstanding request
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response),
                Err(_) => return false,
            }
        }
        true
    }

    fn apply_zoom(&mut self, cmd: zoom::Command) {
        let effects = self.zoom.apply(cmd);
        if let Some(gestures) = &self.gestures {
            gestures.track(self.zoom.scale());
        }
        self.execute_zoom_effects(effects);
    }

    fn execute_zoom_effects(&mut self, effects: Vec<zoom::Effect>) {
        for effect in effects {
            match effect {
                zoom::Effect::RerenderAll(scale) => {
                    let id = self.next_id();
                    let session = self.surfaces.lock().session();
                    self.send(ViewerRequest::Render { id, scale, session });
                }
            }
        }
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ClearError => {
                    self.page_count = None;
                    self.last_pass = None;
                    self.observer.on_error(None);
                }

                Effect::LockScroll => {
                    if self.saved_overflow.is_none() {
                        let previous = self.host.set_body_overflow(Some(SCROLL_LOCK.to_string()));
                        self.saved_overflow = Some(previous);
                    }
                }

                Effect::PickInitialScale => {
                    let width = self.host.viewport_width_px();
                    let _ = self.zoom.apply(zoom::Command::Reset {
                        viewport_width_px: width,
                    });
                    log::debug!("initial scale {} for {width}px viewport", self.zoom.scale());
                }

                Effect::InstallGuards => {
                    if self.guard.is_none() {
                        self.guard = Some(ContentGuard::install(&self.host));
                    }
                    match &self.gestures {
                        Some(gestures) => gestures.track(self.zoom.scale()),
                        None => {
                            self.gestures = Some(GestureBinding::install(
                                &self.host,
                                self.config.double_tap_window,
                                self.zoom.scale(),
                            ));
                        }
                    }
                }

                Effect::StartLoad => self.start_load(),

                Effect::DocumentReady => {
                    let effects = self.zoom.apply(zoom::Command::SetDocumentLoaded(true));
                    self.execute_zoom_effects(effects);
                }

                Effect::ShowError(message) => {
                    self.observer.on_error(Some(message));
                    self.set_loading(false);
                }

                Effect::ReleaseDocument => {
                    let _ = self.zoom.apply(zoom::Command::SetDocumentLoaded(false));
                    self.surfaces.lock().detach();
                    self.page_count = None;

                    let id = self.next_id();
                    self.session_start = id;
                    self.send(ViewerRequest::Close { id });

                    if self.loading {
                        self.set_loading(false);
                    }
                }

                Effect::RestoreScroll => {
                    if let Some(previous) = self.saved_overflow.take() {
                        self.host.set_body_overflow(previous);
                    }
                }

                Effect::RemoveGuards => {
                    self.guard = None;
                    self.gestures = None;
                }
            }
        }
    }

    fn start_load(&mut self) {
        let Some(url) = self.url.clone() else {
            log::warn!("viewer opened without a document URL");
            let effects = self
                .state
                .apply(Command::LoadFailed(MISSING_URL_MESSAGE.to_string()));
            self.execute_effects(effects);
            return;
        };

        self.surfaces.lock().reattach();
        self.set_loading(true);

        let id = self.next_id();
        self.session_start = id;
        self.send(ViewerRequest::Load { id, url });
    }

    fn handle_response(&mut self, response: ViewerResponse) {
        let id = response.id();
        let settled = !matches!(
            response,
            ViewerResponse::LoadingChanged { .. } | ViewerResponse::RenderError { .. }
        );
        if settled {
            self.pending.remove(&id);
        }
        if id < self.session_start {
            log::trace!("dropping stale response {response:?}");
            return;
        }

        match response {
            ViewerResponse::Loaded { page_count, .. } => {
                log::info!("document loaded: {page_count} pages");
                self.page_count = Some(page_count);
                let effects = self.state.apply(Command::LoadSucceeded);
                self.execute_effects(effects);
            }

            ViewerResponse::LoadFailed { error, .. } => {
                let effects = self.state.apply(Command::LoadFailed(error.to_string()));
                self.execute_effects(effects);
            }

            ViewerResponse::LoadingChanged { loading, .. } => {
                if loading != self.loading {
                    self.set_loading(loading);
                }
            }

            ViewerResponse::RenderError { message, .. } => {
                self.observer.on_error(message);
            }

            ViewerResponse::PassComplete { summary, .. } => {
                if !summary.failed_pages.is_empty() {
                    log::warn!(
                        "{} of {} pages failed to render",
                        summary.failed_pages.len(),
                        summary.page_count
                    );
                }
                self.last_pass = Some(summary);
            }

            ViewerResponse::Closed { .. } | ViewerResponse::Cancelled(_) => {}
        }
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.observer.on_loading_change(loading);
    }

    fn send(&mut self, request: ViewerRequest) {
        let id = match &request {
            ViewerRequest::Load { id, .. }
            | ViewerRequest::Render { id, .. }
            | ViewerRequest::Close { id } => Some(*id),
            ViewerRequest::Shutdown => None,
        };

        if self.request_tx.send(request).is_err() {
            log::error!("viewer worker is gone");
            return;
        }
        if let Some(id) = id {
            self.pending.insert(id);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if self.state.is_open() {
            self.close();
        }
        let _ = self.request_tx.send(ViewerRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("viewer worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("state", &self.state)
            .field("scale", &self.zoom.scale())
            .field("url", &self.url)
            .field("page_count", &self.page_count)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
