//! Background worker owning the document handle
//!
//! All loads and render passes run here, one at a time, so two passes never
//! touch the same handle concurrently. Renders queued behind a busy worker
//! collapse into the newest one.

use flume::{Receiver, Sender, TryRecvError};

use super::request::{RequestId, ViewerRequest, ViewerResponse};
use crate::pdf::document::DocumentHandle;
use crate::pdf::loader::DocumentLoader;
use crate::pdf::renderer::{PageRenderer, RenderObserver};
use crate::pdf::surface::SharedSurfaces;
use crate::pdf::zoom::RenderScale;

/// Forwards renderer callbacks over the response channel
struct ChannelObserver<'a> {
    id: RequestId,
    responses: &'a Sender<ViewerResponse>,
}

impl RenderObserver for ChannelObserver<'_> {
    fn on_loading_change(&mut self, loading: bool) {
        let _ = self.responses.send(ViewerResponse::LoadingChanged {
            id: self.id,
            loading,
        });
    }

    fn on_error(&mut self, message: Option<String>) {
        let _ = self.responses.send(ViewerResponse::RenderError {
            id: self.id,
            message,
        });
    }
}

pub(crate) struct Worker {
    loader: DocumentLoader,
    renderer: PageRenderer,
    surfaces: SharedSurfaces,
    handle: Option<DocumentHandle>,
    responses: Sender<ViewerResponse>,
}

impl Worker {
    pub(crate) fn new(
        loader: DocumentLoader,
        renderer: PageRenderer,
        surfaces: SharedSurfaces,
        responses: Sender<ViewerResponse>,
    ) -> Self {
        Self {
            loader,
            renderer,
            surfaces,
            handle: None,
            responses,
        }
    }

    pub(crate) fn run(mut self, requests: Receiver<ViewerRequest>) {
        let mut deferred: Option<ViewerRequest> = None;

        loop {
            let request = match deferred.take() {
                Some(request) => request,
                None => match requests.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                },
            };

            match request {
                ViewerRequest::Load { id, url } => self.load(id, &url),

                ViewerRequest::Render { id, scale, session } => {
                    let latest = coalesce(&requests, id, scale, session);
                    for stale in latest.superseded {
                        let _ = self.responses.send(ViewerResponse::Cancelled(stale));
                    }
                    deferred = latest.next;
                    self.render(latest.id, latest.scale, latest.session);
                }

                ViewerRequest::Close { id } => {
                    self.release();
                    let _ = self.responses.send(ViewerResponse::Closed { id });
                }

                ViewerRequest::Shutdown => break,
            }
        }

        self.release();
        log::debug!("viewer worker stopped");
    }

    fn load(&mut self, id: RequestId, url: &str) {
        // at most one live handle: drop the old one before fetching the new
        self.release();

        match self.loader.load(url) {
            Ok(handle) => {
                let page_count = handle.page_count();
                self.handle = Some(handle);
                let _ = self
                    .responses
                    .send(ViewerResponse::Loaded { id, page_count });
            }
            Err(error) => {
                log::warn!("could not open {url}: {error}");
                let _ = self.responses.send(ViewerResponse::LoadFailed { id, error });
            }
        }
    }

    fn render(&mut self, id: RequestId, scale: RenderScale, session: u64) {
        let Some(handle) = self.handle.as_ref() else {
            log::debug!("render request {id:?} with no document loaded, ignoring");
            let _ = self.responses.send(ViewerResponse::Cancelled(id));
            return;
        };

        let mut observer = ChannelObserver {
            id,
            responses: &self.responses,
        };
        let mut destination = self.surfaces.pinned(session);
        let summary = self
            .renderer
            .render_all(handle, scale, &mut destination, &mut observer);
        let _ = self
            .responses
            .send(ViewerResponse::PassComplete { id, summary });
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.destroy();
        }
    }
}

struct LatestRender {
    id: RequestId,
    scale: RenderScale,
    session: u64,
    superseded: Vec<RequestId>,
    /// First non-render request found behind the renders
    next: Option<ViewerRequest>,
}

/// Skip over renders that are already stale
fn coalesce(
    requests: &Receiver<ViewerRequest>,
    id: RequestId,
    scale: RenderScale,
    session: u64,
) -> LatestRender {
    let mut latest = LatestRender {
        id,
        scale,
        session,
        superseded: Vec::new(),
        next: None,
    };

    loop {
        match requests.try_recv() {
            Ok(ViewerRequest::Render { id, scale, session }) => {
                log::trace!("render {:?} superseded by {id:?}", latest.id);
                latest.superseded.push(latest.id);
                latest.id = id;
                latest.scale = scale;
                latest.session = session;
            }
            Ok(other) => {
                latest.next = Some(other);
                return latest;
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return latest,
        }
    }
}
