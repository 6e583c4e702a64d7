//! Test doubles for the decoder, the network, and render observers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::Rgb;

use crate::pdf::document::{DecodeError, Decoder, PageFault, PageSize, PageSource, PdfPage};
use crate::pdf::loader::FailureCause;
use crate::pdf::loader::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::pdf::renderer::RenderObserver;
use crate::pdf::surface::PageSurface;

/// Decoder for a tiny text format standing in for PDF bytes:
/// `%PDF-fake pages=<n> broken=<a>,<b>`
#[derive(Clone, Debug, Default)]
pub struct FakeDecoder {
    render_delay: Duration,
    live: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub const PAGE_WIDTH: f32 = 100.0;
    pub const PAGE_HEIGHT: f32 = 150.0;

    /// Every page render sleeps for `delay`
    #[must_use]
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Counter of documents opened by this decoder and not yet dropped
    #[must_use]
    pub fn live_documents(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    #[must_use]
    pub fn document_bytes(pages: usize, broken: &[usize]) -> Vec<u8> {
        let broken: Vec<String> = broken.iter().map(ToString::to_string).collect();
        format!("%PDF-fake pages={pages} broken={}\n", broken.join(",")).into_bytes()
    }

    fn parse(bytes: &[u8]) -> Option<(usize, Vec<usize>)> {
        let text = std::str::from_utf8(bytes).ok()?;
        let rest = text.trim().strip_prefix("%PDF-fake")?;

        let mut pages = None;
        let mut broken = Vec::new();
        for field in rest.split_whitespace() {
            if let Some(n) = field.strip_prefix("pages=") {
                pages = n.parse().ok();
            } else if let Some(list) = field.strip_prefix("broken=") {
                broken = list
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .ok()?;
            }
        }
        Some((pages?, broken))
    }
}

impl Decoder for FakeDecoder {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn PageSource>, DecodeError> {
        let (pages, broken) = Self::parse(&bytes)
            .ok_or_else(|| DecodeError::new(format!("not a fake document ({} bytes)", bytes.len())))?;

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDocument {
            pages,
            broken,
            render_delay: self.render_delay,
            live: Arc::clone(&self.live),
        }))
    }
}

struct FakeDocument {
    pages: usize,
    broken: Vec<usize>,
    render_delay: Duration,
    live: Arc<AtomicUsize>,
}

impl Drop for FakeDocument {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PageSource for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page(&self, page_number: usize) -> Result<Box<dyn PdfPage + '_>, PageFault> {
        Ok(Box::new(FakePage {
            number: page_number,
            broken: self.broken.contains(&page_number),
            render_delay: self.render_delay,
        }))
    }
}

struct FakePage {
    number: usize,
    broken: bool,
    render_delay: Duration,
}

impl PdfPage for FakePage {
    fn size(&self) -> Result<PageSize, PageFault> {
        Ok(PageSize::new(FakeDecoder::PAGE_WIDTH, FakeDecoder::PAGE_HEIGHT))
    }

    fn render_into(&self, surface: &mut PageSurface, _scale: f32) -> Result<(), PageFault> {
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        if self.broken {
            return Err(PageFault::Raster {
                page: self.number,
                detail: "corrupt content stream".into(),
            });
        }

        let shade = (self.number * 37 % 200) as u8;
        let pixels = surface.pixels_mut();
        let band = pixels.height() / 4;
        for y in band..band * 2 {
            for x in 0..pixels.width() {
                pixels.put_pixel(x, y, Rgb([shade, shade, shade]));
            }
        }
        Ok(())
    }
}

enum Reply {
    Pdf { pages: usize, cors: bool },
    Bytes(Vec<u8>),
    Fail(FailureCause),
}

struct Rule {
    prefix: String,
    exact: bool,
    nth: Option<usize>,
    reply: Reply,
}

/// Fetcher that answers from a list of rules; first matching rule wins
#[derive(Default)]
pub struct ScriptedFetcher {
    rules: Vec<Rule>,
    fallback: Option<FailureCause>,
    calls: Arc<Mutex<Vec<FetchRequest>>>,
}

impl ScriptedFetcher {
    /// Every recorded request, in order
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<Vec<FetchRequest>>> {
        Arc::clone(&self.calls)
    }

    /// Serve a fake document with a permissive CORS header at exactly `url`
    #[must_use]
    pub fn respond_pdf(mut self, url: &str, pages: usize) -> Self {
        self.rules.push(Rule {
            prefix: url.to_string(),
            exact: true,
            nth: None,
            reply: Reply::Pdf { pages, cors: true },
        });
        self
    }

    /// Serve a fake document at exactly `url` without any CORS header
    #[must_use]
    pub fn respond_pdf_without_cors(mut self, url: &str, pages: usize) -> Self {
        self.rules.push(Rule {
            prefix: url.to_string(),
            exact: true,
            nth: None,
            reply: Reply::Pdf { pages, cors: false },
        });
        self
    }

    /// Serve raw bytes for any URL starting with `prefix`
    #[must_use]
    pub fn respond_bytes(mut self, prefix: &str, body: Vec<u8>) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            exact: false,
            nth: None,
            reply: Reply::Bytes(body),
        });
        self
    }

    /// Fail any URL starting with `prefix`
    #[must_use]
    pub fn fail_prefix(mut self, prefix: &str, cause: FailureCause) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            exact: false,
            nth: None,
            reply: Reply::Fail(cause),
        });
        self
    }

    /// Fail only the `nth` (0-based) request for exactly `url`
    #[must_use]
    pub fn fail_nth(mut self, url: &str, nth: usize, cause: FailureCause) -> Self {
        self.rules.push(Rule {
            prefix: url.to_string(),
            exact: true,
            nth: Some(nth),
            reply: Reply::Fail(cause),
        });
        self
    }

    /// Failure for requests no rule matches
    #[must_use]
    pub fn fail_all(mut self, cause: FailureCause) -> Self {
        self.fallback = Some(cause);
        self
    }

    fn matches(rule: &Rule, url: &str, seen: usize) -> bool {
        let url_ok = if rule.exact {
            url == rule.prefix
        } else {
            url.starts_with(&rule.prefix)
        };
        url_ok && rule.nth.is_none_or(|n| n == seen)
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FailureCause> {
        let url = request.url.as_str();
        let seen = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            let seen = calls.iter().filter(|c| c.url.as_str() == url).count();
            calls.push(request.clone());
            seen
        };

        let Some(rule) = self.rules.iter().find(|r| Self::matches(r, url, seen)) else {
            return Err(self
                .fallback
                .clone()
                .unwrap_or_else(|| FailureCause::Network(format!("no route to {url}"))));
        };

        let mut response = FetchResponse {
            url: url.to_string(),
            status: 200,
            ..FetchResponse::default()
        };
        match &rule.reply {
            Reply::Pdf { pages, cors } => {
                response.body = FakeDecoder::document_bytes(*pages, &[]);
                if *cors {
                    response
                        .headers
                        .insert("access-control-allow-origin".into(), "*".into());
                }
            }
            Reply::Bytes(body) => {
                response.body = body.clone();
                response
                    .headers
                    .insert("access-control-allow-origin".into(), "*".into());
            }
            Reply::Fail(cause) => return Err(cause.clone()),
        }
        Ok(response)
    }
}

/// Observer that records every callback
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub loading: Vec<bool>,
    pub errors: Vec<Option<String>>,
}

impl RenderObserver for RecordingObserver {
    fn on_loading_change(&mut self, loading: bool) {
        self.loading.push(loading);
    }

    fn on_error(&mut self, message: Option<String>) {
        self.errors.push(message);
    }
}

/// Cloneable [`RecordingObserver`] for handing to a viewer while the test
/// keeps a way to inspect it
#[derive(Clone, Debug, Default)]
pub struct SharedRecorder(Arc<Mutex<RecordingObserver>>);

impl SharedRecorder {
    #[must_use]
    pub fn loading(&self) -> Vec<bool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).loading.clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<Option<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).errors.clone()
    }

    /// Most recent error callback, flattened
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.errors().into_iter().last().flatten()
    }
}

impl RenderObserver for SharedRecorder {
    fn on_loading_change(&mut self, loading: bool) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_loading_change(loading);
    }

    fn on_error(&mut self, message: Option<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_error(message);
    }
}
