//! Page render pipeline
//!
//! Rendering is split into three steps so completions may arrive in any order:
//!
//! 1. [`RenderPipeline::request`] issues a ticket for a page, cancelling any
//!    request still in flight for that page.
//! 2. [`RenderPipeline::execute`] asks the engine for the bitmap. The engine
//!    polls the ticket's cancellation token while rasterizing.
//! 3. [`RenderPipeline::commit`] accepts the result only if the ticket is still
//!    the newest one for its page.
//!
//! A cancelled or superseded render is expected and is only logged at debug
//! level. Any other failure is logged as a warning and leaves the page's
//! previous frame in place.

use pdf_engine::{DocumentHandle, PdfEngine, PdfEngineError, RenderRequest, RgbaImage, Viewport};
use pdfcraft_scheduler::{RenderTicket, RenderTracker};
use std::collections::{HashMap, HashSet};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,
    #[error("failed to render page {page}: {source}")]
    Engine {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
}

impl RenderError {
    fn from_engine(page: u32, error: PdfEngineError) -> Self {
        match error {
            PdfEngineError::Cancelled => Self::Cancelled,
            source => Self::Engine { page, source },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A render request that has been issued but not yet committed.
#[derive(Debug, Clone)]
pub struct PendingRender {
    ticket: RenderTicket,
    request: RenderRequest,
}

impl PendingRender {
    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.ticket.page
    }

    pub fn request(&self) -> RenderRequest {
        self.request
    }

    pub fn is_cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }
}

/// Output of a successful render.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub image: RgbaImage,
    /// Parameters the frame was rendered with.
    pub request: RenderRequest,
    /// Viewport size in CSS pixels, before the device pixel ratio.
    pub viewport: Viewport,
    /// Rendered height plus the inter-page margin.
    pub layout_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    Committed { page: u32, layout_height: f32 },
    /// A newer request for the page superseded this one.
    Superseded,
    Cancelled,
    Failed,
}

#[derive(Debug)]
pub struct RenderPipeline {
    tracker: RenderTracker,
    frames: HashMap<u32, RenderedFrame>,
    failed: HashSet<u32>,
    page_margin_px: f32,
    device_pixel_ratio: f32,
}

impl RenderPipeline {
    pub fn new(page_margin_px: f32, device_pixel_ratio: f32) -> Self {
        Self {
            tracker: RenderTracker::new(),
            frames: HashMap::new(),
            failed: HashSet::new(),
            page_margin_px,
            device_pixel_ratio,
        }
    }

    pub fn request(&mut self, page: u32, scale: f32, rotation: u16) -> PendingRender {
        let ticket = self.tracker.begin(page);
        let request = RenderRequest {
            page_index: page.saturating_sub(1),
            scale,
            rotation,
            device_pixel_ratio: self.device_pixel_ratio,
        };

        PendingRender { ticket, request }
    }

    pub fn execute<E: PdfEngine + ?Sized>(
        &self,
        engine: &E,
        handle: DocumentHandle,
        pending: &PendingRender,
    ) -> Result<(RgbaImage, Viewport), RenderError> {
        let page = pending.page();
        let request = pending.request;

        let viewport = engine
            .viewport(handle, request.page_index, request.scale, request.rotation)
            .map_err(|error| RenderError::from_engine(page, error))?;
        let image = engine
            .render_page(handle, request, pending.ticket.token())
            .map_err(|error| RenderError::from_engine(page, error))?;

        Ok((image, viewport))
    }

    pub fn commit(
        &mut self,
        pending: PendingRender,
        result: Result<(RgbaImage, Viewport), RenderError>,
    ) -> RenderOutcome {
        let page = pending.page();
        let request = pending.request;

        if !self.tracker.finish(&pending.ticket) {
            log::debug!(
                "dropping superseded render of page {page} (generation {})",
                pending.ticket.generation
            );
            return RenderOutcome::Superseded;
        }

        match result {
            Ok((image, viewport)) => {
                let layout_height = viewport.height + self.page_margin_px;
                self.failed.remove(&page);
                self.frames.insert(page, RenderedFrame { image, request, viewport, layout_height });
                RenderOutcome::Committed { page, layout_height }
            }
            Err(error) if error.is_cancelled() => {
                log::debug!("render of page {page} cancelled");
                RenderOutcome::Cancelled
            }
            Err(error) => {
                log::warn!("{error}");
                self.failed.insert(page);
                RenderOutcome::Failed
            }
        }
    }

    /// Request, execute and commit in one go.
    pub fn render<E: PdfEngine + ?Sized>(
        &mut self,
        engine: &E,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
        rotation: u16,
    ) -> RenderOutcome {
        let pending = self.request(page, scale, rotation);
        let result = self.execute(engine, handle, &pending);
        self.commit(pending, result)
    }

    pub fn frame(&self, page: u32) -> Option<&RenderedFrame> {
        self.frames.get(&page)
    }

    /// Whether the last committed render of `page` failed.
    pub fn has_failed(&self, page: u32) -> bool {
        self.failed.contains(&page)
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Drops the frames of pages `keep` rejects and cancels their in-flight
    /// renders. Returns how many frames were released.
    pub fn retain_pages(&mut self, keep: impl Fn(u32) -> bool) -> usize {
        let cancelled = self.tracker.retain_pages(&keep);
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} renders for unmounted pages");
        }

        let before = self.frames.len();
        self.frames.retain(|page, _| keep(*page));
        self.failed.retain(|page| keep(*page));
        before - self.frames.len()
    }

    /// Cancels all in-flight work and forgets every frame.
    pub fn reset(&mut self) {
        let cancelled = self.tracker.cancel_all();
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} in-flight renders");
        }
        self.frames.clear();
        self.failed.clear();
    }
}
