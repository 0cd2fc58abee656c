//! Viewer controller
//!
//! [`Viewer`] is the command surface handed to the hosting shell. It owns the
//! document handle, the broadcast [`ViewerState`], the page list, the render
//! pipeline and the annotation store with its history. The shell reads state
//! through [`Viewer::state`] or a subscription and changes it only through the
//! commands below.

use crate::annotation::AnnotationStore;
use crate::gesture::GestureCapture;
use crate::history::History;
use crate::pdf_export::{merge_annotations, ExportError, ExportOptions};
use crate::render::{PendingRender, RenderError, RenderOutcome, RenderPipeline, RenderedFrame};
use doc_model::{
    new_annotation_id, AnnotationId, AnnotationSnapshot, Color, FracPoint, FracRect,
    HistoryAction, InlineTextItem, StickyNote, Tool, ViewerConfig, ViewerSnapshot, ViewerState,
};
use pdf_engine::{DocumentHandle, OpenSource, PdfEngine, PdfEngineError};
use std::fs;
use std::path::Path;
use viewer_core::{
    clamp_page, clamp_zoom, rotate_by, step_zoom, Normalizer, PageExtent, VirtualPageList,
};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("could not load document: {0}")]
    Load(#[source] PdfEngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ViewerState)>;

/// A stroke as drawn on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStroke {
    pub id: AnnotationId,
    pub points_px: Vec<(f32, f32)>,
    pub color: Color,
    /// Stored width multiplied by the current zoom.
    pub width_px: f32,
}

/// A highlight as drawn on screen, `(x, y)` at its top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayHighlight {
    pub id: AnnotationId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
    pub opacity: f32,
}

/// Vector overlay of one rendered page in page-box pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOverlay {
    pub strokes: Vec<OverlayStroke>,
    pub highlights: Vec<OverlayHighlight>,
    /// Stroke being drawn right now, if it is on this page.
    pub live_stroke: Option<Vec<(f32, f32)>>,
    /// Highlight drag preview `(x, y, width, height)`, if it is on this page.
    pub preview: Option<(f32, f32, f32, f32)>,
}

#[derive(Debug)]
struct LoadedDocument {
    handle: DocumentHandle,
    bytes: Vec<u8>,
}

pub struct Viewer<E: PdfEngine> {
    engine: E,
    config: ViewerConfig,
    document: Option<LoadedDocument>,
    state: ViewerState,
    pages: VirtualPageList,
    pipeline: RenderPipeline,
    store: AnnotationStore,
    history: History,
    gesture: GestureCapture,
    tool: Option<Tool>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl<E: PdfEngine> Viewer<E> {
    pub fn new(engine: E, config: ViewerConfig) -> Self {
        let scale = clamp_zoom(config.initial_scale, config.min_scale, config.max_scale);

        Self {
            engine,
            state: ViewerState::empty(scale),
            pages: VirtualPageList::new(0, config.estimated_page_height_px, config.overscan),
            pipeline: RenderPipeline::new(config.page_margin_px, config.device_pixel_ratio),
            config,
            document: None,
            store: AnnotationStore::new(),
            history: History::new(),
            gesture: GestureCapture::new(),
            tool: None,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Synchronous read of `{current_page, total_pages, scale}`.
    pub fn state(&self) -> ViewerSnapshot {
        self.state.snapshot()
    }

    pub fn viewer_state(&self) -> &ViewerState {
        &self.state
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pages(&self) -> &VirtualPageList {
        &self.pages
    }

    pub fn frame(&self, page: u32) -> Option<&RenderedFrame> {
        self.pipeline.frame(page)
    }

    pub fn has_render_failed(&self, page: u32) -> bool {
        self.pipeline.has_failed(page)
    }

    // Subscriptions

    /// Registers a listener called whenever the current page, page count,
    /// scale or loaded flag changes.
    pub fn subscribe(&mut self, listener: impl FnMut(&ViewerState) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    fn update_state(&mut self, change: impl FnOnce(&mut ViewerState)) {
        let before = self.state;
        change(&mut self.state);

        if self.state.broadcast_differs(&before) {
            let state = self.state;
            for (_, listener) in &mut self.listeners {
                listener(&state);
            }
        }
    }

    // Document lifecycle

    /// Replaces the open document. Everything tied to the previous document is
    /// dropped first, so on failure the viewer is left empty.
    pub fn load_document(&mut self, bytes: Vec<u8>) -> Result<u32, ViewerError> {
        self.reset_document();

        let handle = match self.engine.load_document(OpenSource::Bytes(bytes.clone())) {
            Ok(handle) => handle,
            Err(error) => {
                log::error!("failed to load document: {error}");
                return Err(ViewerError::Load(error));
            }
        };

        let page_count = match self.engine.page_count(handle) {
            Ok(count) => count,
            Err(error) => {
                log::error!("failed to read page count: {error}");
                if let Err(close_error) = self.engine.close(handle) {
                    log::warn!("failed to close document: {close_error}");
                }
                return Err(ViewerError::Load(error));
            }
        };

        self.pages.reset(page_count as usize);
        self.document = Some(LoadedDocument { handle, bytes });
        self.update_state(|state| {
            state.total_pages = page_count;
            state.file_loaded = true;
        });

        log::debug!("loaded document with {page_count} pages");
        Ok(page_count)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<u32, ViewerError> {
        match fs::read(path.as_ref()) {
            Ok(bytes) => self.load_document(bytes),
            Err(error) => {
                log::error!("failed to read {}: {error}", path.as_ref().display());
                self.reset_document();
                Err(ViewerError::Load(PdfEngineError::Io(error)))
            }
        }
    }

    pub fn close_document(&mut self) {
        self.reset_document();
    }

    fn reset_document(&mut self) {
        self.pipeline.reset();
        self.gesture.cancel();
        self.store.clear();
        self.history.clear();
        self.pages.reset(0);

        if let Some(document) = self.document.take() {
            if let Err(error) = self.engine.close(document.handle) {
                log::warn!("failed to close document: {error}");
            }
        }

        self.update_state(|state| {
            state.current_page = None;
            state.total_pages = 0;
            state.file_loaded = false;
        });
    }

    // Navigation

    pub fn prev(&mut self) -> Option<u32> {
        let current = self.state.current_page.unwrap_or(1) as i64;
        self.go_to_page(current - 1)
    }

    pub fn next(&mut self) -> Option<u32> {
        let current = self.state.current_page.unwrap_or(1) as i64;
        self.go_to_page(current + 1)
    }

    /// Clamps `requested` into `[1, total_pages]`, scrolls to it and makes it
    /// current. Does nothing without a document.
    pub fn go_to_page(&mut self, requested: i64) -> Option<u32> {
        if !self.state.file_loaded {
            return None;
        }

        let page = clamp_page(requested, self.state.total_pages)?;
        self.pages.scroll_to_index(page as usize - 1);
        self.update_state(|state| state.current_page = Some(page));
        Some(page)
    }

    pub fn set_viewport_height(&mut self, height_px: f32) {
        self.pages.set_viewport_height(height_px);
    }

    /// Scrolls the page list. Once a page is current, the page at the top of
    /// the viewport becomes current.
    pub fn scroll_to(&mut self, offset_px: f32) {
        self.pages.set_scroll_offset(offset_px);

        if self.state.current_page.is_none() {
            return;
        }
        if let Some(index) = self.pages.index_at_offset(self.pages.scroll_offset()) {
            self.update_state(|state| state.current_page = Some(index as u32 + 1));
        }
    }

    /// 1-based numbers of the pages to keep mounted.
    pub fn mounted_pages(&self) -> Vec<u32> {
        self.pages.materialized_range().map(|index| index as u32 + 1).collect()
    }

    // Zoom and rotation

    pub fn zoom_in(&mut self) -> f32 {
        let config = &self.config;
        let scale =
            step_zoom(self.state.scale, config.zoom_step, config.min_scale, config.max_scale);
        self.set_scale(scale)
    }

    pub fn zoom_out(&mut self) -> f32 {
        let config = &self.config;
        let scale =
            step_zoom(self.state.scale, -config.zoom_step, config.min_scale, config.max_scale);
        self.set_scale(scale)
    }

    pub fn set_scale(&mut self, scale: f32) -> f32 {
        let scale = clamp_zoom(scale, self.config.min_scale, self.config.max_scale);
        if scale != self.state.scale {
            self.pages.invalidate_measurements();
            self.update_state(|state| state.scale = scale);
        }
        scale
    }

    pub fn rotate_left(&mut self) -> u16 {
        self.rotate(-90)
    }

    pub fn rotate_right(&mut self) -> u16 {
        self.rotate(90)
    }

    fn rotate(&mut self, delta: i32) -> u16 {
        let rotation = rotate_by(self.state.rotation, delta);
        self.pages.invalidate_measurements();
        self.update_state(|state| state.rotation = rotation);
        rotation
    }

    // Rendering

    /// Issues a render of `page` at the current scale and rotation,
    /// superseding any earlier request for that page.
    pub fn request_render(&mut self, page: u32) -> Option<PendingRender> {
        if self.document.is_none() || page == 0 || page > self.state.total_pages {
            return None;
        }

        Some(self.pipeline.request(page, self.state.scale, self.state.rotation))
    }

    /// Rasterizes a pending request and commits it if it is still current.
    /// On success the page's layout height is measured into the page list.
    pub fn complete_render(&mut self, pending: PendingRender) -> RenderOutcome {
        let result = match &self.document {
            Some(document) => self.pipeline.execute(&self.engine, document.handle, &pending),
            None => Err(RenderError::Cancelled),
        };

        let outcome = self.pipeline.commit(pending, result);
        if let RenderOutcome::Committed { page, layout_height } = outcome {
            self.pages.measure(page as usize - 1, layout_height);
            if self.state.current_page.is_none() {
                self.update_state(|state| state.current_page = Some(page));
            }
        }
        outcome
    }

    pub fn render_page(&mut self, page: u32) -> Option<RenderOutcome> {
        let pending = self.request_render(page)?;
        Some(self.complete_render(pending))
    }

    /// Renders every mounted page whose frame is missing or was produced at
    /// a different scale or rotation. Frames and in-flight renders of pages
    /// that left the mounted window are released first.
    pub fn render_mounted(&mut self) -> Vec<RenderOutcome> {
        let (scale, rotation) = (self.state.scale, self.state.rotation);

        let mounted = self.mounted_pages();
        if let (Some(&first), Some(&last)) = (mounted.first(), mounted.last()) {
            self.pipeline.retain_pages(|page| (first..=last).contains(&page));
        } else {
            self.pipeline.retain_pages(|_| false);
        }

        let stale: Vec<u32> = mounted
            .into_iter()
            .filter(|page| {
                self.pipeline.frame(*page).map_or(true, |frame| {
                    frame.request.scale != scale || frame.request.rotation != rotation
                })
            })
            .collect();

        stale.into_iter().filter_map(|page| self.render_page(page)).collect()
    }

    /// Normalizer for `page` as it is currently shown. A page without a frame
    /// has no known size and maps every pointer position to 0.
    fn normalizer(&self, page: u32) -> Normalizer {
        match self.pipeline.frame(page) {
            Some(frame) => Normalizer::new(
                PageExtent::new(frame.viewport.width, frame.viewport.height),
                frame.request.rotation,
            ),
            None => Normalizer::new(PageExtent::new(0.0, 0.0), self.state.rotation),
        }
    }

    // Tools and pointer gestures

    pub fn tool(&self) -> Option<Tool> {
        self.tool
    }

    /// Selects a tool. Any capture in progress is dropped.
    pub fn set_tool(&mut self, tool: Option<Tool>) {
        self.gesture.cancel();
        self.tool = tool;
    }

    /// Starts a stroke or highlight capture at page-box pixel `(x_px, y_px)`.
    pub fn pointer_down(&mut self, page: u32, x_px: f32, y_px: f32) -> bool {
        let Some(tool) = self.tool.filter(|tool| tool.captures_pointer()) else {
            return false;
        };
        if page == 0 || page > self.state.total_pages {
            return false;
        }

        let point = self.normalizer(page).to_fraction(x_px, y_px);
        self.gesture.begin(tool, page, point)
    }

    pub fn pointer_move(&mut self, x_px: f32, y_px: f32) {
        let Some(page) = self.gesture.active().map(|gesture| gesture.page()) else {
            return;
        };

        let point = self.normalizer(page).to_fraction(x_px, y_px);
        self.gesture.update(point);
    }

    /// Ends the capture. Returns the id of the stored annotation, or `None`
    /// when the gesture was too small to keep.
    pub fn pointer_up(&mut self) -> Option<AnnotationId> {
        let action = self.gesture.finish(&self.config)?;
        let id = action.id();
        self.history.record(&mut self.store, action).then_some(id)
    }

    pub fn live_preview(&self) -> Option<FracRect> {
        self.gesture.preview_rect()
    }

    pub fn live_stroke(&self) -> Option<&[FracPoint]> {
        self.gesture.live_points()
    }

    /// Removes a stroke, e.g. on double-click. Undoable.
    pub fn remove_stroke(&mut self, page: u32, id: AnnotationId) -> bool {
        let Some(stroke) = self.store.stroke(page, id).cloned() else {
            return false;
        };
        self.history.record(&mut self.store, HistoryAction::RemoveStroke { stroke })
    }

    /// Removes a highlight, e.g. on double-click. Undoable.
    pub fn remove_highlight(&mut self, page: u32, id: AnnotationId) -> bool {
        let Some(highlight) = self.store.highlight(page, id).cloned() else {
            return false;
        };
        self.history.record(&mut self.store, HistoryAction::RemoveHighlight { highlight })
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.store).is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.store).is_some()
    }

    // Inline text and notes

    /// Handles a click with the text tool active by placing a text item.
    pub fn click(&mut self, page: u32, x_px: f32, y_px: f32) -> Option<AnnotationId> {
        if self.tool != Some(Tool::Text) {
            return None;
        }
        self.add_text(page, x_px, y_px)
    }

    /// Places a text item at page-box pixels, remembering the current zoom.
    pub fn add_text(&mut self, page: u32, x_px: f32, y_px: f32) -> Option<AnnotationId> {
        if page == 0 || page > self.state.total_pages {
            return None;
        }

        let id = new_annotation_id();
        self.store.add_text(InlineTextItem {
            id,
            page,
            x_px,
            y_px,
            text: self.config.default_text.clone(),
            font_size: self.config.text_font_size,
            color: self.config.text_color,
            origin_scale: self.state.scale,
        });
        Some(id)
    }

    pub fn edit_text(&mut self, id: AnnotationId, text: impl Into<String>) -> bool {
        self.store.set_text(id, text.into())
    }

    pub fn delete_text(&mut self, id: AnnotationId) -> bool {
        self.store.remove_text(id).is_some()
    }

    pub fn add_note(
        &mut self,
        page: u32,
        rect: FracRect,
        text: impl Into<String>,
        color: impl Into<String>,
    ) -> Option<AnnotationId> {
        if page == 0 || page > self.state.total_pages {
            return None;
        }

        let id = new_annotation_id();
        self.store.add_note(StickyNote { id, page, rect, text: text.into(), color: color.into() });
        Some(id)
    }

    pub fn edit_note(&mut self, id: AnnotationId, text: impl Into<String>) -> bool {
        self.store.update_note(id, None, Some(text.into()))
    }

    pub fn move_note(&mut self, id: AnnotationId, rect: FracRect) -> bool {
        self.store.update_note(id, Some(rect), None)
    }

    pub fn delete_note(&mut self, id: AnnotationId) -> bool {
        self.store.remove_note(id).is_some()
    }

    /// Adds a saved set of annotations to the open document. Strokes and
    /// highlights are recorded in history. Returns how many items were added.
    pub fn import_annotations(&mut self, snapshot: AnnotationSnapshot) -> usize {
        let mut added = 0;

        let actions = snapshot
            .strokes
            .into_iter()
            .map(|stroke| HistoryAction::AddStroke { stroke })
            .chain(
                snapshot
                    .highlights
                    .into_iter()
                    .map(|highlight| HistoryAction::AddHighlight { highlight }),
            );
        for action in actions {
            if self.history.record(&mut self.store, action) {
                added += 1;
            }
        }

        added += snapshot.texts.len() + snapshot.notes.len();
        snapshot.texts.into_iter().for_each(|item| self.store.add_text(item));
        snapshot.notes.into_iter().for_each(|note| self.store.add_note(note));
        added
    }

    /// On-screen geometry for a rendered page, or `None` if the page has no
    /// frame yet.
    pub fn overlay(&self, page: u32) -> Option<PageOverlay> {
        self.pipeline.frame(page)?;
        let normalizer = self.normalizer(page);
        let scale = self.state.scale;

        let strokes = self
            .store
            .strokes_for_page(page)
            .into_iter()
            .map(|stroke| OverlayStroke {
                id: stroke.id,
                points_px: stroke.points.iter().map(|point| normalizer.to_pixels(*point)).collect(),
                color: stroke.color,
                width_px: stroke.width * scale,
            })
            .collect();

        let highlights = self
            .store
            .highlights_for_page(page)
            .into_iter()
            .map(|highlight| {
                let (x, y, width, height) = normalizer.rect_to_pixels(highlight.rect);
                OverlayHighlight {
                    id: highlight.id,
                    x,
                    y,
                    width,
                    height,
                    color: highlight.color,
                    opacity: highlight.opacity,
                }
            })
            .collect();

        let on_this_page = self.gesture.active().is_some_and(|gesture| gesture.page() == page);
        let live_stroke = self
            .live_stroke()
            .filter(|_| on_this_page)
            .map(|points| points.iter().map(|point| normalizer.to_pixels(*point)).collect());
        let preview = self
            .live_preview()
            .filter(|_| on_this_page)
            .map(|rect| normalizer.rect_to_pixels(rect));

        Some(PageOverlay { strokes, highlights, live_stroke, preview })
    }

    /// Writes the annotations into a copy of the open document.
    pub fn export(&self, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
        let document = self.document.as_ref().ok_or(ExportError::NoDocument)?;
        merge_annotations(&document.bytes, &self.store, options)
    }
}
