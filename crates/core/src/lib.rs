//! PDFCraft core library
//!
//! Annotation state, undo/redo, pointer gestures, page rendering and the
//! viewer controller that ties them together, plus export of an annotated
//! copy of the document.

pub mod annotation;
pub mod gesture;
pub mod history;
pub mod pdf_export;
pub mod render;
pub mod viewer;

pub use annotation::AnnotationStore;
pub use gesture::{Gesture, GestureCapture};
pub use history::History;
pub use pdf_export::{merge_annotations, ExportError, ExportOptions};
pub use render::{PendingRender, RenderError, RenderOutcome, RenderPipeline, RenderedFrame};
pub use viewer::{
    OverlayHighlight, OverlayStroke, PageOverlay, SubscriptionId, Viewer, ViewerError,
};
