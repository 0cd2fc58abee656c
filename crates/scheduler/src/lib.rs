//! Render scheduling primitives for the PDFCraft viewer.
//!
//! Rendering runs on a single cooperative event loop. Requests for the same
//! page supersede each other: the tracker hands out generation-stamped
//! tickets, cancels the previous ticket's token, and refuses to commit stale
//! results no matter in which order completions arrive.
//!
//! # Example
//!
//! ```
//! use pdfcraft_scheduler::RenderTracker;
//!
//! let mut tracker = RenderTracker::new();
//! let slow = tracker.begin(1);
//! let fast = tracker.begin(1);
//!
//! assert!(tracker.finish(&fast));
//! assert!(!tracker.finish(&slow));
//! ```

mod cancel;
mod tracker;

pub use cancel::CancellationToken;
pub use tracker::{RenderTicket, RenderTracker};
