//! Cooperative cancellation tokens.
//!
//! A render hands a clone of its token to the engine. The engine checks
//! `is_cancelled()` between units of work and bails out early. There is no
//! forced interruption.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag.
///
/// # Example
///
/// ```
/// use pdfcraft_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let engine_token = token.clone();
///
/// token.cancel();
/// assert!(engine_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_token_is_live() {
        assert!(!CancellationToken::new().is_cancelled());
        assert!(!CancellationToken::default().is_cancelled());
    }

    #[test]
    fn engine_copy_observes_cancel_from_viewer() {
        let viewer_side = CancellationToken::new();
        let engine_side = viewer_side.clone();

        viewer_side.cancel();
        viewer_side.cancel();

        assert!(engine_side.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_threads() {
        let token = CancellationToken::new();
        let remote = token.clone();

        thread::spawn(move || remote.cancel()).join().expect("cancel thread should finish");

        assert!(token.is_cancelled());
    }

    #[test]
    fn unrelated_tokens_stay_independent() {
        let first = CancellationToken::new();
        let second = CancellationToken::new();

        first.cancel();

        assert!(!second.is_cancelled());
    }
}
