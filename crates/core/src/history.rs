//! Linear undo/redo over stroke and highlight edits.

use crate::annotation::AnnotationStore;
use doc_model::HistoryAction;

/// Two flat stacks of reversible actions. Recording a new action discards
/// the redo stack, so history never branches.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo: Vec<HistoryAction>,
    redo: Vec<HistoryAction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `action` to `store` and pushes it onto the undo stack.
    ///
    /// An action the store rejects (an empty stroke, removal of something
    /// that is not there) is neither applied nor recorded, and the redo stack
    /// is left alone. Returns whether the action was recorded.
    pub fn record(&mut self, store: &mut AnnotationStore, action: HistoryAction) -> bool {
        if !store.apply(&action) {
            return false;
        }

        self.undo.push(action);
        self.redo.clear();
        true
    }

    /// Reverts the most recent action. Returns it, or `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self, store: &mut AnnotationStore) -> Option<HistoryAction> {
        let action = self.undo.pop()?;
        store.apply(&action.inverse());
        self.redo.push(action.clone());
        Some(action)
    }

    /// Re-applies the most recently undone action.
    pub fn redo(&mut self, store: &mut AnnotationStore) -> Option<HistoryAction> {
        let action = self.redo.pop()?;
        store.apply(&action);
        self.undo.push(action.clone());
        Some(action)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{new_annotation_id, Color, FracPoint, FracRect, Highlight, Stroke};

    fn add_stroke(page: u32) -> HistoryAction {
        HistoryAction::AddStroke {
            stroke: Stroke {
                id: new_annotation_id(),
                page,
                points: vec![FracPoint::new(0.1, 0.1), FracPoint::new(0.4, 0.6)],
                color: Color::rgb(0xff, 0x9a, 0x3d),
                width: 2.0,
            },
        }
    }

    fn add_highlight(page: u32) -> HistoryAction {
        HistoryAction::AddHighlight {
            highlight: Highlight {
                id: new_annotation_id(),
                page,
                rect: FracRect::new(0.1, 0.2, 0.3, 0.05),
                color: Color::rgb(0xff, 0xe0, 0x8a),
                opacity: 0.4,
            },
        }
    }

    #[test]
    fn undo_n_times_restores_initial_state_and_redo_restores_final() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();

        let stroke = add_stroke(1);
        let highlight = add_highlight(2);
        let HistoryAction::AddStroke { stroke: stored } = stroke.clone() else {
            unreachable!()
        };
        let actions = vec![
            stroke,
            highlight,
            add_stroke(2),
            HistoryAction::RemoveStroke { stroke: stored },
            add_highlight(1),
        ];

        let before = store.snapshot();
        for action in actions.iter().cloned() {
            assert!(history.record(&mut store, action));
        }
        let after = store.snapshot();

        for _ in 0..actions.len() {
            assert!(history.undo(&mut store).is_some());
        }
        assert_eq!(store.snapshot(), before);
        assert!(history.undo(&mut store).is_none());

        for _ in 0..actions.len() {
            assert!(history.redo(&mut store).is_some());
        }
        assert_eq!(store.snapshot(), after);
    }

    #[test]
    fn recording_after_undo_clears_redo() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();

        history.record(&mut store, add_stroke(1));
        history.record(&mut store, add_stroke(1));
        history.undo(&mut store);
        assert!(history.can_redo());

        history.record(&mut store, add_highlight(1));

        assert!(!history.can_redo());
        assert!(history.redo(&mut store).is_none());
        assert_eq!(store.stroke_count(), 1);
        assert_eq!(store.highlight_count(), 1);
    }

    #[test]
    fn rejected_action_is_not_recorded() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();

        let HistoryAction::AddStroke { stroke } = add_stroke(1) else { unreachable!() };
        let missing = HistoryAction::RemoveStroke { stroke };

        assert!(!history.record(&mut store, missing));
        assert!(!history.can_undo());
    }

    #[test]
    fn rejected_action_keeps_redo_stack() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();
        history.record(&mut store, add_stroke(1));
        history.undo(&mut store);

        let HistoryAction::AddStroke { mut stroke } = add_stroke(1) else { unreachable!() };
        stroke.points.clear();

        assert!(!history.record(&mut store, HistoryAction::AddStroke { stroke }));
        assert_eq!(history.redo_len(), 1);
    }

    #[test]
    fn undo_on_empty_history_is_a_noop() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();

        assert!(history.undo(&mut store).is_none());
        assert!(history.redo(&mut store).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn undo_of_removal_brings_the_object_back() {
        let mut store = AnnotationStore::new();
        let mut history = History::new();
        let action = add_highlight(3);
        let HistoryAction::AddHighlight { highlight } = action.clone() else { unreachable!() };

        history.record(&mut store, action);
        history.record(&mut store, HistoryAction::RemoveHighlight { highlight: highlight.clone() });
        assert!(store.highlights_for_page(3).is_empty());

        let undone = history.undo(&mut store).expect("removal should be undoable");
        assert!(matches!(undone, HistoryAction::RemoveHighlight { .. }));
        assert_eq!(store.highlights_for_page(3), vec![&highlight]);
    }
}
