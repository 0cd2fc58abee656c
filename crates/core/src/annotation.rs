//! Per-page annotation storage
//!
//! Strokes and highlights are stored in fractional page coordinates and are
//! immutable once stored: an edit is always a removal followed by an addition.
//! Their mutators are crate-private so every change flows through
//! [`History::record`](crate::history::History::record).
//!
//! Inline text items and sticky notes live beside them but are edited in
//! place and are not part of the undo history.

use doc_model::{
    AnnotationId, AnnotationSnapshot, FracRect, Highlight, HistoryAction, InlineTextItem,
    StickyNote, Stroke,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Collection of every annotation on the open document.
///
/// Each stroke or highlight is keyed by a per-store ordinal assigned on its
/// first insertion. Re-adding the same id (for example through undo) reuses
/// that ordinal, so the drawing order after undo matches the order before.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    strokes: BTreeMap<u32, BTreeMap<u64, Stroke>>,
    highlights: BTreeMap<u32, BTreeMap<u64, Highlight>>,
    texts: Vec<InlineTextItem>,
    notes: Vec<StickyNote>,
    /// Draw position per id. Entries outlive removal so an undone delete
    /// re-adds the annotation at its original place in the paint order.
    ordinals: HashMap<AnnotationId, u64>,
    next_ordinal: u64,
}

impl AnnotationStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh store from a serialized dump. Empty strokes are skipped.
    pub fn from_snapshot(snapshot: AnnotationSnapshot) -> Self {
        let mut store = Self::new();
        for stroke in snapshot.strokes {
            store.add_stroke(stroke);
        }
        for highlight in snapshot.highlights {
            store.add_highlight(highlight);
        }
        store.texts = snapshot.texts;
        store.notes = snapshot.notes;
        store
    }

    fn ordinal_for(&mut self, id: AnnotationId) -> u64 {
        if let Some(ordinal) = self.ordinals.get(&id) {
            return *ordinal;
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.ordinals.insert(id, ordinal);
        ordinal
    }

    /// Stores a stroke. Returns `false` for an empty stroke or a duplicate id.
    pub(crate) fn add_stroke(&mut self, stroke: Stroke) -> bool {
        if stroke.points.is_empty() || self.stroke(stroke.page, stroke.id).is_some() {
            return false;
        }

        let ordinal = self.ordinal_for(stroke.id);
        self.strokes.entry(stroke.page).or_default().insert(ordinal, stroke);
        true
    }

    pub(crate) fn remove_stroke(&mut self, page: u32, id: AnnotationId) -> Option<Stroke> {
        let ordinal = *self.ordinals.get(&id)?;
        let on_page = self.strokes.get_mut(&page)?;
        let removed = on_page.remove(&ordinal);
        if on_page.is_empty() {
            self.strokes.remove(&page);
        }
        removed
    }

    /// Stores a highlight. Returns `false` for a negative extent or a duplicate
    /// id.
    pub(crate) fn add_highlight(&mut self, highlight: Highlight) -> bool {
        if highlight.rect.width < 0.0
            || highlight.rect.height < 0.0
            || self.highlight(highlight.page, highlight.id).is_some()
        {
            return false;
        }

        let ordinal = self.ordinal_for(highlight.id);
        self.highlights.entry(highlight.page).or_default().insert(ordinal, highlight);
        true
    }

    pub(crate) fn remove_highlight(&mut self, page: u32, id: AnnotationId) -> Option<Highlight> {
        let ordinal = *self.ordinals.get(&id)?;
        let on_page = self.highlights.get_mut(&page)?;
        let removed = on_page.remove(&ordinal);
        if on_page.is_empty() {
            self.highlights.remove(&page);
        }
        removed
    }

    /// Applies one history action. Returns `false` when the store rejected it
    /// (nothing to remove, or an invalid addition).
    pub(crate) fn apply(&mut self, action: &HistoryAction) -> bool {
        match action {
            HistoryAction::AddStroke { stroke } => self.add_stroke(stroke.clone()),
            HistoryAction::RemoveStroke { stroke } => {
                self.remove_stroke(stroke.page, stroke.id).is_some()
            }
            HistoryAction::AddHighlight { highlight } => self.add_highlight(highlight.clone()),
            HistoryAction::RemoveHighlight { highlight } => {
                self.remove_highlight(highlight.page, highlight.id).is_some()
            }
        }
    }

    pub fn stroke(&self, page: u32, id: AnnotationId) -> Option<&Stroke> {
        let ordinal = self.ordinals.get(&id)?;
        self.strokes.get(&page)?.get(ordinal)
    }

    pub fn highlight(&self, page: u32, id: AnnotationId) -> Option<&Highlight> {
        let ordinal = self.ordinals.get(&id)?;
        self.highlights.get(&page)?.get(ordinal)
    }

    /// Strokes on `page` in drawing order.
    pub fn strokes_for_page(&self, page: u32) -> Vec<&Stroke> {
        self.strokes.get(&page).map(|on_page| on_page.values().collect()).unwrap_or_default()
    }

    /// Highlights on `page` in drawing order.
    pub fn highlights_for_page(&self, page: u32) -> Vec<&Highlight> {
        self.highlights.get(&page).map(|on_page| on_page.values().collect()).unwrap_or_default()
    }

    pub fn texts(&self) -> &[InlineTextItem] {
        &self.texts
    }

    pub fn texts_for_page(&self, page: u32) -> Vec<&InlineTextItem> {
        self.texts.iter().filter(|item| item.page == page).collect()
    }

    pub fn notes(&self) -> &[StickyNote] {
        &self.notes
    }

    pub fn notes_for_page(&self, page: u32) -> Vec<&StickyNote> {
        self.notes.iter().filter(|note| note.page == page).collect()
    }

    pub(crate) fn add_text(&mut self, item: InlineTextItem) {
        self.texts.push(item);
    }

    pub(crate) fn set_text(&mut self, id: AnnotationId, text: String) -> bool {
        match self.texts.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.text = text;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_text(&mut self, id: AnnotationId) -> Option<InlineTextItem> {
        let index = self.texts.iter().position(|item| item.id == id)?;
        Some(self.texts.remove(index))
    }

    pub(crate) fn add_note(&mut self, note: StickyNote) {
        self.notes.push(note);
    }

    pub(crate) fn update_note(
        &mut self,
        id: AnnotationId,
        rect: Option<FracRect>,
        text: Option<String>,
    ) -> bool {
        let Some(note) = self.notes.iter_mut().find(|note| note.id == id) else {
            return false;
        };

        if let Some(rect) = rect {
            note.rect = rect;
        }
        if let Some(text) = text {
            note.text = text;
        }
        true
    }

    pub(crate) fn remove_note(&mut self, id: AnnotationId) -> Option<StickyNote> {
        let index = self.notes.iter().position(|note| note.id == id)?;
        Some(self.notes.remove(index))
    }

    /// Every page number that carries at least one annotation of any kind.
    pub fn annotated_pages(&self) -> BTreeSet<u32> {
        self.strokes
            .keys()
            .chain(self.highlights.keys())
            .copied()
            .chain(self.texts.iter().map(|item| item.page))
            .chain(self.notes.iter().map(|note| note.page))
            .collect()
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.values().map(BTreeMap::len).sum()
    }

    pub fn highlight_count(&self) -> usize {
        self.highlights.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
            && self.highlights.is_empty()
            && self.texts.is_empty()
            && self.notes.is_empty()
    }

    /// Clear all annotations
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Serializable copy of the store, pages in ascending order.
    pub fn snapshot(&self) -> AnnotationSnapshot {
        AnnotationSnapshot {
            strokes: self.strokes.values().flat_map(|on_page| on_page.values().cloned()).collect(),
            highlights: self
                .highlights
                .values()
                .flat_map(|on_page| on_page.values().cloned())
                .collect(),
            texts: self.texts.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{new_annotation_id, Color, FracPoint};

    fn stroke(page: u32) -> Stroke {
        Stroke {
            id: new_annotation_id(),
            page,
            points: vec![FracPoint::new(0.1, 0.1), FracPoint::new(0.2, 0.3)],
            color: Color::rgb(0xff, 0x9a, 0x3d),
            width: 2.0,
        }
    }

    fn highlight(page: u32) -> Highlight {
        Highlight {
            id: new_annotation_id(),
            page,
            rect: FracRect::new(0.2, 0.2, 0.3, 0.1),
            color: Color::rgb(0xff, 0xe0, 0x8a),
            opacity: 0.4,
        }
    }

    #[test]
    fn strokes_are_scoped_to_their_page() {
        let mut store = AnnotationStore::new();
        let first = stroke(1);
        let second = stroke(2);

        assert!(store.add_stroke(first.clone()));
        assert!(store.add_stroke(second));

        assert_eq!(store.strokes_for_page(1), vec![&first]);
        assert_eq!(store.strokes_for_page(2).len(), 1);
        assert!(store.strokes_for_page(3).is_empty());
    }

    #[test]
    fn empty_strokes_are_rejected() {
        let mut store = AnnotationStore::new();
        let mut empty = stroke(1);
        empty.points.clear();

        assert!(!store.add_stroke(empty));
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = AnnotationStore::new();
        let item = highlight(1);

        assert!(store.add_highlight(item.clone()));
        assert!(!store.add_highlight(item));
        assert_eq!(store.highlight_count(), 1);
    }

    #[test]
    fn remove_returns_the_full_object() {
        let mut store = AnnotationStore::new();
        let item = highlight(4);
        store.add_highlight(item.clone());

        assert_eq!(store.remove_highlight(4, item.id), Some(item.clone()));
        assert_eq!(store.remove_highlight(4, item.id), None);
        assert!(store.annotated_pages().is_empty());
    }

    #[test]
    fn remove_on_wrong_page_is_a_noop() {
        let mut store = AnnotationStore::new();
        let item = stroke(1);
        store.add_stroke(item.clone());

        assert_eq!(store.remove_stroke(2, item.id), None);
        assert_eq!(store.stroke_count(), 1);
    }

    #[test]
    fn re_adding_restores_original_drawing_order() {
        let mut store = AnnotationStore::new();
        let (a, b, c) = (stroke(1), stroke(1), stroke(1));
        for item in [&a, &b, &c] {
            store.add_stroke(item.clone());
        }

        let removed = store.remove_stroke(1, a.id).expect("stroke should exist");
        store.add_stroke(removed);

        assert_eq!(store.strokes_for_page(1), vec![&a, &b, &c]);
    }

    #[test]
    fn text_items_are_edited_in_place() {
        let mut store = AnnotationStore::new();
        let item = InlineTextItem {
            id: new_annotation_id(),
            page: 1,
            x_px: 10.0,
            y_px: 20.0,
            text: "New Text".into(),
            font_size: 14.0,
            color: Color::BLACK,
            origin_scale: 1.0,
        };
        store.add_text(item.clone());

        assert!(store.set_text(item.id, "Edited".into()));
        assert_eq!(store.texts()[0].text, "Edited");
        assert!(store.remove_text(item.id).is_some());
        assert!(!store.set_text(item.id, "gone".into()));
    }

    #[test]
    fn snapshot_round_trips_through_from_snapshot() {
        let mut store = AnnotationStore::new();
        store.add_stroke(stroke(2));
        store.add_highlight(highlight(1));
        store.add_note(StickyNote {
            id: new_annotation_id(),
            page: 1,
            rect: FracRect::new(0.5, 0.5, 0.2, 0.1),
            text: "check this".into(),
            color: "blue".into(),
        });

        let rebuilt = AnnotationStore::from_snapshot(store.snapshot());

        assert_eq!(rebuilt.snapshot(), store.snapshot());
        assert_eq!(rebuilt.annotated_pages().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = AnnotationStore::new();
        store.add_stroke(stroke(1));
        store.add_highlight(highlight(1));

        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.stroke_count(), 0);
    }
}
