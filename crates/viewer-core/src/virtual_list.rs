use std::ops::Range;

/// One materialized row of the page list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualItem {
    pub index: usize,
    pub start: f32,
    pub size: f32,
}

/// Vertical layout model for a long list of pages.
///
/// Every page starts at an estimated height. Once a page is rendered its real
/// layout height is measured in and the offsets of the following pages are
/// reflowed, so documents with mixed page sizes lay out correctly without
/// rendering every page up front.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualPageList {
    estimate_px: f32,
    overscan: usize,
    measured: Vec<Option<f32>>,
    starts: Vec<f32>,
    viewport_height_px: f32,
    scroll_offset_px: f32,
}

impl VirtualPageList {
    pub fn new(count: usize, estimate_px: f32, overscan: usize) -> Self {
        let mut list = Self {
            estimate_px: estimate_px.max(1.0),
            overscan,
            measured: Vec::new(),
            starts: Vec::new(),
            viewport_height_px: 800.0,
            scroll_offset_px: 0.0,
        };
        list.reset(count);
        list
    }

    /// Drops every measurement and lays out `count` pages at the estimate.
    pub fn reset(&mut self, count: usize) {
        self.measured = vec![None; count];
        self.scroll_offset_px = 0.0;
        self.reflow_from(0);
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn size_of(&self, index: usize) -> f32 {
        self.measured.get(index).copied().flatten().unwrap_or(self.estimate_px)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        matches!(self.measured.get(index), Some(Some(_)))
    }

    /// Records the real layout height of a page. Returns `true` when the
    /// layout changed.
    pub fn measure(&mut self, index: usize, height_px: f32) -> bool {
        let Some(slot) = self.measured.get_mut(index) else {
            return false;
        };

        if *slot == Some(height_px) {
            return false;
        }

        *slot = Some(height_px);
        self.reflow_from(index + 1);
        true
    }

    /// Forgets every measurement, e.g. after a zoom or rotation change.
    pub fn invalidate_measurements(&mut self) {
        self.measured.iter_mut().for_each(|slot| *slot = None);
        self.reflow_from(0);
    }

    pub fn offset_of(&self, index: usize) -> f32 {
        match self.starts.get(index) {
            Some(start) => *start,
            None => self.total_size(),
        }
    }

    pub fn total_size(&self) -> f32 {
        match self.starts.last() {
            Some(start) => start + self.size_of(self.starts.len() - 1),
            None => 0.0,
        }
    }

    pub fn set_viewport_height(&mut self, height_px: f32) {
        self.viewport_height_px = height_px.max(0.0);
        self.scroll_offset_px = self.scroll_offset_px.min(self.max_scroll_offset());
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height_px
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset_px
    }

    pub fn set_scroll_offset(&mut self, offset_px: f32) {
        self.scroll_offset_px = offset_px.clamp(0.0, self.max_scroll_offset());
    }

    /// Aligns the start of page `index` with the top of the viewport, as far as
    /// the scroll range allows. Returns the new scroll offset.
    pub fn scroll_to_index(&mut self, index: usize) -> f32 {
        if self.is_empty() {
            self.scroll_offset_px = 0.0;
            return 0.0;
        }

        let index = index.min(self.len() - 1);
        self.set_scroll_offset(self.offset_of(index));
        self.scroll_offset_px
    }

    /// Index of the page covering `offset_px`. Offsets past the end map to the
    /// last page.
    pub fn index_at_offset(&self, offset_px: f32) -> Option<usize> {
        if self.is_empty() {
            return None;
        }

        let offset = offset_px.max(0.0);
        let after = self.starts.partition_point(|start| *start <= offset);
        Some(after.saturating_sub(1))
    }

    /// Pages intersecting the viewport, without overscan.
    pub fn visible_range(&self) -> Range<usize> {
        let Some(first) = self.index_at_offset(self.scroll_offset_px) else {
            return 0..0;
        };

        let bottom = self.scroll_offset_px + self.viewport_height_px;
        let last = self.index_at_offset(bottom).unwrap_or(first);
        // A page that starts exactly at the bottom edge is not visible.
        let last = if last > first && self.offset_of(last) >= bottom { last - 1 } else { last };

        first..last + 1
    }

    /// Pages to keep mounted: the visible range widened by the overscan.
    pub fn materialized_range(&self) -> Range<usize> {
        let visible = self.visible_range();
        if visible.is_empty() {
            return visible;
        }

        let start = visible.start.saturating_sub(self.overscan);
        let end = (visible.end + self.overscan).min(self.len());
        start..end
    }

    pub fn virtual_items(&self) -> Vec<VirtualItem> {
        self.materialized_range()
            .map(|index| VirtualItem {
                index,
                start: self.offset_of(index),
                size: self.size_of(index),
            })
            .collect()
    }

    fn max_scroll_offset(&self) -> f32 {
        (self.total_size() - self.viewport_height_px).max(0.0)
    }

    fn reflow_from(&mut self, index: usize) {
        let count = self.measured.len();
        self.starts.resize(count, 0.0);

        let mut cursor = match index {
            0 => 0.0,
            i if i <= count => self.starts[i - 1] + self.size_of(i - 1),
            _ => return,
        };

        for i in index..count {
            self.starts[i] = cursor;
            cursor += self.size_of(i);
        }
    }
}
