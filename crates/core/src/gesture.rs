//! Single-pointer capture for the draw and highlight tools.

use doc_model::{
    new_annotation_id, FracPoint, FracRect, Highlight, HistoryAction, Stroke, Tool, ViewerConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Stroke { page: u32, points: Vec<FracPoint> },
    Highlight { page: u32, start: FracPoint, current: FracPoint },
}

impl Gesture {
    pub fn page(&self) -> u32 {
        match self {
            Self::Stroke { page, .. } | Self::Highlight { page, .. } => *page,
        }
    }
}

/// Tracks at most one pointer-down -> move -> up sequence.
#[derive(Debug, Clone, Default)]
pub struct GestureCapture {
    active: Option<Gesture>,
}

impl GestureCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Gesture> {
        self.active.as_ref()
    }

    /// Starts a capture. Refused while another capture is running or when
    /// `tool` does not draw.
    pub fn begin(&mut self, tool: Tool, page: u32, point: FracPoint) -> bool {
        if self.active.is_some() {
            return false;
        }

        self.active = match tool {
            Tool::Draw => Some(Gesture::Stroke { page, points: vec![point] }),
            Tool::Highlight => Some(Gesture::Highlight { page, start: point, current: point }),
            Tool::Text => None,
        };
        self.active.is_some()
    }

    pub fn update(&mut self, point: FracPoint) {
        match &mut self.active {
            Some(Gesture::Stroke { points, .. }) => points.push(point),
            Some(Gesture::Highlight { current, .. }) => *current = point,
            None => {}
        }
    }

    /// Live rectangle of a highlight drag.
    pub fn preview_rect(&self) -> Option<FracRect> {
        match &self.active {
            Some(Gesture::Highlight { start, current, .. }) => {
                Some(FracRect::from_corners(*start, *current))
            }
            _ => None,
        }
    }

    pub fn live_points(&self) -> Option<&[FracPoint]> {
        match &self.active {
            Some(Gesture::Stroke { points, .. }) => Some(points),
            _ => None,
        }
    }

    /// Ends the capture and turns it into the action to record.
    ///
    /// A stroke needs at least one move after the pointer went down. A
    /// highlight needs an area of at least `config.min_highlight_area`.
    pub fn finish(&mut self, config: &ViewerConfig) -> Option<HistoryAction> {
        match self.active.take()? {
            Gesture::Stroke { page, points } => {
                if points.len() < 2 {
                    return None;
                }

                Some(HistoryAction::AddStroke {
                    stroke: Stroke {
                        id: new_annotation_id(),
                        page,
                        points,
                        color: config.stroke_color,
                        width: config.stroke_width,
                    },
                })
            }
            Gesture::Highlight { page, start, current } => {
                let rect = FracRect::from_corners(start, current);
                if rect.area() < config.min_highlight_area {
                    return None;
                }

                Some(HistoryAction::AddHighlight {
                    highlight: Highlight {
                        id: new_annotation_id(),
                        page,
                        rect,
                        color: config.highlight_color,
                        opacity: config.highlight_opacity,
                    },
                })
            }
        }
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }
}
