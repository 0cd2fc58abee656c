use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AnnotationId = uuid::Uuid;

pub fn new_annotation_id() -> AnnotationId {
    uuid::Uuid::new_v4()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    Draw,
    Highlight,
    Text,
}

impl Tool {
    pub fn captures_pointer(self) -> bool {
        matches!(self, Self::Draw | Self::Highlight)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("color must start with '#': {0}")]
    MissingHash(String),
    #[error("color must have 3 or 6 hex digits: {0}")]
    BadLength(String),
    #[error("invalid hex digit in color: {0}")]
    BadDigit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_normalized(self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some(hex) = value.strip_prefix('#') else {
            return Err(ColorParseError::MissingHash(value.to_owned()));
        };

        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_owned(),
            _ => return Err(ColorParseError::BadLength(value.to_owned())),
        };

        let channel = |range: std::ops::Range<usize>| {
            expanded
                .get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| ColorParseError::BadDigit(value.to_owned()))
        };

        Ok(Self { r: channel(0..2)?, g: channel(2..4)?, b: channel(4..6)? })
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A point expressed as a fraction of the unrotated page box, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FracPoint {
    pub x: f32,
    pub y: f32,
}

impl FracPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FracRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FracRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_corners(a: FracPoint, b: FracPoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: AnnotationId,
    pub page: u32,
    pub points: Vec<FracPoint>,
    pub color: Color,
    /// Width in CSS pixels at 100% zoom.
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: AnnotationId,
    pub page: u32,
    pub rect: FracRect,
    pub color: Color,
    pub opacity: f32,
}

/// Free text placed on a page. Unlike strokes and highlights the position is
/// kept in rendered pixels, together with the zoom that was active when the
/// item was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineTextItem {
    pub id: AnnotationId,
    pub page: u32,
    pub x_px: f32,
    pub y_px: f32,
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub origin_scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: AnnotationId,
    pub page: u32,
    pub rect: FracRect,
    pub text: String,
    pub color: String,
}

impl StickyNote {
    pub fn fill_rgb(&self) -> (f32, f32, f32) {
        match self.color.as_str() {
            "yellow" => (1.0, 1.0, 0.6),
            "blue" => (0.6, 0.8, 1.0),
            "pink" => (1.0, 0.7, 0.8),
            "green" => (0.6, 1.0, 0.6),
            _ => (1.0, 1.0, 0.7),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HistoryAction {
    AddStroke { stroke: Stroke },
    RemoveStroke { stroke: Stroke },
    AddHighlight { highlight: Highlight },
    RemoveHighlight { highlight: Highlight },
}

impl HistoryAction {
    pub fn inverse(&self) -> Self {
        match self {
            Self::AddStroke { stroke } => Self::RemoveStroke { stroke: stroke.clone() },
            Self::RemoveStroke { stroke } => Self::AddStroke { stroke: stroke.clone() },
            Self::AddHighlight { highlight } => {
                Self::RemoveHighlight { highlight: highlight.clone() }
            }
            Self::RemoveHighlight { highlight } => {
                Self::AddHighlight { highlight: highlight.clone() }
            }
        }
    }

    pub fn id(&self) -> AnnotationId {
        match self {
            Self::AddStroke { stroke } | Self::RemoveStroke { stroke } => stroke.id,
            Self::AddHighlight { highlight } | Self::RemoveHighlight { highlight } => highlight.id,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::AddStroke { stroke } | Self::RemoveStroke { stroke } => stroke.page,
            Self::AddHighlight { highlight } | Self::RemoveHighlight { highlight } => {
                highlight.page
            }
        }
    }
}

/// Serializable dump of every annotation on a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSnapshot {
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub texts: Vec<InlineTextItem>,
    #[serde(default)]
    pub notes: Vec<StickyNote>,
}

impl AnnotationSnapshot {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
            && self.highlights.is_empty()
            && self.texts.is_empty()
            && self.notes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    pub current_page: Option<u32>,
    pub total_pages: u32,
    pub scale: f32,
    pub rotation: u16,
    pub file_loaded: bool,
}

impl ViewerState {
    pub fn empty(scale: f32) -> Self {
        Self { current_page: None, total_pages: 0, scale, rotation: 0, file_loaded: false }
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            current_page: self.current_page,
            total_pages: self.total_pages,
            scale: self.scale,
        }
    }

    /// Whether any field the hosting shell listens to differs.
    pub fn broadcast_differs(&self, other: &ViewerState) -> bool {
        self.current_page != other.current_page
            || self.total_pages != other.total_pages
            || self.scale != other.scale
            || self.file_loaded != other.file_loaded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerSnapshot {
    pub current_page: Option<u32>,
    pub total_pages: u32,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub initial_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub zoom_step: f32,
    pub estimated_page_height_px: f32,
    pub page_margin_px: f32,
    pub overscan: usize,
    pub device_pixel_ratio: f32,
    pub stroke_color: Color,
    pub stroke_width: f32,
    pub highlight_color: Color,
    pub highlight_opacity: f32,
    /// Highlights whose fractional area is below this are dropped on release.
    pub min_highlight_area: f32,
    pub text_font_size: f32,
    pub text_color: Color,
    pub default_text: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.0,
            min_scale: 0.5,
            max_scale: 3.0,
            zoom_step: 0.2,
            estimated_page_height_px: 1014.0,
            page_margin_px: 40.0,
            overscan: 5,
            device_pixel_ratio: 1.0,
            stroke_color: Color::rgb(0xff, 0x9a, 0x3d),
            stroke_width: 2.0,
            highlight_color: Color::rgb(0xff, 0xe0, 0x8a),
            highlight_opacity: 0.4,
            min_highlight_area: 1e-6,
            text_font_size: 14.0,
            text_color: Color::BLACK,
            default_text: "New Text".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke() -> Stroke {
        Stroke {
            id: new_annotation_id(),
            page: 2,
            points: vec![FracPoint::new(0.1, 0.2)],
            color: Color::rgb(255, 154, 61),
            width: 2.0,
        }
    }

    #[test]
    fn parses_long_and_short_hex_colors() {
        assert_eq!("#ff9a3d".parse::<Color>(), Ok(Color::rgb(255, 154, 61)));
        assert_eq!("#000".parse::<Color>(), Ok(Color::BLACK));
        assert_eq!("#FFE08A".parse::<Color>(), Ok(Color::rgb(255, 224, 138)));
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(matches!("ff9a3d".parse::<Color>(), Err(ColorParseError::MissingHash(_))));
        assert!(matches!("#ff9a".parse::<Color>(), Err(ColorParseError::BadLength(_))));
        assert!(matches!("#gg9a3d".parse::<Color>(), Err(ColorParseError::BadDigit(_))));
    }

    #[test]
    fn color_serializes_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(255, 154, 61)).expect("serialize");
        assert_eq!(json, "\"#ff9a3d\"");

        let parsed: Color = serde_json::from_str("\"#ffe08a\"").expect("deserialize");
        assert_eq!(parsed, Color::rgb(255, 224, 138));
    }

    #[test]
    fn rect_from_corners_normalizes_drag_direction() {
        let rect = FracRect::from_corners(FracPoint::new(0.5, 0.6), FracPoint::new(0.2, 0.1));
        assert_eq!(rect.x, 0.2);
        assert_eq!(rect.y, 0.1);
        assert!((rect.width - 0.3).abs() < 1e-6);
        assert!((rect.height - 0.5).abs() < 1e-6);
    }

    #[test]
    fn inverse_swaps_add_and_remove() {
        let stroke = stroke();
        let add = HistoryAction::AddStroke { stroke: stroke.clone() };

        assert_eq!(add.inverse(), HistoryAction::RemoveStroke { stroke });
        assert_eq!(add.inverse().inverse(), add);
        assert_eq!(add.page(), 2);
    }

    #[test]
    fn history_action_uses_kebab_case_tag() {
        let action = HistoryAction::AddStroke { stroke: stroke() };
        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(value["kind"], "add-stroke");
    }

    #[test]
    fn broadcast_ignores_rotation_changes() {
        let state = ViewerState::empty(1.0);
        let rotated = ViewerState { rotation: 90, ..state };
        let zoomed = ViewerState { scale: 1.2, ..state };

        assert!(!state.broadcast_differs(&rotated));
        assert!(state.broadcast_differs(&zoomed));
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: ViewerConfig =
            serde_json::from_str(r#"{ "max_scale": 4.0 }"#).expect("deserialize");

        assert_eq!(config.max_scale, 4.0);
        assert_eq!(config.min_scale, 0.5);
        assert_eq!(config.overscan, 5);
    }

    #[test]
    fn unknown_note_color_falls_back_to_light_yellow() {
        let note = StickyNote {
            id: new_annotation_id(),
            page: 1,
            rect: FracRect::new(0.0, 0.0, 0.1, 0.1),
            text: String::new(),
            color: "purple".to_owned(),
        };
        assert_eq!(note.fill_rgb(), (1.0, 1.0, 0.7));
    }
}
