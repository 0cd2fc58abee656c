//! PDF export with annotations merged into the page content
//!
//! Strokes become stroked vector paths and highlights become semi-transparent
//! filled rectangles, appended to each page's content stream. The page's
//! original content is wrapped in `q`/`Q` so the graphics state it leaves
//! behind cannot leak into the appended drawing. Sticky notes are either
//! flattened into the content or attached as `/Text` annotation dictionaries.
//!
//! Pages without annotations are passed through untouched. The whole document
//! is re-serialized, so the output is a complete file rather than an
//! incremental update.

use crate::annotation::AnnotationStore;
use doc_model::{Color, FracPoint, FracRect, Highlight, InlineTextItem, StickyNote, Stroke};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdf_engine::{inherited_attribute, media_box};
use std::fmt::Write as FmtWrite;
use viewer_core::{fraction_to_page_space, normalize_rotation, rotated_size, unrotate_fraction};

const FONT_RESOURCE: &str = "PCFont1";
const NOTE_FONT_SIZE: f32 = 10.0;
const NOTE_LINE_HEIGHT: f32 = 12.0;
const NOTE_OPACITY: f32 = 0.8;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("source is not a valid PDF: {0}")]
    InvalidSource(#[source] lopdf::Error),
    #[error("source PDF has no pages")]
    NoPages,
    #[error("annotation on page {page} but the document has {page_count} pages")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("no document loaded")]
    NoDocument,
    #[error("malformed page object: {0}")]
    Malformed(#[source] lopdf::Error),
    #[error("failed to write content stream: {0}")]
    Format(#[from] std::fmt::Error),
    #[error("failed to serialize PDF: {0}")]
    Serialize(String),
}

/// How sticky notes are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Draw notes into the page content as filled, bordered boxes with text.
    pub flatten_notes: bool,

    /// Attach notes as `/Annot /Text` dictionaries in the page's `/Annots`.
    pub note_annotations: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { flatten_notes: true, note_annotations: false }
    }
}

/// Page box in PDF user space.
///
/// Stored fractions are relative to the page as displayed without any view
/// rotation, which already includes the page's own `/Rotate`. That rotation is
/// undone before mapping into the unrotated media box.
#[derive(Debug, Clone, Copy)]
struct PageGeometry {
    origin: (f32, f32),
    width: f32,
    height: f32,
    rotate: u16,
}

impl PageGeometry {
    fn read(doc: &Document, page_id: ObjectId) -> Self {
        let (x0, y0, width, height) = media_box(doc, page_id);
        let rotate = inherited_attribute(doc, page_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .map(|degrees| normalize_rotation(degrees as i32))
            .unwrap_or(0);

        Self { origin: (x0, y0), width, height, rotate }
    }

    fn point(&self, point: FracPoint) -> (f32, f32) {
        let point = unrotate_fraction(point, self.rotate);
        fraction_to_page_space(point, self.origin, self.width, self.height)
    }

    /// Page-space position of a point given in points from the top-left corner
    /// of the page as displayed.
    fn displayed_point(&self, x_pt: f32, y_pt: f32) -> (f32, f32) {
        let (width, height) = rotated_size(self.width, self.height, self.rotate);
        if width <= 0.0 || height <= 0.0 {
            return self.origin;
        }
        self.point(FracPoint::new(x_pt / width, y_pt / height))
    }

    /// `(x, y, width, height)` of a fractional rectangle, `y` at its bottom.
    fn rect(&self, rect: FracRect) -> (f32, f32, f32, f32) {
        let (ax, ay) = self.point(FracPoint::new(rect.x, rect.y));
        let (bx, by) = self.point(FracPoint::new(rect.x + rect.width, rect.y + rect.height));
        (ax.min(bx), ay.min(by), (ax - bx).abs(), (ay - by).abs())
    }
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    size: f32,
    leading: f32,
    color: Color,
    rotate: u16,
}

/// Accumulates drawing operators for one page plus the resources they need.
#[derive(Debug, Default)]
struct PagePainter {
    content: String,
    opacities: Vec<f32>,
    uses_font: bool,
}

impl PagePainter {
    fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    fn graphics_state(&mut self, opacity: f32) -> String {
        let index = match self.opacities.iter().position(|known| *known == opacity) {
            Some(index) => index,
            None => {
                self.opacities.push(opacity);
                self.opacities.len() - 1
            }
        };
        format!("PCGs{index}")
    }

    fn stroke(&mut self, geometry: PageGeometry, stroke: &Stroke) -> Result<(), ExportError> {
        let Some((first, rest)) = stroke.points.split_first() else {
            return Ok(());
        };

        let (r, g, b) = stroke.color.to_normalized();
        writeln!(self.content, "q")?;
        writeln!(self.content, "{r:.3} {g:.3} {b:.3} RG")?;
        writeln!(self.content, "{:.3} w 1 J 1 j", stroke.width)?;

        let (x, y) = geometry.point(*first);
        writeln!(self.content, "{x:.3} {y:.3} m")?;
        if rest.is_empty() {
            // A lone point still leaves a dot thanks to the round cap.
            writeln!(self.content, "{x:.3} {y:.3} l")?;
        }
        for point in rest {
            let (x, y) = geometry.point(*point);
            writeln!(self.content, "{x:.3} {y:.3} l")?;
        }

        writeln!(self.content, "S")?;
        writeln!(self.content, "Q")?;
        Ok(())
    }

    fn highlight(
        &mut self,
        geometry: PageGeometry,
        highlight: &Highlight,
    ) -> Result<(), ExportError> {
        let (x, y, width, height) = geometry.rect(highlight.rect);
        let (r, g, b) = highlight.color.to_normalized();
        let state = self.graphics_state(highlight.opacity.clamp(0.0, 1.0));

        writeln!(self.content, "q")?;
        writeln!(self.content, "/{state} gs")?;
        writeln!(self.content, "{r:.3} {g:.3} {b:.3} rg")?;
        writeln!(self.content, "{x:.3} {y:.3} {width:.3} {height:.3} re")?;
        writeln!(self.content, "f")?;
        writeln!(self.content, "Q")?;
        Ok(())
    }

    fn note(&mut self, geometry: PageGeometry, note: &StickyNote) -> Result<(), ExportError> {
        let (x, y, width, height) = geometry.rect(note.rect);
        let (shown_width, shown_height) =
            rotated_size(geometry.width, geometry.height, geometry.rotate);
        let (r, g, b) = note.fill_rgb();
        let state = self.graphics_state(NOTE_OPACITY);

        writeln!(self.content, "q")?;
        writeln!(self.content, "/{state} gs")?;
        writeln!(self.content, "{r:.3} {g:.3} {b:.3} rg")?;
        writeln!(self.content, "0 0 0 RG 1 w")?;
        writeln!(self.content, "{x:.3} {y:.3} {width:.3} {height:.3} re")?;
        writeln!(self.content, "B")?;
        writeln!(self.content, "Q")?;

        let text = if note.text.is_empty() { "(empty)" } else { note.text.as_str() };
        let anchor = geometry.displayed_point(
            note.rect.x * shown_width + 4.0,
            note.rect.y * shown_height + 14.0,
        );
        let style = TextStyle {
            size: NOTE_FONT_SIZE,
            leading: NOTE_LINE_HEIGHT,
            color: Color::BLACK,
            rotate: geometry.rotate,
        };
        self.text(text, anchor, style)
    }

    fn inline_text(
        &mut self,
        geometry: PageGeometry,
        item: &InlineTextItem,
    ) -> Result<(), ExportError> {
        let scale = if item.origin_scale > 0.0 { item.origin_scale } else { 1.0 };
        // The stored position is the top of the text box; PDF text starts at the baseline.
        let anchor =
            geometry.displayed_point(item.x_px / scale, item.y_px / scale + item.font_size);
        let style = TextStyle {
            size: item.font_size,
            leading: item.font_size * 1.2,
            color: item.color,
            rotate: geometry.rotate,
        };

        self.text(&item.text, anchor, style)
    }

    /// Writes `text` with its baseline starting at page-space `(x, y)`. On a
    /// page with `/Rotate` the text matrix turns the glyphs so they read
    /// upright once the page is displayed.
    fn text(
        &mut self,
        text: &str,
        (x, y): (f32, f32),
        style: TextStyle,
    ) -> Result<(), ExportError> {
        self.uses_font = true;
        let TextStyle { size, leading, color, rotate } = style;
        let (r, g, b) = color.to_normalized();

        writeln!(self.content, "BT")?;
        writeln!(self.content, "/{FONT_RESOURCE} {size:.3} Tf {leading:.3} TL")?;
        writeln!(self.content, "{r:.3} {g:.3} {b:.3} rg")?;
        match rotate {
            90 => writeln!(self.content, "0 1 -1 0 {x:.3} {y:.3} Tm")?,
            180 => writeln!(self.content, "-1 0 0 -1 {x:.3} {y:.3} Tm")?,
            270 => writeln!(self.content, "0 -1 1 0 {x:.3} {y:.3} Tm")?,
            _ => writeln!(self.content, "{x:.3} {y:.3} Td")?,
        }
        for (index, line) in text.lines().enumerate() {
            if index > 0 {
                writeln!(self.content, "T*")?;
            }
            writeln!(self.content, "({}) Tj", escape_literal(line))?;
        }
        writeln!(self.content, "ET")?;
        Ok(())
    }

    fn apply(self, doc: &mut Document, page_id: ObjectId) -> Result<(), ExportError> {
        let mut resources = inherited_attribute(doc, page_id, b"Resources")
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();

        if !self.opacities.is_empty() {
            let mut states = subdictionary(doc, &resources, b"ExtGState");
            for (index, opacity) in self.opacities.iter().enumerate() {
                states.set(
                    format!("PCGs{index}"),
                    dictionary! {
                        "Type" => "ExtGState",
                        "ca" => Object::Real(*opacity),
                        "CA" => Object::Real(*opacity),
                    },
                );
            }
            resources.set("ExtGState", states);
        }

        if self.uses_font {
            let mut fonts = subdictionary(doc, &resources, b"Font");
            fonts.set(
                FONT_RESOURCE,
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            );
            resources.set("Font", fonts);
        }

        let existing = existing_contents(doc, page_id)?;
        let mut contents = Vec::with_capacity(existing.len() + 2);
        if existing.is_empty() {
            let ours = doc.add_object(Stream::new(Dictionary::new(), self.content.into_bytes()));
            contents.push(Object::Reference(ours));
        } else {
            let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let mut body = b"Q\n".to_vec();
            body.extend_from_slice(self.content.as_bytes());
            let close = doc.add_object(Stream::new(Dictionary::new(), body));

            contents.push(Object::Reference(open));
            contents.extend(existing);
            contents.push(Object::Reference(close));
        }

        let page = page_dictionary_mut(doc, page_id)?;
        page.set("Resources", resources);
        page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

fn page_dictionary_mut(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<&mut Dictionary, ExportError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(ExportError::Malformed)
}

/// Copy of a resource category, resolving an indirect dictionary.
fn subdictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    match resources.get(key) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, ExportError> {
    let page = doc.get_dictionary(page_id).map_err(ExportError::Malformed)?;

    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(parts)) => parts.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(parts)) => parts.clone(),
        _ => Vec::new(),
    })
}

fn add_note_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    geometry: PageGeometry,
    note: &StickyNote,
) -> Result<(), ExportError> {
    let (x, y, width, height) = geometry.rect(note.rect);
    let contents = if note.text.is_empty() { "Sticky Note" } else { note.text.as_str() };

    let annotation_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Rect" => vec![
            Object::Real(x),
            Object::Real(y),
            Object::Real(x + width),
            Object::Real(y + height),
        ],
        "Contents" => Object::String(contents.as_bytes().to_vec(), StringFormat::Literal),
        "Name" => "Comment",
        "C" => vec![Object::Real(1.0), Object::Real(1.0), Object::Real(0.0)],
        "Open" => false,
    });

    let page = doc.get_dictionary(page_id).map_err(ExportError::Malformed)?;
    let indirect_annots = match page.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    if let Some(annots_id) = indirect_annots {
        if let Ok(Object::Array(annots)) = doc.get_object_mut(annots_id) {
            annots.push(Object::Reference(annotation_id));
            return Ok(());
        }
    }

    let page = page_dictionary_mut(doc, page_id)?;
    if let Ok(Object::Array(annots)) = page.get_mut(b"Annots") {
        annots.push(Object::Reference(annotation_id));
    } else {
        page.set("Annots", Object::Array(vec![Object::Reference(annotation_id)]));
    }
    Ok(())
}

/// Escapes a string for a PDF literal. Characters outside printable ASCII
/// are replaced, since the standard font is written with WinAnsi encoding.
fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' '..='~' => escaped.push(ch),
            _ => escaped.push('?'),
        }
    }
    escaped
}

/// Writes every annotation in `store` into a copy of `source`.
///
/// Fails without producing output when `source` does not parse, has no pages,
/// or when an annotation refers to a page the document does not have.
pub fn merge_annotations(
    source: &[u8],
    store: &AnnotationStore,
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut doc = Document::load_mem(source).map_err(ExportError::InvalidSource)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ExportError::NoPages);
    }

    let page_count = pages.len() as u32;
    if let Some(page) = store.annotated_pages().into_iter().find(|page| !pages.contains_key(page)) {
        return Err(ExportError::PageOutOfRange { page, page_count });
    }

    let mut modified_pages = 0usize;
    for (page_number, page_id) in pages {
        let geometry = PageGeometry::read(&doc, page_id);
        let mut painter = PagePainter::default();

        for highlight in store.highlights_for_page(page_number) {
            painter.highlight(geometry, highlight)?;
        }
        for stroke in store.strokes_for_page(page_number) {
            painter.stroke(geometry, stroke)?;
        }
        for item in store.texts_for_page(page_number) {
            painter.inline_text(geometry, item)?;
        }

        let notes = store.notes_for_page(page_number);
        if options.flatten_notes {
            for note in &notes {
                painter.note(geometry, note)?;
            }
        }
        if options.note_annotations {
            for note in &notes {
                add_note_annotation(&mut doc, page_id, geometry, note)?;
            }
        }

        let attached_notes = options.note_annotations && !notes.is_empty();
        if !painter.is_empty() {
            painter.apply(&mut doc, page_id)?;
            modified_pages += 1;
        } else if attached_notes {
            modified_pages += 1;
        }
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| ExportError::Serialize(e.to_string()))?;

    log::info!(
        "exported {page_count} pages ({modified_pages} annotated): {} strokes, {} highlights",
        store.stroke_count(),
        store.highlight_count()
    );
    log::debug!("export wrote {} bytes", buffer.len());
    Ok(buffer)
}
