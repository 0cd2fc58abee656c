use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use pdfcraft_scheduler::CancellationToken;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Rows rasterized between two cancellation checks.
const CANCEL_CHECK_ROWS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    /// For backends implementing [`PdfEngine`] outside this crate.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Natural size of a page in points, plus its intrinsic `/Rotate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
    pub rotate: u16,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0, rotate: 0 }
    }
}

/// How a page maps to output pixels at a given scale and view rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    /// Effective rotation: the page's `/Rotate` plus the view rotation.
    pub rotation: u16,
}

impl Viewport {
    pub fn new(page: PageSize, scale: f32, rotation: u16) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let rotation = (page.rotate + rotation) % 360;
        let (width, height) = if rotation % 180 == 90 {
            (page.height_pt * scale, page.width_pt * scale)
        } else {
            (page.width_pt * scale, page.height_pt * scale)
        };

        Self { width, height, scale, rotation }
    }

    /// Backing bitmap size for a device pixel ratio, so high-DPI output is not
    /// blurred.
    pub fn bitmap_size(&self, device_pixel_ratio: f32) -> (u32, u32) {
        let ratio = if device_pixel_ratio > 0.0 { device_pixel_ratio } else { 1.0 };
        (
            (self.width * ratio).round().max(1.0) as u32,
            (self.height * ratio).round().max(1.0) as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// 0-based page index.
    pub page_index: u32,
    pub scale: f32,
    pub rotation: u16,
    pub device_pixel_ratio: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0, rotation: 0, device_pixel_ratio: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("render cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Rendering collaborator used by the viewer.
pub trait PdfEngine {
    fn load_document(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;

    fn viewport(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        scale: f32,
        rotation: u16,
    ) -> Result<Viewport, PdfEngineError> {
        Ok(Viewport::new(self.page_size(handle, page_index)?, scale, rotation))
    }

    /// Rasterizes one page. Implementations must poll `token` and return
    /// [`PdfEngineError::Cancelled`] once it is cancelled.
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        token: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError>;

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSize>,
}

/// Default backend: reads page geometry with `lopdf` and produces blank page
/// bitmaps sized to the viewport.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let sizes: Vec<PageSize> =
            doc.get_pages().into_values().map(|page_id| read_page_size(&doc, page_id)).collect();

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// Looks up a page attribute, following `/Parent` links for inheritable keys.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    // The depth bound guards against cyclic /Parent chains.
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }

        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

/// Reads `/MediaBox` as `(x0, y0, width, height)`, defaulting to US Letter.
pub fn media_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .and_then(|array| {
            if array.len() != 4 {
                return None;
            }
            let x0 = array[0].as_float().ok()?;
            let y0 = array[1].as_float().ok()?;
            let x1 = array[2].as_float().ok()?;
            let y1 = array[3].as_float().ok()?;
            Some((x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs()))
        })
        .unwrap_or((0.0, 0.0, 612.0, 792.0))
}

fn read_page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    let (_, _, width_pt, height_pt) = media_box(doc, page_id);
    let rotate = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|degrees| degrees.rem_euclid(360) as u16 / 90 * 90)
        .unwrap_or(0);

    PageSize { width_pt, height_pt, rotate }
}

impl PdfEngine for LopdfEngine {
    fn load_document(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
        token: &CancellationToken,
    ) -> Result<RgbaImage, PdfEngineError> {
        if token.is_cancelled() {
            return Err(PdfEngineError::Cancelled);
        }

        let viewport = self.viewport(handle, request.page_index, request.scale, request.rotation)?;
        let (width, height) = viewport.bitmap_size(request.device_pixel_ratio);

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let border = Rgba([220, 220, 220, 255]);

        for y in 0..height {
            if y % CANCEL_CHECK_ROWS == 0 && token.is_cancelled() {
                return Err(PdfEngineError::Cancelled);
            }

            if width >= 4 && height >= 4 {
                if y == 0 || y == height - 1 {
                    for x in 0..width {
                        image.put_pixel(x, y, border);
                    }
                } else {
                    image.put_pixel(0, y, border);
                    image.put_pixel(width - 1, y, border);
                }
            }
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn sample_pdf_bytes(pages: &[(i64, i64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = pages
            .iter()
            .map(|&(width, height, rotate)| {
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                    "Rotate" => rotate,
                });
                page_id.into()
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("save should succeed");
        buffer
    }

    #[test]
    fn loads_pdf_and_reads_page_sizes() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .load_document(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, 0), (842, 595, 90)])))
            .expect("load should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);

        let second = engine.page_size(handle, 1).expect("size should succeed");
        assert_eq!(second, PageSize { width_pt: 842.0, height_pt: 595.0, rotate: 90 });
    }

    #[test]
    fn viewport_applies_scale_and_rotation() {
        let page = PageSize { width_pt: 600.0, height_pt: 800.0, rotate: 0 };

        let upright = Viewport::new(page, 1.5, 0);
        assert_eq!((upright.width, upright.height), (900.0, 1200.0));

        let turned = Viewport::new(page, 1.5, 270);
        assert_eq!((turned.width, turned.height), (1200.0, 900.0));
        assert_eq!(turned.rotation, 270);
    }

    #[test]
    fn intrinsic_rotate_combines_with_view_rotation() {
        let page = PageSize { width_pt: 600.0, height_pt: 800.0, rotate: 90 };
        let viewport = Viewport::new(page, 1.0, 270);

        assert_eq!(viewport.rotation, 0);
        assert_eq!((viewport.width, viewport.height), (600.0, 800.0));
    }

    #[test]
    fn bitmap_size_accounts_for_device_pixel_ratio() {
        let viewport = Viewport::new(PageSize::default(), 1.0, 0);
        assert_eq!(viewport.bitmap_size(2.0), (1224, 1584));
        assert_eq!(viewport.bitmap_size(0.0), (612, 792));
    }

    #[test]
    fn render_produces_bitmap_of_viewport_size() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .load_document(OpenSource::Bytes(sample_pdf_bytes(&[(200, 100, 0)])))
            .expect("load should succeed");

        let request =
            RenderRequest { page_index: 0, scale: 2.0, rotation: 90, device_pixel_ratio: 1.0 };
        let image = engine
            .render_page(handle, request, &CancellationToken::new())
            .expect("render should succeed");

        assert_eq!((image.width(), image.height()), (200, 400));
    }

    #[test]
    fn cancelled_token_aborts_render() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .load_document(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, 0)])))
            .expect("load should succeed");

        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .render_page(handle, RenderRequest::default(), &token)
            .expect_err("cancelled render should fail");
        assert!(matches!(err, PdfEngineError::Cancelled));
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .load_document(OpenSource::Bytes(b"not a pdf at all".to_vec()))
            .expect_err("load should fail");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .load_document(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, 0)])))
            .expect("load should succeed");

        let err = engine.page_size(handle, 4).expect_err("should fail");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 4, page_count: 1 }));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }
}
