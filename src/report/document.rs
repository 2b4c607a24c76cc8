//! The exported PDF: raster pages of the view, then the original image.
//!
//! Every page is drawn as an image XObject. Rasters are re-encoded to JPEG
//! and embedded with the `DCTDecode` filter, so the PDF needs no image
//! decoding library of its own to be read. The original-image page also
//! carries a caption set in Helvetica-Bold.

use super::paginate::PageImage;
use crate::config::PageGeometry;
use crate::error::ExportError;
use crate::pipeline::ingest::ImageAsset;
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

pub const ORIGINAL_IMAGE_CAPTION: &str = "Original Embryo Image";

const CAPTION_SIZE: f32 = 14.0;
const CAPTION_BAND: f32 = 28.0;

/// One page of the report.
#[derive(Debug, Clone)]
pub enum ReportPage {
    /// A band of the captured view, drawn at the top-left margin.
    Raster(PageImage),
    /// The uploaded image, fitted into the frame below the caption.
    Original {
        image: DynamicImage,
        caption: String,
    },
}

/// Ordered report pages plus the page geometry they are laid out for.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    geometry: PageGeometry,
    pages: Vec<ReportPage>,
}

impl ReportDocument {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: Vec::new(),
        }
    }

    /// Start a document from paginated view bands.
    pub fn from_rasters(geometry: PageGeometry, bands: Vec<PageImage>) -> Self {
        Self {
            geometry,
            pages: bands.into_iter().map(ReportPage::Raster).collect(),
        }
    }

    pub fn push(&mut self, page: ReportPage) {
        self.pages.push(page);
    }

    pub fn pages(&self) -> &[ReportPage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// The frame the original image is fitted into: full content width,
    /// printable height minus the caption band. `(x, y_top, w, h)` in points
    /// from the top-left corner.
    pub fn original_frame(&self) -> (f32, f32, f32, f32) {
        let g = &self.geometry;
        (
            g.margin_pt,
            g.margin_pt + CAPTION_BAND,
            g.content_width(),
            g.printable_height() - CAPTION_BAND,
        )
    }

    /// Serialise all pages, in order, into PDF bytes.
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let caption_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let page_id = match page {
                ReportPage::Raster(band) => self.write_raster(&mut doc, pages_id, band)?,
                ReportPage::Original { image, caption } => {
                    self.write_original(&mut doc, pages_id, caption_font, image, caption)?
                }
            };
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        debug!("Serialised {} pages, {} bytes", self.pages.len(), bytes.len());
        Ok(bytes)
    }

    fn write_raster(
        &self,
        doc: &mut Document,
        parent: ObjectId,
        band: &PageImage,
    ) -> Result<ObjectId, ExportError> {
        let g = &self.geometry;
        let xobject = embed_jpeg(doc, &band.image)?;
        let y = g.height_pt - g.margin_pt - band.height_pt;
        let ops = draw_image(g.margin_pt, y, band.width_pt, band.height_pt);
        add_page(doc, parent, g, xobject, None, ops)
    }

    fn write_original(
        &self,
        doc: &mut Document,
        parent: ObjectId,
        font: ObjectId,
        image: &DynamicImage,
        caption: &str,
    ) -> Result<ObjectId, ExportError> {
        let g = &self.geometry;
        let xobject = embed_jpeg(doc, image)?;

        let (fx, ftop, fw, fh) = self.original_frame();
        let (w, h) = fit(image.width(), image.height(), fw, fh);
        let x = fx + (fw - w) / 2.0;
        let y = g.height_pt - ftop - h;

        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Real(CAPTION_SIZE as _)]),
            Operation::new(
                "Td",
                vec![
                    Object::Real(g.margin_pt as _),
                    Object::Real((g.height_pt - g.margin_pt - CAPTION_SIZE) as _),
                ],
            ),
            Operation::new("Tj", vec![Object::string_literal(caption)]),
            Operation::new("ET", vec![]),
        ];
        ops.extend(draw_image(x, y, w, h));
        add_page(doc, parent, g, xobject, Some(font), ops)
    }

    /// Write the PDF to `path` via a temporary sibling file and a rename,
    /// so a failed export never leaves a partial report behind.
    pub async fn save(&self, path: &Path) -> Result<(), ExportError> {
        let bytes = self.to_pdf_bytes()?;
        let write_failed = |source| ExportError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed)?;
        }

        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(write_failed)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_failed(e));
        }

        info!("Saved report ({} pages) to {}", self.pages.len(), path.display());
        Ok(())
    }
}

/// Append the original-image page when an asset is present. Nothing is
/// appended otherwise.
pub async fn append_original_image(
    document: &mut ReportDocument,
    asset: Option<&ImageAsset>,
) -> Result<(), ExportError> {
    let Some(asset) = asset else {
        debug!("No asset held; report has no original-image page");
        return Ok(());
    };

    let bytes = asset.bytes().await?;
    let image = image::load_from_memory(&bytes)?;
    debug!(
        "Original image '{}' decoded at {}x{}",
        asset.name,
        image.width(),
        image.height()
    );
    document.push(ReportPage::Original {
        image,
        caption: ORIGINAL_IMAGE_CAPTION.to_string(),
    });
    Ok(())
}

/// Largest `(w, h)` with the image's aspect ratio inside `max_w × max_h`.
pub fn fit(px_w: u32, px_h: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    if px_w == 0 || px_h == 0 {
        return (0.0, 0.0);
    }
    let scale = (max_w / px_w as f32).min(max_h / px_h as f32);
    (px_w as f32 * scale, px_h as f32 * scale)
}

/// Drop alpha by compositing onto white, so transparent areas print as paper.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u16;
        let over = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

fn embed_jpeg(doc: &mut Document, image: &DynamicImage) -> Result<ObjectId, ExportError> {
    let rgb = DynamicImage::ImageRgb8(flatten_onto_white(image));
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => rgb.width() as i64,
        "Height" => rgb.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    Ok(doc.add_object(Stream::new(dict, jpeg)))
}

fn draw_image(x: f32, y: f32, w: f32, h: f32) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(w as _),
                0.into(),
                0.into(),
                Object::Real(h as _),
                Object::Real(x as _),
                Object::Real(y as _),
            ],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ]
}

fn add_page(
    doc: &mut Document,
    parent: ObjectId,
    geometry: &PageGeometry,
    xobject: ObjectId,
    font: Option<ObjectId>,
    operations: Vec<Operation>,
) -> Result<ObjectId, ExportError> {
    let mut resources = dictionary! {
        "XObject" => dictionary! { "Im0" => xobject },
    };
    if let Some(font) = font {
        resources.set("Font", dictionary! { "F1" => font });
    }

    let content = Content { operations }
        .encode()
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::Real(geometry.width_pt as _),
            Object::Real(geometry.height_pt as _),
        ],
        "Resources" => resources,
        "Contents" => content_id,
    }))
}
