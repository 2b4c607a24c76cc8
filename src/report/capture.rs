//! Raster capture of the rendered view.
//!
//! [`Rasterizer`] is the seam; [`PdfiumRasterizer`] is the real one. pdfium is
//! not async-safe, so all of its work runs inside `spawn_blocking`, and the
//! library is bound per capture rather than held across awaits.

use super::view::ReportView;
use crate::config::AnalyzerConfig;
use crate::error::ExportError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pixels per point. Fixed; not configurable per call.
pub const CAPTURE_SCALE: f32 = 2.0;

/// Turns a laid-out view into a bitmap.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn capture(&self, view: &ReportView) -> Result<DynamicImage, ExportError>;
}

/// Rasterises the view's one-page PDF with pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.pdfium_library_path.clone())
    }
}

#[cfg(target_os = "windows")]
const PLATFORM_LIBRARY: &str = "pdfium.dll";
#[cfg(target_os = "macos")]
const PLATFORM_LIBRARY: &str = "libpdfium.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const PLATFORM_LIBRARY: &str = "libpdfium.so";

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system
/// library. A directory is searched for the platform library name.
fn bind(explicit: Option<&Path>) -> Result<Pdfium, ExportError> {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match candidate {
        Some(path) => {
            let lib = if path.is_dir() {
                path.join(PLATFORM_LIBRARY)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib).map_err(|e| {
                ExportError::Capture(format!("cannot load pdfium from '{}': {}", lib.display(), e))
            })?
        }
        None => Pdfium::bind_to_system_library().map_err(|e| {
            ExportError::Capture(format!(
                "pdfium library not found ({e}); set PDFIUM_LIB_PATH to libpdfium"
            ))
        })?,
    };
    Ok(Pdfium::new(bindings))
}

fn capture_blocking(
    pdf: Vec<u8>,
    target_width: i32,
    library: Option<PathBuf>,
) -> Result<DynamicImage, ExportError> {
    let pdfium = bind(library.as_deref())?;
    let document = pdfium
        .load_pdf_from_byte_vec(pdf, None)
        .map_err(|e| ExportError::Capture(format!("{:?}", e)))?;

    let page = document
        .pages()
        .get(0)
        .map_err(|e| ExportError::Capture(format!("{:?}", e)))?;

    let config = PdfRenderConfig::new().set_target_width(target_width);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ExportError::Capture(format!("{:?}", e)))?;

    Ok(bitmap.as_image())
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn capture(&self, view: &ReportView) -> Result<DynamicImage, ExportError> {
        let pdf = view.to_pdf_bytes()?;
        let target_width = (view.width_pt * CAPTURE_SCALE).round() as i32;
        let library = self.library_path.clone();

        let image = tokio::task::spawn_blocking(move || capture_blocking(pdf, target_width, library))
            .await
            .map_err(|e| ExportError::Internal(format!("Capture task panicked: {}", e)))??;

        info!("Captured view at {}x{} px", image.width(), image.height());
        Ok(image)
    }
}
