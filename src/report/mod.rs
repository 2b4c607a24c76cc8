//! PDF export of a successful analysis.
//!
//! ## Data Flow
//!
//! ```text
//! AnalysisResult ──▶ view ──▶ capture ──▶ paginate ──▶ document ──▶ save
//!                  (layout)  (pdfium,    (Split or    (+ original
//!                             ×2 scale)   Clamp)       image page)
//! ```
//!
//! 1. [`view`]     lays the Markdown out as one tall page
//! 2. [`capture`]  rasterises it; runs in `spawn_blocking`
//! 3. [`paginate`] fits the raster to the configured page size
//! 4. [`document`] assembles the pages, appends the original image and writes
//!    the PDF

pub mod capture;
pub mod document;
pub mod paginate;
pub mod view;

use crate::config::AnalyzerConfig;
use crate::error::ExportError;
use crate::session::Session;
use capture::Rasterizer;
use document::{append_original_image, ReportDocument};
use paginate::paginate;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use view::ReportView;

/// Assemble the report for the session's current result.
///
/// Fails with [`ExportError::NotReady`] unless the session is in `Success`,
/// and with [`ExportError::Capture`] when the capture yields no pixels.
pub async fn build_report(
    session: &Session,
    rasterizer: &dyn Rasterizer,
    config: &AnalyzerConfig,
) -> Result<ReportDocument, ExportError> {
    let result = match session.result() {
        Some(result) if session.can_export() => result,
        _ => return Err(ExportError::NotReady),
    };

    let start = Instant::now();
    let view = ReportView::layout(result, &config.page);
    let raster = rasterizer.capture(&view).await?;
    let bands = paginate(&raster, &config.page, config.overflow);
    if bands.is_empty() {
        return Err(ExportError::Capture(format!(
            "captured view is empty ({}x{} px)",
            raster.width(),
            raster.height()
        )));
    }

    let mut document = ReportDocument::from_rasters(config.page, bands);
    append_original_image(&mut document, session.asset()).await?;

    info!(
        "Assembled report: {} pages in {}ms",
        document.page_count(),
        start.elapsed().as_millis()
    );
    Ok(document)
}

/// Build the report and save it to `path`, or to the configured file name in
/// the current directory. Returns the path written.
pub async fn export_report(
    session: &Session,
    rasterizer: &dyn Rasterizer,
    config: &AnalyzerConfig,
    path: Option<&Path>,
) -> Result<PathBuf, ExportError> {
    let document = build_report(session, rasterizer, config).await?;
    let target = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.report_file_name));
    document.save(&target).await?;
    Ok(target)
}
