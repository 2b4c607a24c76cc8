//! # embryo-analyzer
//!
//! Upload a microscopy image of an embryo, have a vision-capable language
//! model describe it in a fixed set of sections, and export the result as a
//! PDF report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image file
//!  │
//!  ├─ 1. Ingest   accept only declared image/* types
//!  ├─ 2. Encode   bytes → base64 data URI
//!  ├─ 3. Analyse  one call: system instruction + (label, image) user turn
//!  ├─ 4. Tidy     deterministic Markdown cleanup
//!  ├─ 5. Session  phase machine; stale responses discarded by generation
//!  └─ 6. Export   view → raster (pdfium) → pages → PDF (+ original image)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use embryo_analyzer::{Analyzer, AnalyzerConfig, FileCandidate, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential from EMBRYO_ANALYZER_API_KEY or OPENAI_API_KEY
//!     let analyzer = Analyzer::from_config(AnalyzerConfig::default())?;
//!     let mut session = Session::new();
//!     session.select_file(FileCandidate::from_path("embryo.png").await?)?;
//!     analyzer.analyze(&mut session).await?;
//!     if let Some(result) = session.result() {
//!         println!("{}", result.markdown);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `embryo-analyzer` terminal front end (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! The analysis is informational only and is not a medical assessment.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{run_analysis, Analyzer};
pub use backend::{resolve_backend, ModelReply, VisionBackend};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, OverflowPolicy, PageGeometry};
pub use error::{
    AnalysisError, AnalysisFailure, AnalyzerError, ExportError, FileReadError, SessionError,
    ValidationError,
};
pub use pipeline::ingest::{FileCandidate, ImageAsset};
pub use pipeline::llm::{AnalysisClient, AnalysisRequest, AnalysisResult};
pub use progress::SessionObserver;
pub use report::capture::{PdfiumRasterizer, Rasterizer};
pub use report::{build_report, export_report};
pub use session::{AnalysisTicket, Completion, Phase, Session, Transition};
