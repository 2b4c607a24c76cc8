//! Error types for the embryo-analyzer library.
//!
//! Errors are split by the stage that produces them, mirroring the pipeline:
//!
//! * [`ValidationError`]: the selected file was rejected before anything else
//!   happened. Recovered inline; the session simply has no asset.
//! * [`FileReadError`]: the asset could not be read while encoding it for the
//!   request. The pending analysis is abandoned.
//! * [`AnalysisError`]: the single call to the vision model failed.
//! * [`SessionError`]: an operation was triggered in a phase that forbids it.
//! * [`ExportError`]: the report could not be captured, assembled or written.
//! * [`AnalyzerError`]: **fatal** setup problems (missing credential, bad
//!   configuration, unusable provider). These surface before a session starts.
//!
//! Only [`AnalyzerError`] is meant to stop a program. Every other error leaves
//! the session in a well-defined phase from which the user can try again.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration and backend-construction errors.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// No credential for the vision service could be found.
    #[error(
        "No API key configured for the vision service.\n\
Set EMBRYO_ANALYZER_API_KEY (or OPENAI_API_KEY) in the environment, \
or bake one in at build time with EMBRYO_ANALYZER_API_KEY=... cargo build."
    )]
    MissingCredential,

    /// The named provider could not be created (unknown name, missing key, …).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// The selected file is not acceptable as an analysis input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Declared mime type does not start with `image/`.
    #[error("'{name}' is not an image (declared type: {mime})")]
    NotAnImage { name: String, mime: String },
}

/// The asset could not be read while producing its encoded payload.
#[derive(Debug, Error)]
pub enum FileReadError {
    /// The path does not exist or is not a regular file.
    #[error("Image file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Any other I/O failure while reading.
    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the single call to the vision model.
///
/// The session collapses all three variants into one generic user-visible
/// message; the variant and its detail are kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, reset).
    #[error("Network error while contacting the vision service: {0}")]
    Network(String),

    /// The service answered, but not with a success.
    #[error("Vision service returned an error{}: {detail}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Model { status: Option<u16>, detail: String },

    /// The service answered successfully but without any content.
    #[error("Vision service returned an empty response")]
    EmptyResponse,
}

/// A pending analysis that ended without a result.
#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error(transparent)]
    Read(#[from] FileReadError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// An operation was triggered in a phase that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No image has been selected yet.
    #[error("No image selected")]
    NoImage,

    /// An analysis is already running; a second one is refused.
    #[error("An analysis is already in progress (request #{generation})")]
    AnalysisInFlight { generation: u64 },
}

/// Report export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Export was requested without a successful analysis.
    #[error("Nothing to export: run a successful analysis first")]
    NotReady,

    /// The rendered view could not be laid out as a PDF page.
    #[error("Failed to lay out the analysis view: {0}")]
    Layout(String),

    /// The rasteriser failed.
    #[error("Failed to capture the analysis view: {0}")]
    Capture(String),

    /// An image could not be decoded or re-encoded for embedding.
    #[error("Failed to process image for the report: {0}")]
    Image(#[from] image::ImageError),

    /// The original image could not be read back.
    #[error(transparent)]
    Read(#[from] FileReadError),

    /// lopdf failed to serialise the document.
    #[error("Failed to serialise the report: {0}")]
    Pdf(String),

    /// Could not create or write the output file.
    #[error("Failed to write report '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_display_with_status() {
        let e = AnalysisError::Model {
            status: Some(429),
            detail: "rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 429"), "got: {msg}");
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn model_error_display_without_status() {
        let e = AnalysisError::Model {
            status: None,
            detail: "content filter".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
    }

    #[test]
    fn failure_is_transparent() {
        let f = AnalysisFailure::from(AnalysisError::EmptyResponse);
        assert_eq!(f.to_string(), AnalysisError::EmptyResponse.to_string());
    }

    #[test]
    fn in_flight_display_names_generation() {
        let e = SessionError::AnalysisInFlight { generation: 7 };
        assert!(e.to_string().contains("#7"));
    }
}
