//! File ingestion: turn a user-selected file into an [`ImageAsset`].
//!
//! Acceptance is decided by the *declared* mime type alone, the same way a
//! browser file input reports it. Nothing is decoded here: a file that claims
//! to be `image/png` is accepted, and a mislabelled one will fail later at the
//! vision service or at export time.
//!
//! Path-backed candidates are not read on selection. The bytes are loaded when
//! the payload is encoded, so a file that disappears in between surfaces as a
//! [`FileReadError`] at analysis time.

use crate::error::{FileReadError, ValidationError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Where the bytes of a candidate or asset live.
#[derive(Clone)]
pub enum AssetSource {
    /// Bytes already in memory (drag-and-drop, HTTP upload, tests).
    Memory(Arc<[u8]>),
    /// A file on disk, read lazily.
    File(PathBuf),
}

impl fmt::Debug for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::Memory(b) => write!(f, "Memory({} bytes)", b.len()),
            AssetSource::File(p) => f.debug_tuple("File").field(p).finish(),
        }
    }
}

impl AssetSource {
    /// Load the raw bytes.
    pub async fn load(&self) -> Result<Vec<u8>, FileReadError> {
        match self {
            AssetSource::Memory(bytes) => Ok(bytes.to_vec()),
            AssetSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FileReadError::NotFound { path: path.clone() }
                } else {
                    FileReadError::Io {
                        path: path.clone(),
                        source: e,
                    }
                }
            }),
        }
    }
}

/// A file the user picked, before validation.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub name: String,
    pub declared_mime: String,
    pub source: AssetSource,
}

impl FileCandidate {
    /// Candidate from in-memory bytes with an explicit declared type.
    pub fn from_bytes(
        name: impl Into<String>,
        declared_mime: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_mime: declared_mime.into(),
            source: AssetSource::Memory(bytes.into()),
        }
    }

    /// Candidate from a path; the declared type comes from the extension.
    ///
    /// Fails only when the path is not an existing regular file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FileReadError> {
        let path = path.as_ref().to_path_buf();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(FileReadError::NotFound { path }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileReadError::NotFound { path })
            }
            Err(e) => return Err(FileReadError::Io { path, source: e }),
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let declared_mime = mime_from_path(&path).to_string();
        debug!("Candidate {} declared as {}", name, declared_mime);

        Ok(Self {
            name,
            declared_mime,
            source: AssetSource::File(path),
        })
    }
}

/// An accepted image. Owned by the session until replaced.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub name: String,
    pub mime: String,
    pub source: AssetSource,
}

impl ImageAsset {
    pub async fn bytes(&self) -> Result<Vec<u8>, FileReadError> {
        self.source.load().await
    }
}

/// Accept the candidate iff its declared mime type starts with `image/`.
pub fn validate(candidate: FileCandidate) -> Result<ImageAsset, ValidationError> {
    let mime = candidate.declared_mime.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return Err(ValidationError::NotAnImage {
            name: candidate.name,
            mime: candidate.declared_mime,
        });
    }
    Ok(ImageAsset {
        name: candidate.name,
        mime,
        source: candidate.source,
    })
}

/// Guess a mime type from a file extension.
///
/// Image formats go through `image::ImageFormat`; a handful of other common
/// types are listed so that rejections name something meaningful.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };

    if let Some(format) = image::ImageFormat::from_extension(&ext) {
        return format.to_mime_type();
    }

    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_image_subtype() {
        for mime in ["image/png", "image/jpeg", "IMAGE/WEBP", " image/tiff "] {
            let c = FileCandidate::from_bytes("x", mime, vec![1u8, 2, 3]);
            let asset = validate(c).unwrap_or_else(|e| panic!("{mime} rejected: {e}"));
            assert!(asset.mime.starts_with("image/"));
        }
    }

    #[test]
    fn rejects_non_images() {
        for mime in ["application/pdf", "text/plain", "", "imagex/png", "video/mp4"] {
            let c = FileCandidate::from_bytes("x", mime, vec![0u8]);
            assert!(
                matches!(validate(c), Err(ValidationError::NotAnImage { .. })),
                "{mime:?} accepted"
            );
        }
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(mime_from_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_from_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("a.pdf")), "application/pdf");
        assert_eq!(mime_from_path(Path::new("a")), "application/octet-stream");
        assert_eq!(mime_from_path(Path::new("a.xyz")), "application/octet-stream");
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = FileCandidate::from_path("/definitely/not/here.png")
            .await
            .unwrap_err();
        assert!(matches!(err, FileReadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn from_path_reads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embryo.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let asset = validate(FileCandidate::from_path(&path).await.unwrap()).unwrap();
        assert_eq!(asset.name, "embryo.png");
        assert_eq!(asset.mime, "image/png");

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            asset.bytes().await,
            Err(FileReadError::NotFound { .. })
        ));
    }
}
