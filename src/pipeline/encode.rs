//! Payload encoding: `ImageAsset` → base64 body + data URI.
//!
//! Vision APIs accept images inline as `data:<mime>;base64,<payload>` URIs in
//! the JSON request body. The bytes are sent exactly as the user supplied them:
//! no re-encoding, no resizing. The declared mime type travels with them.

use crate::error::FileReadError;
use crate::pipeline::ingest::ImageAsset;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Transport form of an image.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub mime: String,
    /// Standard-alphabet base64, padded.
    pub base64: String,
}

impl std::fmt::Debug for EncodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPayload")
            .field("mime", &self.mime)
            .field("base64_len", &self.base64.len())
            .finish()
    }
}

impl EncodedPayload {
    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }

    /// Decode back to the original bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.base64)
    }
}

/// Read the asset and base64-encode it.
pub async fn encode(asset: &ImageAsset) -> Result<EncodedPayload, FileReadError> {
    let bytes = asset.bytes().await?;
    let base64 = STANDARD.encode(&bytes);
    debug!(
        "Encoded {} ({} bytes) → {} bytes base64",
        asset.name,
        bytes.len(),
        base64.len()
    );

    Ok(EncodedPayload {
        mime: asset.mime.clone(),
        base64,
    })
}
