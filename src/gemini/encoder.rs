use crate::{
    config::EncodePolicy,
    error::{EditError, Result},
    models::{gemini::Blob, ImageResource, ImageSource},
};
use base64::Engine;

/// Base64 payload (no `data:` prefix) and the resource's media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl From<EncodedImage> for Blob {
    fn from(encoded: EncodedImage) -> Self {
        Blob {
            mime_type: encoded.mime_type,
            data: encoded.data,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEncoder {
    policy: EncodePolicy,
}

impl BinaryEncoder {
    pub fn new(policy: EncodePolicy) -> Self {
        Self { policy }
    }

    pub async fn encode(&self, resource: &ImageResource) -> Result<EncodedImage> {
        let bytes = match resource.source() {
            ImageSource::Bytes(bytes) => Ok(bytes.clone()),
            ImageSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                EditError::ReadError(format!("failed to read {}: {}", path.display(), e))
            }),
        };

        let bytes = match (bytes, self.policy) {
            (Ok(bytes), EncodePolicy::Strict) if bytes.is_empty() => {
                return Err(EditError::ReadError("image resource is empty".into()));
            }
            (Ok(bytes), _) => bytes,
            (Err(e), EncodePolicy::Strict) => return Err(e),
            (Err(e), EncodePolicy::Lenient) => {
                log::warn!("Encoding unreadable image as empty payload: {}", e);
                Vec::new()
            }
        };

        log::debug!(
            "Encoded {} bytes of {}",
            bytes.len(),
            resource.mime_type()
        );

        Ok(EncodedImage {
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime_type: resource.mime_type().to_string(),
        })
    }
}
