use crate::error::{EditError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// An image selected by the caller: opaque content plus its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    source: ImageSource,
    mime_type: String,
    name: Option<String>,
}

impl ImageResource {
    pub fn from_bytes(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            source: ImageSource::Bytes(data),
            mime_type: mime_type.into(),
            name: None,
        }
    }

    /// Lazily-read file resource typed from its extension alone; no I/O.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension);
        Self::file(path, mime_type)
    }

    /// Like `from_path`, but sniffs the first bytes of the file so a
    /// mislabelled extension does not decide the media type.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut head = [0u8; 12];
        let sniffed = match tokio::fs::File::open(path).await {
            Ok(mut file) => match file.read(&mut head).await {
                Ok(n) => mime_from_magic_bytes(&head[..n]),
                Err(_) => None,
            },
            Err(_) => None,
        };
        let mime_type = sniffed.or_else(|| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(mime_from_extension)
        });
        Self::file(path, mime_type)
    }

    fn file(path: &Path, mime_type: Option<&str>) -> Self {
        Self {
            source: ImageSource::File(path.to_path_buf()),
            mime_type: mime_type.unwrap_or("application/octet-stream").to_string(),
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Only `image/*` selections may reach the adapter.
    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }
}

pub fn mime_from_magic_bytes(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "image/heif" => "heif",
        _ => "png",
    }
}

pub const MISSING_INPUT_MESSAGE: &str = "Please upload an image and provide an editing prompt.";
pub const NOT_AN_IMAGE_MESSAGE: &str = "Please select an image file.";

/// One submission: an image and a non-empty instruction.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub image: ImageResource,
    pub instruction: String,
}

impl EditRequest {
    pub fn new(image: ImageResource, instruction: impl Into<String>) -> Result<Self> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(EditError::Validation(MISSING_INPUT_MESSAGE.into()));
        }
        if !image.is_image() {
            return Err(EditError::Validation(NOT_AN_IMAGE_MESSAGE.into()));
        }
        Ok(Self { image, instruction })
    }
}

/// JSON shape accepted by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPayload {
    pub image: String,
    pub mime_type: String,
    pub instruction: String,
}
