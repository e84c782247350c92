// src/capture/payload.rs
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use super::CaptureError;

/// Longest edge, in pixels, of any bitmap we encode ourselves.
pub const MAX_UPLOAD_DIMENSION: u32 = 1536;

/// An encoded still image. Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            mime_type: mime_type.into(),
        }
    }

    /// Encode a decoded bitmap as PNG, downscaling oversized captures first.
    pub fn from_image(image: &DynamicImage) -> Result<Self, CaptureError> {
        let image = if image.width().max(image.height()) > MAX_UPLOAD_DIMENSION {
            image.thumbnail(MAX_UPLOAD_DIMENSION, MAX_UPLOAD_DIMENSION)
        } else {
            image.clone()
        };

        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageOutputFormat::Png)
            .map_err(|e| CaptureError::UnsupportedImage(e.to_string()))?;

        Ok(Self::new(buffer, "image/png"))
    }

    /// Accept uploaded bytes. Formats the remote models read natively are kept
    /// as-is; anything else that decodes is re-encoded as PNG.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let format = image::guess_format(&bytes)
            .map_err(|e| CaptureError::UnsupportedImage(e.to_string()))?;

        match passthrough_mime(format) {
            Some(mime) => Ok(Self::new(bytes, mime)),
            None => {
                let decoded = image::load_from_memory(&bytes)
                    .map_err(|e| CaptureError::UnsupportedImage(e.to_string()))?;
                Self::from_image(&decoded)
            }
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

// Bytes can be megabytes long; keep Debug output readable.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn passthrough_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
