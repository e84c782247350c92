// src/capture/provider.rs
use image::DynamicImage;
use log::info;
use screenshots::Screen;
use std::path::{Path, PathBuf};

use super::{CaptureError, ImagePayload};

/// Where a capture gesture takes its image from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Screen,
    File(PathBuf),
    Picker,
    Clipboard,
}

/// Produces one `ImagePayload` per gesture and keeps the latest one around.
pub struct CaptureProvider {
    current: Option<ImagePayload>,
}

impl CaptureProvider {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn capture(&mut self, source: &CaptureSource) -> Result<ImagePayload, CaptureError> {
        match source {
            CaptureSource::Screen => self.capture_screen(),
            CaptureSource::File(path) => self.load_file(path),
            CaptureSource::Picker => self.pick_file(),
            CaptureSource::Clipboard => self.paste_clipboard(),
        }
    }

    /// Capture the entire primary screen
    pub fn capture_screen(&mut self) -> Result<ImagePayload, CaptureError> {
        info!("Capturing primary screen");
        let screens = Screen::all().map_err(|e| CaptureError::Device(e.to_string()))?;
        let screen = screens.first().ok_or(CaptureError::NoScreen)?;
        let image = screen
            .capture()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        let width = image.width() as u32;
        let height = image.height() as u32;

        // The screenshots crate hands back BGRA
        let buffer = image.as_raw();
        let mut rgba_buffer = Vec::with_capacity(buffer.len());
        for chunk in buffer.chunks_exact(4) {
            rgba_buffer.extend_from_slice(&[chunk[2], chunk[1], chunk[0], chunk[3]]);
        }

        let rgba = image::RgbaImage::from_raw(width, height, rgba_buffer).ok_or_else(|| {
            CaptureError::Device("screen buffer does not match its reported size".to_string())
        })?;

        info!("Screen captured: {}x{}", width, height);
        self.keep(ImagePayload::from_image(&DynamicImage::ImageRgba8(rgba))?)
    }

    /// Read an image file from disk
    pub fn load_file(&mut self, path: &Path) -> Result<ImagePayload, CaptureError> {
        info!("Loading image from {}", path.display());
        let bytes = std::fs::read(path)?;
        self.keep(ImagePayload::from_encoded(bytes)?)
    }

    /// Ask the user for an image through the native file dialog
    pub fn pick_file(&mut self) -> Result<ImagePayload, CaptureError> {
        let path = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp", "gif"])
            .pick_file()
            .ok_or(CaptureError::Dismissed)?;
        self.load_file(&path)
    }

    /// Take whatever image is currently on the clipboard
    pub fn paste_clipboard(&mut self) -> Result<ImagePayload, CaptureError> {
        #[cfg(feature = "clipboard")]
        {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| CaptureError::ClipboardUnavailable(e.to_string()))?;
            let data = clipboard
                .get_image()
                .map_err(|e| CaptureError::ClipboardUnavailable(e.to_string()))?;

            let rgba = image::RgbaImage::from_raw(
                data.width as u32,
                data.height as u32,
                data.bytes.into_owned(),
            )
            .ok_or_else(|| {
                CaptureError::ClipboardUnavailable(
                    "clipboard image has an invalid size".to_string(),
                )
            })?;

            info!("Pasted clipboard image: {}x{}", rgba.width(), rgba.height());
            self.keep(ImagePayload::from_image(&DynamicImage::ImageRgba8(rgba))?)
        }
        #[cfg(not(feature = "clipboard"))]
        {
            Err(CaptureError::ClipboardUnavailable(
                "clipboard feature not enabled in this build".to_string(),
            ))
        }
    }

    pub fn current(&self) -> Option<&ImagePayload> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    fn keep(&mut self, payload: ImagePayload) -> Result<ImagePayload, CaptureError> {
        self.current = Some(payload.clone());
        Ok(payload)
    }
}

impl Default for CaptureProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_load_file_keeps_latest_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teapot.png");
        RgbaImage::from_pixel(8, 8, Rgba([200, 120, 40, 255]))
            .save(&path)
            .unwrap();

        let mut provider = CaptureProvider::new();
        let payload = provider
            .capture(&CaptureSource::File(path.clone()))
            .unwrap();

        assert_eq!(payload.mime_type(), "image/png");
        assert_eq!(provider.current(), Some(&payload));

        provider.clear();
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = CaptureProvider::new();

        let result = provider.load_file(&dir.path().join("nope.png"));

        assert!(matches!(result, Err(CaptureError::Io(_))));
        assert!(provider.current().is_none());
    }

    #[test]
    fn test_non_image_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some words").unwrap();

        let mut provider = CaptureProvider::new();
        let result = provider.load_file(&path);

        assert!(matches!(result, Err(CaptureError::UnsupportedImage(_))));
    }
}
