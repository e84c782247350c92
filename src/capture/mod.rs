//! Image capture: the primary screen, files on disk, the file picker and the clipboard.
//!
//! Capture failures stay here. The pipeline only ever sees a finished
//! [`ImagePayload`].

pub mod payload;
pub mod provider;

pub use payload::ImagePayload;
pub use provider::{CaptureProvider, CaptureSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no screens found")]
    NoScreen,

    #[error("capture device error: {0}")]
    Device(String),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported or corrupt image: {0}")]
    UnsupportedImage(String),

    #[error("no image was selected")]
    Dismissed,

    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
}
