// src/pipeline/state.rs
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::connector::VideoPayload;
use crate::capture::ImagePayload;

/// The persona invented for the object in a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaDetails {
    pub object_name: String,
    pub personality: String,
    pub animation_prompt: String,
}

/// A finished animation, ready to play or save.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoResult {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
    created_at: DateTime<Local>,
}

impl VideoResult {
    pub fn new(video: VideoPayload, persona: &PersonaDetails) -> Self {
        let file_name = download_file_name(&persona.object_name, &video.mime_type);
        Self {
            bytes: Arc::from(video.bytes),
            mime_type: video.mime_type,
            file_name,
            created_at: Local::now(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Suggested download name, `animated-{object}.{ext}`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Write the video into `dir` under its suggested name.
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

impl fmt::Debug for VideoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoResult")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Which step of the pipeline a state (or a failure) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Analyzing,
    Generating,
    Completed,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Completed => "completed",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Whatever the run had produced before it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// The stage that failed: `Analyzing` or `Generating`.
    pub failed_stage: Stage,
    pub image: Option<ImagePayload>,
    pub persona: Option<PersonaDetails>,
}

/// The controller's whole mutable state. One variant is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Analyzing {
        image: ImagePayload,
    },
    Generating {
        image: ImagePayload,
        persona: PersonaDetails,
    },
    Completed {
        image: ImagePayload,
        persona: PersonaDetails,
        video: VideoResult,
    },
    Error {
        context: ErrorContext,
        message: String,
    },
}

impl PipelineState {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineState::Idle => Stage::Idle,
            PipelineState::Analyzing { .. } => Stage::Analyzing,
            PipelineState::Generating { .. } => Stage::Generating,
            PipelineState::Completed { .. } => Stage::Completed,
            PipelineState::Error { .. } => Stage::Error,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        match self {
            PipelineState::Idle => None,
            PipelineState::Analyzing { image }
            | PipelineState::Generating { image, .. }
            | PipelineState::Completed { image, .. } => Some(image),
            PipelineState::Error { context, .. } => context.image.as_ref(),
        }
    }

    pub fn persona(&self) -> Option<&PersonaDetails> {
        match self {
            PipelineState::Generating { persona, .. }
            | PipelineState::Completed { persona, .. } => Some(persona),
            PipelineState::Error { context, .. } => context.persona.as_ref(),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoResult> {
        match self {
            PipelineState::Completed { video, .. } => Some(video),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PipelineState::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

fn download_file_name(object_name: &str, mime_type: &str) -> String {
    let mut slug = String::new();
    for c in object_name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "object" } else { slug };

    let extension = match mime_type {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    };

    format!("animated-{}.{}", slug, extension)
}
