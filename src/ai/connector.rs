// src/ai/connector.rs
use crate::capture::ImagePayload;
use crate::pipeline::{PersonaDetails, RunToken};

use super::AiError;

/// Looks at a photo and invents a persona for its most prominent object
pub trait PersonaAnalyzer: Send + Sync {
    fn analyze(&self, image: &ImagePayload) -> Result<PersonaDetails, AiError>;
}

/// Turns a photo plus an animation directive into video bytes.
///
/// Implementations may block for minutes; they must give up with
/// [`AiError::Cancelled`] once `token` goes stale.
pub trait AnimationGenerator: Send + Sync {
    fn generate(
        &self,
        image: &ImagePayload,
        animation_prompt: &str,
        token: &RunToken,
    ) -> Result<VideoPayload, AiError>;
}

/// The three calls a long-running video job service has to offer.
pub trait VideoJobApi: Send + Sync {
    fn submit(&self, image: &ImagePayload, prompt: &str) -> Result<JobHandle, AiError>;
    fn poll(&self, job: &JobHandle) -> Result<JobStatus, AiError>;
    fn fetch(&self, video_uri: &str) -> Result<VideoPayload, AiError>;
}

/// Opaque name of a remote generation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done { video_uri: Option<String> },
    Failed(String),
}

/// Raw video as downloaded from the generation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}
