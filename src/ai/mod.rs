//! Remote model adapters: persona analysis and animation generation.

pub mod animation;
#[cfg(test)]
mod canned_http;
pub mod connector;
pub mod error;
pub mod persona;

pub use animation::{PollingGenerator, VeoClient};
pub use connector::{
    AnimationGenerator, JobHandle, JobStatus, PersonaAnalyzer, VideoJobApi, VideoPayload,
};
pub use error::AiError;
pub use persona::GeminiAnalyzer;

/// Header the Generative Language API reads the key from.
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";
