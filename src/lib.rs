//! Snap a photo, let a vision model invent a persona for the main object in
//! it, then have a video model bring that object to life.
//!
//! [`pipeline::PipelineController`] drives one run at a time through
//! `Idle → Analyzing → Generating → Completed`, with `Error` on failure and
//! `reset` to get back to `Idle` from anywhere.

pub mod ai;
pub mod capture;
pub mod config;
pub mod keys;
pub mod pipeline;

use std::sync::Arc;

use anyhow::Result;

use crate::ai::{GeminiAnalyzer, PollingGenerator, VeoClient};
use crate::config::Config;
use crate::keys::KeySelector;
use crate::pipeline::PipelineController;

/// Wire a controller to the real remote services described by `config`.
pub fn connect(config: &Config, keys: Arc<dyn KeySelector>) -> Result<PipelineController> {
    let analyzer = GeminiAnalyzer::new(config)?;
    let generator = PollingGenerator::from_config(VeoClient::new(config)?, config);
    Ok(PipelineController::new(
        Arc::new(analyzer),
        Arc::new(generator),
        keys,
    ))
}
