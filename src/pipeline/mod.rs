//! The capture → analyze → generate state machine.

pub mod controller;
pub mod state;
pub mod token;

pub use controller::{PipelineController, StartError};
pub use state::{ErrorContext, PersonaDetails, PipelineState, Stage, VideoResult};
pub use token::RunToken;
