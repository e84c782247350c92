// src/pipeline/controller.rs
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use super::state::{ErrorContext, PersonaDetails, PipelineState, Stage, VideoResult};
use super::token::RunToken;
use crate::ai::{AiError, AnimationGenerator, PersonaAnalyzer};
use crate::capture::ImagePayload;
use crate::keys::KeySelector;

/// Why `start` refused to begin a run. Refusals never change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("no API key selected")]
    NoApiKey,

    #[error("a run is already {0}; reset first")]
    Busy(Stage),
}

struct Shared {
    state: PipelineState,
    subscribers: Vec<Sender<PipelineState>>,
}

/// Sequences capture → analyze → generate for one run at a time.
///
/// Clones share the same state, so one thread can drive a run while another
/// watches it or resets it.
#[derive(Clone)]
pub struct PipelineController {
    analyzer: Arc<dyn PersonaAnalyzer>,
    generator: Arc<dyn AnimationGenerator>,
    keys: Arc<dyn KeySelector>,
    shared: Arc<Mutex<Shared>>,
    epoch: Arc<AtomicU64>,
}

impl PipelineController {
    pub fn new(
        analyzer: Arc<dyn PersonaAnalyzer>,
        generator: Arc<dyn AnimationGenerator>,
        keys: Arc<dyn KeySelector>,
    ) -> Self {
        Self {
            analyzer,
            generator,
            keys,
            shared: Arc::new(Mutex::new(Shared {
                state: PipelineState::Idle,
                subscribers: Vec::new(),
            })),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> PipelineState {
        self.lock().state.clone()
    }

    /// Receive a snapshot after every transition from now on.
    pub fn subscribe(&self) -> Receiver<PipelineState> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Run the whole pipeline on the calling thread and return the final
    /// snapshot. Stage failures end in `PipelineState::Error`, not `Err`.
    pub fn start(&self, image: ImagePayload) -> Result<PipelineState, StartError> {
        let token = self.begin(&image)?;
        Ok(self.run(token, image))
    }

    /// Like `start`, but the run happens on its own thread.
    pub fn spawn(&self, image: ImagePayload) -> Result<JoinHandle<PipelineState>, StartError> {
        let token = self.begin(&image)?;
        let controller = self.clone();
        Ok(thread::spawn(move || controller.run(token, image)))
    }

    /// Back to `Idle` from anywhere. Results of the current run, if one is
    /// still outstanding, will be discarded when they arrive.
    pub fn reset(&self) {
        let mut shared = self.lock();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Pipeline reset from {} (epoch {})", shared.state.stage(), epoch);
        Self::publish(&mut shared, PipelineState::Idle);
    }

    fn begin(&self, image: &ImagePayload) -> Result<RunToken, StartError> {
        if !self.keys.has_selected_key() {
            warn!("Refusing to start: no API key selected");
            return Err(StartError::NoApiKey);
        }

        let mut shared = self.lock();
        if !shared.state.is_idle() {
            return Err(StartError::Busy(shared.state.stage()));
        }

        let token = RunToken::new(self.epoch.load(Ordering::SeqCst), Arc::clone(&self.epoch));
        info!("Run {} started: analyzing {} image", token.epoch(), image.mime_type());
        Self::publish(
            &mut shared,
            PipelineState::Analyzing {
                image: image.clone(),
            },
        );
        Ok(token)
    }

    fn run(&self, token: RunToken, image: ImagePayload) -> PipelineState {
        if token.is_stale() {
            debug!("Run {} was reset before it began", token.epoch());
            return self.state();
        }

        let persona = match self.analyzer.analyze(&image) {
            Ok(persona) => persona,
            Err(e) => {
                return self.fail(&token, Stage::Analyzing, Some(image), None, e);
            }
        };

        let generating = PipelineState::Generating {
            image: image.clone(),
            persona: persona.clone(),
        };
        if !self.advance(&token, generating) {
            return self.state();
        }

        let video = match self
            .generator
            .generate(&image, &persona.animation_prompt, &token)
        {
            Ok(video) => VideoResult::new(video, &persona),
            Err(e) => {
                return self.fail(&token, Stage::Generating, Some(image), Some(persona), e);
            }
        };

        info!("Run {} completed: {}", token.epoch(), video.file_name());
        self.advance(
            &token,
            PipelineState::Completed {
                image,
                persona,
                video,
            },
        );
        self.state()
    }

    fn fail(
        &self,
        token: &RunToken,
        failed_stage: Stage,
        image: Option<ImagePayload>,
        persona: Option<PersonaDetails>,
        error: AiError,
    ) -> PipelineState {
        if !token.is_stale() {
            warn!("Run {} failed while {}: {}", token.epoch(), failed_stage, error);
        }
        self.advance(
            token,
            PipelineState::Error {
                context: ErrorContext {
                    failed_stage,
                    image,
                    persona,
                },
                message: error.to_string(),
            },
        );
        self.state()
    }

    /// Apply `next` unless the run has been reset meanwhile.
    fn advance(&self, token: &RunToken, next: PipelineState) -> bool {
        let mut shared = self.lock();
        if token.is_stale() {
            debug!(
                "Dropping {} result from superseded run {}",
                next.stage(),
                token.epoch()
            );
            return false;
        }
        debug!("Run {} -> {}", token.epoch(), next.stage());
        Self::publish(&mut shared, next);
        true
    }

    fn publish(shared: &mut Shared, next: PipelineState) {
        shared.state = next;
        let snapshot = &shared.state;
        shared
            .subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
