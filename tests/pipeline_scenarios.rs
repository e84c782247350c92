use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use animasnap::ai::persona::parse_persona;
use animasnap::ai::{
    AiError, AnimationGenerator, JobHandle, JobStatus, PersonaAnalyzer, PollingGenerator,
    VideoJobApi, VideoPayload,
};
use animasnap::capture::ImagePayload;
use animasnap::keys::PresetKey;
use animasnap::pipeline::{PersonaDetails, PipelineController, PipelineState, RunToken, Stage};

const TEAPOT_JSON: &str = r#"{"objectName":"teapot","personality":"a sassy grandma who judges your tea choices","animationPrompt":"teapot wiggles its spout and winks"}"#;

/// Analyzer that parses a canned model answer, like the real one does.
struct CannedAnalyzer {
    answer: String,
}

impl PersonaAnalyzer for CannedAnalyzer {
    fn analyze(&self, _image: &ImagePayload) -> Result<PersonaDetails, AiError> {
        parse_persona(&self.answer)
    }
}

/// Job service that stays pending for a number of checks, then finishes.
struct SlowJobs {
    pending: usize,
    polls: AtomicUsize,
}

impl VideoJobApi for SlowJobs {
    fn submit(&self, _image: &ImagePayload, _prompt: &str) -> Result<JobHandle, AiError> {
        Ok(JobHandle("models/veo/operations/teapot".to_string()))
    }

    fn poll(&self, _job: &JobHandle) -> Result<JobStatus, AiError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        if n < self.pending {
            Ok(JobStatus::Pending)
        } else {
            Ok(JobStatus::Done {
                video_uri: Some("https://files/teapot.mp4".to_string()),
            })
        }
    }

    fn fetch(&self, _video_uri: &str) -> Result<VideoPayload, AiError> {
        Ok(VideoPayload {
            bytes: b"\x00\x00\x00\x18ftypmp42".to_vec(),
            mime_type: "video/mp4".to_string(),
        })
    }
}

/// Lets a test hold a stage open until it decides to release it.
struct Gate {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Gate {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Self {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (gate, entered_rx, release_tx)
    }

    fn pass(&self) {
        self.entered.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
    }
}

struct GatedAnalyzer(Arc<Gate>);

impl PersonaAnalyzer for GatedAnalyzer {
    fn analyze(&self, _image: &ImagePayload) -> Result<PersonaDetails, AiError> {
        self.0.pass();
        parse_persona(TEAPOT_JSON)
    }
}

/// Holds only its first call at the gate, and labels each video with its call number.
struct FirstCallGated {
    gate: Arc<Gate>,
    calls: AtomicUsize,
}

impl AnimationGenerator for FirstCallGated {
    fn generate(
        &self,
        _image: &ImagePayload,
        _animation_prompt: &str,
        _token: &RunToken,
    ) -> Result<VideoPayload, AiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            self.gate.pass();
        }
        Ok(VideoPayload {
            bytes: format!("video from call {}", call).into_bytes(),
            mime_type: "video/mp4".to_string(),
        })
    }
}

fn teapot_photo() -> ImagePayload {
    ImagePayload::new(vec![0xff, 0xd8, 0xff, 0xe0], "image/jpeg")
}

fn controller_with(
    analyzer: Arc<dyn PersonaAnalyzer>,
    generator: Arc<dyn AnimationGenerator>,
) -> PipelineController {
    PipelineController::new(analyzer, generator, Arc::new(PresetKey(true)))
}

#[test]
fn teapot_photo_becomes_an_animated_teapot() {
    let generator = Arc::new(PollingGenerator::new(
        SlowJobs {
            pending: 3,
            polls: AtomicUsize::new(0),
        },
        Duration::ZERO,
        Some(Duration::from_secs(60)),
    ));
    let controller = controller_with(
        Arc::new(CannedAnalyzer {
            answer: TEAPOT_JSON.to_string(),
        }),
        generator.clone(),
    );

    let state = controller.start(teapot_photo()).unwrap();

    assert_eq!(state.stage(), Stage::Completed);
    assert_eq!(state.persona().unwrap().object_name, "teapot");
    let video = state.video().unwrap();
    assert!(!video.bytes().is_empty());
    assert_eq!(video.file_name(), "animated-teapot.mp4");
    assert_eq!(generator.api().polls.load(Ordering::SeqCst), 4);
}

#[test]
fn missing_animation_prompt_ends_in_error_not_generating() {
    let generator = Arc::new(PollingGenerator::new(
        SlowJobs {
            pending: 0,
            polls: AtomicUsize::new(0),
        },
        Duration::ZERO,
        None,
    ));
    let controller = controller_with(
        Arc::new(CannedAnalyzer {
            answer: r#"{"objectName":"teapot","personality":"sassy"}"#.to_string(),
        }),
        generator.clone(),
    );
    let updates = controller.subscribe();

    let state = controller.start(teapot_photo()).unwrap();

    let stages: Vec<Stage> = updates.try_iter().map(|s| s.stage()).collect();
    assert_eq!(stages, vec![Stage::Analyzing, Stage::Error]);
    assert!(state.error_message().unwrap().contains("animationPrompt"));
    assert_eq!(generator.api().polls.load(Ordering::SeqCst), 0);
}

#[test]
fn reset_while_analyzing_discards_the_persona() {
    let (gate, entered, release) = Gate::new();
    let controller = controller_with(
        Arc::new(GatedAnalyzer(gate)),
        Arc::new(PollingGenerator::new(
            SlowJobs {
                pending: 0,
                polls: AtomicUsize::new(0),
            },
            Duration::ZERO,
            None,
        )),
    );

    let run = controller.spawn(teapot_photo()).unwrap();
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(controller.state().stage(), Stage::Analyzing);

    controller.reset();
    release.send(()).unwrap();
    run.join().unwrap();

    assert_eq!(controller.state(), PipelineState::Idle);
}

#[test]
fn late_result_from_a_reset_run_does_not_clobber_the_next_one() {
    let (gate, entered, release) = Gate::new();
    let generator = Arc::new(FirstCallGated {
        gate,
        calls: AtomicUsize::new(0),
    });
    let controller = controller_with(
        Arc::new(CannedAnalyzer {
            answer: TEAPOT_JSON.to_string(),
        }),
        generator,
    );

    let first = controller.spawn(teapot_photo()).unwrap();
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(controller.state().stage(), Stage::Generating);
    assert!(controller.spawn(teapot_photo()).is_err());

    controller.reset();
    let second = controller.start(teapot_photo()).unwrap();
    assert_eq!(second.video().unwrap().bytes(), b"video from call 2");

    release.send(()).unwrap();
    first.join().unwrap();

    let state = controller.state();
    assert_eq!(state.stage(), Stage::Completed);
    assert_eq!(state.video().unwrap().bytes(), b"video from call 2");
}

#[test]
fn reset_after_failure_allows_a_fresh_start() {
    let controller = controller_with(
        Arc::new(CannedAnalyzer {
            answer: "not json at all".to_string(),
        }),
        Arc::new(PollingGenerator::new(
            SlowJobs {
                pending: 0,
                polls: AtomicUsize::new(0),
            },
            Duration::ZERO,
            None,
        )),
    );

    let failed = controller.start(teapot_photo()).unwrap();
    assert_eq!(failed.stage(), Stage::Error);
    assert_eq!(failed.image(), Some(&teapot_photo()));

    controller.reset();
    assert!(controller.state().is_idle());
    assert_eq!(controller.start(teapot_photo()).unwrap().stage(), Stage::Error);
}
