// src/main.rs
use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use animasnap::ai::{GeminiAnalyzer, PersonaAnalyzer};
use animasnap::capture::{CaptureError, CaptureProvider, CaptureSource, ImagePayload};
use animasnap::config::{Config, API_KEY_VAR};
use animasnap::keys::{EnvKeySelector, KeySelector};
use animasnap::pipeline::{PersonaDetails, PipelineController, PipelineState, Stage};

#[derive(Parser)]
#[command(name = "animasnap")]
#[command(about = "Bring the objects in your photos to life", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture an image, invent a persona for it and animate it
    Animate {
        #[command(flatten)]
        capture: CaptureArgs,

        #[command(flatten)]
        models: ModelArgs,

        /// Directory the finished video is saved to
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Seconds between job status checks (default: 10)
        #[arg(long)]
        poll_secs: Option<u64>,

        /// Give up after this many seconds of polling, 0 for no limit (default: 600)
        #[arg(long)]
        max_wait_secs: Option<u64>,
    },
    /// Only invent the persona, no video
    Analyze {
        #[command(flatten)]
        capture: CaptureArgs,

        #[command(flatten)]
        models: ModelArgs,
    },
    /// Check that an API key is selected, and ask for one if not
    CheckKey,
    /// Run simple interactive mode
    Interactive {
        #[command(flatten)]
        models: ModelArgs,

        /// Directory finished videos are saved to
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
#[group(multiple = false)]
struct CaptureArgs {
    /// Image file to animate
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Capture the primary screen
    #[arg(long)]
    screen: bool,

    /// Choose an image with the file dialog (the default)
    #[arg(long)]
    pick: bool,

    /// Use the image on the clipboard
    #[arg(long)]
    clipboard: bool,
}

impl CaptureArgs {
    fn source(&self) -> CaptureSource {
        if let Some(path) = &self.file {
            CaptureSource::File(path.clone())
        } else if self.screen {
            CaptureSource::Screen
        } else if self.clipboard {
            CaptureSource::Clipboard
        } else {
            if !self.pick {
                info!("No image source given, opening the file picker");
            }
            CaptureSource::Picker
        }
    }
}

#[derive(Args)]
struct ModelArgs {
    /// Model that invents the persona (e.g., "gemini-2.5-flash")
    #[arg(long)]
    persona_model: Option<String>,

    /// Model that renders the video (e.g., "veo-3.1-fast-generate-preview")
    #[arg(long)]
    video_model: Option<String>,

    /// API base URL (default: https://generativelanguage.googleapis.com/v1beta)
    #[arg(long)]
    base_url: Option<String>,
}

impl ModelArgs {
    fn config(self) -> Config {
        Config::from_env()
            .with_base_url(self.base_url)
            .with_persona_model(self.persona_model)
            .with_video_model(self.video_model)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info")
    );

    let cli = Cli::parse();

    match cli.command {
        Commands::Animate { capture, models, out, poll_secs, max_wait_secs } => {
            let keys = Arc::new(EnvKeySelector::new());
            ensure_key(keys.as_ref())?;
            let config = models
                .config()
                .with_output_dir(out)
                .with_poll_secs(poll_secs)
                .with_max_wait_secs(max_wait_secs);
            run_animate(&capture.source(), &config, keys)
        }
        Commands::Analyze { capture, models } => {
            ensure_key(&EnvKeySelector::new())?;
            run_analyze(&capture.source(), &models.config())
        }
        Commands::CheckKey => {
            check_key()
        }
        Commands::Interactive { models, out } => {
            let keys = Arc::new(EnvKeySelector::new());
            ensure_key(keys.as_ref())?;
            run_interactive_mode(&models.config().with_output_dir(out), keys)
        }
    }
}

fn ensure_key(keys: &dyn KeySelector) -> Result<()> {
    if !keys.has_selected_key() {
        keys.open_key_selector();
    }
    if !keys.has_selected_key() {
        bail!("No API key selected. Set {} and try again.", API_KEY_VAR);
    }
    Ok(())
}

fn check_key() -> Result<()> {
    let keys = EnvKeySelector::new();

    if keys.has_selected_key() {
        println!("✓ API key found in {}", keys.vars().join(" or "));
        return Ok(());
    }

    println!("✗ No API key in {}", keys.vars().join(" or "));
    keys.open_key_selector();

    if keys.has_selected_key() {
        println!("✓ API key selected for this session");
        println!("  To keep it, add `export {}=...` to your shell profile.", API_KEY_VAR);
    } else {
        println!("✗ Still no API key selected");
    }

    Ok(())
}

fn capture_image(provider: &mut CaptureProvider, source: &CaptureSource) -> Result<ImagePayload> {
    match provider.capture(source) {
        Ok(image) => {
            info!("Captured {} bytes of {}", image.len(), image.mime_type());
            Ok(image)
        }
        Err(CaptureError::Dismissed) => bail!("No image selected"),
        Err(e) => Err(anyhow!("Capture failed: {}", e)),
    }
}

fn run_analyze(source: &CaptureSource, config: &Config) -> Result<()> {
    let mut provider = CaptureProvider::new();
    let image = capture_image(&mut provider, source)?;

    let analyzer = GeminiAnalyzer::new(config)?;
    match analyzer.analyze(&image) {
        Ok(persona) => {
            print_persona(&persona);
            Ok(())
        }
        Err(e) => {
            error!("Persona analysis failed: {}", e);
            print_hints(&e.to_string());
            Err(e.into())
        }
    }
}

fn run_animate(
    source: &CaptureSource,
    config: &Config,
    keys: Arc<EnvKeySelector>,
) -> Result<()> {
    info!("Starting animation run");

    let mut provider = CaptureProvider::new();
    let image = capture_image(&mut provider, source)?;

    let controller = animasnap::connect(config, keys)?;
    match run_to_end(&controller, image, config)? {
        PipelineState::Completed { .. } => Ok(()),
        PipelineState::Error { message, .. } => Err(anyhow!(message)),
        other => Err(anyhow!("Run ended unexpectedly while {}", other.stage())),
    }
}

/// Start a run, print every snapshot as it happens, save the video if there is one.
fn run_to_end(
    controller: &PipelineController,
    image: ImagePayload,
    config: &Config,
) -> Result<PipelineState> {
    let updates = controller.subscribe();
    let run = controller.spawn(image)?;

    follow(&updates, &run);

    let final_state = run
        .join()
        .map_err(|_| anyhow!("Pipeline thread panicked"))?;

    match &final_state {
        PipelineState::Completed { video, .. } => {
            let path = video.save_to(&config.output_dir)?;
            println!("✓ Saved to: {}", path.display());
        }
        PipelineState::Error { message, .. } => {
            error!("Run failed: {}", message);
            print_hints(message);
        }
        _ => {}
    }

    Ok(final_state)
}

/// Print snapshots until the run reaches a resting state or its thread ends.
fn follow(updates: &Receiver<PipelineState>, run: &JoinHandle<PipelineState>) {
    loop {
        match updates.recv_timeout(Duration::from_millis(500)) {
            Ok(snapshot) => {
                print_snapshot(&snapshot);
                if matches!(snapshot.stage(), Stage::Completed | Stage::Error | Stage::Idle) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) if run.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn print_snapshot(state: &PipelineState) {
    match state {
        PipelineState::Idle => println!("Ready for a new photo."),
        PipelineState::Analyzing { .. } => {
            println!("\nLooking for the star of your photo...");
        }
        PipelineState::Generating { persona, .. } => {
            print_persona(persona);
            println!("Animating... this usually takes a few minutes.");
        }
        PipelineState::Completed { video, .. } => {
            println!(
                "✓ Animation ready at {}: {} ({}, {:.1} MB)",
                video.created_at().format("%H:%M:%S"),
                video.file_name(),
                video.mime_type(),
                video.bytes().len() as f64 / (1024.0 * 1024.0)
            );
        }
        PipelineState::Error { message, .. } => {
            println!("✗ {}", message);
        }
    }
}

fn print_persona(persona: &PersonaDetails) {
    println!("\n=== Meet the {} ===", persona.object_name);
    println!("{}", persona.personality);
    println!("\nAnimation: {}", persona.animation_prompt);
    println!("===========================================\n");
}

fn print_hints(message: &str) {
    if message.contains("HTTP 401") || message.contains("HTTP 403") || message.contains("API key") {
        println!("\nCheck your key with: animasnap check-key");
    } else if message.contains("HTTP 429") {
        println!("\nQuota exhausted. Video models need a key with billing enabled.");
    } else if message.contains("HTTP 404") {
        println!("\nThat model is not available to your key. Try --persona-model / --video-model.");
    }
}

fn run_interactive_mode(config: &Config, keys: Arc<EnvKeySelector>) -> Result<()> {
    println!("AnimaSnap Interactive Mode");
    println!("==========================");

    let controller = animasnap::connect(config, keys)?;
    let mut provider = CaptureProvider::new();

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        println!("\nMain Menu:");
        println!("1. Capture Full Screen");
        println!("2. Open Image File");
        println!("3. Choose Image...");
        println!("4. Paste From Clipboard");
        println!("5. Save Last Video");
        println!("6. Reset");
        println!("7. Exit");
        print!("\nEnter your choice (1-7): ");
        io::stdout().flush()?;

        input.clear();
        stdin.lock().read_line(&mut input)?;
        let choice = input.trim();

        let source = match choice {
            "1" => Some(CaptureSource::Screen),
            "2" => {
                print!("Path to image: ");
                io::stdout().flush()?;
                input.clear();
                stdin.lock().read_line(&mut input)?;
                let path = input.trim();
                if path.is_empty() {
                    None
                } else {
                    Some(CaptureSource::File(PathBuf::from(path)))
                }
            }
            "3" => Some(CaptureSource::Picker),
            "4" => Some(CaptureSource::Clipboard),
            "5" => {
                match controller.state().video() {
                    Some(video) => match video.save_to(&config.output_dir) {
                        Ok(path) => println!("✓ Saved to: {}", path.display()),
                        Err(e) => println!("✗ Failed to save video: {}", e),
                    },
                    None => println!("No finished video yet."),
                }
                None
            }
            "6" => {
                controller.reset();
                provider.clear();
                println!("✓ Cleared");
                None
            }
            "7" => {
                println!("Exiting AnimaSnap");
                break;
            }
            _ => {
                println!("Invalid choice. Please enter a number between 1 and 7.");
                None
            }
        };

        let Some(source) = source else { continue };

        let image = match capture_image(&mut provider, &source) {
            Ok(image) => image,
            Err(e) => {
                println!("✗ {}", e);
                continue;
            }
        };

        if !controller.state().is_idle() {
            info!("Starting over with the new image");
            controller.reset();
        }

        if let Err(e) = run_to_end(&controller, image, config) {
            warn!("Run could not finish: {}", e);
            println!("✗ {}", e);
        }
    }

    Ok(())
}
