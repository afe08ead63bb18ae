use face_capture::{
    camera::{CameraLease, FrameSource, StillFrameSource, SyntheticFrameSource},
    common::Config,
    core::{
        AcceptanceGate, BoundingBox, CaptureStatus, CenteringEvaluator, Detection,
        EnrollmentFlow, EnrollmentSettings, FrameDimensions, FrameSampler, LoginFlow,
        LoginOutcome, LoginSettings, ReplayDetector, StatusEvent, Verdict,
    },
    service::BackendClient,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "face-capture")]
#[command(about = "Face enrollment and login capture engine")]
struct Cli {
    /// Enable verbose development logging
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (defaults to the standard search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face: live hints, press Enter to capture
    Enroll {
        /// Bearer credential of the signed-in user
        #[arg(short, long)]
        token: String,
        #[command(flatten)]
        input: InputArgs,
    },
    /// Log in by face
    Login {
        #[arg(short, long)]
        email: String,
        #[command(flatten)]
        input: InputArgs,
    },
    /// Evaluate one detection against every threshold profile
    Evaluate {
        /// Face box as x,y,width,height
        #[arg(long = "box", value_parser = parse_box)]
        bbox: BoundingBox,
        /// Frame size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_frame)]
        frame: FrameDimensions,
        #[arg(long)]
        score: f32,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Recorded detections (JSON array, null for frames without a face)
    #[arg(short, long)]
    detections: PathBuf,
    /// Directory of frames to replay; blank frames of the configured size otherwise
    #[arg(short, long)]
    frames: Option<PathBuf>,
    /// Simulated inference time per sample
    #[arg(long, default_value = "0")]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Enroll { token, input } => {
            let lease = open_camera(&config, input.frames.as_deref())?;
            let sampler = build_sampler(&config, lease.clone(), &input)?;
            let backend = Arc::new(BackendClient::new(config.backend.clone())?);
            let mut flow = EnrollmentFlow::new(
                sampler,
                backend,
                token,
                EnrollmentSettings::from_config(&config),
            );
            let result = run_enrollment(&mut flow).await;
            flow.dispose();
            lease.release();
            result?;
        }
        Commands::Login { email, input } => {
            let lease = open_camera(&config, input.frames.as_deref())?;
            let sampler = build_sampler(&config, lease.clone(), &input)?;
            let backend = Arc::new(BackendClient::new(config.backend.clone())?);
            let mut flow = LoginFlow::new(sampler, backend, LoginSettings::from_config(&config));
            let result = run_login(&mut flow, email).await;
            flow.dispose();
            lease.release();
            result?;
        }
        Commands::Evaluate { bbox, frame, score } => {
            let gate = AcceptanceGate::new(CenteringEvaluator::new(config.centering));
            let detection = Detection {
                embedding: Vec::new(),
                bounding_box: bbox,
                score,
            };
            for (name, profile) in [
                ("feedback", config.profiles.feedback),
                ("capture", config.profiles.capture),
                ("login", config.profiles.login),
            ] {
                match gate.evaluate(Some(&detection), frame, &profile)? {
                    Verdict::Accepted => println!("{:<8} accepted", name),
                    Verdict::Rejected(reason) => {
                        println!("{:<8} rejected: {} ({})", name, reason, reason.guidance())
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run_enrollment(flow: &mut EnrollmentFlow) -> Result<()> {
    let mut events = flow.subscribe();
    flow.start()?;
    println!("Line up your face, then press Enter to capture.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
                let event = events.borrow_and_update().clone();
                print_event(&event);
                if event.status == CaptureStatus::Error {
                    anyhow::bail!("enrollment failed: {}", event.message);
                }
            }
            line = lines.next_line() => {
                if line?.is_none() {
                    break;
                }
                if let Err(e) = flow.capture().await {
                    eprintln!("Capture failed: {}", e);
                }
                match flow.status() {
                    CaptureStatus::Success if flow.receipt().is_some() => {
                        println!("✓ {}", flow.snapshot().message);
                        return Ok(());
                    }
                    CaptureStatus::Error => {
                        anyhow::bail!("enrollment failed: {}", flow.snapshot().message);
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

async fn run_login(flow: &mut LoginFlow, email: String) -> Result<()> {
    let mut events = flow.subscribe();
    flow.start(email)?;
    println!("Look at the camera...");

    let outcome = loop {
        tokio::select! {
            outcome = flow.wait() => break outcome,
            changed = events.changed() => {
                if changed.is_ok() {
                    print_event(&events.borrow_and_update().clone());
                }
            }
        }
    };

    match outcome {
        LoginOutcome::Verified(login) => {
            let name = login.user.name.as_deref().unwrap_or(&login.user.email);
            println!("✓ Signed in as {}", name);
            Ok(())
        }
        LoginOutcome::Failed(message) => anyhow::bail!("login failed: {}", message),
        LoginOutcome::Pending => anyhow::bail!("login did not finish"),
    }
}

fn open_camera(config: &Config, frames: Option<&Path>) -> Result<Arc<CameraLease>> {
    let lease = match frames {
        Some(dir) => CameraLease::acquire(StillFrameSource::from_dir(dir)?),
        None => CameraLease::acquire(SyntheticFrameSource::new(
            config.camera.width,
            config.camera.height,
        )),
    };
    Ok(lease)
}

fn build_sampler(
    config: &Config,
    lease: Arc<CameraLease>,
    input: &InputArgs,
) -> Result<Arc<FrameSampler>> {
    let detector = ReplayDetector::from_json_file(&input.detections)
        .with_context(|| format!("loading detections from {}", input.detections.display()))?
        .with_latency(Duration::from_millis(input.latency_ms));
    let source: Arc<dyn FrameSource> = lease;

    Ok(Arc::new(
        FrameSampler::new(source, Arc::new(detector))
            .with_sample_timeout(config.capture.sample_timeout()),
    ))
}

fn print_event(event: &StatusEvent) {
    println!(
        "[{}] {:<9} {} (attempts: {})",
        event.at.format("%H:%M:%S"),
        event.status.to_string(),
        event.message,
        event.attempts
    );
}

fn parse_box(s: &str) -> std::result::Result<BoundingBox, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("invalid number '{}': {}", p, e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(BoundingBox::new(*x, *y, *w, *h)),
        _ => Err("expected x,y,width,height".to_string()),
    }
}

fn parse_frame(s: &str) -> std::result::Result<FrameDimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w.trim().parse().map_err(|e| format!("invalid width: {}", e))?;
    let height = h.trim().parse().map_err(|e| format!("invalid height: {}", e))?;
    Ok(FrameDimensions::new(width, height))
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
