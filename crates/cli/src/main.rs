use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;

use swapcam_core::compositing::infrastructure::feather_compositor::FeatherCompositor;
use swapcam_core::inference::domain::face_enhancer::FaceEnhancer;
use swapcam_core::inference::domain::face_locator::FaceLocator;
use swapcam_core::inference::domain::identity_embedder::IdentityEmbedder;
use swapcam_core::inference::domain::target_identity::TargetIdentity;
use swapcam_core::inference::infrastructure::model_resolver;
use swapcam_core::inference::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use swapcam_core::inference::infrastructure::onnx_face_enhancer::OnnxFaceEnhancer;
use swapcam_core::inference::infrastructure::onnx_face_locator::OnnxFaceLocator;
use swapcam_core::inference::infrastructure::onnx_identity_swapper::OnnxIdentitySwapper;
use swapcam_core::pipeline::frame_queue::OverflowPolicy;
use swapcam_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use swapcam_core::pipeline::pipeline_executor::{PipelineConfig, SwapEngines};
use swapcam_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use swapcam_core::pipeline::swap_stream_use_case::{
    build_target_identity, load_source_image, SwapStreamUseCase,
};
use swapcam_core::shared::constants::{
    DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_FEATHER_RATIO, DEFAULT_FRAMES_TO_RECOVER,
    DEFAULT_MISSES_TO_DEGRADE, DEFAULT_QUEUE_CAPACITY, DEFAULT_STARTUP_TIMEOUT_SECS,
    DEFAULT_WORKERS, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, LOCATOR_MODEL_NAME,
    LOCATOR_MODEL_URL,
};
use swapcam_core::stream::endpoint::{EndpointRole, StreamEndpoint};
use swapcam_core::stream::infrastructure::tcp_demuxer::TcpDemuxer;
use swapcam_core::stream::infrastructure::tcp_muxer::TcpMuxer;

/// Live face swapping for TCP video streams.
#[derive(Parser)]
#[command(name = "swapcam")]
struct Cli {
    /// Input stream to connect to (tcp://host:port).
    #[arg(long)]
    input_tcp: String,

    /// Output stream to serve (tcp://host:port); waits for one consumer.
    #[arg(long)]
    output_tcp: String,

    /// Listen on the input address instead of connecting to it.
    #[arg(long)]
    input_listen: bool,

    /// Connect to the output address instead of serving it.
    #[arg(long)]
    output_connect: bool,

    /// Path to the face swap ONNX model.
    #[arg(long)]
    swapper_model: PathBuf,

    /// Path to a face enhancement ONNX model (optional).
    #[arg(long)]
    enhancer_model: Option<PathBuf>,

    /// Image of the person whose identity is swapped in.
    #[arg(long)]
    source_image: PathBuf,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// Feather width at composited face edges, as a fraction of the
    /// face crop (0.0-0.5).
    #[arg(long, default_value_t = DEFAULT_FEATHER_RATIO)]
    feather_ratio: f64,

    /// Swap at most this many faces per frame, left to right (0 = all).
    #[arg(long, default_value = "0")]
    max_faces: usize,

    /// Inference worker threads.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Decoded frames buffered ahead of the workers; the oldest is
    /// dropped when full.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Stall the decoder instead of dropping frames when the buffer
    /// is full. Output falls behind live when inference cannot keep up.
    #[arg(long)]
    no_drop: bool,

    /// Per-frame processing budget in milliseconds (0 = derive from
    /// the input frame rate).
    #[arg(long, default_value = "0")]
    frame_budget_ms: f64,

    /// Consecutive over-budget frames before quality is reduced.
    #[arg(long, default_value_t = DEFAULT_MISSES_TO_DEGRADE)]
    misses_to_degrade: usize,

    /// Consecutive on-budget frames before quality is restored.
    #[arg(long, default_value_t = DEFAULT_FRAMES_TO_RECOVER)]
    frames_to_recover: usize,

    /// Seconds to wait for both sockets at startup.
    #[arg(long, default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS)]
    startup_timeout: u64,

    /// Seconds to wait for in-flight frames after the input ends.
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    drain_timeout: u64,

    /// Encoded output width (requires --height; default keeps the
    /// input resolution).
    #[arg(long)]
    width: Option<u32>,

    /// Encoded output height (requires --width).
    #[arg(long)]
    height: Option<u32>,

    /// Output frame rate override (default keeps the input rate).
    #[arg(long)]
    fps: Option<f64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let input_role = if cli.input_listen {
        EndpointRole::Listen
    } else {
        EndpointRole::Connect
    };
    let output_role = if cli.output_connect {
        EndpointRole::Connect
    } else {
        EndpointRole::Listen
    };
    let input = StreamEndpoint::parse(&cli.input_tcp, input_role)?;
    let output = StreamEndpoint::parse(&cli.output_tcp, output_role)?;

    let (mut locator, mut embedder) = build_identity_engines(&cli)?;
    let identity = build_identity(&cli, &mut locator, &mut embedder)?;

    let swapper = OnnxIdentitySwapper::new(&cli.swapper_model)?;
    let enhancer: Option<Arc<Mutex<dyn FaceEnhancer>>> = match &cli.enhancer_model {
        Some(path) => Some(Arc::new(Mutex::new(OnnxFaceEnhancer::new(path)?))),
        None => None,
    };

    let engines = SwapEngines {
        locator: Arc::new(Mutex::new(locator)),
        swapper: Arc::new(Mutex::new(swapper)),
        enhancer,
        identity: Arc::new(identity),
    };

    let source = TcpDemuxer::new(&input, cli.startup_timeout);
    let mut muxer = TcpMuxer::new(&output, cli.startup_timeout);
    if let (Some(w), Some(h)) = (cli.width, cli.height) {
        muxer = muxer.with_output_size(w, h);
    }
    if let Some(fps) = cli.fps {
        muxer = muxer.with_fps(fps);
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    install_signal_handler(cancelled.clone(), cli.drain_timeout)?;

    let config = PipelineConfig {
        workers: cli.workers,
        queue_capacity: cli.queue_capacity,
        overflow_policy: if cli.no_drop {
            OverflowPolicy::Block
        } else {
            OverflowPolicy::DropOldest
        },
        max_faces: cli.max_faces,
        frame_budget_ms: cli.frame_budget_ms,
        misses_to_degrade: cli.misses_to_degrade,
        frames_to_recover: cli.frames_to_recover,
        drain_timeout_secs: cli.drain_timeout,
        cancelled,
    };

    let use_case = SwapStreamUseCase::new(
        Box::new(source),
        Box::new(muxer),
        engines,
        Arc::new(FeatherCompositor::new(cli.feather_ratio)),
        Box::new(ThreadedPipelineExecutor::new()),
        config,
        cli.startup_timeout,
    );

    let mut logger = StdoutPipelineLogger::new(30);
    let snapshot = use_case.execute(&mut logger)?;
    log::info!("Relay finished: {}", snapshot.describe());

    Ok(())
}

fn build_identity_engines(
    cli: &Cli,
) -> Result<(OnnxFaceLocator, OnnxFaceEmbedder), Box<dyn std::error::Error>> {
    log::info!("Resolving model: {LOCATOR_MODEL_NAME}");
    let locator_path = model_resolver::resolve(
        LOCATOR_MODEL_NAME,
        LOCATOR_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("face detection", d, t))),
    )?;
    eprintln!();

    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedding_path = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        None,
        Some(Box::new(|d, t| download_progress("face embedding", d, t))),
    )?;
    eprintln!();

    let locator = OnnxFaceLocator::new(&locator_path, cli.confidence)?;
    let embedder = OnnxFaceEmbedder::new(&embedding_path)?;
    Ok((locator, embedder))
}

fn build_identity(
    cli: &Cli,
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn IdentityEmbedder,
) -> Result<TargetIdentity, Box<dyn std::error::Error>> {
    let image = load_source_image(&cli.source_image)?;
    let identity = build_target_identity(locator, embedder, &image, &cli.source_image)?;
    log::info!(
        "Target identity derived from {}",
        cli.source_image.display()
    );
    Ok(identity)
}

/// First Ctrl-C drains the pipeline; a second one exits immediately.
/// A watchdog also force-terminates if draining hangs past its timeout,
/// which covers an inference call that never returns.
fn install_signal_handler(
    cancelled: Arc<AtomicBool>,
    drain_timeout_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    ctrlc::set_handler(move || {
        if cancelled.swap(true, Ordering::SeqCst) {
            eprintln!("\nForced exit");
            process::exit(130);
        }
        eprintln!("\nStopping, draining in-flight frames (Ctrl-C again to force)");
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(drain_timeout_secs + 5));
            eprintln!("Drain did not complete within {drain_timeout_secs}s, exiting");
            process::exit(1);
        });
    })?;
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.swapper_model.exists() {
        return Err(format!("Swapper model not found: {}", cli.swapper_model.display()).into());
    }
    if let Some(path) = &cli.enhancer_model {
        if !path.exists() {
            return Err(format!("Enhancer model not found: {}", path.display()).into());
        }
    }
    if !cli.source_image.exists() {
        return Err(format!("Source image not found: {}", cli.source_image.display()).into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if !(0.0..=0.5).contains(&cli.feather_ratio) {
        return Err(format!(
            "Feather ratio must be between 0.0 and 0.5, got {}",
            cli.feather_ratio
        )
        .into());
    }
    if cli.workers == 0 {
        return Err("Workers must be at least 1".into());
    }
    if cli.queue_capacity == 0 {
        return Err("Queue capacity must be at least 1".into());
    }
    if cli.frame_budget_ms < 0.0 {
        return Err(format!(
            "Frame budget must not be negative, got {}",
            cli.frame_budget_ms
        )
        .into());
    }
    if cli.width.is_some() != cli.height.is_some() {
        return Err("--width and --height must be given together".into());
    }
    if let (Some(w), Some(h)) = (cli.width, cli.height) {
        if w == 0 || h == 0 {
            return Err(format!("Output size must be positive, got {w}x{h}").into());
        }
    }
    if let Some(fps) = cli.fps {
        if fps <= 0.0 {
            return Err(format!("Frame rate must be positive, got {fps}").into());
        }
    }
    Ok(())
}

fn download_progress(what: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {what} model... {pct}%");
    } else {
        eprint!("\rDownloading {what} model... {downloaded} bytes");
    }
}
