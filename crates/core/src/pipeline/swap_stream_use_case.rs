//! Orchestrates a full relay run: opens both stream endpoints, derives
//! the target identity from the configured source image, and hands the
//! open streams to a `PipelineExecutor`.

use std::path::Path;
use std::sync::Arc;

use crate::compositing::domain::frame_compositor::FrameCompositor;
use crate::inference::domain::alignment::warp_frame_to_crop;
use crate::inference::domain::face_locator::FaceLocator;
use crate::inference::domain::identity_embedder::IdentityEmbedder;
use crate::inference::domain::target_identity::TargetIdentity;
use crate::inference::infrastructure::onnx_identity_swapper::alignment_for;
use crate::pipeline::pipeline_executor::{
    PipelineConfig, PipelineExecutor, PipelineState, SwapEngines,
};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_stats::{PipelineStats, StatsSnapshot};
use crate::shared::constants::SWAP_CROP_SIZE;
use crate::shared::error::{InferenceError, InferenceStage, PipelineError, StartupError};
use crate::shared::frame::Frame;
use crate::stream::domain::frame_sink::FrameSink;
use crate::stream::domain::frame_source::FrameSource;

/// Single-use orchestrator: `execute` consumes it, so a second run
/// needs a fresh instance.
pub struct SwapStreamUseCase {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    engines: SwapEngines,
    compositor: Arc<dyn FrameCompositor>,
    executor: Box<dyn PipelineExecutor>,
    stats: Arc<PipelineStats>,
    config: PipelineConfig,
    startup_timeout_secs: u64,
}

impl SwapStreamUseCase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        engines: SwapEngines,
        compositor: Arc<dyn FrameCompositor>,
        executor: Box<dyn PipelineExecutor>,
        config: PipelineConfig,
        startup_timeout_secs: u64,
    ) -> Self {
        Self {
            source,
            sink,
            engines,
            compositor,
            executor,
            stats: Arc::new(PipelineStats::new()),
            config,
            startup_timeout_secs,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn execute(
        mut self,
        logger: &mut dyn PipelineLogger,
    ) -> Result<StatsSnapshot, PipelineError> {
        logger.info(&format!("pipeline {}", PipelineState::Starting));

        let info = self.source.open().map_err(|e| StartupError::StreamOpen {
            role: "input",
            timeout_secs: self.startup_timeout_secs,
            source: e,
        })?;
        logger.info(&format!(
            "input stream: {}x{} @ {:.1} fps ({})",
            info.width, info.height, info.fps, info.codec
        ));

        self.sink
            .open(&info)
            .map_err(|e| StartupError::StreamOpen {
                role: "output",
                timeout_secs: self.startup_timeout_secs,
                source: e,
            })?;

        // Budget defaults to the input frame interval
        if self.config.frame_budget_ms <= 0.0 {
            self.config.frame_budget_ms = info.frame_interval_ms();
        }

        let result = self.executor.execute(
            self.source,
            self.sink,
            self.engines,
            self.compositor,
            &info,
            self.stats.clone(),
            logger,
            self.config,
        );
        result.map(|()| self.stats.snapshot())
    }
}

/// Loads an RGB frame from an image file on disk.
pub fn load_source_image(path: &Path) -> Result<Frame, StartupError> {
    if !path.exists() {
        return Err(StartupError::SourceImageNotFound(path.to_path_buf()));
    }
    let image = image::open(path)
        .map_err(|e| StartupError::SourceImageLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgb8();
    let (width, height) = (image.width(), image.height());
    Ok(Frame::new(image.into_raw(), width, height, 3, 0, 0))
}

/// Derives the fixed target identity from a source image.
///
/// Runs the locator on the image, takes the left-most face, embeds it,
/// and keeps its aligned crop. All failures here are fatal startup
/// errors: the relay is useless without an identity.
pub fn build_target_identity(
    locator: &mut dyn FaceLocator,
    embedder: &mut dyn IdentityEmbedder,
    source_image: &Frame,
    image_path: &Path,
) -> Result<TargetIdentity, StartupError> {
    let regions = locator
        .locate(source_image)
        .map_err(StartupError::Identity)?;
    let region = regions
        .first()
        .cloned()
        .ok_or_else(|| StartupError::NoFaceInSource(image_path.to_path_buf()))?;

    let embedding = embedder.embed(source_image, &region)?;

    let to_crop = alignment_for(&region, SWAP_CROP_SIZE).ok_or_else(|| {
        StartupError::Identity(InferenceError::new(
            InferenceStage::Embed,
            "source face has no complete landmark set",
        ))
    })?;
    let crop = warp_frame_to_crop(source_image, &to_crop, SWAP_CROP_SIZE).ok_or_else(|| {
        StartupError::Identity(InferenceError::new(
            InferenceStage::Embed,
            "source face alignment is singular",
        ))
    })?;

    Ok(TargetIdentity::new(embedding, crop))
}
