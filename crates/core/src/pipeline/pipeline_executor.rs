use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::compositing::domain::frame_compositor::FrameCompositor;
use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::domain::face_locator::FaceLocator;
use crate::inference::domain::identity_swapper::IdentitySwapper;
use crate::inference::domain::target_identity::TargetIdentity;
use crate::pipeline::frame_queue::OverflowPolicy;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::pipeline_stats::PipelineStats;
use crate::shared::constants::{
    DEFAULT_DRAIN_TIMEOUT_SECS, DEFAULT_FRAMES_TO_RECOVER, DEFAULT_MISSES_TO_DEGRADE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
};
use crate::shared::error::PipelineError;
use crate::shared::stream_info::StreamInfo;
use crate::stream::domain::frame_sink::FrameSink;
use crate::stream::domain::frame_source::FrameSource;

/// Lifecycle of a relay run. Transitions are one-way:
/// `Starting → Running → Draining → Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The inference engines shared by the worker pool.
///
/// Engines are not assumed reentrant, so each lives behind a mutex and
/// workers serialize on it per call. The identity is immutable and
/// shared without locking.
pub struct SwapEngines {
    pub locator: Arc<Mutex<dyn FaceLocator>>,
    pub swapper: Arc<Mutex<dyn IdentitySwapper>>,
    pub enhancer: Option<Arc<Mutex<dyn FaceEnhancer>>>,
    pub identity: Arc<TargetIdentity>,
}

/// Configuration for a pipeline execution run.
pub struct PipelineConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// How the queue behaves when decoding outpaces the workers.
    pub overflow_policy: OverflowPolicy,
    /// Most faces swapped per frame, left to right. Zero means all.
    pub max_faces: usize,
    /// Per-frame wall-clock budget; overruns count as deadline misses.
    pub frame_budget_ms: f64,
    pub misses_to_degrade: usize,
    pub frames_to_recover: usize,
    pub drain_timeout_secs: u64,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
            max_faces: 0,
            frame_budget_ms: 33.3,
            misses_to_degrade: DEFAULT_MISSES_TO_DEGRADE,
            frames_to_recover: DEFAULT_FRAMES_TO_RECOVER,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Abstracts how the decode → swap → composite → encode pipeline is
/// executed.
///
/// This is a port (application-layer interface). Infrastructure provides
/// concrete implementations. Both endpoints arrive already open; the
/// executor guarantees the sink is finalized before returning, success
/// or not.
pub trait PipelineExecutor: Send {
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        engines: SwapEngines,
        compositor: Arc<dyn FrameCompositor>,
        info: &StreamInfo,
        stats: Arc<PipelineStats>,
        logger: &mut dyn PipelineLogger,
        config: PipelineConfig,
    ) -> Result<(), PipelineError>;
}
