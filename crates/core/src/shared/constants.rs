pub const LOCATOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const LOCATOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/swapcam/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/swapcam/releases/download/v0.1.0/w600k_r50.onnx";

/// Aligned crop edge consumed and produced by the swap model.
pub const SWAP_CROP_SIZE: u32 = 128;

/// Aligned crop edge consumed by the embedding model.
pub const EMBED_CROP_SIZE: u32 = 112;

/// Crop edge consumed and produced by the enhancer model.
pub const ENHANCE_CROP_SIZE: u32 = 512;

pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_FEATHER_RATIO: f64 = 0.1;

/// Consecutive deadline misses before stepping the degradation ladder down.
pub const DEFAULT_MISSES_TO_DEGRADE: usize = 5;
/// Consecutive on-budget frames before stepping back up.
pub const DEFAULT_FRAMES_TO_RECOVER: usize = 30;

pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;
