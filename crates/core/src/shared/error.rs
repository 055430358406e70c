use std::path::PathBuf;

use thiserror::Error;

/// Errors scoped to a stream endpoint.
///
/// `Closed` is the expected end-of-life signal; everything else is a
/// genuine failure of the input or output side.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream does not parse as a recognized container/codec: {0}")]
    Format(String),
    #[error("peer disconnected")]
    Closed,
    #[error("stream I/O error: {0}")]
    Io(String),
}

impl StreamError {
    /// Maps an ffmpeg error to the taxonomy: EOF means the peer is done,
    /// decode errors mean the bitstream is unparseable.
    pub fn from_ffmpeg(err: ffmpeg_next::Error) -> Self {
        match err {
            ffmpeg_next::Error::Eof => StreamError::Closed,
            ffmpeg_next::Error::InvalidData => StreamError::Format(err.to_string()),
            other => StreamError::Io(other.to_string()),
        }
    }
}

/// A failure inside one of the opaque inference engines.
///
/// Always scoped to a single frame or region; the pipeline recovers by
/// skipping that unit, never by unwinding the stream.
#[derive(Error, Debug)]
#[error("{stage} inference failed: {message}")]
pub struct InferenceError {
    pub stage: InferenceStage,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceStage {
    Locate,
    Embed,
    Swap,
    Enhance,
}

impl std::fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InferenceStage::Locate => "locate",
            InferenceStage::Embed => "embed",
            InferenceStage::Swap => "swap",
            InferenceStage::Enhance => "enhance",
        };
        f.write_str(name)
    }
}

impl InferenceError {
    pub fn new(stage: InferenceStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Fatal configuration or initialization failures.
///
/// Any of these aborts startup with a non-zero exit and a diagnostic;
/// none of them can occur once the pipeline is running.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },
    #[error("source image not found: {0}")]
    SourceImageNotFound(PathBuf),
    #[error("failed to load source image {path}: {message}")]
    SourceImageLoad { path: PathBuf, message: String },
    #[error("no face detected in source image {0}")]
    NoFaceInSource(PathBuf),
    #[error("invalid endpoint '{url}': {message}")]
    Endpoint { url: String, message: String },
    #[error("could not open {role} stream within {timeout_secs}s: {source}")]
    StreamOpen {
        role: &'static str,
        timeout_secs: u64,
        #[source]
        source: StreamError,
    },
    #[error("identity setup failed: {0}")]
    Identity(#[from] InferenceError),
}

/// Top-level pipeline outcome errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("input stream failed: {0}")]
    Input(#[source] StreamError),
    #[error("output stream failed: {0}")]
    Output(#[source] StreamError),
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
    #[error("drain did not complete within {0}s")]
    DrainTimeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_from_eof_is_closed() {
        let err = StreamError::from_ffmpeg(ffmpeg_next::Error::Eof);
        assert!(matches!(err, StreamError::Closed));
    }

    #[test]
    fn test_stream_error_from_invalid_data_is_format() {
        let err = StreamError::from_ffmpeg(ffmpeg_next::Error::InvalidData);
        assert!(matches!(err, StreamError::Format(_)));
    }

    #[test]
    fn test_inference_error_display_names_stage() {
        let err = InferenceError::new(InferenceStage::Swap, "bad tensor shape");
        let text = err.to_string();
        assert!(text.contains("swap"));
        assert!(text.contains("bad tensor shape"));
    }

    #[test]
    fn test_pipeline_error_wraps_startup() {
        let err: PipelineError =
            StartupError::ModelNotFound(PathBuf::from("/missing.onnx")).into();
        assert!(err.to_string().contains("/missing.onnx"));
    }
}
