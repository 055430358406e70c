use crate::shared::error::StreamError;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;

/// Consumes ordered output frames and produces an outbound bitstream.
///
/// `finalize` must be reached on both the normal and the error exit
/// path so the peer always receives a well-formed stream trailer.
pub trait FrameSink: Send {
    /// Opens the outbound stream. `info` describes the frames that will
    /// be written (input dimensions); implementations may rescale to a
    /// configured output format.
    fn open(&mut self, info: &StreamInfo) -> Result<(), StreamError>;

    fn write(&mut self, frame: &Frame) -> Result<(), StreamError>;

    /// Flushes the encoder and writes the container trailer. Idempotent.
    fn finalize(&mut self) -> Result<(), StreamError>;
}
