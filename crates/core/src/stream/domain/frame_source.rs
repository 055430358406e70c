use crate::shared::error::StreamError;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;

/// Produces decoded frames from an inbound bitstream.
///
/// Implementations own the transport and codec details; the pipeline
/// sees a lazy, potentially infinite iterator of `Frame`s with strictly
/// increasing sequence numbers.
pub trait FrameSource: Send {
    /// Establishes the stream and returns its properties.
    fn open(&mut self) -> Result<StreamInfo, StreamError>;

    /// Iterator over frames in decode order. Ends with
    /// `Err(StreamError::Closed)` folded into iterator exhaustion when
    /// the peer disconnects cleanly; other errors surface as items.
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, StreamError>> + '_>;

    /// Releases any resources held by the source.
    fn close(&mut self);
}
