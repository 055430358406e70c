/// Properties of a decoded video stream, captured when the input opens
/// and used to configure the output encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
}

impl StreamInfo {
    /// Frame budget implied by the stream rate, in milliseconds.
    /// Falls back to 30 fps when the rate is unknown.
    pub fn frame_interval_ms(&self) -> f64 {
        let fps = if self.fps > 0.0 { self.fps } else { 30.0 };
        1000.0 / fps
    }
}
