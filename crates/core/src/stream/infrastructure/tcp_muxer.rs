use crate::shared::error::StreamError;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;
use crate::stream::domain::frame_sink::FrameSink;
use crate::stream::endpoint::StreamEndpoint;

/// Encodes output frames via ffmpeg-next and muxes them onto the
/// outbound transport.
///
/// TCP endpoints get an mpegts container with low-latency encoder
/// options; plain file URLs (used by tests) let ffmpeg pick the
/// container from the extension. The input frames may be rescaled to a
/// configured output resolution on the way through the RGB→YUV scaler.
pub struct TcpMuxer {
    url: String,
    is_tcp: bool,
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    in_width: u32,
    in_height: u32,
    out_width: Option<u32>,
    out_height: Option<u32>,
    fps_override: Option<f64>,
    fps: f64,
    frame_count: usize,
    video_stream_index: usize,
}

// Safety: TcpMuxer is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for TcpMuxer {}

impl TcpMuxer {
    pub fn new(endpoint: &StreamEndpoint, open_timeout_secs: u64) -> Self {
        let mut muxer = Self::from_url(endpoint.ffmpeg_url(open_timeout_secs));
        muxer.is_tcp = true;
        muxer
    }

    /// Writes to any ffmpeg-writable URL (including a file path).
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_tcp: false,
            octx: None,
            encoder: None,
            scaler: None,
            in_width: 0,
            in_height: 0,
            out_width: None,
            out_height: None,
            fps_override: None,
            fps: 0.0,
            frame_count: 0,
            video_stream_index: 0,
        }
    }

    /// Overrides the encoded output resolution; frames are rescaled.
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.out_width = Some(width);
        self.out_height = Some(height);
        self
    }

    /// Overrides the advertised output frame rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps_override = Some(fps);
        self
    }

    fn fps_i(&self) -> i32 {
        let fps_i = self.fps.round() as i32;
        if fps_i <= 0 {
            30
        } else {
            fps_i
        }
    }
}

impl FrameSink for TcpMuxer {
    fn open(&mut self, info: &StreamInfo) -> Result<(), StreamError> {
        ffmpeg_next::init().map_err(StreamError::from_ffmpeg)?;

        self.in_width = info.width;
        self.in_height = info.height;
        self.fps = self.fps_override.unwrap_or(info.fps);

        let out_w = self.out_width.unwrap_or(info.width);
        let out_h = self.out_height.unwrap_or(info.height);

        let mut octx = if self.is_tcp {
            ffmpeg_next::format::output_as(&self.url, "mpegts")
        } else {
            ffmpeg_next::format::output(&self.url)
        }
        .map_err(StreamError::from_ffmpeg)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        // Prefer H.264 for the live stream; fall back to MPEG4 when the
        // build has no H.264 encoder.
        let (codec, h264) = match ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::H264) {
            Some(c) => (c, true),
            None => (
                ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
                    .ok_or_else(|| StreamError::Format("no usable video encoder".into()))?,
                false,
            ),
        };

        let mut ost = octx
            .add_stream(Some(codec))
            .map_err(StreamError::from_ffmpeg)?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(StreamError::from_ffmpeg)?;

        encoder_ctx.set_width(out_w);
        encoder_ctx.set_height(out_h);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);

        let fps_i = self.fps_i();
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps_i));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps_i, 1)));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut options = ffmpeg_next::Dictionary::new();
        if h264 {
            // Low-latency settings for the live feed.
            options.set("preset", "ultrafast");
            options.set("tune", "zerolatency");
        }

        let encoder = encoder_ctx
            .open_with(options)
            .map_err(StreamError::from_ffmpeg)?;
        ost.set_parameters(&encoder);

        self.video_stream_index = 0; // first stream

        octx.write_header().map_err(StreamError::from_ffmpeg)?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg_next::format::Pixel::YUV420P,
            out_w,
            out_h,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(StreamError::from_ffmpeg)?;

        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = Some(scaler);
        self.frame_count = 0;

        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let fps_i = self.fps_i();
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| StreamError::Io("muxer not opened".into()))?;
        let scaler = self.scaler.as_mut().unwrap();
        let octx = self.octx.as_mut().unwrap();

        if frame.width() != self.in_width || frame.height() != self.in_height {
            return Err(StreamError::Io(format!(
                "frame size {}x{} does not match stream {}x{}",
                frame.width(),
                frame.height(),
                self.in_width,
                self.in_height
            )));
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.in_width,
            self.in_height,
        );

        // Copy pixel data, respecting ffmpeg's row stride.
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data_mut(0);
        let src = frame.data();
        let row_bytes = self.in_width as usize * 3;
        for row in 0..self.in_height as usize {
            let src_start = row * row_bytes;
            let dst_start = row * stride;
            data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler
            .run(&rgb_frame, &mut yuv_frame)
            .map_err(StreamError::from_ffmpeg)?;
        yuv_frame.set_pts(Some(self.frame_count as i64));

        encoder
            .send_frame(&yuv_frame)
            .map_err(StreamError::from_ffmpeg)?;

        let ost_time_base = octx.stream(self.video_stream_index).unwrap().time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.video_stream_index);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps_i), ost_time_base);
            encoded
                .write_interleaved(octx)
                .map_err(StreamError::from_ffmpeg)?;
        }

        self.frame_count += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StreamError> {
        if let Some(mut encoder) = self.encoder.take() {
            let fps_i = self.fps_i();
            let octx = self.octx.as_mut().unwrap();
            let ost_time_base = octx.stream(self.video_stream_index).unwrap().time_base();

            encoder.send_eof().map_err(StreamError::from_ffmpeg)?;
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(self.video_stream_index);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps_i), ost_time_base);
                encoded
                    .write_interleaved(octx)
                    .map_err(StreamError::from_ffmpeg)?;
            }

            octx.write_trailer().map_err(StreamError::from_ffmpeg)?;
        }

        self.octx = None;
        self.scaler = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::domain::frame_source::FrameSource;
    use crate::stream::infrastructure::tcp_demuxer::TcpDemuxer;

    fn info(w: u32, h: u32, fps: f64) -> StreamInfo {
        StreamInfo {
            width: w,
            height: h,
            fps,
            codec: String::new(),
        }
    }

    fn solid_frame(seq: u64, w: u32, h: u32, value: u8) -> Frame {
        let data = vec![value; (w * h * 3) as usize];
        Frame::new(data, w, h, 3, seq, seq as i64 * 33)
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy());
        sink.open(&info(160, 120, 30.0)).unwrap();
        for i in 0..3 {
            sink.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        sink.finalize().unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_written_stream_has_correct_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy());
        sink.open(&info(160, 120, 30.0)).unwrap();
        sink.write(&solid_frame(0, 160, 120, 128)).unwrap();
        sink.finalize().unwrap();

        let mut source = TcpDemuxer::from_url(path.to_string_lossy());
        let read_back = source.open().unwrap();
        assert_eq!(read_back.width, 160);
        assert_eq!(read_back.height, 120);
    }

    #[test]
    fn test_output_size_override_rescales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy()).with_output_size(80, 60);
        sink.open(&info(160, 120, 30.0)).unwrap();
        sink.write(&solid_frame(0, 160, 120, 128)).unwrap();
        sink.finalize().unwrap();

        let mut source = TcpDemuxer::from_url(path.to_string_lossy());
        let read_back = source.open().unwrap();
        assert_eq!(read_back.width, 80);
        assert_eq!(read_back.height, 60);
    }

    #[test]
    fn test_write_without_open_returns_error() {
        let mut sink = TcpMuxer::from_url("/tmp/never-written.mp4");
        assert!(sink.write(&solid_frame(0, 160, 120, 128)).is_err());
    }

    #[test]
    fn test_write_rejects_mismatched_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy());
        sink.open(&info(160, 120, 30.0)).unwrap();
        assert!(sink.write(&solid_frame(0, 80, 60, 128)).is_err());
        sink.finalize().unwrap();
    }

    #[test]
    fn test_finalize_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy());
        sink.open(&info(160, 120, 30.0)).unwrap();
        sink.write(&solid_frame(0, 160, 120, 128)).unwrap();
        sink.finalize().unwrap();
        sink.finalize().unwrap();
    }

    #[test]
    fn test_roundtrip_preserves_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.mp4");

        let mut sink = TcpMuxer::from_url(path.to_string_lossy());
        sink.open(&info(160, 120, 30.0)).unwrap();
        for i in 0..3 {
            sink.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        sink.finalize().unwrap();

        let mut source = TcpDemuxer::from_url(path.to_string_lossy());
        source.open().unwrap();
        let frames: Vec<_> = source.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);

        // Codec is lossy, but overall brightness should be close.
        let first = &frames[0];
        let avg: f64 =
            first.data().iter().map(|&b| b as f64).sum::<f64>() / first.data().len() as f64;
        assert!(
            (avg - 128.0).abs() < 40.0,
            "average pixel value {avg} should be close to 128"
        );
    }
}
