use crate::shared::error::StreamError;
use crate::shared::frame::Frame;
use crate::shared::stream_info::StreamInfo;
use crate::stream::domain::frame_source::FrameSource;
use crate::stream::endpoint::StreamEndpoint;

/// Decodes an inbound compressed bitstream via ffmpeg-next
/// (libavformat + libavcodec) into RGB24 frames.
///
/// The transport is whatever the URL names; for the relay that is a
/// `tcp://` endpoint carrying mpegts, but any ffmpeg-readable URL works,
/// which the tests use to decode from plain files.
pub struct TcpDemuxer {
    url: String,
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    info: Option<StreamInfo>,
}

// Safety: TcpDemuxer is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for TcpDemuxer {}

impl TcpDemuxer {
    pub fn new(endpoint: &StreamEndpoint, open_timeout_secs: u64) -> Self {
        Self::from_url(endpoint.ffmpeg_url(open_timeout_secs))
    }

    /// Opens any ffmpeg-readable URL (including a file path).
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            input_ctx: None,
            video_stream_index: 0,
            info: None,
        }
    }
}

impl FrameSource for TcpDemuxer {
    fn open(&mut self) -> Result<StreamInfo, StreamError> {
        ffmpeg_next::init().map_err(StreamError::from_ffmpeg)?;

        let ictx = ffmpeg_next::format::input(&self.url).map_err(StreamError::from_ffmpeg)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| StreamError::Format("no video stream found".into()))?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(StreamError::from_ffmpeg)?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(StreamError::from_ffmpeg)?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let info = StreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
        };

        self.video_stream_index = video_stream_index;
        self.info = Some(info.clone());
        self.input_ctx = Some(ictx);

        Ok(info)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, StreamError>> + '_> {
        let Some(ictx) = self.input_ctx.as_mut() else {
            return Box::new(std::iter::once(Err(StreamError::Io(
                "demuxer not opened".into(),
            ))));
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .unwrap();
        let time_base = stream.time_base();
        let ms_per_tick = if time_base.denominator() != 0 {
            1000.0 * time_base.numerator() as f64 / time_base.denominator() as f64
        } else {
            0.0
        };

        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(stream.parameters()).unwrap();
        let decoder = codec_ctx.decoder().video().unwrap();

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        Box::new(DemuxFrameIter {
            ictx,
            decoder,
            scaler,
            width,
            height,
            ms_per_tick,
            video_stream_index: self.video_stream_index,
            seq: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.info = None;
    }
}

/// Lazy iterator decoding one frame at a time so the whole stream is
/// never buffered in memory.
struct DemuxFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    ms_per_tick: f64,
    video_stream_index: usize,
    seq: u64,
    flushing: bool,
    done: bool,
}

impl DemuxFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, StreamError>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
                return Some(Err(StreamError::from_ffmpeg(e)));
            }

            let pts_ms = decoded
                .pts()
                .map(|pts| (pts as f64 * self.ms_per_tick).round() as i64)
                .unwrap_or_else(|| (self.seq as f64 * self.ms_per_tick).round() as i64);

            let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
            let frame = Frame::new(pixels, self.width, self.height, 3, self.seq, pts_ms);
            self.seq += 1;
            Some(Ok(frame))
        } else {
            None
        }
    }
}

impl Iterator for DemuxFrameIter<'_> {
    type Item = Result<Frame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                // Peer closed: flush the decoder, then end the iterator.
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            // A rejected packet means transient corruption; the decoder
            // resynchronizes on the next keyframe.
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may pad each row (stride > width*3); the padding is
/// stripped to produce a tightly-packed buffer.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
